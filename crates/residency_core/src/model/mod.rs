//! Registry domain model.
//!
//! # Responsibility
//! - Define canonical records for households, persons, memberships,
//!   temporary residences and the two append-only audit logs.
//! - Own text encodings of enum columns shared by every repository.
//!
//! # Invariants
//! - Every record is identified by a stable UUID.
//! - A membership with `end_date == None` is the person's single active link.
//! - Audit records are immutable once constructed.

pub mod event;
pub mod household;
pub mod membership;
pub mod person;
pub mod temp_residence;
pub mod validation;

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Opaque identifier of the operator performing a change.
///
/// Supplied by the identity layer and stamped onto audit rows verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Actor(String);

impl Actor {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Actor used by background reconciliation passes.
    pub fn system() -> Self {
        Self("system".to_string())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Display for Actor {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
