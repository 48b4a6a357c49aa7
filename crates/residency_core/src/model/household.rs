//! Household domain model.
//!
//! # Responsibility
//! - Define the administrative residency unit tracked independently of its
//!   members.
//!
//! # Invariants
//! - `code` is unique and non-blank.
//! - `head_person_id` mirrors the single active `is_head` membership and is
//!   only written by the lifecycle service.
//! - `version` increases on every household-level mutation.

use crate::model::person::PersonId;
use crate::model::validation::{normalize_optional_text, ModelValidationError};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type HouseholdId = Uuid;

pub const DEFAULT_HOUSEHOLD_TYPE: &str = "permanent";

/// Persisted household record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Household {
    pub id: HouseholdId,
    pub code: String,
    pub address: String,
    pub head_person_id: Option<PersonId>,
    /// Serialized as `type` to match the interchange shape.
    #[serde(rename = "type")]
    pub household_type: String,
    pub note: Option<String>,
    /// Optimistic concurrency counter.
    pub version: i64,
}

/// Registration input for a new household.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewHousehold {
    pub code: String,
    pub address: String,
    /// Defaults to [`DEFAULT_HOUSEHOLD_TYPE`] when blank.
    pub household_type: Option<String>,
    pub note: Option<String>,
    /// Existing person registered as head at creation time.
    pub head_person_id: Option<PersonId>,
}

impl NewHousehold {
    pub fn new(code: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            address: address.into(),
            ..Self::default()
        }
    }

    /// Builds the record to insert, trimming text fields.
    ///
    /// The head pointer is left unset; the lifecycle service links the head
    /// only after its membership exists.
    pub fn into_household(self) -> Result<Household, ModelValidationError> {
        let code = self.code.trim().to_string();
        if code.is_empty() {
            return Err(ModelValidationError::BlankHouseholdCode);
        }
        Ok(Household {
            id: Uuid::new_v4(),
            code,
            address: self.address.trim().to_string(),
            head_person_id: None,
            household_type: normalize_optional_text(self.household_type.as_deref())
                .unwrap_or_else(|| DEFAULT_HOUSEHOLD_TYPE.to_string()),
            note: normalize_optional_text(self.note.as_deref()),
            version: 1,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{NewHousehold, DEFAULT_HOUSEHOLD_TYPE};
    use crate::model::validation::ModelValidationError;

    #[test]
    fn blank_code_is_rejected() {
        let err = NewHousehold::new("   ", "1 Main St").into_household().unwrap_err();
        assert_eq!(err, ModelValidationError::BlankHouseholdCode);
    }

    #[test]
    fn defaults_are_applied() {
        let household = NewHousehold::new(" HK001 ", " 1 Main St ")
            .into_household()
            .unwrap();
        assert_eq!(household.code, "HK001");
        assert_eq!(household.address, "1 Main St");
        assert_eq!(household.household_type, DEFAULT_HOUSEHOLD_TYPE);
        assert_eq!(household.head_person_id, None);
        assert_eq!(household.version, 1);
    }
}
