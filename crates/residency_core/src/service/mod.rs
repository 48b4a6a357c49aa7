//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls into atomic registry operations.
//! - Keep callers decoupled from storage details.
//!
//! # Invariants
//! - Every mutating operation runs inside exactly one immediate transaction
//!   opened by [`in_transaction`]; state rows and audit rows commit together
//!   or not at all.

pub mod consistency;
pub mod error;
pub mod lifecycle_service;
pub mod reconcile_service;
pub mod registry_service;

use crate::model::household::{Household, HouseholdId};
use crate::model::person::{Person, PersonId};
use crate::repo::history_repo::SqliteHistoryLog;
use crate::repo::household_repo::{HouseholdRepository, SqliteHouseholdRepository};
use crate::repo::membership_repo::SqliteMembershipRepository;
use crate::repo::person_event_repo::SqlitePersonEventLog;
use crate::repo::person_repo::{PersonRepository, SqlitePersonRepository};
use crate::repo::temp_residence_repo::SqliteTempResidenceRepository;
use crate::repo::RepoError;
use error::{LifecycleError, LifecycleResult};
use log::{info, warn};
use rusqlite::{Connection, TransactionBehavior};
use std::fmt::Display;
use std::time::Instant;

/// All repositories bound to one connection or open transaction.
pub(crate) struct RegistryStore<'conn> {
    pub households: SqliteHouseholdRepository<'conn>,
    pub persons: SqlitePersonRepository<'conn>,
    pub memberships: SqliteMembershipRepository<'conn>,
    pub temp_residences: SqliteTempResidenceRepository<'conn>,
    pub history: SqliteHistoryLog<'conn>,
    pub person_events: SqlitePersonEventLog<'conn>,
}

impl<'conn> RegistryStore<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self {
            households: SqliteHouseholdRepository::new(conn),
            persons: SqlitePersonRepository::new(conn),
            memberships: SqliteMembershipRepository::new(conn),
            temp_residences: SqliteTempResidenceRepository::new(conn),
            history: SqliteHistoryLog::new(conn),
            person_events: SqlitePersonEventLog::new(conn),
        }
    }

    pub fn require_household(&self, id: HouseholdId) -> LifecycleResult<Household> {
        self.households
            .get_household(id)?
            .ok_or(LifecycleError::NotFound {
                entity: "household",
                id,
            })
    }

    pub fn require_person(&self, id: PersonId) -> LifecycleResult<Person> {
        self.persons.get_person(id)?.ok_or(LifecycleError::NotFound {
            entity: "person",
            id,
        })
    }
}

/// Runs `body` inside one immediate transaction.
///
/// The write lock is held from the first read, so preconditions checked by
/// `body` still hold at commit. Any error drops the transaction, which rolls
/// back every statement issued by `body`.
pub(crate) fn in_transaction<T, E>(
    conn: &mut Connection,
    operation: &'static str,
    body: impl FnOnce(&RegistryStore<'_>) -> Result<T, E>,
) -> Result<T, E>
where
    E: From<RepoError> + Display,
{
    let started_at = Instant::now();
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(RepoError::from)?;

    let outcome = body(&RegistryStore::new(&tx));
    match outcome {
        Ok(value) => {
            tx.commit().map_err(RepoError::from)?;
            info!(
                "event={} module=service status=ok duration_ms={}",
                operation,
                started_at.elapsed().as_millis()
            );
            Ok(value)
        }
        Err(err) => {
            drop(tx);
            warn!(
                "event={} module=service status=rolled_back duration_ms={} error={}",
                operation,
                started_at.elapsed().as_millis(),
                err
            );
            Err(err)
        }
    }
}

/// Calendar date used when a request does not carry one.
pub(crate) fn today() -> chrono::NaiveDate {
    chrono::Local::now().date_naive()
}
