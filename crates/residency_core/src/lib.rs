//! Core of the residency registry: households, persons and the membership
//! lifecycle that links them.
//! This crate is the single source of truth for registry invariants.

pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use db::{open_db, open_db_in_memory, DbError, DbResult};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::event::{
    HistoryEvent, HistoryEventType, HistoryValue, PersonEvent, PersonEventType,
};
pub use model::household::{Household, HouseholdId, NewHousehold};
pub use model::membership::{Membership, MembershipId, MembershipType};
pub use model::person::{
    Gender, NewPerson, Person, PersonId, PersonProfilePatch, ResidencyStatus,
};
pub use model::temp_residence::{TempResidence, TempResidenceStatus, TempResidenceType};
pub use model::validation::ModelValidationError;
pub use model::Actor;
pub use repo::{RepoError, RepoResult};
pub use service::consistency::{check_invariants, InvariantViolation};
pub use service::error::{LifecycleError, LifecycleResult};
pub use service::lifecycle_service::{
    AddPersonKind, ChangeHeadRequest, LifecycleEvent, LifecycleEventKind, LifecycleOutcome,
    LifecycleService, MemberView, SplitOutcome, SplitRequest,
};
pub use service::reconcile_service::{
    DailyReport, ReconcileService, ReversionReport, SweepReport,
};
pub use service::registry_service::{HouseholdView, NewTempResidence, RegistryService};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
