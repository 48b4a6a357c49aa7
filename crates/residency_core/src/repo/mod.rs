//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define use-case oriented data access contracts for the registry store
//!   and the two audit logs.
//! - Isolate SQLite query details from lifecycle orchestration.
//!
//! # Invariants
//! - Repositories never open or commit transactions; they run on whatever
//!   connection or transaction the caller hands them, so state changes and
//!   audit rows always share one commit.
//! - Repository APIs return semantic errors (`NotFound`, `UniqueViolation`)
//!   in addition to DB transport errors.

pub mod history_repo;
pub mod household_repo;
pub mod membership_repo;
pub mod person_event_repo;
pub mod person_repo;
pub mod temp_residence_repo;

use crate::db::DbError;
use rusqlite::ffi;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub type RepoResult<T> = Result<T, RepoError>;

/// Generic repository error for registry persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    NotFound { entity: &'static str, id: Uuid },
    /// A unique constraint rejected the write.
    UniqueViolation(String),
    InvalidData(String),
    /// An audit payload could not be encoded as JSON.
    Encoding(serde_json::Error),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound { entity, id } => write!(f, "{entity} not found: {id}"),
            Self::UniqueViolation(message) => write!(f, "unique constraint violated: {message}"),
            Self::InvalidData(message) => write!(f, "invalid persisted registry data: {message}"),
            Self::Encoding(err) => write!(f, "audit payload encoding failed: {err}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::NotFound { .. } => None,
            Self::UniqueViolation(_) => None,
            Self::InvalidData(_) => None,
            Self::Encoding(err) => Some(err),
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<serde_json::Error> for RepoError {
    fn from(value: serde_json::Error) -> Self {
        Self::Encoding(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(err, message) = &value {
            if err.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE {
                return Self::UniqueViolation(
                    message
                        .clone()
                        .unwrap_or_else(|| "unique constraint".to_string()),
                );
            }
        }
        Self::Db(DbError::Sqlite(value))
    }
}

pub(crate) fn parse_uuid(value: &str, column: &'static str) -> RepoResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid uuid `{value}` in {column}")))
}

pub(crate) fn parse_optional_uuid(
    value: Option<String>,
    column: &'static str,
) -> RepoResult<Option<Uuid>> {
    value.map(|value| parse_uuid(&value, column)).transpose()
}

pub(crate) fn parse_enum<T>(
    value: &str,
    column: &'static str,
    parse: impl FnOnce(&str) -> Option<T>,
) -> RepoResult<T> {
    parse(value).ok_or_else(|| RepoError::InvalidData(format!("invalid value `{value}` in {column}")))
}

pub(crate) fn parse_bool(value: i64, column: &'static str) -> RepoResult<bool> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(RepoError::InvalidData(format!(
            "invalid boolean value `{other}` in {column}"
        ))),
    }
}

pub(crate) fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}

pub(crate) fn now_epoch_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::{parse_bool, parse_uuid, RepoError};

    #[test]
    fn parse_bool_rejects_out_of_range() {
        assert!(matches!(
            parse_bool(2, "memberships.is_head"),
            Err(RepoError::InvalidData(_))
        ));
    }

    #[test]
    fn parse_uuid_names_the_column() {
        let err = parse_uuid("nope", "persons.id").unwrap_err();
        assert!(err.to_string().contains("persons.id"));
    }
}
