//! Error taxonomy of registry operations.

use crate::model::validation::ModelValidationError;
use crate::repo::RepoError;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub type LifecycleResult<T> = Result<T, LifecycleError>;

/// Failure of a lifecycle, registry or reconciliation operation.
///
/// Every variant implies the operation's transaction was rolled back.
#[derive(Debug)]
pub enum LifecycleError {
    /// Missing household, person or active membership.
    NotFound { entity: &'static str, id: Uuid },
    /// Duplicate national id or code, an existing active head, or a stale
    /// household version.
    Conflict(String),
    /// Structurally invalid request.
    Validation(String),
    /// A referenced membership is not active or belongs to another household.
    Consistency(String),
    /// Datastore failure; not retried inside core.
    Repo(RepoError),
}

impl LifecycleError {
    /// Whether the caller can fix its input and retry.
    pub fn is_caller_recoverable(&self) -> bool {
        !matches!(self, Self::Repo(_))
    }
}

impl Display for LifecycleError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound { entity, id } => write!(f, "{entity} not found: {id}"),
            Self::Conflict(message) => write!(f, "conflict: {message}"),
            Self::Validation(message) => write!(f, "validation failed: {message}"),
            Self::Consistency(message) => write!(f, "inconsistent reference: {message}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for LifecycleError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for LifecycleError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound { entity, id } => Self::NotFound { entity, id },
            RepoError::UniqueViolation(message) => Self::Conflict(message),
            other => Self::Repo(other),
        }
    }
}

impl From<serde_json::Error> for LifecycleError {
    fn from(value: serde_json::Error) -> Self {
        Self::Repo(RepoError::Encoding(value))
    }
}

impl From<ModelValidationError> for LifecycleError {
    fn from(value: ModelValidationError) -> Self {
        Self::Validation(value.to_string())
    }
}
