use thiserror::Error;

use crate::catalog::CatalogError;
use crate::mobile::MobileTokenError;
use crate::storage::StorageError;
use crate::users::PreferenceError;

/// Errors raised by the step resolution engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed or state-contradictory input.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Operation not found: {0}")]
    NotFound(String),

    #[error("Operation already exists: {0}")]
    AlreadyExists(String),

    /// Ambiguous or missing step definitions, duplicate priorities or bad
    /// policy parameters. Always a deployment defect.
    #[error("Invalid step configuration: {0}")]
    InvalidConfiguration(String),

    /// The persisted operation violates a structural invariant.
    #[error("Operation is not valid: {0}")]
    OperationNotValid(String),

    #[error("Operation is already finished")]
    AlreadyFinished,

    #[error("Operation is already canceled")]
    AlreadyCanceled,

    #[error("Operation has already failed")]
    AlreadyFailed,

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Preference error: {0}")]
    Preferences(#[from] PreferenceError),

    #[error("Mobile token error: {0}")]
    MobileToken(#[from] MobileTokenError),
}

impl From<CatalogError> for EngineError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::InvalidConfiguration(msg) => Self::InvalidConfiguration(msg),
            CatalogError::Preferences(err) => Self::Preferences(err),
            CatalogError::MobileToken(err) => Self::MobileToken(err),
        }
    }
}
