use thiserror::Error;

use crate::proxy::DelegatedAuthError;
use crate::secret::SecretError;
use crate::storage::StorageError;

/// Errors raised by the credential/OTP verification subsystem.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// Malformed or state-contradictory input.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// The entity is not in a status the requested action allows.
    #[error("Not active: {0}")]
    NotActive(String),

    /// Raised by administrative unblock paths when the entity is not blocked.
    #[error("Not blocked: {0}")]
    NotBlocked(String),

    /// Secret-protection collaborator failure.
    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Delegated authentication error: {0}")]
    Delegated(#[from] DelegatedAuthError),
}

impl From<SecretError> for CredentialError {
    fn from(err: SecretError) -> Self {
        Self::Encryption(err.to_string())
    }
}
