//! Error type for the orchestration entry points.

use thiserror::Error;

use crate::credential::CredentialError;
use crate::engine::EngineError;
use crate::storage::StorageError;

/// Errors surfaced by the orchestration layer.
#[derive(Debug, Error)]
pub enum OrchestrationError {
    /// Malformed or state-contradictory input
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Deployment defect in the step configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Resource not found with context
    #[error("Resource not found: {resource_type} {resource_id}")]
    ResourceNotFound {
        resource_type: String,
        resource_id: String,
    },

    /// Error from the resolution engine
    #[error("Engine error: {0}")]
    Engine(EngineError),

    /// Error from credential or OTP verification
    #[error("Credential error: {0}")]
    Credential(CredentialError),

    /// Error from the storage collaborators
    #[error("Storage error: {0}")]
    Storage(StorageError),
}

impl OrchestrationError {
    /// Log the error and return self
    ///
    /// This method logs the error with appropriate context and returns self,
    /// allowing for method chaining and explicit logging when needed.
    pub fn log(self) -> Self {
        match &self {
            Self::InvalidRequest(msg) => tracing::error!("Invalid request: {}", msg),
            Self::InvalidConfiguration(msg) => tracing::error!("Invalid configuration: {}", msg),
            Self::ResourceNotFound {
                resource_type,
                resource_id,
            } => tracing::error!("Resource not found: {} {}", resource_type, resource_id),
            Self::Engine(err) => tracing::error!("Engine error: {}", err),
            Self::Credential(err) => tracing::error!("Credential error: {}", err),
            Self::Storage(err) => tracing::error!("Storage error: {}", err),
        }
        self
    }
}

// Custom From implementations that automatically log errors

impl From<EngineError> for OrchestrationError {
    fn from(err: EngineError) -> Self {
        let error = Self::Engine(err);
        tracing::error!("{}", error);
        error
    }
}

impl From<CredentialError> for OrchestrationError {
    fn from(err: CredentialError) -> Self {
        let error = Self::Credential(err);
        tracing::error!("{}", error);
        error
    }
}

impl From<StorageError> for OrchestrationError {
    fn from(err: StorageError) -> Self {
        let error = Self::Storage(err);
        tracing::error!("{}", error);
        error
    }
}
