//! authstep - Next-step decision engine for multi-factor authentication flows
//!
//! This crate resolves which authentication step a multi-step operation
//! should take next, based on a configured step catalog, the operation's
//! accumulated history and per-user method state, and verifies the
//! credentials and one-time passwords submitted along the way.

mod catalog;
mod config;
mod coordination;
mod credential;
mod engine;
mod mobile;
mod operation;
mod proxy;
mod secret;
mod storage;
mod users;

// Re-export the orchestration entry points
pub use coordination::{
    OperationDetail, OrchestrationError, Orchestrator, VerificationResponse,
    VerifyCombinedRequest, VerifyCredentialRequest, VerifyOtpRequest,
};

pub use engine::{
    CreateOperationRequest, CreateOperationResponse, EngineError, StepEngine,
    UpdateOperationRequest, UpdateOperationResponse, DESC_INVALID_REQUEST,
    DESC_METHOD_NOT_AVAILABLE, DESC_NO_AUTH_METHOD, DESC_OPERATION_CANCELED,
    DESC_OPERATION_TIMEOUT,
};

pub use catalog::{
    AuthMethodPolicy, CatalogError, CatalogSnapshot, OperationType, StepCatalog, StepDefinition,
    StepLookupFilter,
};

pub use operation::{
    AuthMethod, AuthStepResult, MemoryOperationStore, Operation, OperationHistoryEntry,
    OperationResult, OperationStep, OperationStore, SqlOperationStore,
};

pub use credential::{
    AuthenticationResult, Credential, CredentialError, CredentialStatus, CredentialStore,
    CredentialVerifier, MemoryCredentialStore, MemoryOtpStore, Otp, OtpStatus, OtpStore,
    SqlCredentialStore, VerificationMode, remaining_attempts, unblock_credential,
};

pub use mobile::{
    ActivationStatus, MemoryMobileTokenService, MobileTokenError, MobileTokenService,
};
pub use proxy::{DelegatedAuthError, DelegatedAuthenticator, MemoryDelegatedAuthenticator};
pub use secret::{
    PlainTextSecretProtection, ProtectedSecret, SecretError, SecretProtection,
    Sha256SecretProtection,
};
pub use storage::{DbPool, StorageError};
pub use users::{
    AuthMethodConfig, EnabledAuthMethod, MemoryUserPreferences, PreferenceError,
    UserPreferenceProvider,
};
