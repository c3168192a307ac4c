//! Orchestration module
//!
//! High-level entry points tying the resolution engine, the credential
//! verifier and the storage collaborators together. This is the surface a
//! request-handling layer talks to.
//!
//! The module is divided into several submodules:
//! - `errors`: Error type specific to orchestration
//! - `operation`: Operation creation, update and read-only detail lookup
//! - `verify`: Credential/OTP verification feeding the engine

mod errors;
mod operation;
mod verify;

use std::sync::Arc;

use crate::catalog::StepCatalog;
use crate::credential::{CredentialStore, CredentialVerifier, OtpStore};
use crate::engine::StepEngine;
use crate::mobile::MobileTokenService;
use crate::operation::OperationStore;
use crate::proxy::DelegatedAuthenticator;
use crate::secret::SecretProtection;
use crate::users::UserPreferenceProvider;

pub use errors::OrchestrationError;
pub use operation::OperationDetail;
pub use verify::{
    VerificationResponse, VerifyCombinedRequest, VerifyCredentialRequest, VerifyOtpRequest,
};

/// The orchestration facade. Owns the engine and the verifier and routes
/// every public operation through them.
pub struct Orchestrator {
    engine: StepEngine,
    operations: Arc<dyn OperationStore>,
    credentials: Arc<dyn CredentialStore>,
    otps: Arc<dyn OtpStore>,
    verifier: CredentialVerifier,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        catalog: Arc<StepCatalog>,
        operations: Arc<dyn OperationStore>,
        credentials: Arc<dyn CredentialStore>,
        otps: Arc<dyn OtpStore>,
        preferences: Arc<dyn UserPreferenceProvider>,
        mobile: Arc<dyn MobileTokenService>,
        secrets: Arc<dyn SecretProtection>,
        delegate: Arc<dyn DelegatedAuthenticator>,
    ) -> Self {
        let engine = StepEngine::new(catalog, operations.clone(), preferences, mobile);
        let verifier = CredentialVerifier::new(secrets, delegate);
        Self {
            engine,
            operations,
            credentials,
            otps,
            verifier,
        }
    }
}
