//! Credential and OTP verification with failure counters.

mod errors;
mod sql;
mod store;
mod types;
mod verify;

pub use errors::CredentialError;
pub use sql::SqlCredentialStore;
pub use store::{CredentialStore, MemoryCredentialStore, MemoryOtpStore, OtpStore};
pub use types::{
    AuthenticationResult, Credential, CredentialStatus, Otp, OtpStatus, VerificationMode,
};
pub use verify::{CredentialVerifier, remaining_attempts, unblock_credential};
