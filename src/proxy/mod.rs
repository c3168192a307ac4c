//! Delegated ("proxy") authentication collaborator.
//!
//! Credential and OTP definitions can be flagged proxy-enabled, in which case
//! the secret comparison is performed entirely by an external backend and the
//! core only threads the boolean result into the counters and the engine.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DelegatedAuthError {
    #[error("Delegated authentication backend unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait DelegatedAuthenticator: Send + Sync {
    /// Verify `value` against the delegated backend's record for the given
    /// definition and user.
    async fn verify_value(
        &self,
        definition_name: &str,
        user_id: Option<&str>,
        value: &str,
    ) -> Result<bool, DelegatedAuthError>;
}

/// In-memory delegated backend for tests: a map of
/// (definition name, user id) to the expected value.
#[derive(Default)]
pub struct MemoryDelegatedAuthenticator {
    expected: Mutex<HashMap<(String, Option<String>), String>>,
}

impl MemoryDelegatedAuthenticator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_expected(&self, definition_name: &str, user_id: Option<&str>, value: &str) {
        self.expected
            .lock()
            .expect("delegated authenticator poisoned")
            .insert(
                (definition_name.to_string(), user_id.map(str::to_string)),
                value.to_string(),
            );
    }
}

#[async_trait]
impl DelegatedAuthenticator for MemoryDelegatedAuthenticator {
    async fn verify_value(
        &self,
        definition_name: &str,
        user_id: Option<&str>,
        value: &str,
    ) -> Result<bool, DelegatedAuthError> {
        let expected = self
            .expected
            .lock()
            .expect("delegated authenticator poisoned");
        Ok(expected
            .get(&(definition_name.to_string(), user_id.map(str::to_string)))
            .is_some_and(|v| v == value))
    }
}
