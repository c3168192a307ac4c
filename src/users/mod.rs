//! User preference collaborator: which auth methods a user has enabled and
//! their per-method configuration.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::operation::AuthMethod;

#[derive(Debug, Error)]
pub enum PreferenceError {
    #[error("Preference service unavailable: {0}")]
    Unavailable(String),
}

/// Per-user, per-method configuration attached to an enabled method.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AuthMethodConfig {
    /// Overrides the method policy's max-fails for this user when set.
    pub max_auth_fails: Option<u32>,
    /// Mobile-token activation bound to this user, required for the
    /// mobile-token method.
    pub activation_id: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EnabledAuthMethod {
    pub auth_method: AuthMethod,
    pub config: AuthMethodConfig,
}

/// Directory of the auth methods each user has enabled.
#[async_trait]
pub trait UserPreferenceProvider: Send + Sync {
    async fn enabled_auth_methods(
        &self,
        user_id: &str,
    ) -> Result<Vec<EnabledAuthMethod>, PreferenceError>;
}

/// In-memory preference provider for tests and embedded deployments.
#[derive(Default)]
pub struct MemoryUserPreferences {
    methods: Mutex<HashMap<String, Vec<EnabledAuthMethod>>>,
}

impl MemoryUserPreferences {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enable_method(&self, user_id: &str, auth_method: AuthMethod, config: AuthMethodConfig) {
        let mut methods = self.methods.lock().expect("preferences poisoned");
        methods
            .entry(user_id.to_string())
            .or_default()
            .push(EnabledAuthMethod {
                auth_method,
                config,
            });
    }
}

#[async_trait]
impl UserPreferenceProvider for MemoryUserPreferences {
    async fn enabled_auth_methods(
        &self,
        user_id: &str,
    ) -> Result<Vec<EnabledAuthMethod>, PreferenceError> {
        let methods = self.methods.lock().expect("preferences poisoned");
        Ok(methods.get(user_id).cloned().unwrap_or_default())
    }
}
