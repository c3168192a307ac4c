//! Mobile-token companion service collaborator.
//!
//! The mobile-token method requires a live activation on the companion
//! service; choosing it also registers a companion operation the mobile app
//! approves out of band.

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use thiserror::Error;

use crate::operation::Operation;

#[derive(Debug, Error)]
pub enum MobileTokenError {
    #[error("Mobile token service unavailable: {0}")]
    Unavailable(String),

    #[error("Activation not found: {0}")]
    ActivationNotFound(String),
}

/// Liveness state of a mobile-token activation. Anything that is not
/// `Active` makes the method unavailable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActivationStatus {
    Active,
    Other,
}

#[async_trait]
pub trait MobileTokenService: Send + Sync {
    async fn activation_status(
        &self,
        activation_id: &str,
    ) -> Result<ActivationStatus, MobileTokenError>;

    /// Register a companion operation for the mobile app to approve.
    /// Returns the companion operation id.
    async fn register_companion_operation(
        &self,
        operation: &Operation,
        activation_id: &str,
    ) -> Result<String, MobileTokenError>;
}

/// In-memory mobile-token service for tests.
#[derive(Default)]
pub struct MemoryMobileTokenService {
    active: Mutex<HashSet<String>>,
    registered: Mutex<Vec<(String, String)>>,
}

impl MemoryMobileTokenService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn activate(&self, activation_id: &str) {
        self.active
            .lock()
            .expect("mobile service poisoned")
            .insert(activation_id.to_string());
    }

    /// Registered (operation id, activation id) pairs, for assertions.
    pub fn registrations(&self) -> Vec<(String, String)> {
        self.registered
            .lock()
            .expect("mobile service poisoned")
            .clone()
    }
}

#[async_trait]
impl MobileTokenService for MemoryMobileTokenService {
    async fn activation_status(
        &self,
        activation_id: &str,
    ) -> Result<ActivationStatus, MobileTokenError> {
        let active = self.active.lock().expect("mobile service poisoned");
        if active.contains(activation_id) {
            Ok(ActivationStatus::Active)
        } else {
            Ok(ActivationStatus::Other)
        }
    }

    async fn register_companion_operation(
        &self,
        operation: &Operation,
        activation_id: &str,
    ) -> Result<String, MobileTokenError> {
        let mut registered = self.registered.lock().expect("mobile service poisoned");
        registered.push((operation.operation_id.clone(), activation_id.to_string()));
        Ok(format!("mtoken-{}", operation.operation_id))
    }
}
