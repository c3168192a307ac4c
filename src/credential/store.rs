use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::storage::StorageError;

use super::types::{Credential, Otp};

/// Storage contract for credentials, keyed by (user id, credential name).
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_credential(
        &self,
        user_id: &str,
        credential_name: &str,
    ) -> Result<Option<Credential>, StorageError>;

    async fn save_credential(&self, credential: &Credential) -> Result<(), StorageError>;
}

/// Storage contract for one-time passwords, keyed by OTP id.
#[async_trait]
pub trait OtpStore: Send + Sync {
    async fn find_otp(&self, otp_id: &str) -> Result<Option<Otp>, StorageError>;

    async fn save_otp(&self, otp: &Otp) -> Result<(), StorageError>;
}

/// In-memory credential store.
#[derive(Default)]
pub struct MemoryCredentialStore {
    credentials: Mutex<HashMap<(String, String), Credential>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn find_credential(
        &self,
        user_id: &str,
        credential_name: &str,
    ) -> Result<Option<Credential>, StorageError> {
        let credentials = self.credentials.lock().expect("credential store poisoned");
        Ok(credentials
            .get(&(user_id.to_string(), credential_name.to_string()))
            .cloned())
    }

    async fn save_credential(&self, credential: &Credential) -> Result<(), StorageError> {
        let mut credentials = self.credentials.lock().expect("credential store poisoned");
        credentials.insert(
            (
                credential.user_id.clone(),
                credential.credential_name.clone(),
            ),
            credential.clone(),
        );
        Ok(())
    }
}

/// In-memory OTP store.
#[derive(Default)]
pub struct MemoryOtpStore {
    otps: Mutex<HashMap<String, Otp>>,
}

impl MemoryOtpStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OtpStore for MemoryOtpStore {
    async fn find_otp(&self, otp_id: &str) -> Result<Option<Otp>, StorageError> {
        let otps = self.otps.lock().expect("otp store poisoned");
        Ok(otps.get(otp_id).cloned())
    }

    async fn save_otp(&self, otp: &Otp) -> Result<(), StorageError> {
        let mut otps = self.otps.lock().expect("otp store poisoned");
        otps.insert(otp.otp_id.clone(), otp.clone());
        Ok(())
    }
}
