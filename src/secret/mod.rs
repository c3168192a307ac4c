//! Secret protection collaborator.
//!
//! The hashing scheme is pluggable; the crate ships a SHA-256 digest
//! implementation and a plaintext one. Comparisons are constant-time.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SecretError {
    #[error("Secret protection error: {0}")]
    Protection(String),
}

/// A protected secret value together with the tag of the algorithm that
/// produced it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProtectedSecret {
    pub value: String,
    pub algorithm: String,
}

/// Pluggable secret protection: one-way protect plus verify.
pub trait SecretProtection: Send + Sync {
    fn algorithm(&self) -> &'static str;

    fn protect(&self, value: &str) -> Result<ProtectedSecret, SecretError>;

    fn verify(&self, value: &str, protected: &str) -> Result<bool, SecretError>;
}

/// SHA-256 digest protection; the protected form is the base64url digest.
#[derive(Default)]
pub struct Sha256SecretProtection;

impl Sha256SecretProtection {
    pub const TAG: &'static str = "SHA-256";

    pub fn new() -> Self {
        Self
    }
}

impl SecretProtection for Sha256SecretProtection {
    fn algorithm(&self) -> &'static str {
        Self::TAG
    }

    fn protect(&self, value: &str) -> Result<ProtectedSecret, SecretError> {
        let digest = Sha256::digest(value.as_bytes());
        Ok(ProtectedSecret {
            value: URL_SAFE_NO_PAD.encode(digest),
            algorithm: Self::TAG.to_string(),
        })
    }

    fn verify(&self, value: &str, protected: &str) -> Result<bool, SecretError> {
        let digest = Sha256::digest(value.as_bytes());
        let stored = URL_SAFE_NO_PAD
            .decode(protected)
            .map_err(|e| SecretError::Protection(format!("invalid protected value: {e}")))?;
        Ok(digest.as_slice().ct_eq(&stored).into())
    }
}

/// Stores the value as-is. Required for positions-only verification, where
/// individual characters of the stored value must be addressable.
#[derive(Default)]
pub struct PlainTextSecretProtection;

impl PlainTextSecretProtection {
    pub const TAG: &'static str = "PLAIN_TEXT";

    pub fn new() -> Self {
        Self
    }
}

impl SecretProtection for PlainTextSecretProtection {
    fn algorithm(&self) -> &'static str {
        Self::TAG
    }

    fn protect(&self, value: &str) -> Result<ProtectedSecret, SecretError> {
        Ok(ProtectedSecret {
            value: value.to_string(),
            algorithm: Self::TAG.to_string(),
        })
    }

    fn verify(&self, value: &str, protected: &str) -> Result<bool, SecretError> {
        Ok(value.as_bytes().ct_eq(protected.as_bytes()).into())
    }
}
