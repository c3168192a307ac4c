use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a credential.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CredentialStatus {
    Active,
    /// Soft-fail limit reached; unblockable by an administrator.
    BlockedTemporary,
    /// Hard-fail limit reached.
    BlockedPermanent,
    Removed,
}

/// Lifecycle status of a one-time password.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OtpStatus {
    Active,
    Used,
    Blocked,
    /// Lifecycle owned by a delegated backend.
    External,
    Removed,
}

/// A verifiable long-lived secret bound to a user.
///
/// Mutated exclusively through the verification subsystem; every attempt
/// updates the counters, failures drive the blocking transitions.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Credential {
    pub credential_id: String,
    /// Name of the credential definition, e.g. "PIN" or "PASSWORD".
    pub credential_name: String,
    pub user_id: String,
    pub status: CredentialStatus,
    pub protected_value: String,
    /// Algorithm tag of the secret-protection collaborator that produced
    /// `protected_value`.
    pub algorithm: String,
    pub attempt_counter: u64,
    pub failed_attempt_counter_soft: u64,
    pub failed_attempt_counter_hard: u64,
    /// Soft-fail limit; reaching it blocks temporarily. Unset means no limit.
    pub soft_limit: Option<u64>,
    /// Hard-fail limit; reaching it blocks permanently. Unset means no limit.
    pub hard_limit: Option<u64>,
    /// Stamped once per transition into a blocked status.
    pub blocked_at: Option<DateTime<Utc>>,
    /// Verification is delegated to the proxy backend when set.
    pub proxy_enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A verifiable one-time secret, optionally bound to a user and an operation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Otp {
    pub otp_id: String,
    /// Name of the OTP definition, e.g. "SMS_CODE".
    pub otp_name: String,
    pub user_id: Option<String>,
    pub operation_id: Option<String>,
    pub status: OtpStatus,
    pub protected_value: String,
    pub algorithm: String,
    pub attempt_counter: u64,
    pub failed_attempt_counter: u64,
    /// Total failed attempts allowed. Unset means no limit.
    pub attempt_limit: Option<u64>,
    pub expires_at: Option<DateTime<Utc>>,
    pub proxy_enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// How a submitted value is compared against the stored secret.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationMode {
    /// Full comparison through the secret-protection collaborator.
    Match,
    /// Compare only the listed character positions of the stored value.
    PositionsOnly { positions: Vec<usize> },
}

/// Outcome of one raw verification attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthenticationResult {
    Succeeded,
    Failed,
}
