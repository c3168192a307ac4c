use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Overall result of an authentication operation.
///
/// An operation starts in `Continue` and ends in `Done` or `Failed`. Terminal
/// states are final data; operations are never removed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationResult {
    Continue,
    Done,
    Failed,
}

/// Result of a single authentication step, as submitted by the caller or
/// coerced by the resolution engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthStepResult {
    /// The step was satisfied.
    Confirmed,
    /// The user canceled the operation.
    Canceled,
    /// A single authentication attempt failed; further attempts may remain.
    AuthFailed,
    /// The method has no attempts left (or failed out earlier).
    AuthMethodFailed,
    /// The user chose which advertised method to continue with.
    AuthMethodChosen,
    /// The user requested a downgrade to a weaker advertised method.
    AuthMethodDowngrade,
}

/// A named authentication mechanism.
///
/// `Init` is the synthetic method recorded on the first history entry of every
/// operation. `ShowOperationDetail` is a pseudo-method used by clients to
/// fetch operation detail while an out-of-band method (`SmsOtp` or
/// `MobileToken`) is pending.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthMethod {
    Init,
    UserIdAssign,
    UsernamePassword,
    ShowOperationDetail,
    MobileToken,
    SmsOtp,
    OtpCode,
    Consent,
    LoginSca,
    ApprovalSca,
}

impl OperationResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Continue => "CONTINUE",
            Self::Done => "DONE",
            Self::Failed => "FAILED",
        }
    }
}

impl std::str::FromStr for OperationResult {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CONTINUE" => Ok(Self::Continue),
            "DONE" => Ok(Self::Done),
            "FAILED" => Ok(Self::Failed),
            other => Err(format!("unknown operation result: {other}")),
        }
    }
}

impl AuthStepResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Confirmed => "CONFIRMED",
            Self::Canceled => "CANCELED",
            Self::AuthFailed => "AUTH_FAILED",
            Self::AuthMethodFailed => "AUTH_METHOD_FAILED",
            Self::AuthMethodChosen => "AUTH_METHOD_CHOSEN",
            Self::AuthMethodDowngrade => "AUTH_METHOD_DOWNGRADE",
        }
    }
}

impl std::str::FromStr for AuthStepResult {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CONFIRMED" => Ok(Self::Confirmed),
            "CANCELED" => Ok(Self::Canceled),
            "AUTH_FAILED" => Ok(Self::AuthFailed),
            "AUTH_METHOD_FAILED" => Ok(Self::AuthMethodFailed),
            "AUTH_METHOD_CHOSEN" => Ok(Self::AuthMethodChosen),
            "AUTH_METHOD_DOWNGRADE" => Ok(Self::AuthMethodDowngrade),
            other => Err(format!("unknown step result: {other}")),
        }
    }
}

impl std::str::FromStr for AuthMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INIT" => Ok(Self::Init),
            "USER_ID_ASSIGN" => Ok(Self::UserIdAssign),
            "USERNAME_PASSWORD" => Ok(Self::UsernamePassword),
            "SHOW_OPERATION_DETAIL" => Ok(Self::ShowOperationDetail),
            "MOBILE_TOKEN" => Ok(Self::MobileToken),
            "SMS_OTP" => Ok(Self::SmsOtp),
            "OTP_CODE" => Ok(Self::OtpCode),
            "CONSENT" => Ok(Self::Consent),
            "LOGIN_SCA" => Ok(Self::LoginSca),
            "APPROVAL_SCA" => Ok(Self::ApprovalSca),
            other => Err(format!("unknown auth method: {other}")),
        }
    }
}

impl AuthMethod {
    /// String form matching the serialized representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "INIT",
            Self::UserIdAssign => "USER_ID_ASSIGN",
            Self::UsernamePassword => "USERNAME_PASSWORD",
            Self::ShowOperationDetail => "SHOW_OPERATION_DETAIL",
            Self::MobileToken => "MOBILE_TOKEN",
            Self::SmsOtp => "SMS_OTP",
            Self::OtpCode => "OTP_CODE",
            Self::Consent => "CONSENT",
            Self::LoginSca => "LOGIN_SCA",
            Self::ApprovalSca => "APPROVAL_SCA",
        }
    }
}

impl std::fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One candidate next step advertised to the caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationStep {
    pub auth_method: AuthMethod,
}

impl OperationStep {
    pub fn new(auth_method: AuthMethod) -> Self {
        Self { auth_method }
    }
}

/// A tracked multi-step authentication transaction.
///
/// Created once, mutated only through the resolution engine's UPDATE path.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Operation {
    pub operation_id: String,
    /// Name of the configured operation, e.g. "login" or "authorize_payment".
    pub operation_name: String,
    /// Opaque operation data blob carried verbatim for the caller.
    pub operation_data: String,
    /// Optional caller correlation id, carried verbatim.
    pub external_transaction_id: Option<String>,
    pub organization_id: Option<String>,
    /// Unknown until the user has been identified during the flow.
    pub user_id: Option<String>,
    pub result: OperationResult,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// One append-only record of a single resolution round.
///
/// Entries are ordered by `sequence`; the entry with the highest sequence is
/// the current one. No field is mutated after creation except
/// `chosen_auth_method`, which the transition handler sets at most once.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OperationHistoryEntry {
    pub operation_id: String,
    pub sequence: i64,
    pub request_auth_method: AuthMethod,
    pub request_step_result: AuthStepResult,
    pub response_result: OperationResult,
    /// Snapshot of the steps advertised in this round.
    pub response_steps: Vec<OperationStep>,
    pub response_description: Option<String>,
    pub chosen_auth_method: Option<AuthMethod>,
    pub created_at: DateTime<Utc>,
}

impl OperationHistoryEntry {
    /// Whether this entry records a failure caused by an explicit user
    /// cancellation.
    pub fn is_cancellation_failure(&self) -> bool {
        self.request_step_result == AuthStepResult::Canceled
            && self.response_result == OperationResult::Failed
    }
}
