use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::operation::{AuthMethod, AuthStepResult, OperationResult, OperationStep};

/// Result description set when an operation exceeded its expiration.
pub const DESC_OPERATION_TIMEOUT: &str = "operation.timeout";
/// Result description set when an operation was canceled by the user.
pub const DESC_OPERATION_CANCELED: &str = "operation.canceled";
/// Result description set when all candidate methods were filtered out.
pub const DESC_NO_AUTH_METHOD: &str = "error.noAuthMethod";
/// Result description set on malformed transition requests.
pub const DESC_INVALID_REQUEST: &str = "error.invalidRequest";
/// Result description set when the chosen method is not available.
pub const DESC_METHOD_NOT_AVAILABLE: &str = "operation.methodNotAvailable";

/// Request to create a new operation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateOperationRequest {
    /// Caller-supplied id; generated when absent. Must not be in use.
    pub operation_id: Option<String>,
    pub operation_name: String,
    pub operation_data: String,
    pub external_transaction_id: Option<String>,
    pub organization_id: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateOperationResponse {
    pub operation_id: String,
    pub operation_name: String,
    pub result: OperationResult,
    pub result_description: Option<String>,
    pub steps: Vec<OperationStep>,
    pub timestamp_created: DateTime<Utc>,
    pub timestamp_expires: DateTime<Utc>,
}

/// Request to advance an operation by one resolution round.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UpdateOperationRequest {
    pub operation_id: String,
    pub user_id: Option<String>,
    pub organization_id: Option<String>,
    pub auth_method: Option<AuthMethod>,
    pub auth_step_result: Option<AuthStepResult>,
    /// Target of a downgrade or chosen-method transition.
    pub target_auth_method: Option<AuthMethod>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UpdateOperationResponse {
    pub operation_id: String,
    pub result: OperationResult,
    pub result_description: Option<String>,
    pub steps: Vec<OperationStep>,
    pub chosen_auth_method: Option<AuthMethod>,
    /// Companion operation registered with the mobile-token service, set by
    /// a successful mobile-token chosen-method transition.
    pub mobile_token_operation_id: Option<String>,
    pub timestamp_expires: DateTime<Utc>,
}

/// Resolved outcome of one resolution round, before it is recorded.
#[derive(Clone, Debug)]
pub(crate) struct StepOutcome {
    pub result: OperationResult,
    pub steps: Vec<OperationStep>,
    pub description: Option<String>,
    pub chosen_auth_method: Option<AuthMethod>,
    pub mobile_token_operation_id: Option<String>,
}

impl StepOutcome {
    pub(crate) fn failed(description: &str) -> Self {
        Self {
            result: OperationResult::Failed,
            steps: Vec::new(),
            description: Some(description.to_string()),
            chosen_auth_method: None,
            mobile_token_operation_id: None,
        }
    }
}
