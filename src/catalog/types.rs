use serde::{Deserialize, Serialize};

use crate::operation::{AuthMethod, AuthStepResult, OperationResult};

/// Which entry point of the resolution engine a step definition applies to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationType {
    Create,
    Update,
}

/// A configured transition rule: when an operation of `operation_name` sees
/// (`request_auth_method`, `request_step_result`), the candidate next step is
/// `response_auth_method` with overall result `response_result`.
///
/// Statically administered; `priority` orders candidates and must be unique
/// within any filtered candidate set.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StepDefinition {
    pub operation_name: String,
    pub operation_type: OperationType,
    /// `None` matches any step result; only used for the CREATE/INIT case.
    pub request_step_result: Option<AuthStepResult>,
    pub request_auth_method: Option<AuthMethod>,
    pub response_auth_method: AuthMethod,
    pub response_result: OperationResult,
    pub priority: u32,
}

/// Policy attributes of one auth method.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuthMethodPolicy {
    pub auth_method: AuthMethod,
    /// Whether failed attempts count towards a per-method limit.
    pub check_auth_fails: bool,
    /// Default max-fails; the global default applies when unset.
    pub max_auth_fails: Option<u32>,
    /// Whether the method requires a mobile-token activation.
    pub has_mobile_token: bool,
}

/// Filter of one catalog lookup, applied as a pipeline in field order.
#[derive(Clone, Debug)]
pub struct StepLookupFilter {
    pub operation_name: String,
    pub operation_type: OperationType,
    pub request_step_result: Option<AuthStepResult>,
    pub request_auth_method: Option<AuthMethod>,
    pub user_id: Option<String>,
}

/// Full administrative snapshot loaded into the catalog by `reload`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CatalogSnapshot {
    pub step_definitions: Vec<StepDefinition>,
    pub method_policies: Vec<AuthMethodPolicy>,
    /// Per-operation response TTL overrides in seconds.
    pub response_ttl_overrides: Vec<(String, i64)>,
}
