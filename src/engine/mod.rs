//! Step resolution engine.
//!
//! Resolves the next authentication step for an operation from the step
//! catalog, the operation's accumulated history and the per-user method
//! state, then records the round atomically.

mod create;
mod errors;
mod guard;
mod transition;
mod types;
mod update;

use std::sync::Arc;

use crate::catalog::StepCatalog;
use crate::config::DEFAULT_MAX_AUTH_FAILS;
use crate::mobile::MobileTokenService;
use crate::operation::{
    AuthMethod, AuthStepResult, Operation, OperationHistoryEntry, OperationStore,
};
use crate::users::UserPreferenceProvider;

pub use errors::EngineError;
pub use types::{
    CreateOperationRequest, CreateOperationResponse, UpdateOperationRequest,
    UpdateOperationResponse, DESC_INVALID_REQUEST, DESC_METHOD_NOT_AVAILABLE,
    DESC_NO_AUTH_METHOD, DESC_OPERATION_CANCELED, DESC_OPERATION_TIMEOUT,
};

/// The resolution engine. Stateless apart from its collaborators; every call
/// loads the operation fresh from the store.
pub struct StepEngine {
    catalog: Arc<StepCatalog>,
    operations: Arc<dyn OperationStore>,
    preferences: Arc<dyn UserPreferenceProvider>,
    mobile: Arc<dyn MobileTokenService>,
}

impl StepEngine {
    pub fn new(
        catalog: Arc<StepCatalog>,
        operations: Arc<dyn OperationStore>,
        preferences: Arc<dyn UserPreferenceProvider>,
        mobile: Arc<dyn MobileTokenService>,
    ) -> Self {
        Self {
            catalog,
            operations,
            preferences,
            mobile,
        }
    }

    /// Create a new operation and resolve its initial steps.
    pub async fn create_operation(
        &self,
        request: CreateOperationRequest,
    ) -> Result<CreateOperationResponse, EngineError> {
        create::create_operation(self, request).await
    }

    /// Advance an operation by one resolution round.
    pub async fn update_operation(
        &self,
        request: UpdateOperationRequest,
    ) -> Result<UpdateOperationResponse, EngineError> {
        update::update_operation(self, request).await
    }

    /// Remaining attempts the method-level fail limit still permits for one
    /// operation, counting `additional_failures` not yet recorded in the
    /// history. `None` means the method does not track failures.
    pub async fn remaining_method_attempts(
        &self,
        operation: &Operation,
        history: &[OperationHistoryEntry],
        auth_method: AuthMethod,
        additional_failures: u64,
    ) -> Result<Option<u64>, EngineError> {
        let Some(policy) = self.catalog.method_policy(auth_method).await else {
            return Ok(None);
        };
        if !policy.check_auth_fails {
            return Ok(None);
        }
        let max = self
            .effective_max_auth_fails(operation, auth_method, policy.max_auth_fails)
            .await?;
        let fails = count_auth_failures(history, auth_method) + additional_failures;
        Ok(Some(max.saturating_sub(fails)))
    }

    /// Max-fails ceiling for one method, preferring the user's own override
    /// over the method policy, falling back to the global default.
    async fn effective_max_auth_fails(
        &self,
        operation: &Operation,
        auth_method: AuthMethod,
        policy_max: Option<u32>,
    ) -> Result<u64, EngineError> {
        let user_max = match operation.user_id.as_deref() {
            Some(user_id) => self
                .preferences
                .enabled_auth_methods(user_id)
                .await?
                .into_iter()
                .find(|m| m.auth_method == auth_method)
                .and_then(|m| m.config.max_auth_fails),
            None => None,
        };
        Ok(u64::from(
            user_max.or(policy_max).unwrap_or(*DEFAULT_MAX_AUTH_FAILS),
        ))
    }
}

fn count_auth_failures(history: &[OperationHistoryEntry], auth_method: AuthMethod) -> u64 {
    history
        .iter()
        .filter(|e| {
            e.request_auth_method == auth_method
                && e.request_step_result == AuthStepResult::AuthFailed
        })
        .count() as u64
}
