//! Step definition catalog: the in-memory, reload-on-demand index of
//! configured transition rules.

mod errors;
mod types;

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::mobile::{ActivationStatus, MobileTokenService};
use crate::operation::{AuthMethod, OperationResult};
use crate::users::{EnabledAuthMethod, UserPreferenceProvider};

pub use errors::CatalogError;
pub use types::{
    AuthMethodPolicy, CatalogSnapshot, OperationType, StepDefinition, StepLookupFilter,
};

#[derive(Default)]
struct CatalogIndex {
    steps: HashMap<String, Vec<StepDefinition>>,
    policies: HashMap<AuthMethod, AuthMethodPolicy>,
    response_ttls: HashMap<String, i64>,
}

/// Shared, read-mostly index of step definitions and method policies.
///
/// `reload` takes the write lock and replaces the whole index atomically;
/// lookups run under the read lock. Reload is an explicit administrative
/// trigger, never implicit or time-based.
pub struct StepCatalog {
    index: RwLock<CatalogIndex>,
    preferences: Arc<dyn UserPreferenceProvider>,
    mobile: Arc<dyn MobileTokenService>,
}

impl StepCatalog {
    pub fn new(
        preferences: Arc<dyn UserPreferenceProvider>,
        mobile: Arc<dyn MobileTokenService>,
    ) -> Self {
        Self {
            index: RwLock::new(CatalogIndex::default()),
            preferences,
            mobile,
        }
    }

    /// Atomically replace the whole index with a new administrative snapshot.
    pub async fn reload(&self, snapshot: CatalogSnapshot) {
        let mut steps: HashMap<String, Vec<StepDefinition>> = HashMap::new();
        for definition in snapshot.step_definitions {
            steps
                .entry(definition.operation_name.clone())
                .or_default()
                .push(definition);
        }
        let policies = snapshot
            .method_policies
            .into_iter()
            .map(|p| (p.auth_method, p))
            .collect();
        let response_ttls = snapshot.response_ttl_overrides.into_iter().collect();

        let mut index = self.index.write().await;
        *index = CatalogIndex {
            steps,
            policies,
            response_ttls,
        };
        tracing::debug!(
            "Step catalog reloaded: {} operations configured",
            index.steps.len()
        );
    }

    /// Policy attributes of one method, when configured.
    pub async fn method_policy(&self, auth_method: AuthMethod) -> Option<AuthMethodPolicy> {
        let index = self.index.read().await;
        index.policies.get(&auth_method).cloned()
    }

    /// Response TTL for an operation name in seconds, when an override is
    /// configured.
    pub async fn response_ttl_override(&self, operation_name: &str) -> Option<i64> {
        let index = self.index.read().await;
        index.response_ttls.get(operation_name).copied()
    }

    /// Filtered, unsorted candidate list for one resolution call.
    ///
    /// Filters, in order: operation type, request step result (when the
    /// filter supplies one), request auth method, per-user method enablement,
    /// and mobile-token liveness for mobile-token candidates.
    pub async fn lookup(
        &self,
        filter: &StepLookupFilter,
    ) -> Result<Vec<StepDefinition>, CatalogError> {
        let candidates: Vec<StepDefinition> = {
            let index = self.index.read().await;
            let Some(rules) = index.steps.get(&filter.operation_name) else {
                return Err(CatalogError::InvalidConfiguration(format!(
                    "no step definitions for operation: {}",
                    filter.operation_name
                )));
            };

            rules
                .iter()
                .filter(|rule| rule.operation_type == filter.operation_type)
                .filter(|rule| match filter.request_step_result {
                    Some(result) => rule.request_step_result == Some(result),
                    None => true,
                })
                .filter(|rule| match filter.request_auth_method {
                    Some(method) => rule.request_auth_method == Some(method),
                    None => true,
                })
                .cloned()
                .collect()
        };

        // User-scoped filters only apply once the user is known.
        let Some(user_id) = filter.user_id.as_deref() else {
            return Ok(candidates);
        };

        let enabled = self.preferences.enabled_auth_methods(user_id).await?;
        let mut filtered = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            // Terminal candidates do not advertise a next method, so user
            // enablement does not apply to them.
            if candidate.response_result != OperationResult::Continue {
                filtered.push(candidate);
                continue;
            }
            let Some(enabled_method) = enabled
                .iter()
                .find(|m| m.auth_method == candidate.response_auth_method)
            else {
                tracing::debug!(
                    "Dropping candidate {}: not enabled for user {}",
                    candidate.response_auth_method,
                    user_id
                );
                continue;
            };
            if candidate.response_auth_method == AuthMethod::MobileToken
                && !self.mobile_token_alive(user_id, enabled_method).await?
            {
                continue;
            }
            filtered.push(candidate);
        }
        Ok(filtered)
    }

    async fn mobile_token_alive(
        &self,
        user_id: &str,
        enabled_method: &EnabledAuthMethod,
    ) -> Result<bool, CatalogError> {
        let Some(activation_id) = enabled_method.config.activation_id.as_deref() else {
            tracing::debug!("User {} has no mobile-token activation", user_id);
            return Ok(false);
        };
        let status = self.mobile.activation_status(activation_id).await?;
        if status != ActivationStatus::Active {
            tracing::debug!(
                "Dropping mobile-token candidate for user {}: activation {} not active",
                user_id,
                activation_id
            );
        }
        Ok(status == ActivationStatus::Active)
    }
}
