//! Downgrade and chosen-method transitions. Both resolve a target method
//! rather than a step result, so they bypass the plain catalog resolution.

use crate::catalog::{OperationType, StepDefinition, StepLookupFilter};
use crate::mobile::ActivationStatus;
use crate::operation::{
    AuthMethod, AuthStepResult, Operation, OperationHistoryEntry, OperationResult,
};

use super::errors::EngineError;
use super::types::{
    StepOutcome, UpdateOperationRequest, DESC_INVALID_REQUEST, DESC_METHOD_NOT_AVAILABLE,
    DESC_NO_AUTH_METHOD,
};
use super::update::{resolve_candidates, sorted_unique_candidates};
use super::StepEngine;

/// Resolve a downgrade: abandon the submitted method and continue with a
/// weaker one permitted by the downgrade rules.
///
/// A missing target is inferred when the rules leave exactly one choice.
/// Zero rules reject the request; several distinct choices with no explicit
/// target are an ambiguous configuration.
pub(super) async fn resolve_downgrade(
    engine: &StepEngine,
    operation: &Operation,
    request: &UpdateOperationRequest,
    auth_method: AuthMethod,
) -> Result<StepOutcome, EngineError> {
    let candidates = engine
        .catalog
        .lookup(&StepLookupFilter {
            operation_name: operation.operation_name.clone(),
            operation_type: OperationType::Update,
            request_step_result: Some(AuthStepResult::AuthMethodDowngrade),
            request_auth_method: Some(auth_method),
            user_id: operation.user_id.clone(),
        })
        .await?;

    let target = match request.target_auth_method {
        Some(target) => target,
        None => infer_downgrade_target(operation, &candidates)?,
    };

    let selected: Vec<_> = candidates
        .into_iter()
        .filter(|c| c.response_auth_method == target)
        .collect();
    if selected.is_empty() {
        tracing::warn!(
            "Downgrade from {} to {} not permitted for operation {}",
            auth_method,
            target,
            operation.operation_id
        );
        return Ok(StepOutcome::failed(DESC_NO_AUTH_METHOD));
    }
    let selected = sorted_unique_candidates(selected)?;
    Ok(resolve_candidates(&selected))
}

fn infer_downgrade_target(
    operation: &Operation,
    candidates: &[StepDefinition],
) -> Result<AuthMethod, EngineError> {
    let mut targets: Vec<AuthMethod> = candidates.iter().map(|c| c.response_auth_method).collect();
    targets.sort_by_key(|m| m.as_str());
    targets.dedup();
    match targets.as_slice() {
        [] => Err(EngineError::InvalidRequest(format!(
            "no downgrade target available for operation {}",
            operation.operation_id
        ))),
        [single] => Ok(*single),
        _ => Err(EngineError::InvalidConfiguration(format!(
            "ambiguous downgrade targets for operation {}",
            operation.operation_name
        ))),
    }
}

/// Resolve an explicit method choice. The choice is recorded on the response
/// while the steps advertised for the current state are replayed unchanged;
/// choosing the mobile token additionally requires a live activation and
/// registers the companion operation.
pub(super) async fn resolve_chosen(
    engine: &StepEngine,
    operation: &Operation,
    history: &[OperationHistoryEntry],
    request: &UpdateOperationRequest,
) -> Result<StepOutcome, EngineError> {
    let Some(target) = request.target_auth_method else {
        tracing::warn!(
            "Method choice without a target on operation {}",
            operation.operation_id
        );
        return Ok(StepOutcome::failed(DESC_INVALID_REQUEST));
    };
    if operation.result != OperationResult::Continue {
        tracing::warn!(
            "Method choice on operation {} outside an open state",
            operation.operation_id
        );
        return Ok(StepOutcome::failed(DESC_INVALID_REQUEST));
    }

    let mobile_token_operation_id = if target == AuthMethod::MobileToken {
        match mobile_token_companion(engine, operation).await? {
            Some(id) => Some(id),
            None => return Ok(StepOutcome::failed(DESC_METHOD_NOT_AVAILABLE)),
        }
    } else {
        None
    };

    let steps = history
        .last()
        .map(|e| e.response_steps.clone())
        .unwrap_or_default();
    Ok(StepOutcome {
        result: OperationResult::Continue,
        steps,
        description: None,
        chosen_auth_method: Some(target),
        mobile_token_operation_id,
    })
}

/// Register the companion operation for a mobile-token choice. Returns
/// `None` when the user has no live activation.
async fn mobile_token_companion(
    engine: &StepEngine,
    operation: &Operation,
) -> Result<Option<String>, EngineError> {
    let Some(user_id) = operation.user_id.as_deref() else {
        tracing::debug!(
            "Mobile token chosen on operation {} before a user is bound",
            operation.operation_id
        );
        return Ok(None);
    };
    let enabled = engine.preferences.enabled_auth_methods(user_id).await?;
    let activation_id = enabled
        .iter()
        .find(|m| m.auth_method == AuthMethod::MobileToken)
        .and_then(|m| m.config.activation_id.clone());
    let Some(activation_id) = activation_id else {
        tracing::debug!("User {} has no mobile-token activation", user_id);
        return Ok(None);
    };
    if engine.mobile.activation_status(&activation_id).await? != ActivationStatus::Active {
        tracing::debug!(
            "Mobile-token activation {} of user {} is not active",
            activation_id,
            user_id
        );
        return Ok(None);
    }
    let companion_id = engine
        .mobile
        .register_companion_operation(operation, &activation_id)
        .await?;
    tracing::info!(
        "Registered mobile-token companion operation {} for operation {}",
        companion_id,
        operation.operation_id
    );
    Ok(Some(companion_id))
}
