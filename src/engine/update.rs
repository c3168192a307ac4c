use chrono::{DateTime, Duration, Utc};

use crate::catalog::{OperationType, StepDefinition, StepLookupFilter};
use crate::config::RESPONSE_TTL_SECS;
use crate::operation::{
    AuthMethod, AuthStepResult, Operation, OperationHistoryEntry, OperationResult, OperationStep,
};

use super::errors::EngineError;
use super::types::{
    StepOutcome, UpdateOperationRequest, UpdateOperationResponse, DESC_NO_AUTH_METHOD,
    DESC_OPERATION_CANCELED, DESC_OPERATION_TIMEOUT,
};
use super::{count_auth_failures, guard, transition, StepEngine};

/// Advance an operation by one resolution round.
///
/// Every successful call appends exactly one history entry and persists the
/// operation with its resolved result in the same transaction. Rejected
/// calls never mutate anything, with one defined exception: repeated
/// cancellation succeeds without a new round.
pub(super) async fn update_operation(
    engine: &StepEngine,
    request: UpdateOperationRequest,
) -> Result<UpdateOperationResponse, EngineError> {
    let (auth_method, step_result) = guard::validate_request(&request)?;

    let Some(mut operation) = engine.operations.get_operation(&request.operation_id).await? else {
        return Err(EngineError::NotFound(request.operation_id));
    };
    let history = engine.operations.get_history(&operation.operation_id).await?;

    guard::check_operation(&operation, &history, &request, auth_method, step_result)?;

    // Repeated cancellation of an already canceled operation is answered
    // from the recorded state, no round appended.
    if step_result == AuthStepResult::Canceled {
        if let Some(recorded) = history.iter().find(|e| e.is_cancellation_failure()) {
            return Ok(UpdateOperationResponse {
                operation_id: operation.operation_id,
                result: OperationResult::Failed,
                result_description: recorded.response_description.clone(),
                steps: Vec::new(),
                chosen_auth_method: None,
                mobile_token_operation_id: None,
                timestamp_expires: operation.expires_at,
            });
        }
    }

    let now = Utc::now();

    // An expired operation fails with a timeout round regardless of what the
    // caller submitted. The response expiration is pinned to the operation's
    // own deadline.
    if now > operation.expires_at {
        tracing::info!("Operation {} expired, recording timeout", operation.operation_id);
        let outcome = StepOutcome::failed(DESC_OPERATION_TIMEOUT);
        let expires = operation.expires_at;
        return record_round(
            engine, &mut operation, &history, auth_method, step_result, outcome, now, expires,
        )
        .await;
    }

    bind_identity(&mut operation, &request);

    let outcome = match step_result {
        AuthStepResult::Canceled => {
            tracing::info!("Operation {} canceled by the user", operation.operation_id);
            resolve_cancellation(engine, &operation, auth_method).await?
        }
        AuthStepResult::AuthMethodDowngrade => {
            transition::resolve_downgrade(engine, &operation, &request, auth_method).await?
        }
        AuthStepResult::AuthMethodChosen => {
            transition::resolve_chosen(engine, &operation, &history, &request).await?
        }
        _ => {
            // Methods that have failed out resolve as if the caller had
            // reported the method failure itself.
            let effective = if method_failed_out(
                engine,
                &operation,
                &history,
                auth_method,
                step_result,
            )
            .await?
            {
                tracing::debug!(
                    "Method {} failed out on operation {}",
                    auth_method,
                    operation.operation_id
                );
                AuthStepResult::AuthMethodFailed
            } else {
                step_result
            };
            resolve_from_catalog(engine, &operation, auth_method, effective).await?
        }
    };

    let expires = response_expires(engine, &operation, now).await;
    record_round(
        engine, &mut operation, &history, auth_method, step_result, outcome, now, expires,
    )
    .await
}

/// A known user binds to the operation on first sight and stays bound.
fn bind_identity(operation: &mut Operation, request: &UpdateOperationRequest) {
    if operation.user_id.is_none() {
        operation.user_id = request.user_id.clone();
    }
    if operation.organization_id.is_none() {
        operation.organization_id = request.organization_id.clone();
    }
}

/// Whether the submitted method is exhausted: an earlier round already
/// recorded its failure, or the accumulated failed attempts (including the
/// current call when it is itself a failure) reach the method's limit.
async fn method_failed_out(
    engine: &StepEngine,
    operation: &Operation,
    history: &[OperationHistoryEntry],
    auth_method: AuthMethod,
    step_result: AuthStepResult,
) -> Result<bool, EngineError> {
    if step_result == AuthStepResult::AuthMethodFailed {
        return Ok(true);
    }
    if history.iter().any(|e| {
        e.request_auth_method == auth_method
            && e.request_step_result == AuthStepResult::AuthMethodFailed
    }) {
        return Ok(true);
    }
    let Some(policy) = engine.catalog.method_policy(auth_method).await else {
        return Ok(false);
    };
    if !policy.check_auth_fails {
        return Ok(false);
    }
    let max = engine
        .effective_max_auth_fails(operation, auth_method, policy.max_auth_fails)
        .await?;
    let current = u64::from(step_result == AuthStepResult::AuthFailed);
    Ok(count_auth_failures(history, auth_method) + current >= max)
}

/// Cancellation resolves through CANCELED step definitions when any are
/// configured. Without them the operation fails with the canceled marker.
/// Either way the round keeps its CANCELED request result, which is what
/// later calls use to recognize a cancellation-origin failure.
async fn resolve_cancellation(
    engine: &StepEngine,
    operation: &Operation,
    auth_method: AuthMethod,
) -> Result<StepOutcome, EngineError> {
    let candidates = engine
        .catalog
        .lookup(&StepLookupFilter {
            operation_name: operation.operation_name.clone(),
            operation_type: OperationType::Update,
            request_step_result: Some(AuthStepResult::Canceled),
            request_auth_method: Some(auth_method),
            user_id: operation.user_id.clone(),
        })
        .await?;
    if candidates.is_empty() {
        return Ok(StepOutcome::failed(DESC_OPERATION_CANCELED));
    }
    let candidates = sorted_unique_candidates(candidates)?;
    Ok(resolve_candidates(&candidates))
}

async fn resolve_from_catalog(
    engine: &StepEngine,
    operation: &Operation,
    auth_method: AuthMethod,
    step_result: AuthStepResult,
) -> Result<StepOutcome, EngineError> {
    let candidates = engine
        .catalog
        .lookup(&StepLookupFilter {
            operation_name: operation.operation_name.clone(),
            operation_type: OperationType::Update,
            request_step_result: Some(step_result),
            request_auth_method: Some(auth_method),
            user_id: operation.user_id.clone(),
        })
        .await?;
    let candidates = sorted_unique_candidates(candidates)?;
    Ok(resolve_candidates(&candidates))
}

/// Order candidates by priority and reject duplicate priorities, which make
/// the configured ordering ambiguous.
pub(super) fn sorted_unique_candidates(
    mut candidates: Vec<StepDefinition>,
) -> Result<Vec<StepDefinition>, EngineError> {
    candidates.sort_by_key(|c| c.priority);
    for pair in candidates.windows(2) {
        if pair[0].priority == pair[1].priority {
            return Err(EngineError::InvalidConfiguration(format!(
                "duplicate step priority {} for operation {}",
                pair[0].priority, pair[0].operation_name
            )));
        }
    }
    Ok(candidates)
}

/// Collapse a filtered candidate list into one outcome.
///
/// An empty list fails the operation outright. Otherwise the overall result
/// follows the strongest candidate result, DONE over CONTINUE over FAILED,
/// and only the candidates carrying that result contribute steps.
pub(super) fn resolve_candidates(candidates: &[StepDefinition]) -> StepOutcome {
    if candidates.is_empty() {
        return StepOutcome::failed(DESC_NO_AUTH_METHOD);
    }
    let result = if candidates
        .iter()
        .any(|c| c.response_result == OperationResult::Done)
    {
        OperationResult::Done
    } else if candidates
        .iter()
        .any(|c| c.response_result == OperationResult::Continue)
    {
        OperationResult::Continue
    } else {
        OperationResult::Failed
    };
    let steps = if result == OperationResult::Continue {
        candidates
            .iter()
            .filter(|c| c.response_result == OperationResult::Continue)
            .map(|c| OperationStep::new(c.response_auth_method))
            .collect()
    } else {
        Vec::new()
    };
    StepOutcome {
        result,
        steps,
        description: None,
        chosen_auth_method: None,
        mobile_token_operation_id: None,
    }
}

async fn response_expires(
    engine: &StepEngine,
    operation: &Operation,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    let ttl = match engine
        .catalog
        .response_ttl_override(&operation.operation_name)
        .await
    {
        Some(ttl) => ttl,
        None => *RESPONSE_TTL_SECS,
    };
    now + Duration::seconds(ttl)
}

#[allow(clippy::too_many_arguments)]
async fn record_round(
    engine: &StepEngine,
    operation: &mut Operation,
    history: &[OperationHistoryEntry],
    auth_method: AuthMethod,
    step_result: AuthStepResult,
    outcome: StepOutcome,
    now: DateTime<Utc>,
    expires: DateTime<Utc>,
) -> Result<UpdateOperationResponse, EngineError> {
    let sequence = history.last().map(|e| e.sequence).unwrap_or(0) + 1;
    let entry = OperationHistoryEntry {
        operation_id: operation.operation_id.clone(),
        sequence,
        request_auth_method: auth_method,
        request_step_result: step_result,
        response_result: outcome.result,
        response_steps: outcome.steps.clone(),
        response_description: outcome.description.clone(),
        chosen_auth_method: outcome.chosen_auth_method,
        created_at: now,
    };
    operation.result = outcome.result;
    engine.operations.save_with_history(operation, &entry).await?;

    tracing::debug!(
        "Operation {} round {}: {} / {:?} resolved to {:?}",
        operation.operation_id,
        sequence,
        auth_method,
        step_result,
        outcome.result
    );

    Ok(UpdateOperationResponse {
        operation_id: operation.operation_id.clone(),
        result: outcome.result,
        result_description: outcome.description,
        steps: outcome.steps,
        chosen_auth_method: outcome.chosen_auth_method,
        mobile_token_operation_id: outcome.mobile_token_operation_id,
        timestamp_expires: expires,
    })
}
