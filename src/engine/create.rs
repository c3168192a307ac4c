use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::catalog::{OperationType, StepLookupFilter};
use crate::config::OPERATION_TTL_SECS;
use crate::operation::{AuthMethod, AuthStepResult, Operation, OperationHistoryEntry};
use crate::storage::StorageError;

use super::errors::EngineError;
use super::types::{CreateOperationRequest, CreateOperationResponse};
use super::update::{resolve_candidates, sorted_unique_candidates};
use super::StepEngine;

/// Create a new operation, resolve its initial steps from the CREATE rules
/// and persist it together with the synthetic INIT round.
pub(super) async fn create_operation(
    engine: &StepEngine,
    request: CreateOperationRequest,
) -> Result<CreateOperationResponse, EngineError> {
    if request.operation_name.is_empty() {
        return Err(EngineError::InvalidRequest(
            "operation name is missing".into(),
        ));
    }
    if let Some(id) = request.operation_id.as_deref() {
        if id.is_empty() {
            return Err(EngineError::InvalidRequest(
                "operation id must not be empty when supplied".into(),
            ));
        }
    }

    // No user is known yet, so no per-user filtering applies at creation.
    let candidates = engine
        .catalog
        .lookup(&StepLookupFilter {
            operation_name: request.operation_name.clone(),
            operation_type: OperationType::Create,
            request_step_result: None,
            request_auth_method: None,
            user_id: None,
        })
        .await?;
    let candidates = sorted_unique_candidates(candidates)?;

    // The initial state must be unambiguous: every creation rule has to
    // agree on one response result. Anything else is a deployment defect.
    let mut results: Vec<_> = candidates.iter().map(|c| c.response_result).collect();
    results.sort_by_key(|r| r.as_str());
    results.dedup();
    if results.len() != 1 {
        return Err(EngineError::InvalidConfiguration(format!(
            "creation rules for operation {} resolve to {} distinct results",
            request.operation_name,
            results.len()
        )));
    }

    let outcome = resolve_candidates(&candidates);

    let operation_id = request
        .operation_id
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let now = Utc::now();
    let expires_at = now + Duration::seconds(*OPERATION_TTL_SECS);

    let operation = Operation {
        operation_id: operation_id.clone(),
        operation_name: request.operation_name.clone(),
        operation_data: request.operation_data,
        external_transaction_id: request.external_transaction_id,
        organization_id: request.organization_id,
        user_id: None,
        result: outcome.result,
        created_at: now,
        expires_at,
    };
    let entry = OperationHistoryEntry {
        operation_id: operation_id.clone(),
        sequence: 1,
        request_auth_method: AuthMethod::Init,
        request_step_result: AuthStepResult::Confirmed,
        response_result: outcome.result,
        response_steps: outcome.steps.clone(),
        response_description: outcome.description.clone(),
        chosen_auth_method: None,
        created_at: now,
    };

    match engine.operations.create_with_history(&operation, &entry).await {
        Ok(()) => {}
        Err(StorageError::Conflict(_)) => {
            return Err(EngineError::AlreadyExists(operation_id));
        }
        Err(err) => return Err(err.into()),
    }

    tracing::info!(
        "Created operation {} ({}) with result {:?}",
        operation_id,
        request.operation_name,
        outcome.result
    );

    Ok(CreateOperationResponse {
        operation_id,
        operation_name: request.operation_name,
        result: outcome.result,
        result_description: outcome.description,
        steps: outcome.steps,
        timestamp_created: now,
        timestamp_expires: expires_at,
    })
}
