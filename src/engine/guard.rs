//! Legitimacy guard: the state-machine invariant checks run before any
//! UPDATE resolution proceeds. A violation rejects the call with no mutation.

use crate::operation::{
    AuthMethod, AuthStepResult, Operation, OperationHistoryEntry, OperationResult,
};

use super::errors::EngineError;
use super::types::UpdateOperationRequest;

/// Field-presence checks over the raw request. Returns the submitted method
/// and step result once both are known present.
pub(super) fn validate_request(
    request: &UpdateOperationRequest,
) -> Result<(AuthMethod, AuthStepResult), EngineError> {
    if request.operation_id.is_empty() {
        return Err(EngineError::InvalidRequest("operation id is missing".into()));
    }
    let Some(auth_method) = request.auth_method else {
        return Err(EngineError::InvalidRequest("auth method is missing".into()));
    };

    // INIT cannot be "updated" except to cancel or to record a method choice.
    if auth_method == AuthMethod::Init
        && !matches!(
            request.auth_step_result,
            Some(AuthStepResult::Canceled) | Some(AuthStepResult::AuthMethodChosen)
        )
    {
        return Err(EngineError::InvalidRequest(
            "INIT method only accepts cancellation or method choice".into(),
        ));
    }

    let Some(step_result) = request.auth_step_result else {
        return Err(EngineError::InvalidRequest("step result is missing".into()));
    };

    Ok((auth_method, step_result))
}

/// State checks against the loaded operation and its history.
pub(super) fn check_operation(
    operation: &Operation,
    history: &[OperationHistoryEntry],
    request: &UpdateOperationRequest,
    auth_method: AuthMethod,
    step_result: AuthStepResult,
) -> Result<(), EngineError> {
    let Some(first) = history.first() else {
        return Err(EngineError::OperationNotValid(format!(
            "operation {} has no history",
            operation.operation_id
        )));
    };
    if first.request_auth_method != AuthMethod::Init
        || first.request_step_result != AuthStepResult::Confirmed
    {
        return Err(EngineError::OperationNotValid(format!(
            "operation {} has a corrupted first history entry",
            operation.operation_id
        )));
    }
    let Some(current) = history.last() else {
        return Err(EngineError::OperationNotValid(format!(
            "operation {} has no history",
            operation.operation_id
        )));
    };

    // While the operation continues, the submitted method must have been
    // advertised in the previous round.
    if current.response_result == OperationResult::Continue
        && step_result != AuthStepResult::Canceled
    {
        check_method_advertised(operation, current, request, auth_method, step_result)?;
    }

    check_terminal_history(operation, history, step_result)?;

    Ok(())
}

fn check_method_advertised(
    operation: &Operation,
    current: &OperationHistoryEntry,
    request: &UpdateOperationRequest,
    auth_method: AuthMethod,
    step_result: AuthStepResult,
) -> Result<(), EngineError> {
    let advertised =
        |method: AuthMethod| current.response_steps.iter().any(|s| s.auth_method == method);

    if step_result == AuthStepResult::AuthMethodChosen {
        // The chosen target must match an advertised method. A missing
        // target falls through to the transition handler, which resolves it
        // as a failed outcome rather than an error.
        if let Some(target) = request.target_auth_method {
            if !advertised(target) {
                return Err(EngineError::InvalidRequest(format!(
                    "chosen method {} was not advertised for operation {}",
                    target, operation.operation_id
                )));
            }
        }
        return Ok(());
    }

    if auth_method == AuthMethod::ShowOperationDetail {
        // Operation detail may be shown while an out-of-band method is
        // pending.
        if advertised(AuthMethod::SmsOtp) || advertised(AuthMethod::MobileToken) {
            return Ok(());
        }
        return Err(EngineError::InvalidRequest(format!(
            "operation detail not available for operation {}",
            operation.operation_id
        )));
    }

    if !advertised(auth_method) {
        return Err(EngineError::InvalidRequest(format!(
            "auth method {} was not advertised for operation {}",
            auth_method, operation.operation_id
        )));
    }
    Ok(())
}

/// Scan the full history for terminal rounds. Double cancellation is
/// explicitly permitted; any other call against a terminal operation is a
/// state conflict.
fn check_terminal_history(
    operation: &Operation,
    history: &[OperationHistoryEntry],
    step_result: AuthStepResult,
) -> Result<(), EngineError> {
    if history
        .iter()
        .any(|e| e.response_result == OperationResult::Done)
    {
        return Err(EngineError::AlreadyFinished);
    }

    let failed = history
        .iter()
        .any(|e| e.response_result == OperationResult::Failed);
    if !failed {
        return Ok(());
    }

    let canceled = history.iter().any(|e| e.is_cancellation_failure());
    if canceled {
        if step_result == AuthStepResult::Canceled {
            tracing::debug!(
                "Repeated cancellation of operation {}",
                operation.operation_id
            );
            return Ok(());
        }
        return Err(EngineError::AlreadyCanceled);
    }
    Err(EngineError::AlreadyFailed)
}
