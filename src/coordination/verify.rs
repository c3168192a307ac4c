//! Verification entry points. Each one validates the submitted secret,
//! persists the updated counters and then feeds the outcome into the
//! engine's update path, which has final authority over the recorded result.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::credential::{
    remaining_attempts, AuthenticationResult, Credential, Otp, VerificationMode,
};
use crate::engine::{UpdateOperationRequest, UpdateOperationResponse};
use crate::operation::{
    AuthMethod, AuthStepResult, Operation, OperationHistoryEntry, OperationResult,
};

use super::errors::OrchestrationError;
use super::Orchestrator;

/// Request to verify a stored credential value.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VerifyCredentialRequest {
    pub operation_id: String,
    pub user_id: String,
    pub organization_id: Option<String>,
    pub credential_name: String,
    pub value: String,
    pub mode: VerificationMode,
    /// Auth method of this attempt; inferred from the advertised steps when
    /// absent.
    pub auth_method: Option<AuthMethod>,
    /// Skip the engine hand-off and only update the counters.
    pub suppress_operation_update: bool,
}

/// Request to verify a one-time password.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VerifyOtpRequest {
    pub operation_id: String,
    pub otp_id: String,
    pub value: String,
    pub user_id: Option<String>,
    pub auth_method: Option<AuthMethod>,
    pub suppress_operation_update: bool,
}

/// Request to verify a credential and an OTP together. Overall success
/// requires both to succeed independently.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VerifyCombinedRequest {
    pub operation_id: String,
    pub user_id: String,
    pub organization_id: Option<String>,
    pub credential_name: String,
    pub credential_value: String,
    pub mode: VerificationMode,
    pub otp_id: String,
    pub otp_value: String,
    pub auth_method: Option<AuthMethod>,
    pub suppress_operation_update: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VerificationResponse {
    pub authentication_result: AuthenticationResult,
    /// Minimum of the applicable attempt ceilings; `None` means unlimited.
    pub remaining_attempts: Option<u64>,
    /// The engine's resolution of this attempt, absent when suppressed.
    pub operation: Option<UpdateOperationResponse>,
}

impl Orchestrator {
    /// Verify a credential value for an operation.
    pub async fn verify_credential(
        &self,
        request: VerifyCredentialRequest,
    ) -> Result<VerificationResponse, OrchestrationError> {
        let (operation, history) = self.load_operation(&request.operation_id).await?;
        let auth_method = self.resolve_auth_method(request.auth_method, &history)?;

        let mut credential = self
            .find_credential(&request.user_id, &request.credential_name)
            .await?;
        let now = Utc::now();
        let result = self
            .verifier
            .verify_credential_value(&mut credential, &request.value, &request.mode, now)
            .await?;
        // The counter mutation persists even when the engine hand-off is
        // suppressed or fails afterwards; an attempt stays counted.
        self.credentials.save_credential(&credential).await?;

        let failed = u64::from(result == AuthenticationResult::Failed);
        let method_ceiling = self
            .engine
            .remaining_method_attempts(&operation, &history, auth_method, failed)
            .await?;
        let remaining = remaining_attempts(Some(&credential), None, method_ceiling);

        self.finish_verification(request_into_update(
            &request.operation_id,
            Some(request.user_id),
            request.organization_id,
            auth_method,
            request.suppress_operation_update,
        ), result, remaining)
        .await
    }

    /// Verify a one-time password for an operation.
    pub async fn verify_otp(
        &self,
        request: VerifyOtpRequest,
    ) -> Result<VerificationResponse, OrchestrationError> {
        let (operation, history) = self.load_operation(&request.operation_id).await?;
        let auth_method = self.resolve_auth_method(request.auth_method, &history)?;

        let mut otp = self.find_otp(&request.otp_id).await?;
        check_otp_binding(&otp, &request.operation_id, request.user_id.as_deref())?;

        let now = Utc::now();
        let result = self
            .verifier
            .verify_otp_value(&mut otp, &request.value, now)
            .await?;
        self.otps.save_otp(&otp).await?;

        let failed = u64::from(result == AuthenticationResult::Failed);
        let method_ceiling = self
            .engine
            .remaining_method_attempts(&operation, &history, auth_method, failed)
            .await?;
        let remaining = remaining_attempts(None, Some(&otp), method_ceiling);

        let user_id = request.user_id.or_else(|| otp.user_id.clone());
        self.finish_verification(request_into_update(
            &request.operation_id,
            user_id,
            None,
            auth_method,
            request.suppress_operation_update,
        ), result, remaining)
        .await
    }

    /// Verify a credential and an OTP together. The OTP binding is checked
    /// before either verification runs, so a binding mismatch costs no
    /// attempt.
    pub async fn verify_combined(
        &self,
        request: VerifyCombinedRequest,
    ) -> Result<VerificationResponse, OrchestrationError> {
        let (operation, history) = self.load_operation(&request.operation_id).await?;
        let auth_method = self.resolve_auth_method(request.auth_method, &history)?;

        let mut otp = self.find_otp(&request.otp_id).await?;
        check_otp_binding(&otp, &request.operation_id, Some(&request.user_id))?;
        let mut credential = self
            .find_credential(&request.user_id, &request.credential_name)
            .await?;

        // Both run unconditionally so both sets of counters reflect the
        // attempt.
        let now = Utc::now();
        let credential_result = self
            .verifier
            .verify_credential_value(&mut credential, &request.credential_value, &request.mode, now)
            .await?;
        let otp_result = self
            .verifier
            .verify_otp_value(&mut otp, &request.otp_value, now)
            .await?;
        self.credentials.save_credential(&credential).await?;
        self.otps.save_otp(&otp).await?;

        let result = if credential_result == AuthenticationResult::Succeeded
            && otp_result == AuthenticationResult::Succeeded
        {
            AuthenticationResult::Succeeded
        } else {
            AuthenticationResult::Failed
        };
        let failed = u64::from(result == AuthenticationResult::Failed);
        let method_ceiling = self
            .engine
            .remaining_method_attempts(&operation, &history, auth_method, failed)
            .await?;
        let remaining = remaining_attempts(Some(&credential), Some(&otp), method_ceiling);

        self.finish_verification(request_into_update(
            &request.operation_id,
            Some(request.user_id),
            request.organization_id,
            auth_method,
            request.suppress_operation_update,
        ), result, remaining)
        .await
    }

    async fn load_operation(
        &self,
        operation_id: &str,
    ) -> Result<(Operation, Vec<OperationHistoryEntry>), OrchestrationError> {
        let Some(operation) = self.operations.get_operation(operation_id).await? else {
            return Err(OrchestrationError::ResourceNotFound {
                resource_type: "operation".to_string(),
                resource_id: operation_id.to_string(),
            }
            .log());
        };
        let history = self.operations.get_history(operation_id).await?;
        Ok((operation, history))
    }

    /// Administrative lift of a temporary credential block.
    pub async fn unblock_credential(
        &self,
        user_id: &str,
        credential_name: &str,
    ) -> Result<(), OrchestrationError> {
        let mut credential = self.find_credential(user_id, credential_name).await?;
        crate::credential::unblock_credential(&mut credential, Utc::now())?;
        self.credentials.save_credential(&credential).await?;
        Ok(())
    }

    async fn find_credential(
        &self,
        user_id: &str,
        credential_name: &str,
    ) -> Result<Credential, OrchestrationError> {
        let Some(credential) = self
            .credentials
            .find_credential(user_id, credential_name)
            .await?
        else {
            return Err(OrchestrationError::ResourceNotFound {
                resource_type: "credential".to_string(),
                resource_id: format!("{user_id}/{credential_name}"),
            }
            .log());
        };
        Ok(credential)
    }

    async fn find_otp(&self, otp_id: &str) -> Result<Otp, OrchestrationError> {
        let Some(otp) = self.otps.find_otp(otp_id).await? else {
            return Err(OrchestrationError::ResourceNotFound {
                resource_type: "otp".to_string(),
                resource_id: otp_id.to_string(),
            }
            .log());
        };
        Ok(otp)
    }

    /// The auth method of a verification is either explicit or inferred from
    /// the operation's currently advertised steps. Inference is only valid
    /// when exactly one step is advertised.
    fn resolve_auth_method(
        &self,
        explicit: Option<AuthMethod>,
        history: &[OperationHistoryEntry],
    ) -> Result<AuthMethod, OrchestrationError> {
        if let Some(auth_method) = explicit {
            return Ok(auth_method);
        }
        let advertised: Vec<AuthMethod> = history
            .last()
            .map(|e| e.response_steps.iter().map(|s| s.auth_method).collect())
            .unwrap_or_default();
        match advertised.as_slice() {
            [] => Err(OrchestrationError::InvalidRequest(
                "auth method is missing and no step is advertised".to_string(),
            )
            .log()),
            [single] => Ok(*single),
            _ => Err(OrchestrationError::InvalidConfiguration(
                "auth method is missing and several steps are advertised".to_string(),
            )
            .log()),
        }
    }

    /// Hand the verification outcome to the engine and build the response.
    ///
    /// When the engine resolves the round to a failed operation, the
    /// reported verification result is retro-marked failed as well; the
    /// state machine has final authority over the attempt's outcome.
    async fn finish_verification(
        &self,
        update: Option<UpdateOperationRequest>,
        result: AuthenticationResult,
        remaining: Option<u64>,
    ) -> Result<VerificationResponse, OrchestrationError> {
        let Some(mut update) = update else {
            return Ok(VerificationResponse {
                authentication_result: result,
                remaining_attempts: remaining,
                operation: None,
            });
        };

        update.auth_step_result = Some(step_result_for(result, remaining));
        let operation = self.engine.update_operation(update).await?;

        let authentication_result = if operation.result == OperationResult::Failed
            && result == AuthenticationResult::Succeeded
        {
            tracing::warn!(
                "Operation {} failed, retro-marking successful verification as failed",
                operation.operation_id
            );
            AuthenticationResult::Failed
        } else {
            result
        };

        Ok(VerificationResponse {
            authentication_result,
            remaining_attempts: remaining,
            operation: Some(operation),
        })
    }
}

fn request_into_update(
    operation_id: &str,
    user_id: Option<String>,
    organization_id: Option<String>,
    auth_method: AuthMethod,
    suppress: bool,
) -> Option<UpdateOperationRequest> {
    if suppress {
        return None;
    }
    Some(UpdateOperationRequest {
        operation_id: operation_id.to_string(),
        user_id,
        organization_id,
        auth_method: Some(auth_method),
        auth_step_result: None,
        target_auth_method: None,
    })
}

/// Terminality mapping of a verification outcome to a step result. A failed
/// attempt with no attempts left reports the whole method failed.
fn step_result_for(result: AuthenticationResult, remaining: Option<u64>) -> AuthStepResult {
    match result {
        AuthenticationResult::Succeeded => AuthStepResult::Confirmed,
        AuthenticationResult::Failed if remaining == Some(0) => AuthStepResult::AuthMethodFailed,
        AuthenticationResult::Failed => AuthStepResult::AuthFailed,
    }
}

/// OTP binding checks run before any verification, so a mismatch costs no
/// attempt.
fn check_otp_binding(
    otp: &Otp,
    operation_id: &str,
    user_id: Option<&str>,
) -> Result<(), OrchestrationError> {
    if let Some(bound) = otp.operation_id.as_deref() {
        if bound != operation_id {
            return Err(OrchestrationError::InvalidRequest(format!(
                "otp {} is bound to another operation",
                otp.otp_id
            ))
            .log());
        }
    }
    if let (Some(bound), Some(supplied)) = (otp.user_id.as_deref(), user_id) {
        if bound != supplied {
            return Err(OrchestrationError::InvalidRequest(format!(
                "otp {} is bound to another user",
                otp.otp_id
            ))
            .log());
        }
    }
    Ok(())
}
