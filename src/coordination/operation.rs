use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::{
    CreateOperationRequest, CreateOperationResponse, UpdateOperationRequest,
    UpdateOperationResponse,
};
use crate::operation::{AuthMethod, OperationResult, OperationStep};

use super::errors::OrchestrationError;
use super::Orchestrator;

/// Read-only view of an operation and its currently advertised next steps.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OperationDetail {
    pub operation_id: String,
    pub operation_name: String,
    pub operation_data: String,
    pub external_transaction_id: Option<String>,
    pub organization_id: Option<String>,
    pub user_id: Option<String>,
    pub result: OperationResult,
    /// Description recorded by the most recent resolution round.
    pub result_description: Option<String>,
    /// Steps advertised by the most recent resolution round.
    pub steps: Vec<OperationStep>,
    /// Explicit method choice, when one was recorded.
    pub chosen_auth_method: Option<AuthMethod>,
    pub timestamp_created: DateTime<Utc>,
    pub timestamp_expires: DateTime<Utc>,
}

impl Orchestrator {
    /// Create a new operation and resolve its initial steps.
    pub async fn create_operation(
        &self,
        request: CreateOperationRequest,
    ) -> Result<CreateOperationResponse, OrchestrationError> {
        Ok(self.engine.create_operation(request).await?)
    }

    /// Advance an operation by one resolution round.
    pub async fn update_operation(
        &self,
        request: UpdateOperationRequest,
    ) -> Result<UpdateOperationResponse, OrchestrationError> {
        Ok(self.engine.update_operation(request).await?)
    }

    /// Look up an operation for display. Performs no mutation and no state
    /// check beyond existence.
    pub async fn get_operation_detail(
        &self,
        operation_id: &str,
    ) -> Result<OperationDetail, OrchestrationError> {
        let Some(operation) = self.operations.get_operation(operation_id).await? else {
            return Err(OrchestrationError::ResourceNotFound {
                resource_type: "operation".to_string(),
                resource_id: operation_id.to_string(),
            }
            .log());
        };
        let history = self.operations.get_history(operation_id).await?;
        let current = history.last();
        let chosen_auth_method = history.iter().rev().find_map(|e| e.chosen_auth_method);

        Ok(OperationDetail {
            operation_id: operation.operation_id,
            operation_name: operation.operation_name,
            operation_data: operation.operation_data,
            external_transaction_id: operation.external_transaction_id,
            organization_id: operation.organization_id,
            user_id: operation.user_id,
            result: operation.result,
            result_description: current.and_then(|e| e.response_description.clone()),
            steps: current.map(|e| e.response_steps.clone()).unwrap_or_default(),
            chosen_auth_method,
            timestamp_created: operation.created_at,
            timestamp_expires: operation.expires_at,
        })
    }
}
