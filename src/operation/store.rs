use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::storage::StorageError;

use super::types::{Operation, OperationHistoryEntry};

/// Storage contract for operations and their append-only history.
///
/// `create_with_history` and `save_with_history` are the transactional
/// boundaries of the resolution engine: the operation write and the history
/// append of one resolution round must never be observable separately.
#[async_trait]
pub trait OperationStore: Send + Sync {
    async fn get_operation(&self, operation_id: &str) -> Result<Option<Operation>, StorageError>;

    /// History of one operation, ordered by ascending sequence number.
    async fn get_history(
        &self,
        operation_id: &str,
    ) -> Result<Vec<OperationHistoryEntry>, StorageError>;

    /// Insert a new operation together with its first history entry.
    /// Returns `StorageError::Conflict` when the operation id is taken.
    async fn create_with_history(
        &self,
        operation: &Operation,
        entry: &OperationHistoryEntry,
    ) -> Result<(), StorageError>;

    /// Persist an updated operation and append one history entry atomically.
    async fn save_with_history(
        &self,
        operation: &Operation,
        entry: &OperationHistoryEntry,
    ) -> Result<(), StorageError>;
}

#[derive(Default)]
struct MemoryOperationState {
    operations: HashMap<String, Operation>,
    history: HashMap<String, Vec<OperationHistoryEntry>>,
}

/// In-memory operation store. Used by the test suite and small deployments;
/// a single mutex critical section stands in for the database transaction.
#[derive(Default)]
pub struct MemoryOperationStore {
    state: Mutex<MemoryOperationState>,
}

impl MemoryOperationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OperationStore for MemoryOperationStore {
    async fn get_operation(&self, operation_id: &str) -> Result<Option<Operation>, StorageError> {
        let state = self.state.lock().expect("operation store poisoned");
        Ok(state.operations.get(operation_id).cloned())
    }

    async fn get_history(
        &self,
        operation_id: &str,
    ) -> Result<Vec<OperationHistoryEntry>, StorageError> {
        let state = self.state.lock().expect("operation store poisoned");
        Ok(state.history.get(operation_id).cloned().unwrap_or_default())
    }

    async fn create_with_history(
        &self,
        operation: &Operation,
        entry: &OperationHistoryEntry,
    ) -> Result<(), StorageError> {
        let mut state = self.state.lock().expect("operation store poisoned");
        if state.operations.contains_key(&operation.operation_id) {
            return Err(StorageError::Conflict(format!(
                "operation {} already exists",
                operation.operation_id
            )));
        }
        state
            .operations
            .insert(operation.operation_id.clone(), operation.clone());
        state
            .history
            .insert(operation.operation_id.clone(), vec![entry.clone()]);
        Ok(())
    }

    async fn save_with_history(
        &self,
        operation: &Operation,
        entry: &OperationHistoryEntry,
    ) -> Result<(), StorageError> {
        let mut state = self.state.lock().expect("operation store poisoned");
        state
            .operations
            .insert(operation.operation_id.clone(), operation.clone());
        state
            .history
            .entry(operation.operation_id.clone())
            .or_default()
            .push(entry.clone());
        Ok(())
    }
}
