//! Operation and history data model plus the storage contract.

mod sql;
mod store;
mod types;

pub use sql::SqlOperationStore;
pub use store::{MemoryOperationStore, OperationStore};
pub use types::{
    AuthMethod, AuthStepResult, Operation, OperationHistoryEntry, OperationResult, OperationStep,
};
