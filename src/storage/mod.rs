//! Storage collaborator plumbing shared by the domain stores.

mod errors;
mod sql;

pub use errors::StorageError;
pub use sql::DbPool;
