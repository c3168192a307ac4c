use thiserror::Error;

/// Errors raised by the storage collaborators.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backing store rejected or failed the call.
    #[error("Storage backend error: {0}")]
    Backend(String),

    /// An insert collided with an existing row.
    #[error("Storage conflict: {0}")]
    Conflict(String),
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                Self::Conflict(db.to_string())
            }
            _ => Self::Backend(err.to_string()),
        }
    }
}
