use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::{FromRow, Pool, Postgres, Row, Sqlite, postgres::PgRow, sqlite::SqliteRow};

use async_trait::async_trait;

use crate::storage::{DbPool, StorageError};

use super::store::OperationStore;
use super::types::{
    AuthMethod, AuthStepResult, Operation, OperationHistoryEntry, OperationResult, OperationStep,
};

/// SQL-backed operation store, maintained for SQLite and PostgreSQL.
///
/// Each `*_with_history` call wraps the operation write and the history
/// append in one database transaction.
pub struct SqlOperationStore {
    pool: DbPool,
}

impl SqlOperationStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Create the operation tables when they do not exist yet.
    pub async fn init(&self) -> Result<(), StorageError> {
        if let Some(pool) = self.pool.as_sqlite() {
            create_tables_sqlite(pool).await
        } else if let Some(pool) = self.pool.as_postgres() {
            create_tables_postgres(pool).await
        } else {
            Err(StorageError::Backend("unsupported database type".into()))
        }
    }
}

#[async_trait]
impl OperationStore for SqlOperationStore {
    async fn get_operation(&self, operation_id: &str) -> Result<Option<Operation>, StorageError> {
        if let Some(pool) = self.pool.as_sqlite() {
            sqlx::query_as::<_, Operation>("SELECT * FROM ns_operation WHERE operation_id = ?")
                .bind(operation_id)
                .fetch_optional(pool)
                .await
                .map_err(StorageError::from)
        } else if let Some(pool) = self.pool.as_postgres() {
            sqlx::query_as::<_, Operation>("SELECT * FROM ns_operation WHERE operation_id = $1")
                .bind(operation_id)
                .fetch_optional(pool)
                .await
                .map_err(StorageError::from)
        } else {
            Err(StorageError::Backend("unsupported database type".into()))
        }
    }

    async fn get_history(
        &self,
        operation_id: &str,
    ) -> Result<Vec<OperationHistoryEntry>, StorageError> {
        if let Some(pool) = self.pool.as_sqlite() {
            sqlx::query_as::<_, OperationHistoryEntry>(
                "SELECT * FROM ns_operation_history WHERE operation_id = ? ORDER BY sequence ASC",
            )
            .bind(operation_id)
            .fetch_all(pool)
            .await
            .map_err(StorageError::from)
        } else if let Some(pool) = self.pool.as_postgres() {
            sqlx::query_as::<_, OperationHistoryEntry>(
                "SELECT * FROM ns_operation_history WHERE operation_id = $1 ORDER BY sequence ASC",
            )
            .bind(operation_id)
            .fetch_all(pool)
            .await
            .map_err(StorageError::from)
        } else {
            Err(StorageError::Backend("unsupported database type".into()))
        }
    }

    async fn create_with_history(
        &self,
        operation: &Operation,
        entry: &OperationHistoryEntry,
    ) -> Result<(), StorageError> {
        if let Some(pool) = self.pool.as_sqlite() {
            write_with_history_sqlite(pool, operation, entry, true).await
        } else if let Some(pool) = self.pool.as_postgres() {
            write_with_history_postgres(pool, operation, entry, true).await
        } else {
            Err(StorageError::Backend("unsupported database type".into()))
        }
    }

    async fn save_with_history(
        &self,
        operation: &Operation,
        entry: &OperationHistoryEntry,
    ) -> Result<(), StorageError> {
        if let Some(pool) = self.pool.as_sqlite() {
            write_with_history_sqlite(pool, operation, entry, false).await
        } else if let Some(pool) = self.pool.as_postgres() {
            write_with_history_postgres(pool, operation, entry, false).await
        } else {
            Err(StorageError::Backend("unsupported database type".into()))
        }
    }
}

/// Serialize the advertised steps snapshot. The snapshot is descriptive data;
/// a serialization failure degrades to a warning and an empty snapshot
/// instead of aborting the transaction.
fn steps_snapshot(entry: &OperationHistoryEntry) -> String {
    match serde_json::to_string(&entry.response_steps) {
        Ok(json) => json,
        Err(err) => {
            tracing::warn!(
                "Failed to serialize response steps for operation {}: {}",
                entry.operation_id,
                err
            );
            "[]".to_string()
        }
    }
}

async fn create_tables_sqlite(pool: &Pool<Sqlite>) -> Result<(), StorageError> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS ns_operation (
            operation_id TEXT PRIMARY KEY NOT NULL,
            operation_name TEXT NOT NULL,
            operation_data TEXT NOT NULL,
            external_transaction_id TEXT,
            organization_id TEXT,
            user_id TEXT,
            result TEXT NOT NULL,
            created_at TIMESTAMP NOT NULL,
            expires_at TIMESTAMP NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS ns_operation_history (
            operation_id TEXT NOT NULL REFERENCES ns_operation(operation_id),
            sequence INTEGER NOT NULL,
            request_auth_method TEXT NOT NULL,
            request_step_result TEXT NOT NULL,
            response_result TEXT NOT NULL,
            response_steps TEXT NOT NULL,
            response_description TEXT,
            chosen_auth_method TEXT,
            created_at TIMESTAMP NOT NULL,
            PRIMARY KEY (operation_id, sequence)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_tables_postgres(pool: &Pool<Postgres>) -> Result<(), StorageError> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS ns_operation (
            operation_id TEXT PRIMARY KEY NOT NULL,
            operation_name TEXT NOT NULL,
            operation_data TEXT NOT NULL,
            external_transaction_id TEXT,
            organization_id TEXT,
            user_id TEXT,
            result TEXT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL,
            expires_at TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS ns_operation_history (
            operation_id TEXT NOT NULL REFERENCES ns_operation(operation_id),
            sequence BIGINT NOT NULL,
            request_auth_method TEXT NOT NULL,
            request_step_result TEXT NOT NULL,
            response_result TEXT NOT NULL,
            response_steps TEXT NOT NULL,
            response_description TEXT,
            chosen_auth_method TEXT,
            created_at TIMESTAMPTZ NOT NULL,
            PRIMARY KEY (operation_id, sequence)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn write_with_history_sqlite(
    pool: &Pool<Sqlite>,
    operation: &Operation,
    entry: &OperationHistoryEntry,
    insert: bool,
) -> Result<(), StorageError> {
    let mut tx = pool.begin().await?;

    let operation_sql = if insert {
        r#"
        INSERT INTO ns_operation
        (operation_id, operation_name, operation_data, external_transaction_id, organization_id, user_id, result, created_at, expires_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#
    } else {
        r#"
        INSERT OR REPLACE INTO ns_operation
        (operation_id, operation_name, operation_data, external_transaction_id, organization_id, user_id, result, created_at, expires_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#
    };

    sqlx::query(operation_sql)
        .bind(&operation.operation_id)
        .bind(&operation.operation_name)
        .bind(&operation.operation_data)
        .bind(&operation.external_transaction_id)
        .bind(&operation.organization_id)
        .bind(&operation.user_id)
        .bind(operation.result.as_str())
        .bind(operation.created_at)
        .bind(operation.expires_at)
        .execute(&mut *tx)
        .await?;

    sqlx::query(
        r#"
        INSERT INTO ns_operation_history
        (operation_id, sequence, request_auth_method, request_step_result, response_result, response_steps, response_description, chosen_auth_method, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&entry.operation_id)
    .bind(entry.sequence)
    .bind(entry.request_auth_method.as_str())
    .bind(entry.request_step_result.as_str())
    .bind(entry.response_result.as_str())
    .bind(steps_snapshot(entry))
    .bind(&entry.response_description)
    .bind(entry.chosen_auth_method.map(|m| m.as_str()))
    .bind(entry.created_at)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}

async fn write_with_history_postgres(
    pool: &Pool<Postgres>,
    operation: &Operation,
    entry: &OperationHistoryEntry,
    insert: bool,
) -> Result<(), StorageError> {
    let mut tx = pool.begin().await?;

    let operation_sql = if insert {
        r#"
        INSERT INTO ns_operation
        (operation_id, operation_name, operation_data, external_transaction_id, organization_id, user_id, result, created_at, expires_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#
    } else {
        r#"
        INSERT INTO ns_operation
        (operation_id, operation_name, operation_data, external_transaction_id, organization_id, user_id, result, created_at, expires_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        ON CONFLICT (operation_id) DO UPDATE
        SET operation_data = $3, external_transaction_id = $4, organization_id = $5, user_id = $6, result = $7, expires_at = $9
        "#
    };

    sqlx::query(operation_sql)
        .bind(&operation.operation_id)
        .bind(&operation.operation_name)
        .bind(&operation.operation_data)
        .bind(&operation.external_transaction_id)
        .bind(&operation.organization_id)
        .bind(&operation.user_id)
        .bind(operation.result.as_str())
        .bind(operation.created_at)
        .bind(operation.expires_at)
        .execute(&mut *tx)
        .await?;

    sqlx::query(
        r#"
        INSERT INTO ns_operation_history
        (operation_id, sequence, request_auth_method, request_step_result, response_result, response_steps, response_description, chosen_auth_method, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(&entry.operation_id)
    .bind(entry.sequence)
    .bind(entry.request_auth_method.as_str())
    .bind(entry.request_step_result.as_str())
    .bind(entry.response_result.as_str())
    .bind(steps_snapshot(entry))
    .bind(&entry.response_description)
    .bind(entry.chosen_auth_method.map(|m| m.as_str()))
    .bind(entry.created_at)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}

fn decode_error(column: &str, err: String) -> sqlx::Error {
    sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: err.into(),
    }
}

fn operation_from_parts(
    operation_id: String,
    operation_name: String,
    operation_data: String,
    external_transaction_id: Option<String>,
    organization_id: Option<String>,
    user_id: Option<String>,
    result: String,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
) -> Result<Operation, sqlx::Error> {
    Ok(Operation {
        operation_id,
        operation_name,
        operation_data,
        external_transaction_id,
        organization_id,
        user_id,
        result: OperationResult::from_str(&result).map_err(|e| decode_error("result", e))?,
        created_at,
        expires_at,
    })
}

#[allow(clippy::too_many_arguments)]
fn history_from_parts(
    operation_id: String,
    sequence: i64,
    request_auth_method: String,
    request_step_result: String,
    response_result: String,
    response_steps: String,
    response_description: Option<String>,
    chosen_auth_method: Option<String>,
    created_at: DateTime<Utc>,
) -> Result<OperationHistoryEntry, sqlx::Error> {
    let steps: Vec<OperationStep> = serde_json::from_str(&response_steps).unwrap_or_else(|err| {
        // The snapshot is best-effort data, a bad blob must not make the
        // operation unreadable.
        tracing::warn!(
            "Discarding unreadable steps snapshot for operation {}: {}",
            operation_id,
            err
        );
        Vec::new()
    });

    Ok(OperationHistoryEntry {
        operation_id,
        sequence,
        request_auth_method: AuthMethod::from_str(&request_auth_method)
            .map_err(|e| decode_error("request_auth_method", e))?,
        request_step_result: AuthStepResult::from_str(&request_step_result)
            .map_err(|e| decode_error("request_step_result", e))?,
        response_result: OperationResult::from_str(&response_result)
            .map_err(|e| decode_error("response_result", e))?,
        response_steps: steps,
        response_description,
        chosen_auth_method: chosen_auth_method
            .map(|m| AuthMethod::from_str(&m).map_err(|e| decode_error("chosen_auth_method", e)))
            .transpose()?,
        created_at,
    })
}

impl<'r> FromRow<'r, SqliteRow> for Operation {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        operation_from_parts(
            row.try_get("operation_id")?,
            row.try_get("operation_name")?,
            row.try_get("operation_data")?,
            row.try_get("external_transaction_id")?,
            row.try_get("organization_id")?,
            row.try_get("user_id")?,
            row.try_get("result")?,
            row.try_get("created_at")?,
            row.try_get("expires_at")?,
        )
    }
}

impl<'r> FromRow<'r, PgRow> for Operation {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        operation_from_parts(
            row.try_get("operation_id")?,
            row.try_get("operation_name")?,
            row.try_get("operation_data")?,
            row.try_get("external_transaction_id")?,
            row.try_get("organization_id")?,
            row.try_get("user_id")?,
            row.try_get("result")?,
            row.try_get("created_at")?,
            row.try_get("expires_at")?,
        )
    }
}

impl<'r> FromRow<'r, SqliteRow> for OperationHistoryEntry {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        history_from_parts(
            row.try_get("operation_id")?,
            row.try_get("sequence")?,
            row.try_get("request_auth_method")?,
            row.try_get("request_step_result")?,
            row.try_get("response_result")?,
            row.try_get("response_steps")?,
            row.try_get("response_description")?,
            row.try_get("chosen_auth_method")?,
            row.try_get("created_at")?,
        )
    }
}

impl<'r> FromRow<'r, PgRow> for OperationHistoryEntry {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        history_from_parts(
            row.try_get("operation_id")?,
            row.try_get("sequence")?,
            row.try_get("request_auth_method")?,
            row.try_get("request_step_result")?,
            row.try_get("response_result")?,
            row.try_get("response_steps")?,
            row.try_get("response_description")?,
            row.try_get("chosen_auth_method")?,
            row.try_get("created_at")?,
        )
    }
}
