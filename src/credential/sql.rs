use std::str::FromStr;

use async_trait::async_trait;
use sqlx::{FromRow, Pool, Postgres, Row, Sqlite, postgres::PgRow, sqlite::SqliteRow};

use crate::storage::{DbPool, StorageError};

use super::store::{CredentialStore, OtpStore};
use super::types::{Credential, CredentialStatus, Otp, OtpStatus};

impl CredentialStatus {
    fn as_db_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::BlockedTemporary => "BLOCKED_TEMPORARY",
            Self::BlockedPermanent => "BLOCKED_PERMANENT",
            Self::Removed => "REMOVED",
        }
    }
}

impl FromStr for CredentialStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(Self::Active),
            "BLOCKED_TEMPORARY" => Ok(Self::BlockedTemporary),
            "BLOCKED_PERMANENT" => Ok(Self::BlockedPermanent),
            "REMOVED" => Ok(Self::Removed),
            other => Err(format!("unknown credential status: {other}")),
        }
    }
}

impl OtpStatus {
    fn as_db_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Used => "USED",
            Self::Blocked => "BLOCKED",
            Self::External => "EXTERNAL",
            Self::Removed => "REMOVED",
        }
    }
}

impl FromStr for OtpStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(Self::Active),
            "USED" => Ok(Self::Used),
            "BLOCKED" => Ok(Self::Blocked),
            "EXTERNAL" => Ok(Self::External),
            "REMOVED" => Ok(Self::Removed),
            other => Err(format!("unknown otp status: {other}")),
        }
    }
}

/// SQL-backed credential and OTP store, maintained for SQLite and PostgreSQL.
pub struct SqlCredentialStore {
    pool: DbPool,
}

impl SqlCredentialStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

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
impl CredentialStore for SqlCredentialStore {
    async fn find_credential(
        &self,
        user_id: &str,
        credential_name: &str,
    ) -> Result<Option<Credential>, StorageError> {
        if let Some(pool) = self.pool.as_sqlite() {
            sqlx::query_as::<_, Credential>(
                "SELECT * FROM ns_credential WHERE user_id = ? AND credential_name = ?",
            )
            .bind(user_id)
            .bind(credential_name)
            .fetch_optional(pool)
            .await
            .map_err(StorageError::from)
        } else if let Some(pool) = self.pool.as_postgres() {
            sqlx::query_as::<_, Credential>(
                "SELECT * FROM ns_credential WHERE user_id = $1 AND credential_name = $2",
            )
            .bind(user_id)
            .bind(credential_name)
            .fetch_optional(pool)
            .await
            .map_err(StorageError::from)
        } else {
            Err(StorageError::Backend("unsupported database type".into()))
        }
    }

    async fn save_credential(&self, credential: &Credential) -> Result<(), StorageError> {
        if let Some(pool) = self.pool.as_sqlite() {
            save_credential_sqlite(pool, credential).await
        } else if let Some(pool) = self.pool.as_postgres() {
            save_credential_postgres(pool, credential).await
        } else {
            Err(StorageError::Backend("unsupported database type".into()))
        }
    }
}

#[async_trait]
impl OtpStore for SqlCredentialStore {
    async fn find_otp(&self, otp_id: &str) -> Result<Option<Otp>, StorageError> {
        if let Some(pool) = self.pool.as_sqlite() {
            sqlx::query_as::<_, Otp>("SELECT * FROM ns_otp WHERE otp_id = ?")
                .bind(otp_id)
                .fetch_optional(pool)
                .await
                .map_err(StorageError::from)
        } else if let Some(pool) = self.pool.as_postgres() {
            sqlx::query_as::<_, Otp>("SELECT * FROM ns_otp WHERE otp_id = $1")
                .bind(otp_id)
                .fetch_optional(pool)
                .await
                .map_err(StorageError::from)
        } else {
            Err(StorageError::Backend("unsupported database type".into()))
        }
    }

    async fn save_otp(&self, otp: &Otp) -> Result<(), StorageError> {
        if let Some(pool) = self.pool.as_sqlite() {
            save_otp_sqlite(pool, otp).await
        } else if let Some(pool) = self.pool.as_postgres() {
            save_otp_postgres(pool, otp).await
        } else {
            Err(StorageError::Backend("unsupported database type".into()))
        }
    }
}

async fn create_tables_sqlite(pool: &Pool<Sqlite>) -> Result<(), StorageError> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS ns_credential (
            credential_id TEXT PRIMARY KEY NOT NULL,
            credential_name TEXT NOT NULL,
            user_id TEXT NOT NULL,
            status TEXT NOT NULL,
            protected_value TEXT NOT NULL,
            algorithm TEXT NOT NULL,
            attempt_counter INTEGER NOT NULL DEFAULT 0,
            failed_attempt_counter_soft INTEGER NOT NULL DEFAULT 0,
            failed_attempt_counter_hard INTEGER NOT NULL DEFAULT 0,
            soft_limit INTEGER,
            hard_limit INTEGER,
            blocked_at TIMESTAMP,
            proxy_enabled INTEGER NOT NULL DEFAULT 0,
            created_at TIMESTAMP NOT NULL,
            updated_at TIMESTAMP NOT NULL,
            UNIQUE (user_id, credential_name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS ns_otp (
            otp_id TEXT PRIMARY KEY NOT NULL,
            otp_name TEXT NOT NULL,
            user_id TEXT,
            operation_id TEXT,
            status TEXT NOT NULL,
            protected_value TEXT NOT NULL,
            algorithm TEXT NOT NULL,
            attempt_counter INTEGER NOT NULL DEFAULT 0,
            failed_attempt_counter INTEGER NOT NULL DEFAULT 0,
            attempt_limit INTEGER,
            expires_at TIMESTAMP,
            proxy_enabled INTEGER NOT NULL DEFAULT 0,
            created_at TIMESTAMP NOT NULL,
            updated_at TIMESTAMP NOT NULL
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
        CREATE TABLE IF NOT EXISTS ns_credential (
            credential_id TEXT PRIMARY KEY NOT NULL,
            credential_name TEXT NOT NULL,
            user_id TEXT NOT NULL,
            status TEXT NOT NULL,
            protected_value TEXT NOT NULL,
            algorithm TEXT NOT NULL,
            attempt_counter BIGINT NOT NULL DEFAULT 0,
            failed_attempt_counter_soft BIGINT NOT NULL DEFAULT 0,
            failed_attempt_counter_hard BIGINT NOT NULL DEFAULT 0,
            soft_limit BIGINT,
            hard_limit BIGINT,
            blocked_at TIMESTAMPTZ,
            proxy_enabled BOOLEAN NOT NULL DEFAULT FALSE,
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL,
            UNIQUE (user_id, credential_name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS ns_otp (
            otp_id TEXT PRIMARY KEY NOT NULL,
            otp_name TEXT NOT NULL,
            user_id TEXT,
            operation_id TEXT,
            status TEXT NOT NULL,
            protected_value TEXT NOT NULL,
            algorithm TEXT NOT NULL,
            attempt_counter BIGINT NOT NULL DEFAULT 0,
            failed_attempt_counter BIGINT NOT NULL DEFAULT 0,
            attempt_limit BIGINT,
            expires_at TIMESTAMPTZ,
            proxy_enabled BOOLEAN NOT NULL DEFAULT FALSE,
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn save_credential_sqlite(
    pool: &Pool<Sqlite>,
    credential: &Credential,
) -> Result<(), StorageError> {
    sqlx::query(
        r#"
        INSERT OR REPLACE INTO ns_credential
        (credential_id, credential_name, user_id, status, protected_value, algorithm,
         attempt_counter, failed_attempt_counter_soft, failed_attempt_counter_hard,
         soft_limit, hard_limit, blocked_at, proxy_enabled, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&credential.credential_id)
    .bind(&credential.credential_name)
    .bind(&credential.user_id)
    .bind(credential.status.as_db_str())
    .bind(&credential.protected_value)
    .bind(&credential.algorithm)
    .bind(credential.attempt_counter as i64)
    .bind(credential.failed_attempt_counter_soft as i64)
    .bind(credential.failed_attempt_counter_hard as i64)
    .bind(credential.soft_limit.map(|v| v as i64))
    .bind(credential.hard_limit.map(|v| v as i64))
    .bind(credential.blocked_at)
    .bind(credential.proxy_enabled)
    .bind(credential.created_at)
    .bind(credential.updated_at)
    .execute(pool)
    .await?;
    Ok(())
}

async fn save_credential_postgres(
    pool: &Pool<Postgres>,
    credential: &Credential,
) -> Result<(), StorageError> {
    sqlx::query(
        r#"
        INSERT INTO ns_credential
        (credential_id, credential_name, user_id, status, protected_value, algorithm,
         attempt_counter, failed_attempt_counter_soft, failed_attempt_counter_hard,
         soft_limit, hard_limit, blocked_at, proxy_enabled, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
        ON CONFLICT (credential_id) DO UPDATE
        SET status = $4, protected_value = $5, algorithm = $6, attempt_counter = $7,
            failed_attempt_counter_soft = $8, failed_attempt_counter_hard = $9,
            soft_limit = $10, hard_limit = $11, blocked_at = $12, proxy_enabled = $13,
            updated_at = $15
        "#,
    )
    .bind(&credential.credential_id)
    .bind(&credential.credential_name)
    .bind(&credential.user_id)
    .bind(credential.status.as_db_str())
    .bind(&credential.protected_value)
    .bind(&credential.algorithm)
    .bind(credential.attempt_counter as i64)
    .bind(credential.failed_attempt_counter_soft as i64)
    .bind(credential.failed_attempt_counter_hard as i64)
    .bind(credential.soft_limit.map(|v| v as i64))
    .bind(credential.hard_limit.map(|v| v as i64))
    .bind(credential.blocked_at)
    .bind(credential.proxy_enabled)
    .bind(credential.created_at)
    .bind(credential.updated_at)
    .execute(pool)
    .await?;
    Ok(())
}

async fn save_otp_sqlite(pool: &Pool<Sqlite>, otp: &Otp) -> Result<(), StorageError> {
    sqlx::query(
        r#"
        INSERT OR REPLACE INTO ns_otp
        (otp_id, otp_name, user_id, operation_id, status, protected_value, algorithm,
         attempt_counter, failed_attempt_counter, attempt_limit, expires_at,
         proxy_enabled, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&otp.otp_id)
    .bind(&otp.otp_name)
    .bind(&otp.user_id)
    .bind(&otp.operation_id)
    .bind(otp.status.as_db_str())
    .bind(&otp.protected_value)
    .bind(&otp.algorithm)
    .bind(otp.attempt_counter as i64)
    .bind(otp.failed_attempt_counter as i64)
    .bind(otp.attempt_limit.map(|v| v as i64))
    .bind(otp.expires_at)
    .bind(otp.proxy_enabled)
    .bind(otp.created_at)
    .bind(otp.updated_at)
    .execute(pool)
    .await?;
    Ok(())
}

async fn save_otp_postgres(pool: &Pool<Postgres>, otp: &Otp) -> Result<(), StorageError> {
    sqlx::query(
        r#"
        INSERT INTO ns_otp
        (otp_id, otp_name, user_id, operation_id, status, protected_value, algorithm,
         attempt_counter, failed_attempt_counter, attempt_limit, expires_at,
         proxy_enabled, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        ON CONFLICT (otp_id) DO UPDATE
        SET status = $5, attempt_counter = $8, failed_attempt_counter = $9,
            attempt_limit = $10, expires_at = $11, proxy_enabled = $12, updated_at = $14
        "#,
    )
    .bind(&otp.otp_id)
    .bind(&otp.otp_name)
    .bind(&otp.user_id)
    .bind(&otp.operation_id)
    .bind(otp.status.as_db_str())
    .bind(&otp.protected_value)
    .bind(&otp.algorithm)
    .bind(otp.attempt_counter as i64)
    .bind(otp.failed_attempt_counter as i64)
    .bind(otp.attempt_limit.map(|v| v as i64))
    .bind(otp.expires_at)
    .bind(otp.proxy_enabled)
    .bind(otp.created_at)
    .bind(otp.updated_at)
    .execute(pool)
    .await?;
    Ok(())
}

fn decode_error(column: &str, err: String) -> sqlx::Error {
    sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: err.into(),
    }
}

macro_rules! credential_from_row {
    ($row:expr) => {{
        let row = $row;
        let status: String = row.try_get("status")?;
        Ok(Credential {
            credential_id: row.try_get("credential_id")?,
            credential_name: row.try_get("credential_name")?,
            user_id: row.try_get("user_id")?,
            status: CredentialStatus::from_str(&status).map_err(|e| decode_error("status", e))?,
            protected_value: row.try_get("protected_value")?,
            algorithm: row.try_get("algorithm")?,
            attempt_counter: row.try_get::<i64, _>("attempt_counter")? as u64,
            failed_attempt_counter_soft: row.try_get::<i64, _>("failed_attempt_counter_soft")?
                as u64,
            failed_attempt_counter_hard: row.try_get::<i64, _>("failed_attempt_counter_hard")?
                as u64,
            soft_limit: row.try_get::<Option<i64>, _>("soft_limit")?.map(|v| v as u64),
            hard_limit: row.try_get::<Option<i64>, _>("hard_limit")?.map(|v| v as u64),
            blocked_at: row.try_get("blocked_at")?,
            proxy_enabled: row.try_get("proxy_enabled")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }};
}

macro_rules! otp_from_row {
    ($row:expr) => {{
        let row = $row;
        let status: String = row.try_get("status")?;
        Ok(Otp {
            otp_id: row.try_get("otp_id")?,
            otp_name: row.try_get("otp_name")?,
            user_id: row.try_get("user_id")?,
            operation_id: row.try_get("operation_id")?,
            status: OtpStatus::from_str(&status).map_err(|e| decode_error("status", e))?,
            protected_value: row.try_get("protected_value")?,
            algorithm: row.try_get("algorithm")?,
            attempt_counter: row.try_get::<i64, _>("attempt_counter")? as u64,
            failed_attempt_counter: row.try_get::<i64, _>("failed_attempt_counter")? as u64,
            attempt_limit: row
                .try_get::<Option<i64>, _>("attempt_limit")?
                .map(|v| v as u64),
            expires_at: row.try_get("expires_at")?,
            proxy_enabled: row.try_get("proxy_enabled")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }};
}

impl<'r> FromRow<'r, SqliteRow> for Credential {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        credential_from_row!(row)
    }
}

impl<'r> FromRow<'r, PgRow> for Credential {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        credential_from_row!(row)
    }
}

impl<'r> FromRow<'r, SqliteRow> for Otp {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        otp_from_row!(row)
    }
}

impl<'r> FromRow<'r, PgRow> for Otp {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        otp_from_row!(row)
    }
}
