use std::env;

use sqlx::{Pool, Postgres, Sqlite, postgres::PgPoolOptions, sqlite::SqlitePoolOptions};

use super::errors::StorageError;

/// Connection pool for one of the supported database backends.
///
/// Store implementations dispatch on the variant, the same query set is
/// maintained for both backends.
#[derive(Clone)]
pub enum DbPool {
    Sqlite(Pool<Sqlite>),
    Postgres(Pool<Postgres>),
}

impl DbPool {
    /// Connect from a database URL. `sqlite:` URLs select the SQLite
    /// backend, anything else is treated as PostgreSQL.
    pub async fn connect(url: &str) -> Result<Self, StorageError> {
        if url.starts_with("sqlite") {
            let pool = SqlitePoolOptions::new()
                .max_connections(8)
                .connect(url)
                .await?;
            Ok(Self::Sqlite(pool))
        } else {
            let pool = PgPoolOptions::new().max_connections(8).connect(url).await?;
            Ok(Self::Postgres(pool))
        }
    }

    /// Connect using `AUTHSTEP_DB_URL`, loading a `.env` file when one is
    /// present. Falls back to an in-memory SQLite database.
    pub async fn connect_from_env() -> Result<Self, StorageError> {
        dotenvy::dotenv().ok();
        let url =
            env::var("AUTHSTEP_DB_URL").unwrap_or_else(|_| "sqlite::memory:".to_string());
        tracing::info!("Connecting to database: {}", url);
        Self::connect(&url).await
    }

    pub fn as_sqlite(&self) -> Option<&Pool<Sqlite>> {
        match self {
            Self::Sqlite(pool) => Some(pool),
            _ => None,
        }
    }

    pub fn as_postgres(&self) -> Option<&Pool<Postgres>> {
        match self {
            Self::Postgres(pool) => Some(pool),
            _ => None,
        }
    }
}
