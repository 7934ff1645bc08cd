// Module database - PostgreSQL durable tier of the cache
// Rows are written only for successful computations; expired rows are
// treated as misses and purged opportunistically.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool};

use crate::cache::{CacheEntry, CacheError, DurableTier};

/// Database error type
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Database connection error: {0}")]
    ConnectionError(#[from] sqlx::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl From<DatabaseError> for CacheError {
    fn from(err: DatabaseError) -> Self {
        CacheError::Backend(err.to_string())
    }
}

#[derive(Debug, Clone, FromRow)]
struct CacheRow {
    key: String,
    value: sqlx::types::JsonValue,
    expires_at: DateTime<Utc>,
}

impl From<CacheRow> for CacheEntry {
    fn from(row: CacheRow) -> Self {
        CacheEntry {
            key: row.key,
            value: row.value,
            expires_at: row.expires_at,
        }
    }
}

/// Postgres-backed durable tier
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Create new database connection pool
    ///
    /// # Errors
    /// Returns DatabaseError if the URL is empty or the connection fails
    pub async fn connect(database_url: &str) -> Result<Self, DatabaseError> {
        if database_url.trim().is_empty() {
            return Err(DatabaseError::ConfigError(
                "DATABASE_URL is empty".to_string(),
            ));
        }

        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        tracing::info!("PostgreSQL connection pool created");

        Ok(Self { pool })
    }

    /// Run database migrations
    pub async fn migrate(&self) -> Result<(), DatabaseError> {
        let mut conn = self.pool.acquire().await?;

        let migration_sql = include_str!("../migrations/20260301_create_cache_entries.sql");

        // Raw SQL supports multiple statements
        sqlx::raw_sql(migration_sql).execute(&mut *conn).await?;

        tracing::info!("Database migrations completed");
        Ok(())
    }

    /// Delete rows whose TTL has passed. Returns the number removed.
    pub async fn purge_expired(&self) -> Result<u64, DatabaseError> {
        let result = sqlx::query("DELETE FROM cache_entries WHERE expires_at <= NOW()")
            .execute(&self.pool)
            .await?;
        if result.rows_affected() > 0 {
            tracing::info!("Purged {} expired cache entries", result.rows_affected());
        }
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl DurableTier for PgStore {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        let row = sqlx::query_as::<_, CacheRow>(
            "SELECT key, value, expires_at FROM cache_entries WHERE key = $1",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from)?;

        Ok(row.map(CacheEntry::from))
    }

    async fn upsert(&self, entry: &CacheEntry) -> Result<(), CacheError> {
        sqlx::query(
            r#"
            INSERT INTO cache_entries (key, value, expires_at, updated_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (key) DO UPDATE
            SET value = EXCLUDED.value,
                expires_at = EXCLUDED.expires_at,
                updated_at = NOW()
            "#,
        )
        .bind(&entry.key)
        .bind(&entry.value)
        .bind(entry.expires_at)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from)?;

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        sqlx::query("DELETE FROM cache_entries WHERE key = $1")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(DatabaseError::from)?;
        Ok(())
    }
}
