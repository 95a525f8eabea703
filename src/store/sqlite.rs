use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

use super::{is_unique_violation, resolve_unmarked, MarkUsed, StoreError, StoreResult, TokenStore};
use crate::models::token::{Token, TokenRow};

const SCHEMA: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS tokens (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        token TEXT NOT NULL UNIQUE,
        used BOOLEAN NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        used_at TEXT
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_tokens_used ON tokens (used)",
];

/// SQLite-backed token store. The default for single-node deployments.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(database_url: &str, max_connections: Option<u32>) -> anyhow::Result<Self> {
        let in_memory = database_url.contains(":memory:");

        let opts = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            // Concurrent writers wait on the database lock instead of failing fast.
            .busy_timeout(Duration::from_secs(5));

        let pool = if in_memory {
            // Every connection to :memory: is its own database, so keep exactly
            // one and never recycle it.
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(opts)
                .await?
        } else {
            SqlitePoolOptions::new()
                // SQLite serializes writers anyway; one connection avoids
                // "database is locked" churn unless the operator asks for more.
                .max_connections(max_connections.unwrap_or(1))
                .connect_with(opts)
                .await?
        };

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl TokenStore for SqliteStore {
    async fn init_schema(&self) -> StoreResult<()> {
        for stmt in SCHEMA {
            sqlx::query(stmt).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn create(&self, value: &str) -> StoreResult<i64> {
        let result = sqlx::query("INSERT INTO tokens (token, used, created_at) VALUES (?, 0, ?)")
            .bind(value)
            .bind(Utc::now())
            .execute(&self.pool)
            .await;

        match result {
            Ok(done) => Ok(done.last_insert_rowid()),
            Err(e) if is_unique_violation(&e) => Err(StoreError::DuplicateValue),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_pending(&self) -> StoreResult<Vec<String>> {
        let values = sqlx::query_scalar::<_, String>(
            "SELECT token FROM tokens WHERE used = 0 ORDER BY id ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(values)
    }

    async fn mark_used(&self, value: &str) -> StoreResult<MarkUsed> {
        let result = sqlx::query("UPDATE tokens SET used = 1, used_at = ? WHERE token = ? AND used = 0")
            .bind(Utc::now())
            .bind(value)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 1 {
            return Ok(MarkUsed::Marked);
        }

        let used = sqlx::query_scalar::<_, bool>("SELECT used FROM tokens WHERE token = ?")
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;

        Ok(resolve_unmarked(used))
    }

    async fn find(&self, value: &str) -> StoreResult<Option<Token>> {
        let row = sqlx::query_as::<_, TokenRow>(
            "SELECT id, token, used, created_at, used_at FROM tokens WHERE token = ?",
        )
        .bind(value)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Token::from))
    }

    async fn health_check(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
