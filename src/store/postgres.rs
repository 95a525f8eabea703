use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use super::{is_unique_violation, resolve_unmarked, MarkUsed, StoreError, StoreResult, TokenStore};
use crate::models::token::{Token, TokenRow};

const SCHEMA: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS tokens (
        id BIGSERIAL PRIMARY KEY,
        token TEXT NOT NULL UNIQUE,
        used BOOLEAN NOT NULL DEFAULT FALSE,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        used_at TIMESTAMPTZ
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_tokens_used ON tokens (used)",
];

/// Postgres-backed token store, for several server processes sharing one table.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str, max_connections: Option<u32>) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections.unwrap_or(5))
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl TokenStore for PgStore {
    async fn init_schema(&self) -> StoreResult<()> {
        for stmt in SCHEMA {
            sqlx::query(stmt).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn create(&self, value: &str) -> StoreResult<i64> {
        let result = sqlx::query_scalar::<_, i64>(
            "INSERT INTO tokens (token, used, created_at) VALUES ($1, FALSE, $2) RETURNING id",
        )
        .bind(value)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(id) => Ok(id),
            Err(e) if is_unique_violation(&e) => Err(StoreError::DuplicateValue),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_pending(&self) -> StoreResult<Vec<String>> {
        let values = sqlx::query_scalar::<_, String>(
            "SELECT token FROM tokens WHERE used = FALSE ORDER BY id ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(values)
    }

    async fn mark_used(&self, value: &str) -> StoreResult<MarkUsed> {
        // The row lock taken by UPDATE serializes concurrent redeemers; the
        // loser re-evaluates `used = FALSE` after the winner commits.
        let result = sqlx::query(
            "UPDATE tokens SET used = TRUE, used_at = $1 WHERE token = $2 AND used = FALSE",
        )
        .bind(Utc::now())
        .bind(value)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(MarkUsed::Marked);
        }

        let used = sqlx::query_scalar::<_, bool>("SELECT used FROM tokens WHERE token = $1")
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;

        Ok(resolve_unmarked(used))
    }

    async fn find(&self, value: &str) -> StoreResult<Option<Token>> {
        let row = sqlx::query_as::<_, TokenRow>(
            "SELECT id, token, used, created_at, used_at FROM tokens WHERE token = $1",
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
