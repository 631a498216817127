use async_trait::async_trait;
use sqlx::PgPool;
use tracing::info;

use crate::error::Result;
use crate::models::{BlacklistEntry, EndpointHistory};

use super::BlacklistStore;

/// PostgreSQL-backed history and blacklist
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BlacklistStore for PgStore {
    async fn is_blacklisted(&self, endpoint: &str) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM proxy_blacklist WHERE endpoint = $1)",
        )
        .bind(endpoint)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn record_outcome(
        &self,
        endpoint: &str,
        success: bool,
        quality_score: Option<f64>,
    ) -> Result<EndpointHistory> {
        let history = sqlx::query_as::<_, EndpointHistory>(
            r#"
            INSERT INTO endpoint_history (endpoint, success_count, failure_count, quality_score, last_checked)
            VALUES (
                $1,
                CASE WHEN $2 THEN 1 ELSE 0 END,
                CASE WHEN $2 THEN 0 ELSE 1 END,
                $3,
                NOW()
            )
            ON CONFLICT (endpoint) DO UPDATE SET
                success_count = CASE
                    WHEN $2 THEN endpoint_history.success_count + 1
                    ELSE endpoint_history.success_count
                END,
                failure_count = CASE
                    WHEN $2 THEN endpoint_history.failure_count
                    ELSE endpoint_history.failure_count + 1
                END,
                quality_score = COALESCE($3, endpoint_history.quality_score),
                last_checked = NOW()
            RETURNING endpoint, success_count, failure_count, quality_score, last_checked
            "#,
        )
        .bind(endpoint)
        .bind(success)
        .bind(quality_score)
        .fetch_one(&self.pool)
        .await?;

        Ok(history)
    }

    async fn history(&self, endpoint: &str) -> Result<Option<EndpointHistory>> {
        let history = sqlx::query_as::<_, EndpointHistory>(
            r#"
            SELECT endpoint, success_count, failure_count, quality_score, last_checked
            FROM endpoint_history
            WHERE endpoint = $1
            "#,
        )
        .bind(endpoint)
        .fetch_optional(&self.pool)
        .await?;

        Ok(history)
    }

    async fn upsert(&self, endpoint: &str, reason: &str, auto_added: bool) -> Result<BlacklistEntry> {
        let entry = sqlx::query_as::<_, BlacklistEntry>(
            r#"
            INSERT INTO proxy_blacklist (endpoint, reason, auto_added, added_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (endpoint) DO UPDATE SET
                reason = EXCLUDED.reason,
                auto_added = EXCLUDED.auto_added,
                added_at = EXCLUDED.added_at
            RETURNING endpoint, reason, auto_added, added_at
            "#,
        )
        .bind(endpoint)
        .bind(reason)
        .bind(auto_added)
        .fetch_one(&self.pool)
        .await?;

        info!(endpoint, auto_added, "Blacklisted endpoint: {}", reason);
        Ok(entry)
    }

    async fn remove(&self, endpoint: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM proxy_blacklist WHERE endpoint = $1")
            .bind(endpoint)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list(&self) -> Result<Vec<BlacklistEntry>> {
        let entries = sqlx::query_as::<_, BlacklistEntry>(
            r#"
            SELECT endpoint, reason, auto_added, added_at
            FROM proxy_blacklist
            ORDER BY added_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }
}
