use std::time::Duration;

use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool};
use tracing::info;

use crate::error::Result;
use crate::models::{BatchReport, BatchSummary, ValidationResult};

use super::ResultStore;

/// Latest result per endpoint plus per-batch statistics
#[derive(Clone)]
pub struct ResultRepository {
    pool: PgPool,
}

impl ResultRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ResultStore for ResultRepository {
    async fn save_report(&self, report: &BatchReport) -> Result<i64> {
        let mut tx = self.pool.begin().await?;

        let mut saved = 0;
        for result in report.persistable() {
            upsert_result(&mut *tx, result).await?;
            saved += 1;
        }
        let id = insert_scan(&mut *tx, &report.summary).await?;

        tx.commit().await?;

        info!(scan_id = id, results = saved, "Saved validation results");
        Ok(id)
    }

    async fn best_working(&self, limit: usize) -> Result<Vec<ValidationResult>> {
        let rows: Vec<(Json<ValidationResult>,)> = sqlx::query_as(
            r#"
            SELECT result
            FROM validation_results
            WHERE status = 'ok'
            ORDER BY quality_score DESC NULLS LAST
            LIMIT $1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(Json(r),)| r).collect())
    }

    async fn delete_stale(&self, older_than: Duration) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM validation_results
            WHERE checked_at < NOW() - INTERVAL '1 second' * $1
              AND status <> 'ok'
            "#,
        )
        .bind(older_than.as_secs_f64())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

/// Replace the stored result for the endpoint
async fn upsert_result(conn: &mut PgConnection, result: &ValidationResult) -> Result<()> {
    let geo = result.geolocation();

    sqlx::query(
        r#"
        INSERT INTO validation_results
            (endpoint, source, status, protocol, anonymity, response_time,
             quality_score, country, country_code, result, checked_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, NOW())
        ON CONFLICT (endpoint) DO UPDATE SET
            source = EXCLUDED.source,
            status = EXCLUDED.status,
            protocol = EXCLUDED.protocol,
            anonymity = EXCLUDED.anonymity,
            response_time = EXCLUDED.response_time,
            quality_score = EXCLUDED.quality_score,
            country = EXCLUDED.country,
            country_code = EXCLUDED.country_code,
            result = EXCLUDED.result,
            checked_at = EXCLUDED.checked_at
        "#,
    )
    .bind(&result.endpoint)
    .bind(&result.source)
    .bind(result.status().as_str())
    .bind(result.protocol().as_str())
    .bind(result.anonymity().as_str())
    .bind(result.response_time())
    .bind(result.quality_score())
    .bind(geo.map(|g| g.country.clone()))
    .bind(geo.map(|g| g.country_code.clone()))
    .bind(Json(result))
    .execute(&mut *conn)
    .await?;

    Ok(())
}

async fn insert_scan(conn: &mut PgConnection, summary: &BatchSummary) -> Result<i64> {
    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO scan_stats
            (total_candidates, working, cancelled, average_response_time, elapsed_secs, summary)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id
        "#,
    )
    .bind(summary.total as i32)
    .bind(summary.working() as i32)
    .bind(summary.cancelled as i32)
    .bind(summary.average_response_time)
    .bind(summary.elapsed_secs)
    .bind(Json(summary))
    .fetch_one(&mut *conn)
    .await?;

    Ok(id)
}
