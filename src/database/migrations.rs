use crate::error::Result;
use sqlx::{Executor, PgPool};
use tracing::info;

/// Run all database migrations
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    create_migrations_table(pool).await?;

    for (version, name, sql) in get_migrations() {
        if !is_migration_applied(pool, version).await? {
            info!(version = version, name = name, "Applying migration");

            pool.execute(sql).await?;
            record_migration(pool, version, name).await?;

            info!(version = version, name = name, "Migration applied successfully");
        }
    }

    Ok(())
}

/// Create the migrations tracking table
async fn create_migrations_table(pool: &PgPool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            name VARCHAR(255) NOT NULL,
            applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn is_migration_applied(pool: &PgPool, version: i32) -> Result<bool> {
    let result = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM schema_migrations WHERE version = $1",
    )
    .bind(version)
    .fetch_one(pool)
    .await?;

    Ok(result > 0)
}

async fn record_migration(pool: &PgPool, version: i32, name: &str) -> Result<()> {
    sqlx::query("INSERT INTO schema_migrations (version, name) VALUES ($1, $2)")
        .bind(version)
        .bind(name)
        .execute(pool)
        .await?;

    Ok(())
}

/// All migrations in order
fn get_migrations() -> Vec<(i32, &'static str, &'static str)> {
    vec![
        (1, "history_and_blacklist", MIGRATION_001_HISTORY_AND_BLACKLIST),
        (2, "validation_results", MIGRATION_002_VALIDATION_RESULTS),
        (3, "scan_stats", MIGRATION_003_SCAN_STATS),
        (4, "unbounded_result_keys", MIGRATION_004_UNBOUNDED_RESULT_KEYS),
    ]
}

const MIGRATION_001_HISTORY_AND_BLACKLIST: &str = r#"
CREATE TABLE IF NOT EXISTS endpoint_history (
    endpoint VARCHAR(300) PRIMARY KEY,
    success_count BIGINT NOT NULL DEFAULT 0,
    failure_count BIGINT NOT NULL DEFAULT 0,
    quality_score DOUBLE PRECISION,
    last_checked TIMESTAMPTZ
);

CREATE TABLE IF NOT EXISTS proxy_blacklist (
    endpoint VARCHAR(300) PRIMARY KEY,
    reason TEXT NOT NULL,
    auto_added BOOLEAN NOT NULL DEFAULT FALSE,
    added_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS idx_proxy_blacklist_added_at ON proxy_blacklist(added_at DESC);
"#;

const MIGRATION_002_VALIDATION_RESULTS: &str = r#"
CREATE TABLE IF NOT EXISTS validation_results (
    endpoint VARCHAR(300) PRIMARY KEY,
    source VARCHAR(100) NOT NULL,
    status VARCHAR(20) NOT NULL,
    protocol VARCHAR(10),
    anonymity VARCHAR(20),
    response_time DOUBLE PRECISION,
    quality_score DOUBLE PRECISION,
    country VARCHAR(100),
    country_code VARCHAR(8),
    result JSONB NOT NULL,
    checked_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS idx_validation_results_status ON validation_results(status);
CREATE INDEX IF NOT EXISTS idx_validation_results_country ON validation_results(country_code);
CREATE INDEX IF NOT EXISTS idx_validation_results_quality ON validation_results(quality_score DESC);
"#;

const MIGRATION_003_SCAN_STATS: &str = r#"
CREATE TABLE IF NOT EXISTS scan_stats (
    id BIGSERIAL PRIMARY KEY,
    scanned_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    total_candidates INTEGER NOT NULL,
    working INTEGER NOT NULL,
    cancelled INTEGER NOT NULL DEFAULT 0,
    average_response_time DOUBLE PRECISION,
    elapsed_secs DOUBLE PRECISION NOT NULL,
    summary JSONB NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_scan_stats_scanned_at ON scan_stats(scanned_at DESC);
"#;

// Sources are free-form labels from input files
const MIGRATION_004_UNBOUNDED_RESULT_KEYS: &str = r#"
ALTER TABLE validation_results ALTER COLUMN endpoint TYPE TEXT;
ALTER TABLE validation_results ALTER COLUMN source TYPE TEXT;

CREATE INDEX IF NOT EXISTS idx_validation_results_checked_at ON validation_results(checked_at);
"#;
