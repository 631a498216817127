//! Proxyhunter - Entry Point
//!
//! Validates candidates from `HUNTER_INPUT` (or stdin) once and prints one JSON
//! result per line, or keeps re-validating the file when
//! `HUNTER_REFRESH_INTERVAL` is set and prints the working pool after every pass.

use std::io::Write;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tokio::io::AsyncReadExt;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use proxyhunter::config::{Config, LogConfig};
use proxyhunter::error::{HunterError, Result};
use proxyhunter::models::{write_json_lines, BatchReport, Protocol, TargetCheck};
use proxyhunter::repository::{BlacklistStore, MemoryStore, PgStore, ResultRepository, ResultStore};
use proxyhunter::services::pool_refresher::parse_candidate_lines;
use proxyhunter::services::{
    FileCandidateSource, PoolRefresher, PoolRefresherHandle, ResultCleanupConfig,
    ResultCleanupHandle, ResultCleanupService,
};
use proxyhunter::{Database, Validator};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;
    init_tracing(&config.log);

    info!(
        threads = config.validator.threads,
        anonymity = config.validator.anonymity.as_str(),
        "Starting proxyhunter"
    );

    let db = match &config.database {
        Some(db_config) => {
            let db = Database::connect(db_config).await?;
            db.run_migrations().await?;
            Some(db)
        }
        None => {
            info!("DATABASE_URL not set, keeping history in memory");
            None
        }
    };

    let store: Arc<dyn BlacklistStore> = match &db {
        Some(db) => Arc::new(PgStore::new(db.pool().clone())),
        None => Arc::new(MemoryStore::new()),
    };
    let results: Option<Arc<dyn ResultStore>> = db
        .as_ref()
        .map(|db| Arc::new(ResultRepository::new(db.pool().clone())) as Arc<dyn ResultStore>);

    let validator = Validator::from_config(config.validator.clone(), store);

    match config.refresh.interval {
        Some(every) => {
            let path = config.input.clone().ok_or_else(|| {
                HunterError::InvalidConfig(
                    "HUNTER_REFRESH_INTERVAL requires HUNTER_INPUT".to_string(),
                )
            })?;

            let mut refresher = PoolRefresher::new(
                validator,
                Arc::new(FileCandidateSource::new(path, "file")),
                every,
            );
            if let Some(results) = &results {
                refresher = refresher.with_results(results.clone());
            }

            let mut updates = refresher.subscribe();
            let printer = tokio::spawn(async move {
                while updates.changed().await.is_ok() {
                    let pool = updates.borrow_and_update().clone();
                    let stdout = std::io::stdout();
                    if let Err(e) = write_json_lines(&mut stdout.lock(), pool.iter()) {
                        error!("Failed to write working pool: {}", e);
                    }
                }
            });

            let cleanup = match (&results, config.refresh.result_retention) {
                (Some(results), Some(retention)) => {
                    let service = ResultCleanupService::new(
                        results.clone(),
                        ResultCleanupConfig::for_retention(retention),
                    );
                    let (handle, cleanup_shutdown) = ResultCleanupHandle::new();
                    let task = tokio::spawn(async move {
                        service.run(cleanup_shutdown).await;
                    });
                    Some((handle, task))
                }
                _ => None,
            };

            let (handle, refresher_shutdown) = PoolRefresherHandle::new();
            let task = tokio::spawn(async move {
                refresher.run(refresher_shutdown).await;
            });

            shutdown_signal().await;
            info!("Shutdown signal received");
            handle.shutdown();
            let _ = task.await;
            // the refresher is gone, so its channel is closed
            let _ = printer.await;

            if let Some((handle, task)) = cleanup {
                handle.shutdown();
                let _ = task.await;
            }
        }
        None => {
            let candidates = read_candidates(config.input.as_deref()).await?;

            let (cancel_tx, cancel_rx) = watch::channel(false);
            let signal_task = tokio::spawn(async move {
                shutdown_signal().await;
                warn!("Shutdown signal received, finishing in-flight candidates");
                let _ = cancel_tx.send(true);
            });

            let report = validator.validate_batch(candidates, cancel_rx).await?;
            signal_task.abort();

            if let Some(results) = &results {
                if let Err(e) = results.save_report(&report).await {
                    error!("Failed to persist validation results: {}", e);
                }
                if let Some(retention) = config.refresh.result_retention {
                    match results.delete_stale(retention).await {
                        Ok(0) => {}
                        Ok(deleted) => info!(deleted, "Deleted stale validation results"),
                        Err(e) => warn!("Failed to delete stale validation results: {}", e),
                    }
                }
            }
            print_report(&report)?;

            if let Some(url) = &config.target_url {
                let checks = check_working_against(&validator, &report, url).await;
                let stdout = std::io::stdout();
                let mut out = stdout.lock();
                for check in &checks {
                    serde_json::to_writer(&mut out, check)?;
                    out.write_all(b"\n")?;
                }
                out.flush()?;
            }
        }
    }

    if let Some(db) = db {
        db.close().await;
    }

    info!("Proxyhunter stopped");
    Ok(())
}

/// Logs go to stderr; stdout carries the results
fn init_tracing(log: &LogConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("proxyhunter={}", log.level).into());
    let registry = tracing_subscriber::registry().with(filter);

    if log.format == "pretty" {
        registry
            .with(fmt::layer().pretty().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    }
}

async fn read_candidates(input: Option<&str>) -> Result<Vec<(String, String)>> {
    match input {
        Some(path) => {
            let text = tokio::fs::read_to_string(path).await?;
            Ok(parse_candidate_lines(&text, "file"))
        }
        None => {
            let mut text = String::new();
            tokio::io::stdin().read_to_string(&mut text).await?;
            Ok(parse_candidate_lines(&text, "stdin"))
        }
    }
}

fn print_report(report: &BatchReport) -> Result<()> {
    let stdout = std::io::stdout();
    write_json_lines(&mut stdout.lock(), &report.results)?;

    info!(
        total = report.summary.total,
        working = report.summary.working(),
        cancelled = report.summary.cancelled,
        summary = %serde_json::to_string(&report.summary)?,
        "Batch summary"
    );
    Ok(())
}

/// Fetch `url` through every working HTTP proxy of the batch
async fn check_working_against(
    validator: &Validator,
    report: &BatchReport,
    url: &str,
) -> Vec<TargetCheck> {
    let proxies: Vec<String> = report
        .working()
        .into_iter()
        .filter(|r| r.protocol() == Protocol::Http)
        .map(|r| r.endpoint.clone())
        .collect();

    let checks: Vec<TargetCheck> = stream::iter(proxies)
        .map(|proxy| async move { validator.check_target(&proxy, url, &[]).await })
        .buffer_unordered(validator.threads())
        .filter_map(|check| async move {
            match check {
                Ok(check) => Some(check),
                Err(e) => {
                    warn!("Skipping target check: {}", e);
                    None
                }
            }
        })
        .collect()
        .await;

    info!(
        url,
        checked = checks.len(),
        succeeded = checks.iter().filter(|c| c.success).count(),
        "Target checks finished"
    );
    checks
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
