//! Pool refresher service
//!
//! Periodically re-validates every candidate from a [`CandidateSource`] and
//! publishes the working proxies of the latest pass, fastest first. Each
//! published pool is also sent to every [`PoolRefresher::subscribe`] receiver.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::watch;
use tokio::time::interval;
use tracing::{debug, error, info, instrument, warn};

use crate::error::Result;
use crate::models::{BatchReport, BatchSummary, ValidationResult};
use crate::repository::ResultStore;
use crate::validator::Validator;

/// Supplies `(host:port, source)` pairs for each pass
#[async_trait]
pub trait CandidateSource: Send + Sync {
    async fn load(&self) -> Result<Vec<(String, String)>>;
}

/// Reads candidates from a text file, one per line
///
/// Lines look like `host:port` or `host:port source`. Blank lines and lines
/// starting with `#` are skipped.
pub struct FileCandidateSource {
    path: PathBuf,
    default_source: String,
}

impl FileCandidateSource {
    pub fn new(path: impl Into<PathBuf>, default_source: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            default_source: default_source.into(),
        }
    }
}

#[async_trait]
impl CandidateSource for FileCandidateSource {
    async fn load(&self) -> Result<Vec<(String, String)>> {
        let text = tokio::fs::read_to_string(&self.path).await?;
        Ok(parse_candidate_lines(&text, &self.default_source))
    }
}

pub fn parse_candidate_lines(text: &str, default_source: &str) -> Vec<(String, String)> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let endpoint = parts.next()?;
            let source = parts.next().unwrap_or(default_source);
            Some((endpoint.to_string(), source.to_string()))
        })
        .collect()
}

/// Stored proxies served before the first pass finishes
const WARM_START_LIMIT: usize = 500;

/// Re-validation service keeping a warm working pool
pub struct PoolRefresher {
    validator: Validator,
    source: Arc<dyn CandidateSource>,
    results: Option<Arc<dyn ResultStore>>,
    check_interval: Duration,
    pool: Arc<ArcSwap<Vec<ValidationResult>>>,
    updates: watch::Sender<Arc<Vec<ValidationResult>>>,
    last_summary: Arc<RwLock<Option<BatchSummary>>>,
}

impl PoolRefresher {
    pub fn new(
        validator: Validator,
        source: Arc<dyn CandidateSource>,
        check_interval: Duration,
    ) -> Self {
        Self {
            validator,
            source,
            results: None,
            check_interval,
            pool: Arc::new(ArcSwap::from_pointee(Vec::new())),
            updates: watch::channel(Arc::new(Vec::new())).0,
            last_summary: Arc::new(RwLock::new(None)),
        }
    }

    /// Persist every pass through `results`
    pub fn with_results(mut self, results: Arc<dyn ResultStore>) -> Self {
        self.results = Some(results);
        self
    }

    /// Working proxies of the last completed pass
    pub fn working_pool(&self) -> Arc<Vec<ValidationResult>> {
        self.pool.load_full()
    }

    /// Receive every pool published from now on
    pub fn subscribe(&self) -> watch::Receiver<Arc<Vec<ValidationResult>>> {
        self.updates.subscribe()
    }

    fn publish(&self, working: Vec<ValidationResult>) {
        let working = Arc::new(working);
        self.pool.store(working.clone());
        self.updates.send_replace(working);
    }

    /// Serve the best stored proxies until the first pass completes
    ///
    /// Returns how many were loaded; does nothing once a pool is published.
    pub async fn warm_start(&self, limit: usize) -> Result<usize> {
        let Some(results) = &self.results else {
            return Ok(0);
        };
        if !self.pool.load().is_empty() {
            return Ok(0);
        }

        let stored = results.best_working(limit).await?;
        let loaded = stored.len();
        if loaded > 0 {
            info!(loaded, "Serving stored working proxies until the first pass completes");
            self.publish(stored);
        } else {
            debug!("No stored working proxies to start from");
        }
        Ok(loaded)
    }

    pub fn last_summary(&self) -> Option<BatchSummary> {
        self.last_summary.read().clone()
    }

    /// Run the refresher (call in a spawned task)
    #[instrument(skip(self, shutdown))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Starting pool refresher with {}s interval",
            self.check_interval.as_secs()
        );

        if let Err(e) = self.warm_start(WARM_START_LIMIT).await {
            warn!("Could not load stored working proxies: {}", e);
        }

        let mut ticker = interval(self.check_interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.refresh_once(shutdown.clone()).await {
                        error!("Pool refresh failed: {}", e);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Pool refresher shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// One full pass over the candidate source
    pub async fn refresh_once(&self, cancel: watch::Receiver<bool>) -> Result<BatchReport> {
        let candidates = self.source.load().await?;
        let report = self.validator.validate_batch(candidates, cancel).await?;

        let working: Vec<ValidationResult> = report.working().into_iter().cloned().collect();
        info!(
            working = working.len(),
            total = report.summary.total,
            "Refreshed working pool"
        );
        self.publish(working);
        *self.last_summary.write() = Some(report.summary.clone());

        if let Some(results) = &self.results {
            if let Err(e) = results.save_report(&report).await {
                warn!("Failed to persist validation results: {}", e);
            }
        }

        Ok(report)
    }
}

/// Guard for managing the pool refresher lifecycle
pub struct PoolRefresherHandle {
    shutdown_tx: watch::Sender<bool>,
}

impl PoolRefresherHandle {
    pub fn new() -> (Self, watch::Receiver<bool>) {
        let (tx, rx) = watch::channel(false);
        (Self { shutdown_tx: tx }, rx)
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

impl Default for PoolRefresherHandle {
    fn default() -> Self {
        Self::new().0
    }
}
