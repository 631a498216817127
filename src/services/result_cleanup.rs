//! Stored result cleanup service
//!
//! Periodically deletes non-working results that have not been re-checked
//! within the retention period. Working proxies are never pruned here.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::interval;
use tracing::{debug, error, info, instrument};

use crate::error::Result;
use crate::repository::ResultStore;

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Result cleanup service configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ResultCleanupConfig {
    /// Age after which a non-working result is deleted
    pub retention: Duration,
    /// How often to look for stale results
    pub check_interval: Duration,
}

impl ResultCleanupConfig {
    /// Check more often for shorter retention periods
    pub fn for_retention(retention: Duration) -> Self {
        let check_interval = if retention <= DAY {
            Duration::from_secs(300)
        } else if retention <= 7 * DAY {
            Duration::from_secs(3600)
        } else {
            DAY
        };

        Self {
            retention,
            check_interval,
        }
    }
}

impl Default for ResultCleanupConfig {
    fn default() -> Self {
        Self::for_retention(7 * DAY)
    }
}

pub struct ResultCleanupService {
    store: Arc<dyn ResultStore>,
    config: ResultCleanupConfig,
}

impl ResultCleanupService {
    pub fn new(store: Arc<dyn ResultStore>, config: ResultCleanupConfig) -> Self {
        Self { store, config }
    }

    /// Run the cleanup service (call in a spawned task)
    #[instrument(skip(self, shutdown))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Starting result cleanup service (retention: {}s, every {}s)",
            self.config.retention.as_secs(),
            self.config.check_interval.as_secs()
        );

        let mut ticker = interval(self.config.check_interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.cleanup().await {
                        error!("Result cleanup failed: {}", e);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Result cleanup service shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Delete stale results once; returns how many were removed
    pub async fn cleanup(&self) -> Result<u64> {
        let deleted = self.store.delete_stale(self.config.retention).await?;

        if deleted > 0 {
            info!(deleted, "Deleted stale validation results");
        } else {
            debug!("No stale validation results to delete");
        }

        Ok(deleted)
    }
}

/// Handle for managing the result cleanup service
pub struct ResultCleanupHandle {
    shutdown_tx: watch::Sender<bool>,
}

impl ResultCleanupHandle {
    pub fn new() -> (Self, watch::Receiver<bool>) {
        let (tx, rx) = watch::channel(false);
        (Self { shutdown_tx: tx }, rx)
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

impl Default for ResultCleanupHandle {
    fn default() -> Self {
        Self::new().0
    }
}
