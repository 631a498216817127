//! Round-robin proxy selection strategy

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::{eligible, prepare, PerformanceTracker, ProxySelector};
use crate::error::{HunterError, Result};
use crate::models::ValidationResult;

/// Walks the pool in order, skipping failing proxies
pub struct RoundRobinSelector {
    proxies: RwLock<Vec<Arc<ValidationResult>>>,
    index: AtomicUsize,
    tracker: PerformanceTracker,
}

impl RoundRobinSelector {
    pub fn new() -> Self {
        Self {
            proxies: RwLock::new(Vec::new()),
            index: AtomicUsize::new(0),
            tracker: PerformanceTracker::new(),
        }
    }
}

impl Default for RoundRobinSelector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProxySelector for RoundRobinSelector {
    async fn select_excluding(&self, exclude: &HashSet<String>) -> Result<Arc<ValidationResult>> {
        let proxies = self.proxies.read();
        let candidates = eligible(&proxies, &self.tracker, exclude);

        let start = self.index.load(Ordering::Relaxed) % proxies.len().max(1);
        let idx = candidates
            .iter()
            .copied()
            .find(|&i| i >= start)
            .or_else(|| candidates.first().copied())
            .ok_or(HunterError::NoProxiesAvailable)?;

        self.index.store(idx + 1, Ordering::Relaxed);
        proxies.get(idx).cloned().ok_or(HunterError::NoProxiesAvailable)
    }

    async fn refresh(&self, proxies: Vec<ValidationResult>) -> Result<()> {
        let mut guard = self.proxies.write();
        *guard = prepare(proxies, &self.tracker);
        self.index.store(0, Ordering::Relaxed);
        Ok(())
    }

    fn available_count(&self) -> usize {
        self.proxies.read().len()
    }

    fn strategy_name(&self) -> &'static str {
        "round_robin"
    }

    fn record(&self, endpoint: &str, success: bool, response_time: Option<f64>) {
        self.tracker.record(endpoint, success, response_time);
    }

    fn tracker(&self) -> &PerformanceTracker {
        &self.tracker
    }
}
