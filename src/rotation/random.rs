//! Random proxy selection strategy

use async_trait::async_trait;
use parking_lot::RwLock;
use rand::seq::SliceRandom;
use std::collections::HashSet;
use std::sync::Arc;

use super::{eligible, prepare, PerformanceTracker, ProxySelector};
use crate::error::{HunterError, Result};
use crate::models::ValidationResult;

/// Selects a random proxy from the healthy part of the pool
pub struct RandomSelector {
    proxies: RwLock<Vec<Arc<ValidationResult>>>,
    tracker: PerformanceTracker,
}

impl RandomSelector {
    pub fn new() -> Self {
        Self {
            proxies: RwLock::new(Vec::new()),
            tracker: PerformanceTracker::new(),
        }
    }
}

impl Default for RandomSelector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProxySelector for RandomSelector {
    async fn select_excluding(&self, exclude: &HashSet<String>) -> Result<Arc<ValidationResult>> {
        let proxies = self.proxies.read();
        let candidates = eligible(&proxies, &self.tracker, exclude);

        let mut rng = rand::thread_rng();
        candidates
            .choose(&mut rng)
            .and_then(|&i| proxies.get(i).cloned())
            .ok_or(HunterError::NoProxiesAvailable)
    }

    async fn refresh(&self, proxies: Vec<ValidationResult>) -> Result<()> {
        let mut guard = self.proxies.write();
        *guard = prepare(proxies, &self.tracker);
        Ok(())
    }

    fn available_count(&self) -> usize {
        self.proxies.read().len()
    }

    fn strategy_name(&self) -> &'static str {
        "random"
    }

    fn record(&self, endpoint: &str, success: bool, response_time: Option<f64>) {
        self.tracker.record(endpoint, success, response_time);
    }

    fn tracker(&self) -> &PerformanceTracker {
        &self.tracker
    }
}
