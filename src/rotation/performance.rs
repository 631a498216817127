//! Performance-ranked proxy selection strategy

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;

use super::{eligible, prepare, PerformanceTracker, ProxySelector};
use crate::error::{HunterError, Result};
use crate::models::ValidationResult;

/// Always picks the best scoring healthy proxy; ties go to the earlier one
pub struct PerformanceSelector {
    proxies: RwLock<Vec<Arc<ValidationResult>>>,
    tracker: PerformanceTracker,
}

impl PerformanceSelector {
    pub fn new() -> Self {
        Self {
            proxies: RwLock::new(Vec::new()),
            tracker: PerformanceTracker::new(),
        }
    }
}

impl Default for PerformanceSelector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProxySelector for PerformanceSelector {
    async fn select_excluding(&self, exclude: &HashSet<String>) -> Result<Arc<ValidationResult>> {
        let proxies = self.proxies.read();

        let mut best: Option<(usize, f64)> = None;
        for i in eligible(&proxies, &self.tracker, exclude) {
            let score = self.tracker.score(&proxies[i].endpoint);
            if best.map(|(_, top)| score > top).unwrap_or(true) {
                best = Some((i, score));
            }
        }

        best.and_then(|(i, _)| proxies.get(i).cloned())
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
        "performance"
    }

    fn record(&self, endpoint: &str, success: bool, response_time: Option<f64>) {
        self.tracker.record(endpoint, success, response_time);
    }

    fn tracker(&self) -> &PerformanceTracker {
        &self.tracker
    }
}
