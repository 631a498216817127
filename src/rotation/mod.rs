//! Proxy rotation over a validated working pool
//!
//! Selectors hand out working proxies one request at a time and track how
//! each proxy performs. A proxy that keeps failing is skipped until every
//! proxy in the pool is failing, at which point all of them get another chance.

mod performance;
mod random;
mod round_robin;
pub mod session;

pub use performance::PerformanceSelector;
pub use random::RandomSelector;
pub use round_robin::RoundRobinSelector;
pub use session::{PoolStatus, ProxySession, TrafficStats, MAX_ATTEMPTS};

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::Result;
use crate::models::ValidationResult;

/// Requests before a proxy can be marked failing
pub const FAILING_MIN_REQUESTS: u64 = 5;
/// Failure ratio above which a proxy is marked failing
pub const FAILING_RATE: f64 = 0.8;
/// Assumed response time for proxies without a measured one
const DEFAULT_RESPONSE_TIME: f64 = 5.0;

/// Strategy types for proxy rotation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RotationStrategy {
    #[default]
    RoundRobin,
    Random,
    Performance,
}

impl RotationStrategy {
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "random" => Self::Random,
            "performance" | "fastest" => Self::Performance,
            _ => Self::RoundRobin,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RoundRobin => "round_robin",
            Self::Random => "random",
            Self::Performance => "performance",
        }
    }
}

/// Picks the proxy for the next request
#[async_trait]
pub trait ProxySelector: Send + Sync {
    /// Select a proxy whose endpoint is not in `exclude`
    ///
    /// Returns an error if no proxies are available
    async fn select_excluding(&self, exclude: &HashSet<String>) -> Result<Arc<ValidationResult>>;

    async fn select(&self) -> Result<Arc<ValidationResult>> {
        self.select_excluding(&HashSet::new()).await
    }

    /// Replace the pool
    async fn refresh(&self, proxies: Vec<ValidationResult>) -> Result<()>;

    fn available_count(&self) -> usize;

    fn strategy_name(&self) -> &'static str;

    /// Record the outcome of a request made through `endpoint`
    fn record(&self, endpoint: &str, success: bool, response_time: Option<f64>);

    fn tracker(&self) -> &PerformanceTracker;
}

/// Request counters for one proxy
#[derive(Debug, Clone, PartialEq)]
pub struct ProxyPerformance {
    pub success_count: u64,
    pub failure_count: u64,
    /// Running average over every request, seeded from validation
    pub avg_response_time: f64,
    pub failing: bool,
}

impl ProxyPerformance {
    pub fn new(avg_response_time: f64) -> Self {
        Self {
            success_count: 0,
            failure_count: 0,
            avg_response_time,
            failing: false,
        }
    }

    pub fn total(&self) -> u64 {
        self.success_count + self.failure_count
    }

    /// Success rate discounted by response time; unused proxies score 0.5
    pub fn score(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.5;
        }
        let success_rate = self.success_count as f64 / total as f64;
        success_rate / (1.0 + self.avg_response_time)
    }

    fn record(&mut self, success: bool, response_time: Option<f64>) {
        if success {
            self.success_count += 1;
            if let Some(elapsed) = response_time {
                let total = self.total() as f64;
                self.avg_response_time =
                    (self.avg_response_time * (total - 1.0) + elapsed) / total;
            }
        } else {
            self.failure_count += 1;
            let total = self.total();
            if total >= FAILING_MIN_REQUESTS
                && self.failure_count as f64 / total as f64 > FAILING_RATE
            {
                self.failing = true;
            }
        }
    }
}

impl Default for ProxyPerformance {
    fn default() -> Self {
        Self::new(DEFAULT_RESPONSE_TIME)
    }
}

/// Per-endpoint request counters shared by a selector
#[derive(Debug, Default)]
pub struct PerformanceTracker {
    stats: DashMap<String, ProxyPerformance>,
}

impl PerformanceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking `proxy` with its validated response time; existing counters are kept
    pub fn seed(&self, proxy: &ValidationResult) {
        let avg = proxy.response_time().unwrap_or(DEFAULT_RESPONSE_TIME);
        self.stats
            .entry(proxy.endpoint.clone())
            .or_insert_with(|| ProxyPerformance::new(avg));
    }

    pub fn record(&self, endpoint: &str, success: bool, response_time: Option<f64>) {
        self.stats
            .entry(endpoint.to_string())
            .or_default()
            .record(success, response_time);
    }

    pub fn get(&self, endpoint: &str) -> Option<ProxyPerformance> {
        self.stats.get(endpoint).map(|p| p.value().clone())
    }

    pub fn score(&self, endpoint: &str) -> f64 {
        self.stats.get(endpoint).map(|p| p.score()).unwrap_or(0.5)
    }

    pub fn is_failing(&self, endpoint: &str) -> bool {
        self.stats.get(endpoint).map(|p| p.failing).unwrap_or(false)
    }

    pub fn failing_count(&self) -> usize {
        self.stats.iter().filter(|p| p.failing).count()
    }

    /// Give every failing proxy another chance; counters are kept
    pub fn reset_failing(&self) {
        for mut entry in self.stats.iter_mut() {
            entry.failing = false;
        }
    }

    pub fn clear(&self) {
        self.stats.clear();
    }
}

/// Positions in `proxies` a selector may pick from
///
/// Failing proxies are skipped; when the whole pool is failing the marks are
/// reset and every proxy not in `exclude` is eligible again.
fn eligible(
    proxies: &[Arc<ValidationResult>],
    tracker: &PerformanceTracker,
    exclude: &HashSet<String>,
) -> Vec<usize> {
    let open = || {
        proxies
            .iter()
            .enumerate()
            .filter(|(_, p)| !exclude.contains(&p.endpoint))
    };

    let healthy: Vec<usize> = open()
        .filter(|(_, p)| !tracker.is_failing(&p.endpoint))
        .map(|(i, _)| i)
        .collect();

    if healthy.is_empty() && proxies.iter().all(|p| tracker.is_failing(&p.endpoint)) {
        tracker.reset_failing();
        return open().map(|(i, _)| i).collect();
    }
    healthy
}

/// Seed `tracker` and wrap the pool for a selector
fn prepare(proxies: Vec<ValidationResult>, tracker: &PerformanceTracker) -> Vec<Arc<ValidationResult>> {
    proxies
        .into_iter()
        .map(|p| {
            tracker.seed(&p);
            Arc::new(p)
        })
        .collect()
}

/// Create a proxy selector based on the strategy type
pub fn create_selector(strategy: RotationStrategy) -> Box<dyn ProxySelector> {
    match strategy {
        RotationStrategy::RoundRobin => Box::new(RoundRobinSelector::new()),
        RotationStrategy::Random => Box::new(RandomSelector::new()),
        RotationStrategy::Performance => Box::new(PerformanceSelector::new()),
    }
}
