pub mod blacklist;
pub mod memory;
pub mod results;

pub use blacklist::PgStore;
pub use memory::{MemoryResultStore, MemoryStore};
pub use results::ResultRepository;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{BatchReport, BlacklistEntry, EndpointHistory, ValidationResult};

/// Validation history and blacklist storage
///
/// `record_outcome` must increment atomically and return the updated row.
#[async_trait]
pub trait BlacklistStore: Send + Sync {
    async fn is_blacklisted(&self, endpoint: &str) -> Result<bool>;

    /// Add one success or failure; a `quality_score` replaces the stored one
    async fn record_outcome(
        &self,
        endpoint: &str,
        success: bool,
        quality_score: Option<f64>,
    ) -> Result<EndpointHistory>;

    async fn history(&self, endpoint: &str) -> Result<Option<EndpointHistory>>;

    /// Insert or replace the blacklist entry for `endpoint`
    async fn upsert(&self, endpoint: &str, reason: &str, auto_added: bool) -> Result<BlacklistEntry>;

    /// Returns whether an entry was removed
    async fn remove(&self, endpoint: &str) -> Result<bool>;

    async fn list(&self) -> Result<Vec<BlacklistEntry>>;
}

/// Latest validation result per endpoint plus per-batch statistics
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Store a batch's results and its statistics row together; returns the scan id
    async fn save_report(&self, report: &BatchReport) -> Result<i64>;

    /// Working proxies ordered by quality, best first
    async fn best_working(&self, limit: usize) -> Result<Vec<ValidationResult>>;

    /// Delete non-working results last checked more than `older_than` ago
    async fn delete_stale(&self, older_than: Duration) -> Result<u64>;
}
