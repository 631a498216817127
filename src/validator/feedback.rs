//! Outcome counters and automatic blacklisting

use tracing::{info, warn};

use crate::error::Result;
use crate::models::{EndpointHistory, ValidationResult};
use crate::repository::BlacklistStore;

/// Minimum attempts before an endpoint can be auto-blacklisted
pub const AUTO_BLACKLIST_MIN_ATTEMPTS: i64 = 5;
/// Failure ratio at or above which an endpoint is auto-blacklisted
pub const AUTO_BLACKLIST_FAILURE_RATE: f64 = 0.9;

/// Whether the accumulated history warrants a blacklist entry
pub fn should_blacklist(history: &EndpointHistory) -> bool {
    history.total_attempts() >= AUTO_BLACKLIST_MIN_ATTEMPTS
        && history.failure_rate() >= AUTO_BLACKLIST_FAILURE_RATE
}

pub fn auto_blacklist_reason(history: &EndpointHistory) -> String {
    format!(
        "Auto-blacklisted: {}/{} failures",
        history.failure_count,
        history.total_attempts()
    )
}

/// Record a terminal result and blacklist the endpoint if its history is bad
///
/// Returns the updated history, or `None` for statuses that are not counted.
pub async fn record(
    store: &dyn BlacklistStore,
    result: &ValidationResult,
) -> Result<Option<EndpointHistory>> {
    let Some(success) = result.status().counts_as_success() else {
        return Ok(None);
    };

    let history = store
        .record_outcome(&result.endpoint, success, result.quality_score())
        .await?;

    if should_blacklist(&history) {
        let reason = auto_blacklist_reason(&history);
        store.upsert(&result.endpoint, &reason, true).await?;
        warn!(endpoint = %result.endpoint, "{}", reason);
    } else if !success {
        info!(
            endpoint = %result.endpoint,
            failures = history.failure_count,
            attempts = history.total_attempts(),
            "Recorded failure"
        );
    }

    Ok(Some(history))
}
