use std::time::Duration;

/// Statuses worth another attempt
pub const DEFAULT_RETRY_STATUSES: &[u16] = &[429, 500, 502, 503, 504, 520, 521, 522, 523, 524];

/// Status-driven retry policy for HTTP requests
///
/// Transport errors are never retried here; callers fall back to their next
/// endpoint instead.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    pub backoff: Duration,
    pub retry_statuses: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(500),
            retry_statuses: DEFAULT_RETRY_STATUSES.to_vec(),
        }
    }
}

impl RetryPolicy {
    /// A policy that makes exactly one attempt
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            backoff: Duration::ZERO,
            retry_statuses: Vec::new(),
        }
    }

    /// Whether attempt number `attempt` (1-based) that ended in `status` should be repeated
    pub fn should_retry(&self, status: u16, attempt: u32) -> bool {
        attempt < self.max_attempts.max(1) && self.retry_statuses.contains(&status)
    }

    /// Delay before the attempt following attempt number `attempt`
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.backoff.saturating_mul(1u32 << exponent)
    }
}
