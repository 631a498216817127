use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Cumulative validation history for one endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct EndpointHistory {
    pub endpoint: String,
    pub success_count: i64,
    pub failure_count: i64,
    pub quality_score: Option<f64>,
    pub last_checked: Option<DateTime<Utc>>,
}

impl EndpointHistory {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            success_count: 0,
            failure_count: 0,
            quality_score: None,
            last_checked: None,
        }
    }

    pub fn total_attempts(&self) -> i64 {
        self.success_count + self.failure_count
    }

    /// Failure ratio in `[0,1]`, zero without history
    pub fn failure_rate(&self) -> f64 {
        let total = self.total_attempts();
        if total == 0 {
            0.0
        } else {
            self.failure_count as f64 / total as f64
        }
    }
}

/// An endpoint excluded from probing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct BlacklistEntry {
    pub endpoint: String,
    pub reason: String,
    pub auto_added: bool,
    pub added_at: DateTime<Utc>,
}
