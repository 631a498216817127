use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;

use crate::error::Result;
use crate::models::{BatchReport, BatchSummary, BlacklistEntry, EndpointHistory, ValidationResult};

use super::{BlacklistStore, ResultStore};

/// In-process store; counters are updated under the DashMap entry lock
#[derive(Default)]
pub struct MemoryStore {
    history: DashMap<String, EndpointHistory>,
    blacklist: DashMap<String, BlacklistEntry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlacklistStore for MemoryStore {
    async fn is_blacklisted(&self, endpoint: &str) -> Result<bool> {
        Ok(self.blacklist.contains_key(endpoint))
    }

    async fn record_outcome(
        &self,
        endpoint: &str,
        success: bool,
        quality_score: Option<f64>,
    ) -> Result<EndpointHistory> {
        let mut entry = self
            .history
            .entry(endpoint.to_string())
            .or_insert_with(|| EndpointHistory::new(endpoint));

        if success {
            entry.success_count += 1;
        } else {
            entry.failure_count += 1;
        }
        if quality_score.is_some() {
            entry.quality_score = quality_score;
        }
        entry.last_checked = Some(Utc::now());

        Ok(entry.value().clone())
    }

    async fn history(&self, endpoint: &str) -> Result<Option<EndpointHistory>> {
        Ok(self.history.get(endpoint).map(|h| h.value().clone()))
    }

    async fn upsert(&self, endpoint: &str, reason: &str, auto_added: bool) -> Result<BlacklistEntry> {
        let entry = BlacklistEntry {
            endpoint: endpoint.to_string(),
            reason: reason.to_string(),
            auto_added,
            added_at: Utc::now(),
        };
        self.blacklist.insert(endpoint.to_string(), entry.clone());
        Ok(entry)
    }

    async fn remove(&self, endpoint: &str) -> Result<bool> {
        Ok(self.blacklist.remove(endpoint).is_some())
    }

    async fn list(&self) -> Result<Vec<BlacklistEntry>> {
        let mut entries: Vec<_> = self.blacklist.iter().map(|e| e.value().clone()).collect();
        entries.sort_by(|a, b| b.added_at.cmp(&a.added_at));
        Ok(entries)
    }
}

struct StoredResult {
    result: ValidationResult,
    checked_at: DateTime<Utc>,
}

/// In-process result store, used when no database is configured
#[derive(Default)]
pub struct MemoryResultStore {
    results: DashMap<String, StoredResult>,
    scans: Mutex<Vec<BatchSummary>>,
}

impl MemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, endpoint: &str) -> Option<ValidationResult> {
        self.results.get(endpoint).map(|s| s.result.clone())
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn scan_count(&self) -> usize {
        self.scans.lock().len()
    }

    #[cfg(test)]
    pub(crate) fn backdate(&self, endpoint: &str, age: chrono::Duration) {
        if let Some(mut stored) = self.results.get_mut(endpoint) {
            stored.checked_at = stored.checked_at - age;
        }
    }
}

#[async_trait]
impl ResultStore for MemoryResultStore {
    async fn save_report(&self, report: &BatchReport) -> Result<i64> {
        let mut scans = self.scans.lock();
        let checked_at = Utc::now();

        for result in report.persistable() {
            self.results.insert(
                result.endpoint.clone(),
                StoredResult {
                    result: result.clone(),
                    checked_at,
                },
            );
        }
        scans.push(report.summary.clone());

        Ok(scans.len() as i64)
    }

    async fn best_working(&self, limit: usize) -> Result<Vec<ValidationResult>> {
        let mut working: Vec<ValidationResult> = self
            .results
            .iter()
            .filter(|s| s.result.is_ok())
            .map(|s| s.result.clone())
            .collect();
        working.sort_by(|a, b| {
            b.quality_score()
                .unwrap_or(0.0)
                .total_cmp(&a.quality_score().unwrap_or(0.0))
        });
        working.truncate(limit);
        Ok(working)
    }

    async fn delete_stale(&self, older_than: Duration) -> Result<u64> {
        let cutoff = chrono::Duration::from_std(older_than)
            .ok()
            .and_then(|age| Utc::now().checked_sub_signed(age));
        let Some(cutoff) = cutoff else {
            return Ok(0);
        };

        let mut removed = 0;
        self.results.retain(|_, stored| {
            let stale = stored.checked_at < cutoff && !stored.result.is_ok();
            if stale {
                removed += 1;
            }
            !stale
        });
        Ok(removed)
    }
}
