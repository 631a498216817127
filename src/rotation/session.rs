//! Requests through a rotating pool of working proxies
//!
//! Each request tries up to [`MAX_ATTEMPTS`] different proxies. Any HTTP
//! response counts as a success for the proxy that delivered it; only
//! transport failures move on to the next proxy.

use std::collections::{HashSet, VecDeque};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{HunterError, Result};
use crate::models::{Protocol, TargetCheck, ValidationResult};
use crate::validator::normalizer::parse_endpoint;
use crate::validator::{check_target, check_target_url, HttpClient, Validator};

use super::{create_selector, ProxySelector, RotationStrategy};

/// Proxies tried for one request
pub const MAX_ATTEMPTS: usize = 3;
/// Requests kept for [`ProxySession::recent_traffic`]
const TRAFFIC_LOG_LIMIT: usize = 1000;

/// Aggregates over the recorded traffic
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TrafficStats {
    pub total_requests: usize,
    /// Requests answered with a 2xx or 3xx status
    pub successful_requests: usize,
    pub failed_requests: usize,
    pub unique_proxies: usize,
    pub avg_response_time: f64,
    pub total_data: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PoolStatus {
    pub strategy: &'static str,
    pub total_proxies: usize,
    pub failing_proxies: usize,
}

/// GET client rotating over working HTTP proxies
pub struct ProxySession {
    client: HttpClient,
    selector: Box<dyn ProxySelector>,
    timeout: Duration,
    traffic: Mutex<VecDeque<TargetCheck>>,
}

impl ProxySession {
    pub fn new(client: HttpClient, strategy: RotationStrategy, timeout: Duration) -> Self {
        Self {
            client,
            selector: create_selector(strategy),
            timeout,
            traffic: Mutex::new(VecDeque::new()),
        }
    }

    /// Session sharing the validator's transport and request timeout
    pub fn from_validator(validator: &Validator, strategy: RotationStrategy) -> Self {
        Self::new(
            validator.http_client().clone(),
            strategy,
            validator.request_timeout(),
        )
    }

    /// Replace the pool with the working HTTP proxies among `results`
    ///
    /// SOCKS proxies are left out since requests are sent proxy-style over HTTP.
    pub async fn refresh(&self, results: &[ValidationResult]) -> Result<usize> {
        let usable: Vec<ValidationResult> = results
            .iter()
            .filter(|r| r.is_ok() && r.protocol() == Protocol::Http)
            .cloned()
            .collect();
        let count = usable.len();

        self.selector.refresh(usable).await?;
        info!(
            proxies = count,
            strategy = self.selector.strategy_name(),
            "Refreshed session proxy pool"
        );
        Ok(count)
    }

    /// GET `url`, moving to another proxy when one fails to deliver a response
    pub async fn get(&self, url: &str, headers: &[(&str, String)]) -> Result<TargetCheck> {
        check_target_url(url)?;

        let mut tried = HashSet::new();
        let mut last_error = None;

        while tried.len() < MAX_ATTEMPTS {
            let proxy = match self.selector.select_excluding(&tried).await {
                Ok(proxy) => proxy,
                Err(HunterError::NoProxiesAvailable) => break,
                Err(e) => return Err(e),
            };
            tried.insert(proxy.endpoint.clone());

            let candidate = match parse_endpoint(&proxy.endpoint, &proxy.source) {
                Ok(candidate) => candidate,
                Err(e) => {
                    warn!(proxy = %proxy.endpoint, "Skipping unusable pool entry: {}", e);
                    self.selector.record(&proxy.endpoint, false, None);
                    continue;
                }
            };

            let check = check_target(&self.client, &candidate, url, headers, self.timeout).await;
            self.selector
                .record(&check.proxy, check.responded(), Some(check.response_time));
            self.log(check.clone());

            if check.responded() {
                debug!(proxy = %check.proxy, status = ?check.status_code, "Request delivered");
                return Ok(check);
            }

            warn!(
                proxy = %check.proxy,
                "Request failed: {}",
                check.error.as_deref().unwrap_or("no response")
            );
            last_error = check.error;
        }

        match last_error {
            Some(error) => Err(HunterError::ProxyConnectionFailed(format!(
                "{} proxies failed for {}, last error: {}",
                tried.len(),
                url,
                error
            ))),
            None => Err(HunterError::NoProxiesAvailable),
        }
    }

    fn log(&self, check: TargetCheck) {
        let mut traffic = self.traffic.lock();
        if traffic.len() == TRAFFIC_LOG_LIMIT {
            traffic.pop_front();
        }
        traffic.push_back(check);
    }

    pub fn traffic_stats(&self) -> TrafficStats {
        let traffic = self.traffic.lock();
        if traffic.is_empty() {
            return TrafficStats::default();
        }

        let total_requests = traffic.len();
        let successful_requests = traffic
            .iter()
            .filter(|c| matches!(c.status_code, Some(200..=399)))
            .count();
        let unique_proxies = traffic
            .iter()
            .map(|c| c.proxy.as_str())
            .collect::<HashSet<_>>()
            .len();
        let avg_response_time =
            traffic.iter().map(|c| c.response_time).sum::<f64>() / total_requests as f64;

        TrafficStats {
            total_requests,
            successful_requests,
            failed_requests: total_requests - successful_requests,
            unique_proxies,
            avg_response_time,
            total_data: traffic.iter().map(|c| c.content_length).sum(),
        }
    }

    /// Up to `limit` most recent requests, oldest first
    pub fn recent_traffic(&self, limit: usize) -> Vec<TargetCheck> {
        let traffic = self.traffic.lock();
        traffic
            .iter()
            .skip(traffic.len().saturating_sub(limit))
            .cloned()
            .collect()
    }

    pub fn pool_status(&self) -> PoolStatus {
        PoolStatus {
            strategy: self.selector.strategy_name(),
            total_proxies: self.selector.available_count(),
            failing_proxies: self.selector.tracker().failing_count(),
        }
    }
}
