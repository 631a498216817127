//! Per-candidate validation state machine

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, instrument, warn};

use crate::config::ValidatorConfig;
use crate::models::{
    Anonymity, CandidateEndpoint, Outcome, Protocol, ValidationResult, WorkingProxy,
};
use crate::repository::BlacklistStore;

use super::anonymity;
use super::detect::detect_protocol;
use super::echo::EchoEndpoint;
use super::feedback;
use super::geo::GeoResolver;
use super::http::HttpClient;
use super::probe::probe;
use super::scorer::quality_score;

/// What the IP-reveal test learned
#[derive(Debug, Clone)]
struct Reveal {
    observed_ip: String,
    data_size: usize,
    service: String,
}

/// Runs one candidate from the blacklist gate to the feedback stage
#[derive(Clone)]
pub struct Pipeline {
    client: HttpClient,
    store: Arc<dyn BlacklistStore>,
    geo: GeoResolver,
    config: Arc<ValidatorConfig>,
    echo_endpoints: Arc<Vec<EchoEndpoint>>,
}

impl Pipeline {
    pub fn new(
        client: HttpClient,
        store: Arc<dyn BlacklistStore>,
        geo: GeoResolver,
        config: Arc<ValidatorConfig>,
    ) -> Self {
        let echo_endpoints = Arc::new(config.echo_endpoints());
        Self {
            client,
            store,
            geo,
            config,
            echo_endpoints,
        }
    }

    pub fn store(&self) -> &Arc<dyn BlacklistStore> {
        &self.store
    }

    pub fn client(&self) -> &HttpClient {
        &self.client
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    /// Validate `candidate` and record the outcome
    #[instrument(skip(self, candidate, real_ip), fields(endpoint = %candidate, source = %candidate.source))]
    pub async fn run(&self, candidate: &CandidateEndpoint, real_ip: Option<&str>) -> ValidationResult {
        let outcome = self.evaluate(candidate, real_ip).await;
        let result = ValidationResult::new(candidate.key(), candidate.source.clone(), outcome);

        debug!(status = %result.status(), "Validation finished");
        self.record_feedback(&result).await;
        result
    }

    /// Feed a terminal result back into the blacklist counters
    pub async fn record_feedback(&self, result: &ValidationResult) {
        if !self.config.auto_blacklist {
            return;
        }
        if let Err(e) = feedback::record(self.store.as_ref(), result).await {
            warn!(endpoint = %result.endpoint, "Failed to record validation outcome: {}", e);
        }
    }

    async fn evaluate(&self, candidate: &CandidateEndpoint, real_ip: Option<&str>) -> Outcome {
        let key = candidate.key();

        match self.store.is_blacklisted(&key).await {
            Ok(true) => return Outcome::Blacklisted,
            Ok(false) => {}
            Err(e) => {
                return Outcome::Error {
                    message: format!("blacklist lookup failed: {}", e),
                }
            }
        }

        let started = Instant::now();

        if let Err(e) = probe(
            self.client.connector().as_ref(),
            candidate,
            self.config.probe_timeout,
        )
        .await
        {
            return Outcome::Unreachable {
                reason: e.to_string(),
            };
        }

        let protocol = detect_protocol(
            &self.client,
            candidate,
            self.echo_endpoints.first(),
            self.config.probe_timeout,
            self.config.enable_socks,
        )
        .await;

        match protocol {
            Protocol::Unknown => Outcome::Failed {
                protocol: Protocol::Unknown,
                reason: "no supported proxy protocol detected".to_string(),
            },
            Protocol::Socks4 | Protocol::Socks5 => {
                let response_time = started.elapsed().as_secs_f64();
                let score = self
                    .score(&key, response_time, Anonymity::Anonymous, &candidate.source)
                    .await;

                Outcome::Ok(WorkingProxy {
                    protocol,
                    response_time,
                    data_size: 0,
                    proxy_observed_ip: None,
                    anonymity: Anonymity::Anonymous,
                    leaked_headers: Default::default(),
                    quality_score: score,
                    geolocation: None,
                    echo_service: None,
                })
            }
            Protocol::Http => self.evaluate_http(candidate, real_ip, started).await,
        }
    }

    async fn evaluate_http(
        &self,
        candidate: &CandidateEndpoint,
        real_ip: Option<&str>,
        started: Instant,
    ) -> Outcome {
        let Some(reveal) = self.reveal_ip(candidate).await else {
            return Outcome::Failed {
                protocol: Protocol::Http,
                reason: "no echo service answered through the proxy".to_string(),
            };
        };
        let response_time = started.elapsed().as_secs_f64();

        let report = anonymity::analyze(
            &self.client,
            candidate,
            &self.config.headers_url,
            real_ip,
            Some(&reveal.observed_ip),
            self.config.timeout,
        )
        .await;

        if !self.config.anonymity.accepts(report.level) {
            debug!(
                anonymity = %report.level,
                policy = self.config.anonymity.as_str(),
                "Rejected by anonymity policy"
            );
            return Outcome::NotAnonymous {
                protocol: Protocol::Http,
                proxy_observed_ip: reveal.observed_ip,
                anonymity: report.level,
                leaked_headers: report.leaked_headers,
            };
        }

        let geolocation = if self.config.enable_geolocation {
            Some(self.geo.resolve(&reveal.observed_ip).await)
        } else {
            None
        };

        let score = self
            .score(&candidate.key(), response_time, report.level, &candidate.source)
            .await;

        Outcome::Ok(WorkingProxy {
            protocol: Protocol::Http,
            response_time,
            data_size: reveal.data_size,
            proxy_observed_ip: Some(reveal.observed_ip),
            anonymity: report.level,
            leaked_headers: report.leaked_headers,
            quality_score: score,
            geolocation,
            echo_service: Some(reveal.service),
        })
    }

    /// Try each echo endpoint through the proxy until one reports an IPv4 address
    async fn reveal_ip(&self, candidate: &CandidateEndpoint) -> Option<Reveal> {
        for endpoint in self.echo_endpoints.iter() {
            let response = match self
                .client
                .get(&endpoint.url, Some(candidate), &[], self.config.timeout)
                .await
            {
                Ok(r) if r.is_ok() => r,
                Ok(r) => {
                    debug!(service = %endpoint.name, status = r.status, "Echo service rejected request");
                    continue;
                }
                Err(e) => {
                    debug!(service = %endpoint.name, "Echo service failed: {}", e);
                    continue;
                }
            };

            if let Some(ip) = endpoint.extract_ip(&response.text()) {
                return Some(Reveal {
                    observed_ip: ip,
                    data_size: response.body.len(),
                    service: endpoint.name.clone(),
                });
            }
        }

        None
    }

    /// Score with the stored history plus this successful pass
    async fn score(&self, key: &str, response_time: f64, level: Anonymity, source: &str) -> f64 {
        let (successes, failures) = match self.store.history(key).await {
            Ok(Some(h)) => (h.success_count, h.failure_count),
            Ok(None) => (0, 0),
            Err(e) => {
                warn!(endpoint = key, "Could not load history for scoring: {}", e);
                (0, 0)
            }
        };

        quality_score(response_time, successes + 1, failures, level, source)
    }
}
