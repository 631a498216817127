//! Bounded concurrent batch validation

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt};
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tracing::{error, info, instrument, warn};

use crate::config::{ValidatorConfig, MAX_THREADS};
use crate::error::{HunterError, Result};
use crate::models::{BatchReport, CandidateEndpoint, Outcome, TargetCheck, ValidationResult};
use crate::repository::BlacklistStore;

use super::geo::{GeoLookup, GeoResolver, HttpGeoLookup};
use super::http::HttpClient;
use super::normalizer::{normalize, parse_endpoint, Normalized};
use super::pipeline::Pipeline;
use super::target::{check_target, check_target_url};
use super::public_ip::{HttpPublicIpSource, PublicIpCache, PublicIpSource};
use super::transport::{Connector, TcpConnector};

/// Drives candidates through the pipeline with at most `threads` in flight
#[derive(Clone)]
pub struct Validator {
    pipeline: Pipeline,
    public_ip: PublicIpCache,
    threads: usize,
}

impl Validator {
    pub fn new(
        config: ValidatorConfig,
        connector: Arc<dyn Connector>,
        store: Arc<dyn BlacklistStore>,
        geo: Arc<dyn GeoLookup>,
        public_ip: Arc<dyn PublicIpSource>,
    ) -> Self {
        let config = Arc::new(config);
        let client = HttpClient::new(connector, config.retry_policy());

        Self {
            public_ip: PublicIpCache::new(public_ip, config.public_ip_ttl),
            threads: config.threads.clamp(1, MAX_THREADS),
            pipeline: Pipeline::new(client, store, GeoResolver::new(geo), config),
        }
    }

    /// Validator speaking plain TCP with HTTP geolocation and public IP services
    pub fn from_config(config: ValidatorConfig, store: Arc<dyn BlacklistStore>) -> Self {
        let connector: Arc<dyn Connector> = Arc::new(TcpConnector);
        let client = HttpClient::new(connector.clone(), config.retry_policy());

        let geo = Arc::new(HttpGeoLookup::new(
            client.clone(),
            config.geo_urls.clone(),
            config.timeout,
        ));
        let public_ip = Arc::new(HttpPublicIpSource::new(
            client,
            config.echo_endpoints(),
            config.timeout,
        ));

        Self::new(config, connector, store, geo, public_ip)
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    pub fn store(&self) -> &Arc<dyn BlacklistStore> {
        self.pipeline.store()
    }

    pub fn public_ip(&self) -> &PublicIpCache {
        &self.public_ip
    }

    pub fn http_client(&self) -> &HttpClient {
        self.pipeline.client()
    }

    /// Per-request timeout applied to full HTTP exchanges
    pub fn request_timeout(&self) -> Duration {
        self.pipeline.config().timeout
    }

    /// Validate a single raw `host:port`
    pub async fn validate_one(&self, raw: &str, source: &str) -> ValidationResult {
        match parse_endpoint(raw, source) {
            Ok(candidate) => {
                let real_ip = self.public_ip.get().await;
                self.run_isolated(candidate, real_ip.map(Arc::from)).await
            }
            Err(e) => ValidationResult::new(
                raw.trim(),
                source,
                Outcome::Invalid {
                    reason: e.to_string(),
                },
            ),
        }
    }

    /// Fetch `url` through the proxy at `proxy` (`host:port`)
    pub async fn check_target(
        &self,
        proxy: &str,
        url: &str,
        headers: &[(&str, String)],
    ) -> Result<TargetCheck> {
        let candidate = parse_endpoint(proxy, "manual")?;
        check_target_url(url)?;

        Ok(check_target(
            self.http_client(),
            &candidate,
            url,
            headers,
            self.request_timeout(),
        )
        .await)
    }

    /// Validate a batch of `(raw, source)` pairs
    ///
    /// Results come back in input order after deduplication. Once `cancel`
    /// turns true no further candidates are started; those already running
    /// finish within their own timeouts.
    #[instrument(skip_all, fields(threads = self.threads))]
    pub async fn validate_batch<I, R, S>(
        &self,
        inputs: I,
        cancel: watch::Receiver<bool>,
    ) -> Result<BatchReport>
    where
        I: IntoIterator<Item = (R, S)>,
        R: AsRef<str>,
        S: AsRef<str>,
    {
        let started = Instant::now();
        let normalized = normalize(inputs);
        let total = normalized.len();

        let mut slots: Vec<Option<ValidationResult>> = Vec::with_capacity(total);
        let mut pending = Vec::new();
        for (index, item) in normalized.into_iter().enumerate() {
            match item {
                Normalized::Invalid(result) => slots.push(Some(result)),
                Normalized::Candidate(candidate) => {
                    slots.push(None);
                    pending.push((index, candidate));
                }
            }
        }

        let submitted = pending.len();
        info!(total, candidates = submitted, "Starting validation batch");

        let cancelled_early = *cancel.borrow();
        let real_ip: Option<Arc<str>> = if submitted > 0 && !cancelled_early {
            self.public_ip.get().await.map(Arc::from)
        } else {
            None
        };
        if submitted > 0 && !cancelled_early && real_ip.is_none() {
            warn!("Public IP unknown, anonymity checks will be limited");
        }

        let completed: Vec<(usize, ValidationResult)> = stream::iter(pending)
            .take_while(|_| futures::future::ready(!*cancel.borrow()))
            .map(|(index, candidate)| {
                let real_ip = real_ip.clone();
                async move { (index, self.run_isolated(candidate, real_ip).await) }
            })
            .buffer_unordered(self.threads)
            .collect()
            .await;

        let processed = completed.len();
        for (index, result) in completed {
            slots[index] = Some(result);
        }
        let results: Vec<ValidationResult> = slots.into_iter().flatten().collect();
        let cancelled = total - results.len();

        if total > 0 && results.is_empty() && !*cancel.borrow() {
            return Err(HunterError::NothingProcessed { candidates: total });
        }

        let report = BatchReport::new(results, cancelled, started.elapsed().as_secs_f64());
        info!(
            total,
            processed,
            working = report.summary.working(),
            cancelled,
            elapsed_secs = report.summary.elapsed_secs,
            "Validation batch complete"
        );

        Ok(report)
    }

    /// Run one candidate on its own task so a panic only fails that candidate
    async fn run_isolated(
        &self,
        candidate: CandidateEndpoint,
        real_ip: Option<Arc<str>>,
    ) -> ValidationResult {
        let pipeline = self.pipeline.clone();
        let task_candidate = candidate.clone();
        let handle = AbortOnDrop(tokio::spawn(async move {
            pipeline
                .run(&task_candidate, real_ip.as_deref())
                .await
        }));

        match handle.await {
            Ok(result) => result,
            Err(e) => {
                error!(endpoint = %candidate, "Validation task failed: {}", e);
                let result = ValidationResult::new(
                    candidate.key(),
                    candidate.source.clone(),
                    Outcome::Error {
                        message: format!("validation task failed: {}", e),
                    },
                );
                self.pipeline.record_feedback(&result).await;
                result
            }
        }
    }
}

/// Join handle that aborts its task when dropped unfinished
///
/// Dropping a batch future must not leave candidates validating in the background.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

impl<T> Future for AbortOnDrop<T> {
    type Output = std::result::Result<T, JoinError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.0).poll(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Anonymity, GeoLocation, Protocol, ValidationStatus};
    use crate::repository::MemoryStore;
    use crate::validator::testing::{Behavior, ScriptedConnector};
    use async_trait::async_trait;
    use std::time::Duration;

    const REAL_IP: &str = "192.0.2.10";

    struct FixedIp;

    #[async_trait]
    impl PublicIpSource for FixedIp {
        async fn fetch(&self) -> Result<String> {
            Ok(REAL_IP.to_string())
        }
    }

    struct StaticGeo;

    #[async_trait]
    impl GeoLookup for StaticGeo {
        async fn lookup(&self, _ip: &str) -> Result<GeoLocation> {
            Ok(GeoLocation {
                country: "Germany".to_string(),
                country_code: "DE".to_string(),
                ..Default::default()
            })
        }
    }

    fn config(threads: usize) -> ValidatorConfig {
        ValidatorConfig {
            threads,
            timeout: Duration::from_secs(3),
            probe_timeout: Duration::from_secs(1),
            max_retries: 1,
            ..ValidatorConfig::default()
        }
    }

    fn validator(
        threads: usize,
        connector: Arc<ScriptedConnector>,
        store: Arc<MemoryStore>,
    ) -> Validator {
        Validator::new(
            config(threads),
            connector,
            store,
            Arc::new(StaticGeo),
            Arc::new(FixedIp),
        )
    }

    fn idle() -> watch::Receiver<bool> {
        watch::channel(false).1
    }

    fn mixed_network() -> ScriptedConnector {
        ScriptedConnector::new()
            .with("198.51.100.1", 8080, Behavior::http_proxy("198.51.100.1"))
            .with(
                "198.51.100.2",
                3128,
                Behavior::leaky_proxy("198.51.100.2", &[("X-Forwarded-For", REAL_IP)]),
            )
            .with("198.51.100.3", 1080, Behavior::Socks5)
            .with("198.51.100.4", 1080, Behavior::Socks4)
            .with("198.51.100.5", 8000, Behavior::respond(403, "forbidden"))
    }

    fn mixed_inputs() -> Vec<(&'static str, &'static str)> {
        vec![
            ("198.51.100.1:8080", "github-proxy-list"),
            ("198.51.100.2:3128", "pubproxy"),
            ("198.51.100.3:1080", "proxyscrape-http"),
            ("198.51.100.4:1080", "free-proxy-list"),
            ("198.51.100.5:8000", "pubproxy"),
            ("198.51.100.6:9999", "pubproxy"),
            ("not-an-endpoint", "pubproxy"),
            ("198.51.100.1:8080", "pubproxy"),
        ]
    }

    #[tokio::test]
    async fn test_mixed_batch() {
        let store = Arc::new(MemoryStore::new());
        store
            .upsert("203.0.113.5:3128", "manual", false)
            .await
            .unwrap();
        let connector = Arc::new(
            ScriptedConnector::new()
                .with("203.0.113.5", 3128, Behavior::http_proxy("203.0.113.5"))
                .with("203.0.113.6", 1080, Behavior::Socks5),
        );
        let v = validator(10, connector.clone(), store.clone());

        let report = v
            .validate_batch(
                vec![
                    ("203.0.113.5:3128", "pubproxy"),
                    ("203.0.113.6:1080", "pubproxy"),
                    ("203.0.113.7:9999", "pubproxy"),
                ],
                idle(),
            )
            .await
            .unwrap();

        assert_eq!(report.results.len(), 3);
        assert_eq!(
            report.get("203.0.113.5:3128").unwrap().status(),
            ValidationStatus::Blacklisted
        );
        let socks = report.get("203.0.113.6:1080").unwrap();
        assert_eq!(socks.status(), ValidationStatus::Ok);
        assert_eq!(socks.protocol(), Protocol::Socks5);
        assert_eq!(socks.anonymity(), Anonymity::Anonymous);
        assert_eq!(
            report.get("203.0.113.7:9999").unwrap().status(),
            ValidationStatus::Unreachable
        );

        assert_eq!(connector.connects_to("203.0.113.5", 3128), 0);
        assert_eq!(report.summary.total, 3);
        assert_eq!(report.summary.working(), 1);
        assert_eq!(report.summary.cancelled, 0);
        assert_eq!(
            store.history("203.0.113.7:9999").await.unwrap().unwrap().failure_count,
            1
        );
    }

    #[tokio::test]
    async fn test_results_follow_input_order() {
        let connector = Arc::new(mixed_network());
        let v = validator(8, connector, Arc::new(MemoryStore::new()));

        let report = v.validate_batch(mixed_inputs(), idle()).await.unwrap();
        let endpoints: Vec<&str> = report.results.iter().map(|r| r.endpoint.as_str()).collect();

        assert_eq!(
            endpoints,
            vec![
                "198.51.100.1:8080",
                "198.51.100.2:3128",
                "198.51.100.3:1080",
                "198.51.100.4:1080",
                "198.51.100.5:8000",
                "198.51.100.6:9999",
                "not-an-endpoint",
            ]
        );
        assert_eq!(report.results[0].source, "github-proxy-list");
        assert_eq!(report.results[1].anonymity(), Anonymity::Transparent);
        assert_eq!(report.results[3].protocol(), Protocol::Socks4);
        assert_eq!(report.results[4].status(), ValidationStatus::Failed);
        assert_eq!(report.results[6].status(), ValidationStatus::Invalid);
        assert_eq!(report.summary.geographic_distribution.get("Germany"), Some(&2));
    }

    #[tokio::test]
    async fn test_pool_size_does_not_change_outcomes() {
        let serial = validator(1, Arc::new(mixed_network()), Arc::new(MemoryStore::new()))
            .validate_batch(mixed_inputs(), idle())
            .await
            .unwrap();
        let parallel = validator(50, Arc::new(mixed_network()), Arc::new(MemoryStore::new()))
            .validate_batch(mixed_inputs(), idle())
            .await
            .unwrap();

        assert_eq!(serial.results.len(), parallel.results.len());
        for (a, b) in serial.results.iter().zip(&parallel.results) {
            assert_eq!(a.endpoint, b.endpoint);
            assert_eq!(a.status(), b.status());
            assert_eq!(a.protocol(), b.protocol());
            assert_eq!(a.anonymity(), b.anonymity());
            match (a.quality_score(), b.quality_score()) {
                (Some(x), Some(y)) => assert!((x - y).abs() < 0.5, "{} vs {}", x, y),
                (x, y) => assert_eq!(x, y),
            }
        }
    }

    #[tokio::test]
    async fn test_invalid_input_makes_no_connections() {
        let connector = Arc::new(ScriptedConnector::new());
        let v = validator(4, connector.clone(), Arc::new(MemoryStore::new()));

        let report = v
            .validate_batch(vec![("not-an-endpoint", "pubproxy")], idle())
            .await
            .unwrap();

        assert_eq!(report.results.len(), 1);
        assert_eq!(report.results[0].status(), ValidationStatus::Invalid);
        assert_eq!(connector.total_connects(), 0);
    }

    #[tokio::test]
    async fn test_panicking_candidate_is_isolated() {
        let connector = Arc::new(
            ScriptedConnector::new()
                .with("203.0.113.8", 8080, Behavior::Panic)
                .with("203.0.113.6", 1080, Behavior::Socks5),
        );
        let store = Arc::new(MemoryStore::new());
        let v = validator(2, connector, store.clone());

        let report = v
            .validate_batch(
                vec![("203.0.113.8:8080", "pubproxy"), ("203.0.113.6:1080", "pubproxy")],
                idle(),
            )
            .await
            .unwrap();

        assert_eq!(report.results[0].status(), ValidationStatus::Error);
        assert_eq!(report.results[1].status(), ValidationStatus::Ok);
        let history = store.history("203.0.113.8:8080").await.unwrap().unwrap();
        assert_eq!(history.failure_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_stops_new_work() {
        let connector = Arc::new(
            ScriptedConnector::new()
                .with("203.0.113.20", 8080, Behavior::Hang)
                .with("203.0.113.21", 1080, Behavior::Socks5)
                .with("203.0.113.22", 1080, Behavior::Socks5),
        );
        let v = validator(1, connector.clone(), Arc::new(MemoryStore::new()));
        let (cancel_tx, cancel_rx) = watch::channel(false);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            let _ = cancel_tx.send(true);
        });

        let report = v
            .validate_batch(
                vec![
                    ("203.0.113.20:8080", "pubproxy"),
                    ("203.0.113.21:1080", "pubproxy"),
                    ("203.0.113.22:1080", "pubproxy"),
                ],
                cancel_rx,
            )
            .await
            .unwrap();

        assert_eq!(report.results.len(), 1);
        assert_eq!(report.results[0].status(), ValidationStatus::Unreachable);
        assert_eq!(report.summary.cancelled, 2);
        assert_eq!(connector.connects_to("203.0.113.21", 1080), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_batch_stops_running_candidates() {
        let connector = Arc::new(
            ScriptedConnector::new()
                .with("198.51.100.20", 8080, Behavior::Hang)
                .with("198.51.100.21", 8080, Behavior::Hang),
        );
        let store = Arc::new(MemoryStore::new());
        let v = validator(4, connector.clone(), store.clone());

        let batch = v.validate_batch(
            vec![
                ("198.51.100.20:8080", "pubproxy"),
                ("198.51.100.21:8080", "pubproxy"),
            ],
            idle(),
        );
        assert!(tokio::time::timeout(Duration::from_millis(100), batch)
            .await
            .is_err());
        assert_eq!(connector.connects_to("198.51.100.20", 8080), 1);

        // well past the probe timeout the aborted tasks would have recorded failures
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(store.history("198.51.100.20:8080").await.unwrap().is_none());
        assert!(store.history("198.51.100.21:8080").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_check_target_through_working_proxy() {
        let connector = Arc::new(
            ScriptedConnector::new().with("198.51.100.1", 8080, Behavior::http_proxy("198.51.100.1")),
        );
        let v = validator(2, connector, Arc::new(MemoryStore::new()));

        let check = v
            .check_target("198.51.100.1:8080", "http://example.com/", &[])
            .await
            .unwrap();
        assert!(check.success);
        assert_eq!(check.target_url, "http://example.com/");

        assert!(matches!(
            v.check_target("198.51.100.1", "http://example.com/", &[]).await,
            Err(HunterError::InvalidEndpoint(_))
        ));
        assert!(matches!(
            v.check_target("198.51.100.1:8080", "https://example.com/", &[]).await,
            Err(HunterError::InvalidUrl(_))
        ));
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let connector = Arc::new(ScriptedConnector::new().with("203.0.113.6", 1080, Behavior::Socks5));
        let v = validator(4, connector.clone(), Arc::new(MemoryStore::new()));
        let (_tx, rx) = watch::channel(true);

        let report = v
            .validate_batch(vec![("203.0.113.6:1080", "pubproxy")], rx)
            .await
            .unwrap();

        assert!(report.results.is_empty());
        assert_eq!(report.summary.cancelled, 1);
        assert_eq!(connector.total_connects(), 0);
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let v = validator(4, Arc::new(ScriptedConnector::new()), Arc::new(MemoryStore::new()));
        let report = v
            .validate_batch(Vec::<(String, String)>::new(), idle())
            .await
            .unwrap();

        assert!(report.results.is_empty());
        assert_eq!(report.summary.total, 0);
    }

    #[tokio::test]
    async fn test_validate_one() {
        let connector = Arc::new(ScriptedConnector::new().with("203.0.113.6", 1080, Behavior::Socks5));
        let v = validator(4, connector, Arc::new(MemoryStore::new()));

        assert!(v.validate_one("203.0.113.6:1080", "pubproxy").await.is_ok());
        assert_eq!(
            v.validate_one("203.0.113.6", "pubproxy").await.status(),
            ValidationStatus::Invalid
        );
        assert_eq!(v.threads(), 4);
    }
}
