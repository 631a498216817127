//! The caller's own public IP, cached for a TTL

use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::error::{HunterError, Result};

use super::echo::EchoEndpoint;
use super::http::HttpClient;

/// Source of the caller's public address
#[async_trait]
pub trait PublicIpSource: Send + Sync {
    async fn fetch(&self) -> Result<String>;
}

/// Asks the echo services directly, without a proxy
pub struct HttpPublicIpSource {
    client: HttpClient,
    endpoints: Vec<EchoEndpoint>,
    request_timeout: Duration,
}

impl HttpPublicIpSource {
    pub fn new(client: HttpClient, endpoints: Vec<EchoEndpoint>, request_timeout: Duration) -> Self {
        Self {
            client,
            endpoints,
            request_timeout,
        }
    }
}

#[async_trait]
impl PublicIpSource for HttpPublicIpSource {
    async fn fetch(&self) -> Result<String> {
        for endpoint in &self.endpoints {
            match self
                .client
                .get(&endpoint.url, None, &[], self.request_timeout)
                .await
            {
                Ok(response) if response.is_ok() => {
                    if let Some(ip) = endpoint.extract_ip(&response.text()) {
                        debug!(service = %endpoint.name, "Public IP is {}", ip);
                        return Ok(ip);
                    }
                }
                Ok(response) => debug!(service = %endpoint.name, status = response.status, "Public IP lookup rejected"),
                Err(e) => debug!(service = %endpoint.name, "Public IP lookup failed: {}", e),
            }
        }

        Err(HunterError::UnexpectedResponse(
            "no echo service returned a public IP".to_string(),
        ))
    }
}

struct CachedIp {
    ip: String,
    fetched_at: Instant,
}

/// TTL cache in front of a [`PublicIpSource`]
///
/// Concurrent refreshes are allowed; the last writer wins.
#[derive(Clone)]
pub struct PublicIpCache {
    source: Arc<dyn PublicIpSource>,
    ttl: Duration,
    cell: Arc<ArcSwapOption<CachedIp>>,
}

impl PublicIpCache {
    pub fn new(source: Arc<dyn PublicIpSource>, ttl: Duration) -> Self {
        Self {
            source,
            ttl,
            cell: Arc::new(ArcSwapOption::empty()),
        }
    }

    /// Cached IP if still fresh, otherwise a new fetch
    ///
    /// `None` when the fetch fails.
    pub async fn get(&self) -> Option<String> {
        if let Some(cached) = self.cell.load_full() {
            if cached.fetched_at.elapsed() < self.ttl {
                return Some(cached.ip.clone());
            }
        }

        match self.source.fetch().await {
            Ok(ip) => {
                info!("Resolved public IP {}", ip);
                self.cell.store(Some(Arc::new(CachedIp {
                    ip: ip.clone(),
                    fetched_at: Instant::now(),
                })));
                Some(ip)
            }
            Err(e) => {
                warn!("Could not determine public IP: {}", e);
                None
            }
        }
    }

    pub fn invalidate(&self) {
        self.cell.store(None);
    }
}
