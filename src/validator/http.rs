//! Minimal HTTP/1.1 GET client over a [`Connector`]
//!
//! Requests either go straight to the target (origin-form URI) or through a
//! candidate proxy (absolute-form URI sent to the proxy's socket).

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::header::{ACCEPT, CONNECTION, HOST, USER_AGENT};
use http::{Method, Request};
use http_body_util::{BodyExt, Empty, Limited};
use rand::seq::SliceRandom;
use tokio::time::{sleep, timeout};
use tracing::debug;
use url::Url;

use crate::error::{HunterError, Result};
use crate::models::CandidateEndpoint;

use super::retry::RetryPolicy;
use super::transport::Connector;

const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:109.0) Gecko/20100101 Firefox/119.0",
    "Mozilla/5.0 (X11; Ubuntu; Linux x86_64; rv:109.0) Gecko/20100101 Firefox/119.0",
];

/// Largest response body read through a candidate
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Status and body of a completed request
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn is_ok(&self) -> bool {
        self.status == 200
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Parsed `http://` target
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Target {
    pub host: String,
    pub port: u16,
    /// Value of the `Host` header
    pub authority: String,
    pub origin_form: String,
    pub absolute_form: String,
}

impl Target {
    pub fn parse(raw: &str) -> Result<Self> {
        let url = Url::parse(raw)?;
        if url.scheme() != "http" {
            return Err(HunterError::InvalidUrl(format!(
                "only http:// URLs are supported: {}",
                raw
            )));
        }

        let host = url
            .host_str()
            .ok_or_else(|| HunterError::InvalidUrl(format!("missing host in {}", raw)))?
            .to_string();
        let port = url.port_or_known_default().unwrap_or(80);
        let authority = match url.port() {
            Some(p) => format!("{}:{}", host, p),
            None => host.clone(),
        };

        let origin_form = match url.query() {
            Some(q) => format!("{}?{}", url.path(), q),
            None => url.path().to_string(),
        };

        Ok(Self {
            host,
            port,
            authority,
            origin_form,
            absolute_form: url.to_string(),
        })
    }
}

/// GET client with per-attempt timeouts and a status retry policy
#[derive(Clone)]
pub struct HttpClient {
    connector: Arc<dyn Connector>,
    retry: RetryPolicy,
}

impl HttpClient {
    pub fn new(connector: Arc<dyn Connector>, retry: RetryPolicy) -> Self {
        Self { connector, retry }
    }

    pub fn connector(&self) -> &Arc<dyn Connector> {
        &self.connector
    }

    /// GET `url`, retrying statuses listed in the policy
    ///
    /// The response of the last attempt is returned whatever its status.
    pub async fn get(
        &self,
        url: &str,
        proxy: Option<&CandidateEndpoint>,
        headers: &[(&str, String)],
        request_timeout: Duration,
    ) -> Result<HttpResponse> {
        let mut attempt = 1;
        loop {
            let response = self.get_once(url, proxy, headers, request_timeout).await?;
            if !self.retry.should_retry(response.status, attempt) {
                return Ok(response);
            }

            let delay = self.retry.delay_after(attempt);
            debug!(
                url,
                status = response.status,
                attempt,
                "Retrying after {}ms",
                delay.as_millis()
            );
            sleep(delay).await;
            attempt += 1;
        }
    }

    /// Single GET attempt, bounded as a whole by `request_timeout`
    pub async fn get_once(
        &self,
        url: &str,
        proxy: Option<&CandidateEndpoint>,
        headers: &[(&str, String)],
        request_timeout: Duration,
    ) -> Result<HttpResponse> {
        let target = Target::parse(url)?;
        timeout(request_timeout, self.send(&target, proxy, headers))
            .await
            .map_err(|_| HunterError::Timeout)?
    }

    async fn send(
        &self,
        target: &Target,
        proxy: Option<&CandidateEndpoint>,
        headers: &[(&str, String)],
    ) -> Result<HttpResponse> {
        let (dial_host, dial_port, uri) = match proxy {
            Some(p) => (p.host.as_str(), p.port, target.absolute_form.as_str()),
            None => (target.host.as_str(), target.port, target.origin_form.as_str()),
        };

        let stream = self.connector.connect(dial_host, dial_port).await?;

        let user_agent = USER_AGENTS
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or(USER_AGENTS[0]);

        let mut builder = Request::builder()
            .method(Method::GET)
            .uri(uri)
            .header(HOST, target.authority.as_str())
            .header(USER_AGENT, user_agent)
            .header(ACCEPT, "*/*")
            .header(CONNECTION, "close");

        for (name, value) in headers {
            builder = builder.header(*name, value.as_str());
        }

        let request = builder.body(Empty::<Bytes>::new())?;

        let io = hyper_util::rt::TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| HunterError::ProxyConnectionFailed(format!("Handshake failed: {}", e)))?;

        tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!("Connection ended: {}", e);
            }
        });

        let response = sender
            .send_request(request)
            .await
            .map_err(|e| HunterError::ProxyConnectionFailed(format!("Request failed: {}", e)))?;

        let status = response.status().as_u16();
        let body = Limited::new(response.into_body(), MAX_BODY_BYTES)
            .collect()
            .await
            .map_err(|e| HunterError::Http(format!("Failed to read response: {}", e)))?
            .to_bytes();

        Ok(HttpResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validator::testing::{Behavior, ScriptedConnector};

    #[test]
    fn test_target_forms() {
        let t = Target::parse("http://httpbin.org/ip").unwrap();
        assert_eq!(t.host, "httpbin.org");
        assert_eq!(t.port, 80);
        assert_eq!(t.authority, "httpbin.org");
        assert_eq!(t.origin_form, "/ip");
        assert_eq!(t.absolute_form, "http://httpbin.org/ip");

        let t = Target::parse("http://ip-api.com:8080/json?fields=query").unwrap();
        assert_eq!(t.port, 8080);
        assert_eq!(t.authority, "ip-api.com:8080");
        assert_eq!(t.origin_form, "/json?fields=query");

        assert!(Target::parse("https://api.ipify.org").is_err());
        assert!(Target::parse("not a url").is_err());
    }

    #[tokio::test]
    async fn test_proxied_get_uses_absolute_form() {
        let connector = Arc::new(
            ScriptedConnector::new().with("10.0.0.1", 8080, Behavior::http_proxy("198.51.100.7")),
        );
        let client = HttpClient::new(connector.clone(), RetryPolicy::none());
        let proxy = CandidateEndpoint::new("10.0.0.1", 8080, "t");

        let response = client
            .get("http://httpbin.org/ip", Some(&proxy), &[], Duration::from_secs(2))
            .await
            .unwrap();

        assert!(response.is_ok());
        assert!(response.text().contains("198.51.100.7"));
        assert_eq!(connector.connects_to("10.0.0.1", 8080), 1);
        assert_eq!(connector.connects_to("httpbin.org", 80), 0);
        assert_eq!(
            connector.last_request_target("10.0.0.1", 8080).as_deref(),
            Some("http://httpbin.org/ip")
        );
    }

    #[tokio::test]
    async fn test_direct_get_uses_origin_form() {
        let connector = Arc::new(
            ScriptedConnector::new().with("ipecho.net", 80, Behavior::respond(200, "198.51.100.9\n")),
        );
        let client = HttpClient::new(connector.clone(), RetryPolicy::none());

        let response = client
            .get("http://ipecho.net/plain", None, &[], Duration::from_secs(2))
            .await
            .unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.text(), "198.51.100.9\n");
        assert_eq!(
            connector.last_request_target("ipecho.net", 80).as_deref(),
            Some("/plain")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_listed_status_then_gives_up() {
        let connector = Arc::new(
            ScriptedConnector::new().with("ipecho.net", 80, Behavior::respond(503, "busy")),
        );
        let client = HttpClient::new(connector.clone(), RetryPolicy::default());

        let response = client
            .get("http://ipecho.net/plain", None, &[], Duration::from_secs(2))
            .await
            .unwrap();

        assert_eq!(response.status, 503);
        assert_eq!(connector.connects_to("ipecho.net", 80), 3);
    }

    #[tokio::test]
    async fn test_unlisted_status_is_not_retried() {
        let connector = Arc::new(
            ScriptedConnector::new().with("ipecho.net", 80, Behavior::respond(404, "nope")),
        );
        let client = HttpClient::new(connector.clone(), RetryPolicy::default());

        let response = client
            .get("http://ipecho.net/plain", None, &[], Duration::from_secs(2))
            .await
            .unwrap();

        assert_eq!(response.status, 404);
        assert_eq!(connector.connects_to("ipecho.net", 80), 1);
    }

    #[tokio::test]
    async fn test_oversized_body_is_rejected() {
        let huge = "x".repeat(MAX_BODY_BYTES + 1);
        let connector = Arc::new(
            ScriptedConnector::new().with("10.0.0.1", 8080, Behavior::respond(200, &huge)),
        );
        let client = HttpClient::new(connector, RetryPolicy::none());
        let proxy = CandidateEndpoint::new("10.0.0.1", 8080, "t");

        let err = client
            .get("http://httpbin.org/ip", Some(&proxy), &[], Duration::from_secs(5))
            .await
            .unwrap_err();

        assert!(matches!(err, HunterError::Http(_)));
    }

    #[tokio::test]
    async fn test_body_at_limit_is_read() {
        let body = "x".repeat(MAX_BODY_BYTES);
        let connector = Arc::new(
            ScriptedConnector::new().with("ipecho.net", 80, Behavior::respond(200, &body)),
        );
        let client = HttpClient::new(connector, RetryPolicy::none());

        let response = client
            .get("http://ipecho.net/plain", None, &[], Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(response.body.len(), MAX_BODY_BYTES);
    }

    #[tokio::test]
    async fn test_transport_error_is_not_retried() {
        let connector = Arc::new(ScriptedConnector::new());
        let client = HttpClient::new(connector.clone(), RetryPolicy::default());

        let err = client
            .get("http://ipecho.net/plain", None, &[], Duration::from_secs(2))
            .await
            .unwrap_err();

        assert!(matches!(err, HunterError::ProxyConnectionFailed(_)));
        assert_eq!(connector.connects_to("ipecho.net", 80), 1);
    }
}
