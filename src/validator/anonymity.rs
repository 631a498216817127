//! Anonymity classification from echoed request headers

use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{HunterError, Result};
use crate::models::{Anonymity, CandidateEndpoint};

use super::http::HttpClient;

/// Headers that reveal the client behind a proxy
pub const SPOOF_HEADERS: [&str; 3] = ["X-Real-IP", "X-Forwarded-For", "Via"];

/// Outcome of the header-echo test
#[derive(Debug, Clone, PartialEq)]
pub struct AnonymityReport {
    pub level: Anonymity,
    pub leaked_headers: BTreeSet<String>,
}

impl AnonymityReport {
    pub fn unknown() -> Self {
        Self {
            level: Anonymity::Unknown,
            leaked_headers: BTreeSet::new(),
        }
    }
}

/// Which anonymity levels a batch accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnonymityPolicy {
    #[default]
    Any,
    /// Rejects transparent proxies
    Anonymous,
    /// Accepts elite proxies only
    Elite,
}

impl AnonymityPolicy {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "any" | "" => Some(AnonymityPolicy::Any),
            "anonymous" => Some(AnonymityPolicy::Anonymous),
            "elite" => Some(AnonymityPolicy::Elite),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AnonymityPolicy::Any => "any",
            AnonymityPolicy::Anonymous => "anonymous",
            AnonymityPolicy::Elite => "elite",
        }
    }

    pub fn accepts(&self, level: Anonymity) -> bool {
        match self {
            AnonymityPolicy::Any => true,
            AnonymityPolicy::Anonymous => level != Anonymity::Transparent,
            AnonymityPolicy::Elite => level == Anonymity::Elite,
        }
    }
}

/// Level implied by the number of echoed spoof headers
pub fn classify(leaked: usize, real_ip_leaked: bool) -> Anonymity {
    if real_ip_leaked || leaked >= 2 {
        Anonymity::Transparent
    } else if leaked == 1 {
        Anonymity::Anonymous
    } else {
        Anonymity::Elite
    }
}

/// Find spoof headers in an echoed `headers` object
///
/// Returns the leaked header names and whether any value contains `real_ip`.
pub fn inspect_headers(
    headers: &serde_json::Map<String, serde_json::Value>,
    real_ip: Option<&str>,
) -> (BTreeSet<String>, bool) {
    let mut leaked = BTreeSet::new();
    let mut real_ip_leaked = false;

    for (name, value) in headers {
        let Some(canonical) = SPOOF_HEADERS
            .iter()
            .find(|h| h.eq_ignore_ascii_case(name))
        else {
            continue;
        };

        leaked.insert(canonical.to_string());

        let value = value.as_str().unwrap_or_default();
        if real_ip.map(|ip| carries_address(value, ip)).unwrap_or(false) {
            real_ip_leaked = true;
        }
    }

    (leaked, real_ip_leaked)
}

/// Whether a header value lists `ip` as one of its comma or space separated tokens
fn carries_address(value: &str, ip: &str) -> bool {
    value
        .split(|c: char| c == ',' || c.is_whitespace())
        .any(|token| token == ip)
}

/// Run the header-echo test through `candidate`
///
/// Request failures degrade to `Anonymity::Unknown`. Seeing the real IP as
/// the observed address forces `Transparent`.
pub async fn analyze(
    client: &HttpClient,
    candidate: &CandidateEndpoint,
    headers_url: &str,
    real_ip: Option<&str>,
    observed_ip: Option<&str>,
    request_timeout: Duration,
) -> AnonymityReport {
    let mut report = match header_test(client, candidate, headers_url, real_ip, request_timeout).await
    {
        Ok(report) => report,
        Err(e) => {
            debug!("Anonymity test through {} failed: {}", candidate, e);
            AnonymityReport::unknown()
        }
    };

    if let (Some(real), Some(observed)) = (real_ip, observed_ip) {
        if real == observed {
            report.level = Anonymity::Transparent;
        }
    }

    report
}

async fn header_test(
    client: &HttpClient,
    candidate: &CandidateEndpoint,
    headers_url: &str,
    real_ip: Option<&str>,
    request_timeout: Duration,
) -> Result<AnonymityReport> {
    let spoof: Vec<(&str, String)> = match real_ip {
        Some(ip) => SPOOF_HEADERS.iter().map(|h| (*h, ip.to_string())).collect(),
        None => Vec::new(),
    };

    let response = client
        .get(headers_url, Some(candidate), &spoof, request_timeout)
        .await?;

    if !response.is_ok() {
        return Err(HunterError::UnexpectedStatus {
            status: response.status,
            url: headers_url.to_string(),
        });
    }

    let body: serde_json::Value = serde_json::from_slice(&response.body)?;
    let headers = body
        .get("headers")
        .and_then(|h| h.as_object())
        .ok_or_else(|| HunterError::UnexpectedResponse("missing headers object".to_string()))?;

    let (leaked_headers, real_ip_leaked) = inspect_headers(headers, real_ip);
    Ok(AnonymityReport {
        level: classify(leaked_headers.len(), real_ip_leaked),
        leaked_headers,
    })
}
