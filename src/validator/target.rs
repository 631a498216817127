//! Fetching arbitrary pages through a proxy

use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::Result;
use crate::models::{CandidateEndpoint, TargetCheck};

use super::http::{HttpClient, Target};

/// Reject URLs the client cannot fetch before any proxy is blamed for them
pub fn check_target_url(url: &str) -> Result<()> {
    Target::parse(url).map(|_| ())
}

/// Single proxied GET to `url`; transport failures are reported in the result
pub async fn check_target(
    client: &HttpClient,
    proxy: &CandidateEndpoint,
    url: &str,
    headers: &[(&str, String)],
    request_timeout: Duration,
) -> TargetCheck {
    let started = Instant::now();
    let response = client
        .get_once(url, Some(proxy), headers, request_timeout)
        .await;
    let response_time = started.elapsed().as_secs_f64();

    match response {
        Ok(response) => TargetCheck {
            proxy: proxy.key(),
            target_url: url.to_string(),
            status_code: Some(response.status),
            response_time,
            content_length: response.body.len(),
            success: response.is_ok(),
            error: None,
        },
        Err(e) => {
            debug!(proxy = %proxy, url, timed_out = e.is_timeout(), "Target request failed: {}", e);
            TargetCheck {
                proxy: proxy.key(),
                target_url: url.to_string(),
                status_code: None,
                response_time,
                content_length: 0,
                success: false,
                error: Some(e.to_string()),
            }
        }
    }
}
