//! Protocol detection by ordered handshake attempts

use std::time::Duration;

use tokio::time::timeout;
use tracing::debug;

use crate::error::{HunterError, Result};
use crate::models::{CandidateEndpoint, Protocol};

use super::echo::EchoEndpoint;
use super::http::HttpClient;
use super::socks::{socks4_handshake, socks5_handshake};
use super::transport::Connector;

/// Try HTTP, then SOCKS5, then SOCKS4, each on a fresh connection
///
/// Returns `Protocol::Unknown` when nothing answers correctly.
pub async fn detect_protocol(
    client: &HttpClient,
    candidate: &CandidateEndpoint,
    echo: Option<&EchoEndpoint>,
    probe_timeout: Duration,
    enable_socks: bool,
) -> Protocol {
    match echo {
        Some(echo) => match http_test(client, candidate, echo, probe_timeout).await {
            Ok(()) => return Protocol::Http,
            Err(e) => debug!("{} is not an HTTP proxy: {}", candidate, e),
        },
        None => debug!("No echo endpoint configured, skipping HTTP detection"),
    }

    if !enable_socks {
        return Protocol::Unknown;
    }

    let connector = client.connector().as_ref();

    match socks_test(connector, candidate, probe_timeout, Protocol::Socks5).await {
        Ok(()) => return Protocol::Socks5,
        Err(e) => debug!("{} is not a SOCKS5 proxy: {}", candidate, e),
    }

    match socks_test(connector, candidate, probe_timeout, Protocol::Socks4).await {
        Ok(()) => return Protocol::Socks4,
        Err(e) => debug!("{} is not a SOCKS4 proxy: {}", candidate, e),
    }

    Protocol::Unknown
}

/// Proxy-style GET to the echo endpoint; needs a 200 carrying an IPv4 address
async fn http_test(
    client: &HttpClient,
    candidate: &CandidateEndpoint,
    echo: &EchoEndpoint,
    probe_timeout: Duration,
) -> Result<()> {
    let response = client
        .get_once(&echo.url, Some(candidate), &[], probe_timeout)
        .await?;

    if !response.is_ok() {
        return Err(HunterError::UnexpectedStatus {
            status: response.status,
            url: echo.url.clone(),
        });
    }

    echo.extract_ip(&response.text())
        .map(|_| ())
        .ok_or_else(|| HunterError::UnexpectedResponse("no IPv4 address in body".to_string()))
}

async fn socks_test(
    connector: &dyn Connector,
    candidate: &CandidateEndpoint,
    probe_timeout: Duration,
    protocol: Protocol,
) -> Result<()> {
    let attempt = async {
        let mut stream = connector.connect(&candidate.host, candidate.port).await?;
        match protocol {
            Protocol::Socks5 => socks5_handshake(&mut stream).await,
            _ => socks4_handshake(&mut stream).await,
        }
    };

    timeout(probe_timeout, attempt)
        .await
        .map_err(|_| HunterError::Timeout)?
}
