//! Network seam for every outbound connection
//!
//! Probes, handshakes and HTTP requests all dial through a [`Connector`], so
//! the pipeline can run against scripted streams in tests.

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::debug;

use crate::error::{HunterError, Result};

/// Byte stream returned by a connector
pub trait ProxyStream: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

impl<T> ProxyStream for T where T: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

/// Opens raw connections to `host:port`
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, host: &str, port: u16) -> Result<Box<dyn ProxyStream>>;
}

/// Plain TCP connector
#[derive(Debug, Clone, Default)]
pub struct TcpConnector;

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, host: &str, port: u16) -> Result<Box<dyn ProxyStream>> {
        let addr = format_tcp_addr(host, port);
        debug!("Dialing {}", addr);

        let stream = TcpStream::connect(&addr).await.map_err(|e| {
            HunterError::ProxyConnectionFailed(format!("TCP connect to {} failed: {}", addr, e))
        })?;
        stream.set_nodelay(true)?;

        Ok(Box::new(stream))
    }
}

/// Format a dialable `host:port` address
///
/// Candidates are IPv4 or hostnames; echo URL hosts keep the brackets `Url` gives them.
pub fn format_tcp_addr(host: &str, port: u16) -> String {
    format!("{}:{}", host, port)
}
