use std::time::Duration;

use tokio::time::timeout;
use tracing::debug;

use crate::error::{HunterError, Result};
use crate::models::CandidateEndpoint;

use super::transport::Connector;

/// TCP reachability check bounded by `probe_timeout`
pub async fn probe(
    connector: &dyn Connector,
    candidate: &CandidateEndpoint,
    probe_timeout: Duration,
) -> Result<()> {
    match timeout(probe_timeout, connector.connect(&candidate.host, candidate.port)).await {
        Ok(Ok(_stream)) => {
            debug!("{} accepted TCP connection", candidate);
            Ok(())
        }
        Ok(Err(e)) => Err(e),
        Err(_) => Err(HunterError::Timeout),
    }
}
