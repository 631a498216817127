use serde::{Deserialize, Serialize};

/// A candidate proxy endpoint with its provenance tag
///
/// Built only by the normalizer, so `host` is never empty and `port` is never zero.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CandidateEndpoint {
    pub host: String,
    pub port: u16,
    pub source: String,
}

impl CandidateEndpoint {
    pub(crate) fn new(host: impl Into<String>, port: u16, source: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            source: source.into(),
        }
    }

    /// Identity key (`host:port`)
    pub fn key(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Proxy URL used for proxy-style HTTP requests
    pub fn http_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

impl std::fmt::Display for CandidateEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidate_key_and_url() {
        let candidate = CandidateEndpoint::new("203.0.113.5", 3128, "pubproxy");
        assert_eq!(candidate.key(), "203.0.113.5:3128");
        assert_eq!(candidate.http_url(), "http://203.0.113.5:3128");
        assert_eq!(candidate.to_string(), "203.0.113.5:3128");
        assert_eq!(candidate.source, "pubproxy");
    }
}
