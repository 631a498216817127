use serde::{Deserialize, Serialize};

/// Outcome of fetching an arbitrary page through one proxy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetCheck {
    /// `host:port` of the proxy used
    pub proxy: String,
    pub target_url: String,
    /// Absent when no response arrived
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    /// Seconds until the response body was read or the request failed
    pub response_time: f64,
    pub content_length: usize,
    /// Whether the target answered 200
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TargetCheck {
    /// Whether the proxy delivered a response, whatever its status
    pub fn responded(&self) -> bool {
        self.status_code.is_some()
    }
}
