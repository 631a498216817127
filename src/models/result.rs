use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::GeoLocation;

/// Proxy protocol spoken by a candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Http,
    Socks4,
    Socks5,
    Unknown,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Socks4 => "socks4",
            Protocol::Socks5 => "socks5",
            Protocol::Unknown => "unknown",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "http" => Some(Protocol::Http),
            "socks4" => Some(Protocol::Socks4),
            "socks5" => Some(Protocol::Socks5),
            "unknown" => Some(Protocol::Unknown),
            _ => None,
        }
    }

    pub fn is_socks(&self) -> bool {
        matches!(self, Protocol::Socks4 | Protocol::Socks5)
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How much of the client's identity a proxy discloses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Anonymity {
    Elite,
    Anonymous,
    Transparent,
    Unknown,
}

impl Anonymity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Anonymity::Elite => "elite",
            Anonymity::Anonymous => "anonymous",
            Anonymity::Transparent => "transparent",
            Anonymity::Unknown => "unknown",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "elite" => Some(Anonymity::Elite),
            "anonymous" => Some(Anonymity::Anonymous),
            "transparent" => Some(Anonymity::Transparent),
            "unknown" => Some(Anonymity::Unknown),
            _ => None,
        }
    }
}

impl std::fmt::Display for Anonymity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Terminal status of one validation pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    Ok,
    Failed,
    Unreachable,
    Invalid,
    Blacklisted,
    NotAnonymous,
    Error,
}

impl ValidationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationStatus::Ok => "ok",
            ValidationStatus::Failed => "failed",
            ValidationStatus::Unreachable => "unreachable",
            ValidationStatus::Invalid => "invalid",
            ValidationStatus::Blacklisted => "blacklisted",
            ValidationStatus::NotAnonymous => "not_anonymous",
            ValidationStatus::Error => "error",
        }
    }

    /// Outcome as seen by the blacklist counters: `Some(true)` success,
    /// `Some(false)` failure, `None` when nothing is recorded.
    pub fn counts_as_success(&self) -> Option<bool> {
        match self {
            ValidationStatus::Ok | ValidationStatus::NotAnonymous => Some(true),
            ValidationStatus::Failed | ValidationStatus::Unreachable | ValidationStatus::Error => {
                Some(false)
            }
            ValidationStatus::Invalid | ValidationStatus::Blacklisted => None,
        }
    }
}

impl std::fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Fields of a working proxy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkingProxy {
    pub protocol: Protocol,
    /// Seconds from the start of the pass to the confirming response
    pub response_time: f64,
    pub data_size: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy_observed_ip: Option<String>,
    pub anonymity: Anonymity,
    pub leaked_headers: BTreeSet<String>,
    pub quality_score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geolocation: Option<GeoLocation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub echo_service: Option<String>,
}

/// Terminal outcome, one variant per status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Ok(WorkingProxy),
    Failed {
        protocol: Protocol,
        reason: String,
    },
    Unreachable {
        reason: String,
    },
    Invalid {
        reason: String,
    },
    Blacklisted,
    NotAnonymous {
        protocol: Protocol,
        proxy_observed_ip: String,
        anonymity: Anonymity,
        leaked_headers: BTreeSet<String>,
    },
    Error {
        message: String,
    },
}

impl Outcome {
    pub fn status(&self) -> ValidationStatus {
        match self {
            Outcome::Ok(_) => ValidationStatus::Ok,
            Outcome::Failed { .. } => ValidationStatus::Failed,
            Outcome::Unreachable { .. } => ValidationStatus::Unreachable,
            Outcome::Invalid { .. } => ValidationStatus::Invalid,
            Outcome::Blacklisted => ValidationStatus::Blacklisted,
            Outcome::NotAnonymous { .. } => ValidationStatus::NotAnonymous,
            Outcome::Error { .. } => ValidationStatus::Error,
        }
    }
}

/// Result of validating one candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    /// `host:port`, or the raw input when it could not be parsed
    pub endpoint: String,
    pub source: String,
    #[serde(flatten)]
    pub outcome: Outcome,
}

impl ValidationResult {
    pub fn new(endpoint: impl Into<String>, source: impl Into<String>, outcome: Outcome) -> Self {
        Self {
            endpoint: endpoint.into(),
            source: source.into(),
            outcome,
        }
    }

    pub fn status(&self) -> ValidationStatus {
        self.outcome.status()
    }

    pub fn is_ok(&self) -> bool {
        matches!(self.outcome, Outcome::Ok(_))
    }

    pub fn working(&self) -> Option<&WorkingProxy> {
        match &self.outcome {
            Outcome::Ok(working) => Some(working),
            _ => None,
        }
    }

    pub fn protocol(&self) -> Protocol {
        match &self.outcome {
            Outcome::Ok(w) => w.protocol,
            Outcome::Failed { protocol, .. } | Outcome::NotAnonymous { protocol, .. } => *protocol,
            _ => Protocol::Unknown,
        }
    }

    pub fn anonymity(&self) -> Anonymity {
        match &self.outcome {
            Outcome::Ok(w) => w.anonymity,
            Outcome::NotAnonymous { anonymity, .. } => *anonymity,
            _ => Anonymity::Unknown,
        }
    }

    pub fn response_time(&self) -> Option<f64> {
        self.working().map(|w| w.response_time)
    }

    pub fn quality_score(&self) -> Option<f64> {
        self.working().map(|w| w.quality_score)
    }

    pub fn geolocation(&self) -> Option<&GeoLocation> {
        self.working().and_then(|w| w.geolocation.as_ref())
    }
}
