//! Endpoint parsing and deduplication

use std::collections::HashSet;

use crate::error::{HunterError, Result};
use crate::models::{CandidateEndpoint, Outcome, ValidationResult};

/// One normalized input line
#[derive(Debug, Clone, PartialEq)]
pub enum Normalized {
    Candidate(CandidateEndpoint),
    /// Malformed input, already resolved to its terminal result
    Invalid(ValidationResult),
}

/// Parse a raw `host:port` string
pub fn parse_endpoint(raw: &str, source: &str) -> Result<CandidateEndpoint> {
    let trimmed = raw.trim();

    if trimmed.matches(':').count() != 1 {
        return Err(HunterError::InvalidEndpoint(format!(
            "expected exactly one ':' in '{}'",
            trimmed
        )));
    }

    let (host, port) = trimmed
        .split_once(':')
        .ok_or_else(|| HunterError::InvalidEndpoint(format!("missing port in '{}'", trimmed)))?;

    if host.is_empty() {
        return Err(HunterError::InvalidEndpoint(format!(
            "empty host in '{}'",
            trimmed
        )));
    }

    if port.is_empty() || !port.bytes().all(|b| b.is_ascii_digit()) {
        return Err(HunterError::InvalidEndpoint(format!(
            "port must be numeric in '{}'",
            trimmed
        )));
    }

    let port = match port.parse::<u16>() {
        Ok(p) if p >= 1 => p,
        _ => {
            return Err(HunterError::InvalidEndpoint(format!(
                "port out of range in '{}'",
                trimmed
            )))
        }
    };

    Ok(CandidateEndpoint::new(host, port, source))
}

/// Normalize a batch of `(raw, source)` pairs
///
/// Valid endpoints are deduplicated by `host:port`, keeping the first-seen
/// position and source. Every malformed line yields its own `invalid` result.
pub fn normalize<I, R, S>(inputs: I) -> Vec<Normalized>
where
    I: IntoIterator<Item = (R, S)>,
    R: AsRef<str>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    for (raw, source) in inputs {
        let (raw, source) = (raw.as_ref(), source.as_ref());
        match parse_endpoint(raw, source) {
            Ok(candidate) => {
                if seen.insert(candidate.key()) {
                    out.push(Normalized::Candidate(candidate));
                }
            }
            Err(e) => out.push(Normalized::Invalid(ValidationResult::new(
                raw.trim(),
                source,
                Outcome::Invalid {
                    reason: e.to_string(),
                },
            ))),
        }
    }

    out
}
