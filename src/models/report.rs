//! Batch aggregation and queries over validated results

use std::collections::BTreeMap;
use std::io::Write;

use serde::{Deserialize, Serialize};

use crate::error::Result;

use super::{Anonymity, Protocol, ValidationResult, ValidationStatus};

/// Quality score range used for distribution summaries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityBucket {
    Excellent,
    Good,
    Fair,
    Poor,
    VeryPoor,
}

impl QualityBucket {
    pub fn for_score(score: f64) -> Self {
        if score >= 80.0 {
            QualityBucket::Excellent
        } else if score >= 60.0 {
            QualityBucket::Good
        } else if score >= 40.0 {
            QualityBucket::Fair
        } else if score >= 20.0 {
            QualityBucket::Poor
        } else {
            QualityBucket::VeryPoor
        }
    }
}

/// Per-pass aggregate counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub by_status: BTreeMap<ValidationStatus, usize>,
    pub by_protocol: BTreeMap<Protocol, usize>,
    pub by_anonymity: BTreeMap<Anonymity, usize>,
    pub quality_distribution: BTreeMap<QualityBucket, usize>,
    /// Country name to number of working proxies, unknown locations excluded
    pub geographic_distribution: BTreeMap<String, usize>,
    /// Mean response time over working proxies, seconds
    pub average_response_time: Option<f64>,
    /// Candidates never submitted because the batch was cancelled
    pub cancelled: usize,
    pub elapsed_secs: f64,
}

impl BatchSummary {
    pub fn from_results(results: &[ValidationResult]) -> Self {
        let mut summary = BatchSummary {
            total: results.len(),
            ..Default::default()
        };

        let mut response_total = 0.0;
        let mut working = 0usize;

        for result in results {
            *summary.by_status.entry(result.status()).or_insert(0) += 1;

            let Some(w) = result.working() else {
                continue;
            };

            working += 1;
            response_total += w.response_time;
            *summary.by_protocol.entry(w.protocol).or_insert(0) += 1;
            *summary.by_anonymity.entry(w.anonymity).or_insert(0) += 1;
            *summary
                .quality_distribution
                .entry(QualityBucket::for_score(w.quality_score))
                .or_insert(0) += 1;

            if let Some(geo) = w.geolocation.as_ref().filter(|g| !g.is_unknown()) {
                *summary
                    .geographic_distribution
                    .entry(geo.country.clone())
                    .or_insert(0) += 1;
            }
        }

        if working > 0 {
            summary.average_response_time = Some(response_total / working as f64);
        }

        summary
    }

    pub fn count(&self, status: ValidationStatus) -> usize {
        self.by_status.get(&status).copied().unwrap_or(0)
    }

    pub fn working(&self) -> usize {
        self.count(ValidationStatus::Ok)
    }
}

/// Results of one validation pass
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchReport {
    pub results: Vec<ValidationResult>,
    pub summary: BatchSummary,
}

impl BatchReport {
    pub fn new(results: Vec<ValidationResult>, cancelled: usize, elapsed_secs: f64) -> Self {
        let mut summary = BatchSummary::from_results(&results);
        summary.cancelled = cancelled;
        summary.elapsed_secs = elapsed_secs;
        Self { results, summary }
    }

    pub fn get(&self, endpoint: &str) -> Option<&ValidationResult> {
        self.results.iter().find(|r| r.endpoint == endpoint)
    }

    /// Working proxies ordered by response time
    pub fn working(&self) -> Vec<&ValidationResult> {
        let mut working: Vec<_> = self.results.iter().filter(|r| r.is_ok()).collect();
        working.sort_by(|a, b| {
            a.response_time()
                .unwrap_or(f64::MAX)
                .total_cmp(&b.response_time().unwrap_or(f64::MAX))
        });
        working
    }

    /// Working proxies located in a country (ISO code, case-insensitive)
    pub fn by_country(&self, country_code: &str) -> Vec<&ValidationResult> {
        self.working()
            .into_iter()
            .filter(|r| {
                r.geolocation()
                    .map(|g| g.country_code.eq_ignore_ascii_case(country_code))
                    .unwrap_or(false)
            })
            .collect()
    }

    pub fn by_protocol(&self, protocol: Protocol) -> Vec<&ValidationResult> {
        self.working()
            .into_iter()
            .filter(|r| r.protocol() == protocol)
            .collect()
    }

    pub fn elite(&self) -> Vec<&ValidationResult> {
        self.working()
            .into_iter()
            .filter(|r| r.anonymity() == Anonymity::Elite)
            .collect()
    }

    /// Working proxies answering within `max_secs`
    pub fn fast(&self, max_secs: f64) -> Vec<&ValidationResult> {
        self.working()
            .into_iter()
            .filter(|r| r.response_time().map(|t| t <= max_secs).unwrap_or(false))
            .collect()
    }

    /// Working proxies at or above a quality score, best first
    pub fn min_quality(&self, min_score: f64) -> Vec<&ValidationResult> {
        let mut ranked: Vec<_> = self
            .working()
            .into_iter()
            .filter(|r| r.quality_score().map(|s| s >= min_score).unwrap_or(false))
            .collect();
        ranked.sort_by(|a, b| {
            b.quality_score()
                .unwrap_or(0.0)
                .total_cmp(&a.quality_score().unwrap_or(0.0))
        });
        ranked
    }

    /// Results worth storing; malformed input has no endpoint to key on
    pub fn persistable(&self) -> impl Iterator<Item = &ValidationResult> {
        self.results
            .iter()
            .filter(|r| r.status() != ValidationStatus::Invalid)
    }

    /// `host:port` strings of the fastest proxies, for rotation
    pub fn rotation_list(&self, count: usize, max_secs: f64) -> Vec<String> {
        self.fast(max_secs)
            .into_iter()
            .take(count)
            .map(|r| r.endpoint.clone())
            .collect()
    }
}

/// One JSON object per line
pub fn write_json_lines<'a, W, I>(out: &mut W, results: I) -> Result<()>
where
    W: Write,
    I: IntoIterator<Item = &'a ValidationResult>,
{
    for result in results {
        serde_json::to_writer(&mut *out, result)?;
        out.write_all(b"\n")?;
    }
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{GeoLocation, Outcome, WorkingProxy};
    use std::collections::BTreeSet;

    fn ok(endpoint: &str, protocol: Protocol, rt: f64, score: f64, anonymity: Anonymity, cc: &str) -> ValidationResult {
        let geolocation = if cc.is_empty() {
            None
        } else {
            Some(GeoLocation {
                country: format!("Country {}", cc),
                country_code: cc.to_string(),
                ..Default::default()
            })
        };
        ValidationResult::new(
            endpoint,
            "test",
            Outcome::Ok(WorkingProxy {
                protocol,
                response_time: rt,
                data_size: 0,
                proxy_observed_ip: None,
                anonymity,
                leaked_headers: BTreeSet::new(),
                quality_score: score,
                geolocation,
                echo_service: None,
            }),
        )
    }

    fn sample() -> BatchReport {
        let results = vec![
            ok("10.0.0.1:80", Protocol::Http, 2.0, 85.0, Anonymity::Elite, "DE"),
            ok("10.0.0.2:1080", Protocol::Socks5, 0.5, 65.0, Anonymity::Anonymous, ""),
            ok("10.0.0.3:8080", Protocol::Http, 6.0, 30.0, Anonymity::Transparent, "us"),
            ValidationResult::new(
                "10.0.0.4:80",
                "test",
                Outcome::Unreachable {
                    reason: "refused".to_string(),
                },
            ),
            ValidationResult::new(
                "garbage",
                "test",
                Outcome::Invalid {
                    reason: "missing port".to_string(),
                },
            ),
        ];
        BatchReport::new(results, 2, 1.5)
    }

    #[test]
    fn test_quality_buckets() {
        assert_eq!(QualityBucket::for_score(100.0), QualityBucket::Excellent);
        assert_eq!(QualityBucket::for_score(80.0), QualityBucket::Excellent);
        assert_eq!(QualityBucket::for_score(79.9), QualityBucket::Good);
        assert_eq!(QualityBucket::for_score(40.0), QualityBucket::Fair);
        assert_eq!(QualityBucket::for_score(20.0), QualityBucket::Poor);
        assert_eq!(QualityBucket::for_score(0.0), QualityBucket::VeryPoor);
    }

    #[test]
    fn test_summary_counts() {
        let report = sample();
        let summary = &report.summary;

        assert_eq!(summary.total, 5);
        assert_eq!(summary.working(), 3);
        assert_eq!(summary.count(ValidationStatus::Unreachable), 1);
        assert_eq!(summary.count(ValidationStatus::Invalid), 1);
        assert_eq!(summary.count(ValidationStatus::Blacklisted), 0);
        assert_eq!(summary.by_protocol.get(&Protocol::Http), Some(&2));
        assert_eq!(summary.by_protocol.get(&Protocol::Socks5), Some(&1));
        assert_eq!(summary.geographic_distribution.len(), 2);
        assert_eq!(summary.cancelled, 2);

        let avg = summary.average_response_time.unwrap();
        assert!((avg - 8.5 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_summary_of_empty_batch() {
        let summary = BatchSummary::from_results(&[]);
        assert_eq!(summary.total, 0);
        assert!(summary.average_response_time.is_none());
    }

    #[test]
    fn test_report_queries() {
        let report = sample();

        let working: Vec<_> = report.working().iter().map(|r| r.endpoint.as_str()).collect();
        assert_eq!(working, vec!["10.0.0.2:1080", "10.0.0.1:80", "10.0.0.3:8080"]);

        assert_eq!(report.by_country("US").len(), 1);
        assert_eq!(report.by_protocol(Protocol::Socks5).len(), 1);
        assert_eq!(report.elite().len(), 1);
        assert_eq!(report.fast(2.0).len(), 2);

        let ranked: Vec<_> = report.min_quality(50.0).iter().map(|r| r.endpoint.as_str()).collect();
        assert_eq!(ranked, vec!["10.0.0.1:80", "10.0.0.2:1080"]);

        assert_eq!(report.rotation_list(1, 5.0), vec!["10.0.0.2:1080".to_string()]);
        assert!(report.get("10.0.0.4:80").is_some());
    }

    #[test]
    fn test_invalid_input_is_not_persisted() {
        let report = sample();
        let stored: Vec<_> = report.persistable().map(|r| r.endpoint.as_str()).collect();

        assert_eq!(
            stored,
            vec!["10.0.0.1:80", "10.0.0.2:1080", "10.0.0.3:8080", "10.0.0.4:80"]
        );
        assert_eq!(report.results.len(), 5);
    }

    #[test]
    fn test_write_json_lines() {
        let report = sample();
        let mut out = Vec::new();
        write_json_lines(&mut out, report.working()).unwrap();

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(text.ends_with('\n'));

        let first: ValidationResult = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(&first, report.working()[0]);
    }
}
