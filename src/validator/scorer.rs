//! Composite quality score

use crate::models::Anonymity;

const RESPONSE_TIME_WEIGHT: f64 = 0.3;
const SUCCESS_RATE_WEIGHT: f64 = 0.4;
const ANONYMITY_WEIGHT: f64 = 0.2;
const SOURCE_WEIGHT: f64 = 0.1;

/// Reliability of each known candidate source, 0 to 100
pub fn source_reliability(source: &str) -> f64 {
    match source {
        "github-proxy-list" => 90.0,
        "github-free-proxies" | "github-proxy-daily" => 85.0,
        "proxylist-geonode" => 80.0,
        "proxyscrape-http" | "proxyscrape-https" => 75.0,
        "pubproxy" => 70.0,
        "free-proxy-list" => 65.0,
        _ => 50.0,
    }
}

pub fn response_time_score(seconds: f64) -> f64 {
    (100.0 - seconds * 10.0).max(0.0)
}

/// Neutral 50 without any history
pub fn success_rate_score(successes: i64, failures: i64) -> f64 {
    let total = successes + failures;
    if total <= 0 {
        50.0
    } else {
        successes as f64 / total as f64 * 100.0
    }
}

pub fn anonymity_score(level: Anonymity) -> f64 {
    match level {
        Anonymity::Elite => 100.0,
        Anonymity::Anonymous => 80.0,
        Anonymity::Transparent => 60.0,
        Anonymity::Unknown => 40.0,
    }
}

/// Weighted score in `[0, 100]`
pub fn quality_score(
    response_time_secs: f64,
    successes: i64,
    failures: i64,
    anonymity: Anonymity,
    source: &str,
) -> f64 {
    let response = if response_time_secs.is_finite() {
        response_time_score(response_time_secs.max(0.0))
    } else {
        0.0
    };

    let score = response * RESPONSE_TIME_WEIGHT
        + success_rate_score(successes, failures) * SUCCESS_RATE_WEIGHT
        + anonymity_score(anonymity) * ANONYMITY_WEIGHT
        + source_reliability(source) * SOURCE_WEIGHT;

    score.clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sub_scores() {
        assert_eq!(response_time_score(0.0), 100.0);
        assert_eq!(response_time_score(2.5), 75.0);
        assert_eq!(response_time_score(12.0), 0.0);

        assert_eq!(success_rate_score(0, 0), 50.0);
        assert_eq!(success_rate_score(3, 1), 75.0);

        assert_eq!(source_reliability("github-proxy-list"), 90.0);
        assert_eq!(source_reliability("proxyscrape-https"), 75.0);
        assert_eq!(source_reliability("somewhere-else"), 50.0);
    }

    #[test]
    fn test_weighted_score() {
        // 100*0.3 + 100*0.4 + 100*0.2 + 90*0.1
        let score = quality_score(0.0, 1, 0, Anonymity::Elite, "github-proxy-list");
        assert!((score - 99.0).abs() < 1e-9);

        // 80*0.3 + 50*0.4 + 40*0.2 + 50*0.1
        let score = quality_score(2.0, 0, 0, Anonymity::Unknown, "");
        assert!((score - 57.0).abs() < 1e-9);
    }

    #[test]
    fn test_score_always_in_range() {
        let levels = [
            Anonymity::Elite,
            Anonymity::Anonymous,
            Anonymity::Transparent,
            Anonymity::Unknown,
        ];
        for rt in [0.0, 0.5, 3.0, 10.0, 1000.0, f64::INFINITY, f64::NAN, -1.0] {
            for (s, f) in [(0, 0), (0, 100), (100, 0), (7, 3)] {
                for level in levels {
                    let score = quality_score(rt, s, f, level, "pubproxy");
                    assert!((0.0..=100.0).contains(&score), "{} out of range", score);
                }
            }
        }
    }
}
