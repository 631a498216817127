use crate::error::{HunterError, Result};
use crate::validator::anonymity::AnonymityPolicy;
use crate::validator::echo::{default_echo_endpoints, EchoEndpoint};
use crate::validator::geo::default_geo_urls;
use crate::validator::retry::{RetryPolicy, DEFAULT_RETRY_STATUSES};
use std::env;
use std::str::FromStr;
use std::time::Duration;

pub const MAX_THREADS: usize = 100;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Validation engine settings
    pub validator: ValidatorConfig,
    /// Database configuration, absent when `DATABASE_URL` is unset
    pub database: Option<DatabaseConfig>,
    /// Pool refresher settings
    pub refresh: RefreshConfig,
    /// Candidate list path; stdin when absent
    pub input: Option<String>,
    /// Page fetched through each working proxy after a one-shot batch
    pub target_url: Option<String>,
    /// Logging configuration
    pub log: LogConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidatorConfig {
    /// Concurrent candidates, 1 to 100
    pub threads: usize,
    /// Budget for each full HTTP request
    pub timeout: Duration,
    /// Budget for TCP probes and detection handshakes
    pub probe_timeout: Duration,
    /// Total attempts for retryable HTTP statuses
    pub max_retries: u32,
    pub retry_backoff: Duration,
    pub anonymity: AnonymityPolicy,
    pub enable_socks: bool,
    pub enable_geolocation: bool,
    pub auto_blacklist: bool,
    pub public_ip_ttl: Duration,
    pub echo_urls: Vec<String>,
    pub headers_url: String,
    pub geo_urls: Vec<String>,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            threads: 20,
            timeout: Duration::from_secs(5),
            probe_timeout: Duration::from_secs(2),
            max_retries: 3,
            retry_backoff: Duration::from_millis(500),
            anonymity: AnonymityPolicy::Any,
            enable_socks: true,
            enable_geolocation: true,
            auto_blacklist: true,
            public_ip_ttl: Duration::from_secs(300),
            echo_urls: default_echo_endpoints().into_iter().map(|e| e.url).collect(),
            headers_url: "http://httpbin.org/headers".to_string(),
            geo_urls: default_geo_urls(),
        }
    }
}

impl ValidatorConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_retries.max(1),
            backoff: self.retry_backoff,
            retry_statuses: DEFAULT_RETRY_STATUSES.to_vec(),
        }
    }

    pub fn echo_endpoints(&self) -> Vec<EchoEndpoint> {
        self.echo_urls
            .iter()
            .map(|url| EchoEndpoint::from_url(url))
            .collect()
    }

    pub fn validate(&self) -> Result<()> {
        if self.probe_timeout.is_zero() {
            return Err(HunterError::InvalidConfig(
                "HUNTER_PROBE_TIMEOUT must be greater than zero".into(),
            ));
        }
        if self.probe_timeout >= self.timeout {
            return Err(HunterError::InvalidConfig(
                "HUNTER_PROBE_TIMEOUT must be smaller than HUNTER_TIMEOUT".into(),
            ));
        }
        if self.echo_urls.is_empty() {
            return Err(HunterError::InvalidConfig(
                "HUNTER_ECHO_URLS must name at least one service".into(),
            ));
        }
        if self.geo_urls.is_empty() {
            return Err(HunterError::InvalidConfig(
                "HUNTER_GEO_URLS must name at least one service".into(),
            ));
        }
        for url in self
            .echo_urls
            .iter()
            .chain(std::iter::once(&self.headers_url))
            .chain(self.geo_urls.iter())
        {
            if !url.starts_with("http://") {
                return Err(HunterError::InvalidConfig(format!(
                    "only http:// services are supported: {}",
                    url
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,
    /// Maximum connections in pool
    pub max_connections: u32,
    /// Minimum connections in pool
    pub min_connections: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RefreshConfig {
    /// Re-validation period; `None` runs a single batch
    pub interval: Option<Duration>,
    /// Age after which stored non-working results are pruned; `None` keeps them
    pub result_retention: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log level (debug, info, warn, error)
    pub level: String,
    /// Output format (json, pretty)
    pub format: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = ValidatorConfig::default();

        let threads: usize = parse_env("HUNTER_THREADS", "20")?;
        let anonymity_raw = get_env_or("HUNTER_ANONYMITY", "any");
        let anonymity = AnonymityPolicy::from_str(&anonymity_raw).ok_or_else(|| {
            HunterError::InvalidConfig(format!(
                "HUNTER_ANONYMITY must be any, anonymous or elite (got {})",
                anonymity_raw
            ))
        })?;

        let validator = ValidatorConfig {
            threads: threads.clamp(1, MAX_THREADS),
            timeout: Duration::from_secs(parse_env("HUNTER_TIMEOUT", "5")?),
            probe_timeout: Duration::from_secs(parse_env("HUNTER_PROBE_TIMEOUT", "2")?),
            max_retries: parse_env("HUNTER_MAX_RETRIES", "3")?,
            retry_backoff: Duration::from_millis(parse_env("HUNTER_RETRY_BACKOFF_MS", "500")?),
            anonymity,
            enable_socks: parse_env("HUNTER_ENABLE_SOCKS", "true")?,
            enable_geolocation: parse_env("HUNTER_ENABLE_GEOLOCATION", "true")?,
            auto_blacklist: parse_env("HUNTER_AUTO_BLACKLIST", "true")?,
            public_ip_ttl: Duration::from_secs(parse_env("HUNTER_PUBLIC_IP_TTL", "300")?),
            echo_urls: list_env("HUNTER_ECHO_URLS").unwrap_or(defaults.echo_urls),
            headers_url: get_env_or("HUNTER_HEADERS_URL", &defaults.headers_url),
            geo_urls: list_env("HUNTER_GEO_URLS").unwrap_or(defaults.geo_urls),
        };
        validator.validate()?;

        let database = match env::var("DATABASE_URL") {
            Ok(url) if !url.trim().is_empty() => Some(DatabaseConfig {
                url: url.trim().to_string(),
                max_connections: parse_env("DB_MAX_CONNECTIONS", "10")?,
                min_connections: parse_env("DB_MIN_CONNECTIONS", "1")?,
            }),
            _ => None,
        };

        let interval_secs: u64 = parse_env("HUNTER_REFRESH_INTERVAL", "0")?;
        let retention_days: u64 = parse_env("HUNTER_RESULT_RETENTION_DAYS", "7")?;

        let target_url = env::var("HUNTER_TARGET_URL")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        if let Some(url) = &target_url {
            if !url.starts_with("http://") {
                return Err(HunterError::InvalidConfig(format!(
                    "HUNTER_TARGET_URL must be an http:// URL: {}",
                    url
                )));
            }
        }

        Ok(Config {
            validator,
            database,
            refresh: RefreshConfig {
                interval: (interval_secs > 0).then(|| Duration::from_secs(interval_secs)),
                result_retention: (retention_days > 0)
                    .then(|| Duration::from_secs(retention_days * 24 * 60 * 60)),
            },
            target_url,
            input: env::var("HUNTER_INPUT").ok().filter(|s| !s.trim().is_empty()),
            log: LogConfig {
                level: get_env_or("LOG_LEVEL", "info"),
                format: get_env_or("LOG_FORMAT", "json"),
            },
        })
    }
}

/// Get environment variable with a default value
fn get_env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T: FromStr>(key: &str, default: &str) -> Result<T> {
    get_env_or(key, default)
        .trim()
        .parse()
        .map_err(|_| HunterError::InvalidConfig(format!("{} has an invalid value", key)))
}

/// Comma-separated list, `None` when unset or empty
fn list_env(key: &str) -> Option<Vec<String>> {
    let items: Vec<String> = env::var(key)
        .ok()?
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    (!items.is_empty()).then_some(items)
}
