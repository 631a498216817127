//! IP-echo services and address extraction

use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

/// How an echo service reports the caller's address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EchoFormat {
    /// JSON object, address under the given key
    JsonField(String),
    /// Address on the first line of a plain-text body
    PlainText,
}

/// An IP-echo endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EchoEndpoint {
    pub name: String,
    pub url: String,
    pub format: EchoFormat,
}

impl EchoEndpoint {
    /// Build an endpoint from a URL, recognizing the well-known services by host
    pub fn from_url(url: &str) -> Self {
        let host = url::Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_lowercase))
            .unwrap_or_default();

        let (name, format) = if host.contains("httpbin") {
            ("httpbin".to_string(), EchoFormat::JsonField("origin".into()))
        } else if host.contains("ip-api") {
            ("ipapi".to_string(), EchoFormat::JsonField("query".into()))
        } else if host.contains("ipify") {
            ("ipify".to_string(), EchoFormat::JsonField("ip".into()))
        } else if host.contains("ipinfo") {
            ("ipinfo".to_string(), EchoFormat::PlainText)
        } else if host.contains("checkip") {
            ("checkip".to_string(), EchoFormat::PlainText)
        } else if host.contains("ipecho") {
            ("ipecho".to_string(), EchoFormat::PlainText)
        } else if host.contains("ifconfig") {
            ("ifconfig".to_string(), EchoFormat::PlainText)
        } else {
            (host, EchoFormat::PlainText)
        };

        Self {
            name,
            url: url.to_string(),
            format,
        }
    }

    /// Extract the echoed IPv4 address from a response body
    pub fn extract_ip(&self, body: &str) -> Option<String> {
        let parsed = match &self.format {
            EchoFormat::JsonField(key) => serde_json::from_str::<serde_json::Value>(body)
                .ok()
                .and_then(|v| v.get(key).and_then(|f| f.as_str()).map(str::to_string))
                .and_then(|s| s.split(',').next().map(|first| first.trim().to_string())),
            EchoFormat::PlainText => body.lines().next().map(|l| l.trim().to_string()),
        };

        parsed
            .filter(|s| s.parse::<Ipv4Addr>().is_ok())
            .or_else(|| find_ipv4(body))
    }
}

/// Default echo endpoints, in the order they are tried
pub fn default_echo_endpoints() -> Vec<EchoEndpoint> {
    [
        "http://httpbin.org/ip",
        "http://ipecho.net/plain",
        "http://checkip.amazonaws.com/",
        "http://ipinfo.io/ip",
        "http://ip-api.com/json?fields=query",
        "http://ifconfig.me/ip",
    ]
    .into_iter()
    .map(EchoEndpoint::from_url)
    .collect()
}

/// First IPv4 literal anywhere in `text`
pub fn find_ipv4(text: &str) -> Option<String> {
    text.split(|c: char| !(c.is_ascii_digit() || c == '.'))
        .filter(|token| !token.is_empty())
        .find_map(|token| {
            token
                .trim_matches('.')
                .parse::<Ipv4Addr>()
                .ok()
                .map(|ip| ip.to_string())
        })
}
