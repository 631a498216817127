//! Geolocation lookups with a process-wide cache

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::error::{HunterError, Result};
use crate::models::{GeoLocation, UNKNOWN};

use super::http::HttpClient;

/// Resolves an IP address to a location
#[async_trait]
pub trait GeoLookup: Send + Sync {
    async fn lookup(&self, ip: &str) -> Result<GeoLocation>;
}

/// Response layout of a geolocation service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeoProvider {
    IpApi,
    GeoPlugin,
}

impl GeoProvider {
    fn for_template(template: &str) -> Self {
        if template.contains("geoplugin") {
            GeoProvider::GeoPlugin
        } else {
            GeoProvider::IpApi
        }
    }

    /// Map a JSON body onto a location; `None` without a country
    pub fn parse(&self, body: &Value) -> Option<GeoLocation> {
        let text = |key: &str| {
            body.get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        let number = |key: &str| body.get(key).map(lenient_f64).unwrap_or(0.0);

        let location = match self {
            GeoProvider::IpApi => {
                if body.get("status").and_then(Value::as_str) == Some("fail") {
                    return None;
                }
                GeoLocation {
                    country: text("country"),
                    country_code: text("countryCode"),
                    region: text("regionName"),
                    city: text("city"),
                    latitude: number("lat"),
                    longitude: number("lon"),
                    timezone: text("timezone"),
                    isp: text("isp"),
                }
            }
            GeoProvider::GeoPlugin => GeoLocation {
                country: text("geoplugin_countryName"),
                country_code: text("geoplugin_countryCode"),
                region: text("geoplugin_regionName"),
                city: text("geoplugin_city"),
                latitude: number("geoplugin_latitude"),
                longitude: number("geoplugin_longitude"),
                timezone: text("geoplugin_timezone"),
                isp: String::new(),
            },
        };

        if location.country.is_empty() {
            return None;
        }

        Some(GeoLocation {
            region: or_unknown(location.region),
            city: or_unknown(location.city),
            ..location
        })
    }
}

fn or_unknown(value: String) -> String {
    if value.trim().is_empty() {
        UNKNOWN.to_string()
    } else {
        value
    }
}

fn lenient_f64(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

/// Default lookup URL templates, `{ip}` is substituted
pub fn default_geo_urls() -> Vec<String> {
    vec![
        "http://ip-api.com/json/{ip}?fields=status,country,countryCode,region,regionName,city,lat,lon,timezone,isp".to_string(),
        "http://www.geoplugin.net/json.gp?ip={ip}".to_string(),
    ]
}

/// Lookup over plain-HTTP geolocation services, tried in order
pub struct HttpGeoLookup {
    client: HttpClient,
    templates: Vec<String>,
    request_timeout: Duration,
}

impl HttpGeoLookup {
    pub fn new(client: HttpClient, templates: Vec<String>, request_timeout: Duration) -> Self {
        Self {
            client,
            templates,
            request_timeout,
        }
    }
}

#[async_trait]
impl GeoLookup for HttpGeoLookup {
    async fn lookup(&self, ip: &str) -> Result<GeoLocation> {
        let mut last_error = None;

        for template in &self.templates {
            let url = template.replace("{ip}", ip);
            let provider = GeoProvider::for_template(template);

            let response = match self.client.get(&url, None, &[], self.request_timeout).await {
                Ok(r) => r,
                Err(e) => {
                    debug!("Geo lookup {} failed: {}", url, e);
                    last_error = Some(e);
                    continue;
                }
            };

            if !response.is_ok() {
                last_error = Some(HunterError::UnexpectedStatus {
                    status: response.status,
                    url,
                });
                continue;
            }

            let parsed = serde_json::from_slice::<Value>(&response.body)
                .ok()
                .and_then(|body| provider.parse(&body));
            match parsed {
                Some(location) => return Ok(location),
                None => {
                    last_error = Some(HunterError::UnexpectedResponse(format!(
                        "no country in response from {}",
                        url
                    )))
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| HunterError::InvalidConfig("no geolocation services configured".into())))
    }
}

/// Cached resolver that never fails
///
/// Failed lookups cache the default "Unknown" record, so each IP is looked up
/// at most once per process (concurrent misses may race, last insert wins).
#[derive(Clone)]
pub struct GeoResolver {
    lookup: Arc<dyn GeoLookup>,
    cache: Arc<DashMap<String, GeoLocation>>,
}

impl GeoResolver {
    pub fn new(lookup: Arc<dyn GeoLookup>) -> Self {
        Self {
            lookup,
            cache: Arc::new(DashMap::new()),
        }
    }

    #[instrument(skip(self))]
    pub async fn resolve(&self, ip: &str) -> GeoLocation {
        if let Some(hit) = self.cache.get(ip) {
            return hit.clone();
        }

        let location = match self.lookup.lookup(ip).await {
            Ok(location) => location,
            Err(e) => {
                debug!("Geolocation unavailable: {}", e);
                GeoLocation::default()
            }
        };

        self.cache.insert(ip.to_string(), location.clone());
        location
    }

    pub fn cached(&self) -> usize {
        self.cache.len()
    }
}
