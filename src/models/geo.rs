use serde::{Deserialize, Serialize};

pub const UNKNOWN: &str = "Unknown";

/// Coarse location metadata for a proxy's observed IP
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
    pub country: String,
    pub country_code: String,
    pub region: String,
    pub city: String,
    pub latitude: f64,
    pub longitude: f64,
    pub timezone: String,
    pub isp: String,
}

impl Default for GeoLocation {
    fn default() -> Self {
        Self {
            country: UNKNOWN.to_string(),
            country_code: String::new(),
            region: UNKNOWN.to_string(),
            city: UNKNOWN.to_string(),
            latitude: 0.0,
            longitude: 0.0,
            timezone: String::new(),
            isp: UNKNOWN.to_string(),
        }
    }
}

impl GeoLocation {
    pub fn is_unknown(&self) -> bool {
        self.country.is_empty() || self.country == UNKNOWN
    }
}
