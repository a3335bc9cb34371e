//! Data models for analytics

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::models::{DeviceType, EventParams, Pixel};

/// Geographic location information derived from IP address
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoLocation {
    /// ISO country code (e.g., "US", "GB")
    pub country: Option<String>,

    /// Region/state/province code
    pub region: Option<String>,
}

/// Identity derived from a client IP
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IpInfo {
    pub ip_hash: String,
    pub country: String,
    pub region: String,
}

/// Client classification derived from a user-agent header
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAgentInfo {
    pub browser: String,
    pub os: String,
    pub device_type: DeviceType,
}

/// Frequency table for one categorical dimension
pub type CountMap = BTreeMap<String, u64>;

/// One flattened `(parameter, value)` frequency
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterRow {
    pub parameter: String,
    pub value: String,
    pub count: u64,
}

/// Client-visible shape of a stored event
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicEvent {
    pub timestamp: i64,
    pub is_returning: bool,
    pub country: Option<String>,
    pub region: Option<String>,
    pub browser: Option<String>,
    pub os: Option<String>,
    pub device_type: Option<DeviceType>,
    pub params: EventParams,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSummary {
    pub total_events: u64,
    pub unique_users: u64,
    pub new_users: u64,
    pub returning_users: u64,
    pub events_per_user: f64,

    pub country_counts: CountMap,
    pub device_type_counts: CountMap,
    pub os_counts: CountMap,
    pub browser_counts: CountMap,

    pub param_counts: BTreeMap<String, CountMap>,
    pub parameter_rows: Vec<ParameterRow>,
}

/// Result of aggregating one pixel's event history
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EventAggregate {
    pub events: Vec<PublicEvent>,
    pub summary: StatsSummary,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PixelMetadata {
    pub id: String,
    pub created_at: i64,
    pub expires_at: i64,
}

impl From<&Pixel> for PixelMetadata {
    fn from(pixel: &Pixel) -> Self {
        Self {
            id: pixel.id.clone(),
            created_at: pixel.created_at,
            expires_at: pixel.expires_at,
        }
    }
}

/// Full stats payload for one pixel
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PixelStats {
    pub pixel: PixelMetadata,
    pub events: Vec<PublicEvent>,
    pub summary: StatsSummary,
}
