use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;

/// Query parameters attached to an event, in request-arrival key order.
///
/// Values stay loosely typed: a key seen once is a JSON string, a repeated key
/// is a JSON array of its values. Rows written by older clients may carry
/// numbers or other JSON values.
pub type EventParams = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceType {
    Mobile,
    Tablet,
    Desktop,
}

impl DeviceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceType::Mobile => "Mobile",
            DeviceType::Tablet => "Tablet",
            DeviceType::Desktop => "Desktop",
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mobile" => Ok(DeviceType::Mobile),
            "tablet" => Ok(DeviceType::Tablet),
            "desktop" => Ok(DeviceType::Desktop),
            _ => Err(()),
        }
    }
}

/// A stored pixel load.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelEvent {
    pub id: i64,
    pub pixel_id: String,
    pub timestamp: i64,
    pub ip_hash: String,
    pub country: Option<String>,
    pub region: Option<String>,
    pub browser: Option<String>,
    pub os: Option<String>,
    pub device_type: Option<DeviceType>,
    pub params: EventParams,
    pub notes: Option<String>,
}

/// An event that has not been persisted yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    pub pixel_id: String,
    pub timestamp: i64,
    pub ip_hash: String,
    pub country: Option<String>,
    pub region: Option<String>,
    pub browser: Option<String>,
    pub os: Option<String>,
    pub device_type: Option<DeviceType>,
    pub params: EventParams,
    pub notes: Option<String>,
}

impl NewEvent {
    /// Params as stored in the `params` column.
    pub fn params_json(&self) -> String {
        Value::Object(self.params.clone()).to_string()
    }
}

/// Raw `events` row shared by the SQL backends.
#[derive(Debug, Clone, FromRow)]
pub struct EventRow {
    pub id: i64,
    pub pixel_id: String,
    pub timestamp: i64,
    pub ip_hash: String,
    pub country: Option<String>,
    pub region: Option<String>,
    pub browser: Option<String>,
    pub os: Option<String>,
    pub device_type: Option<String>,
    pub params: Option<String>,
    pub notes: Option<String>,
}

impl From<EventRow> for PixelEvent {
    fn from(row: EventRow) -> Self {
        let params = match row.params.as_deref() {
            None | Some("") => EventParams::new(),
            Some(raw) => match serde_json::from_str::<Value>(raw) {
                Ok(Value::Object(map)) => map,
                Ok(_) | Err(_) => {
                    tracing::warn!(event_id = row.id, "discarding unreadable event params");
                    EventParams::new()
                }
            },
        };

        PixelEvent {
            id: row.id,
            pixel_id: row.pixel_id,
            timestamp: row.timestamp,
            ip_hash: row.ip_hash,
            country: row.country,
            region: row.region,
            browser: row.browser,
            os: row.os,
            device_type: row.device_type.as_deref().and_then(|s| s.parse().ok()),
            params,
            notes: row.notes,
        }
    }
}
