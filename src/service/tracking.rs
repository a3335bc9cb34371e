//! Pixel lifecycle and event recording
//!
//! The service owns no state beyond its collaborators; every call touches a
//! single pixel's rows.

use anyhow::{Context, Result};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

use crate::analytics::{aggregate, user_agent, IdentityClassifier, PixelStats};
use crate::config::TrackingConfig;
use crate::models::{EventParams, NewEvent, Pixel, PixelId};
use crate::storage::Storage;

const MS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

/// Current wall-clock time in milliseconds since the Unix epoch
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// What happened to a pixel load
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Recorded,
    /// No such pixel; nothing written
    UnknownPixel,
    /// Pixel past its expiry; nothing written
    Expired,
}

pub struct TrackingService {
    storage: Arc<dyn Storage>,
    identity: IdentityClassifier,
    config: TrackingConfig,
}

impl TrackingService {
    pub fn new(
        storage: Arc<dyn Storage>,
        identity: IdentityClassifier,
        config: TrackingConfig,
    ) -> Self {
        Self {
            storage,
            identity,
            config,
        }
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    pub fn config(&self) -> &TrackingConfig {
        &self.config
    }

    pub async fn create_pixel(&self) -> Result<Pixel> {
        self.create_pixel_at(now_millis()).await
    }

    /// Create a pixel whose validity window starts at `now`
    pub async fn create_pixel_at(&self, now: i64) -> Result<Pixel> {
        let id = PixelId::generate();
        let expires_at = now + i64::from(self.config.pixel_expiry_days) * MS_PER_DAY;

        let pixel = self
            .storage
            .create_pixel(id.as_str(), now, expires_at)
            .await
            .with_context(|| format!("Failed to create pixel {id}"))?;

        info!(pixel_id = %pixel.id, expires_at = pixel.expires_at, "created pixel");
        Ok(pixel)
    }

    pub async fn record_event(
        &self,
        pixel_id: &PixelId,
        ip: &str,
        user_agent: &str,
        query: &[(String, String)],
    ) -> Result<RecordOutcome> {
        self.record_event_at(pixel_id, ip, user_agent, query, now_millis())
            .await
    }

    /// Record a pixel load observed at `now`.
    ///
    /// Unknown and expired pixels are ignored without error.
    pub async fn record_event_at(
        &self,
        pixel_id: &PixelId,
        ip: &str,
        user_agent: &str,
        query: &[(String, String)],
        now: i64,
    ) -> Result<RecordOutcome> {
        let Some(pixel) = self.storage.get_pixel(pixel_id.as_str()).await? else {
            debug!(%pixel_id, "ignoring load of unknown pixel");
            return Ok(RecordOutcome::UnknownPixel);
        };

        if pixel.is_expired_at(now) {
            debug!(%pixel_id, "ignoring load of expired pixel");
            return Ok(RecordOutcome::Expired);
        }

        let ip_info = self.identity.classify(ip);
        let ua_info = user_agent::classify(user_agent);
        let (params, notes) = limit_params(collect_params(query), self.config.max_params);

        let event = NewEvent {
            pixel_id: pixel.id,
            timestamp: now,
            ip_hash: ip_info.ip_hash,
            country: Some(ip_info.country),
            region: Some(ip_info.region),
            browser: Some(ua_info.browser),
            os: Some(ua_info.os),
            device_type: Some(ua_info.device_type),
            params,
            notes,
        };

        let inserted = self
            .storage
            .create_event(&event)
            .await
            .with_context(|| format!("Failed to record event for pixel {pixel_id}"))?;

        if !inserted {
            debug!(%pixel_id, "pixel deleted before its event was written");
            return Ok(RecordOutcome::UnknownPixel);
        }

        Ok(RecordOutcome::Recorded)
    }

    /// Stats for a pixel, or `None` if it does not exist.
    ///
    /// Expired pixels remain queryable until swept.
    pub async fn get_stats(&self, pixel_id: &PixelId) -> Result<Option<PixelStats>> {
        let Some(pixel) = self.storage.get_pixel(pixel_id.as_str()).await? else {
            return Ok(None);
        };

        let events = self.storage.get_events_by_pixel(&pixel.id).await?;
        let aggregate = aggregate(&events);

        Ok(Some(PixelStats {
            pixel: (&pixel).into(),
            events: aggregate.events,
            summary: aggregate.summary,
        }))
    }

    /// Delete a pixel and its events. Returns false if it did not exist.
    pub async fn delete_pixel(&self, pixel_id: &PixelId) -> Result<bool> {
        if self.storage.get_pixel(pixel_id.as_str()).await?.is_none() {
            return Ok(false);
        }

        let deleted = self.storage.delete_pixel(pixel_id.as_str()).await?;
        if deleted {
            info!(%pixel_id, "deleted pixel");
        }
        Ok(deleted)
    }
}

/// Build event params from query pairs, keeping first-arrival key order.
///
/// A repeated key becomes an array of its values.
pub fn collect_params(query: &[(String, String)]) -> EventParams {
    let mut params = EventParams::new();

    for (key, value) in query {
        match params.get_mut(key) {
            None => {
                params.insert(key.clone(), Value::String(value.clone()));
            }
            Some(Value::Array(values)) => values.push(Value::String(value.clone())),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, Value::String(value.clone())]);
            }
        }
    }

    params
}

/// Keep at most `max_params` keys, returning a note when any were dropped.
pub fn limit_params(params: EventParams, max_params: usize) -> (EventParams, Option<String>) {
    let total = params.len();
    if total <= max_params {
        return (params, None);
    }

    let limited: EventParams = params.into_iter().take(max_params).collect();
    let note = format!("Only first {max_params} of {total} params saved");

    (limited, Some(note))
}
