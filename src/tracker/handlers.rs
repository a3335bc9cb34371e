use axum::{
    extract::{rejection::QueryRejection, ConnectInfo, Path, Query, State},
    http::{header, HeaderMap},
    response::IntoResponse,
};
use std::net::SocketAddr;
use std::sync::Arc;

use crate::analytics::extract_client_ip;
use crate::config::AnalyticsConfig;
use crate::models::PixelId;
use crate::service::{RecordOutcome, TrackingService};

/// 1x1 GIF served for every pixel load
pub const PIXEL_GIF: [u8; 35] = [
    0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x01, 0x00, 0x01, 0x00, 0x80, 0x01, 0x00, 0xff, 0xff,
    0xff, 0x00, 0x00, 0x00, 0x2c, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x02,
    0x02, 0x44, 0x01, 0x00, 0x3b,
];

pub struct TrackerState {
    pub service: Arc<TrackingService>,
    pub analytics_config: AnalyticsConfig,
}

fn gif_response() -> impl IntoResponse {
    (
        [
            (header::CONTENT_TYPE, "image/gif"),
            (header::CACHE_CONTROL, "no-cache, no-store, must-revalidate"),
        ],
        PIXEL_GIF.as_slice(),
    )
}

/// Strip the `.gif` suffix from the requested file name
fn pixel_id_from_file(file: &str) -> Option<PixelId> {
    file.strip_suffix(".gif")
        .and_then(|id| PixelId::parse(id).ok())
}

/// Record a pixel load and serve the GIF
///
/// The GIF is returned whatever happens: malformed ids, unknown or expired
/// pixels, and storage failures never surface to the embedding page.
pub async fn track_pixel(
    State(state): State<Arc<TrackerState>>,
    Path(file): Path<String>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    query: Result<Query<Vec<(String, String)>>, QueryRejection>,
) -> impl IntoResponse {
    let Some(pixel_id) = pixel_id_from_file(&file) else {
        tracing::debug!(file = %file, "pixel request with malformed id");
        return gif_response();
    };

    let params = match query {
        Ok(Query(params)) => params,
        Err(e) => {
            tracing::debug!(%pixel_id, error = %e, "unparseable pixel query string");
            Vec::new()
        }
    };

    let client_ip = extract_client_ip(&headers, addr.ip(), &state.analytics_config);
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("");

    match state
        .service
        .record_event(&pixel_id, &client_ip.to_string(), user_agent, &params)
        .await
    {
        Ok(RecordOutcome::Recorded) => {
            tracing::debug!(%pixel_id, "recorded pixel load");
        }
        Ok(_) => {}
        Err(err) => {
            tracing::warn!(%pixel_id, error = %err, "failed to record pixel load");
        }
    }

    gif_response()
}
