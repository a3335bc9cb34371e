use axum::{routing::get, Router};
use std::sync::Arc;

use crate::config::AnalyticsConfig;
use crate::service::TrackingService;

use super::handlers::{track_pixel, TrackerState};

/// Router for `/p/{pixelId}.gif`
///
/// Needs `ConnectInfo<SocketAddr>`, so serve it with
/// `into_make_service_with_connect_info`.
pub fn create_tracker_router(
    service: Arc<TrackingService>,
    analytics_config: AnalyticsConfig,
) -> Router {
    let state = Arc::new(TrackerState {
        service,
        analytics_config,
    });

    Router::new()
        .route("/p/{file}", get(track_pixel))
        .with_state(state)
}
