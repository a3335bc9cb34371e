use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::config::FrontendConfig;
use crate::service::TrackingService;

use super::handlers::{create_pixel, dashboard, delete_pixel, get_stats, health_check, AppState};
use super::static_files::serve_frontend;

pub fn create_api_router(
    service: Arc<TrackingService>,
    public_base_url: String,
    frontend_config: FrontendConfig,
) -> Router {
    let state = Arc::new(AppState {
        service,
        public_base_url,
        static_dir: frontend_config.static_dir,
    });

    // Stats are fetched cross-origin by embedding pages
    let stats_routes = Router::new()
        .route("/stats/{id}", get(get_stats))
        .layer(CorsLayer::permissive())
        .with_state(Arc::clone(&state));

    Router::new()
        .route("/", get(create_pixel))
        .route("/create-pixel", get(create_pixel))
        .route("/health", get(health_check))
        .route("/delete/{id}", post(delete_pixel))
        .route("/frontend/{*path}", get(serve_frontend))
        .route("/{id}", get(dashboard))
        .with_state(state)
        .merge(stats_routes)
}
