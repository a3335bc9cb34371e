use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    Json,
};
use serde::Serialize;
use std::sync::Arc;

use crate::analytics::PixelStats;
use crate::models::PixelId;
use crate::service::TrackingService;

use super::static_files::load_dashboard_template;

/// Placeholder in `index.html` replaced with the page's initial data
pub const DASHBOARD_DATA_PLACEHOLDER: &str = "__BEACON_DATA__";

pub struct AppState {
    pub service: Arc<TrackingService>,
    pub public_base_url: String,
    pub static_dir: Option<String>,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub message: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DashboardData<'a> {
    pixel_id: &'a str,
    stats: Option<PixelStats>,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

fn parse_pixel_id(raw: &str) -> Result<PixelId, ApiError> {
    PixelId::parse(raw).map_err(|_| error(StatusCode::BAD_REQUEST, "Invalid pixel ID"))
}

/// Create a pixel and send the browser to its dashboard
pub async fn create_pixel(State(state): State<Arc<AppState>>) -> Result<Redirect, ApiError> {
    match state.service.create_pixel().await {
        Ok(pixel) => Ok(Redirect::to(&format!(
            "{}/{}",
            state.public_base_url, pixel.id
        ))),
        Err(e) => {
            tracing::error!(error = %e, "failed to create pixel");
            Err(error(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to create pixel: {}", e),
            ))
        }
    }
}

/// Aggregated stats for one pixel
pub async fn get_stats(
    State(state): State<Arc<AppState>>,
    Path(raw_id): Path<String>,
) -> Result<Json<PixelStats>, ApiError> {
    let pixel_id = parse_pixel_id(&raw_id)?;

    match state.service.get_stats(&pixel_id).await {
        Ok(Some(stats)) => Ok(Json(stats)),
        Ok(None) => Err(error(StatusCode::NOT_FOUND, "Pixel not found")),
        Err(e) => {
            tracing::error!(%pixel_id, error = %e, "failed to load pixel stats");
            Err(error(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to get stats: {}", e),
            ))
        }
    }
}

/// Delete a pixel together with its events
pub async fn delete_pixel(
    State(state): State<Arc<AppState>>,
    Path(raw_id): Path<String>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let pixel_id = parse_pixel_id(&raw_id)?;

    match state.service.delete_pixel(&pixel_id).await {
        Ok(true) => Ok(Json(SuccessResponse { success: true })),
        Ok(false) => Err(error(StatusCode::NOT_FOUND, "Pixel not found")),
        Err(e) => {
            tracing::error!(%pixel_id, error = %e, "failed to delete pixel");
            Err(error(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to delete pixel: {}", e),
            ))
        }
    }
}

/// Dashboard page with the pixel's stats inlined.
///
/// A malformed or unknown id still renders the page, with `stats: null`.
pub async fn dashboard(
    State(state): State<Arc<AppState>>,
    Path(raw_id): Path<String>,
) -> Response {
    let stats = match PixelId::parse(&raw_id) {
        Ok(pixel_id) => match state.service.get_stats(&pixel_id).await {
            Ok(stats) => stats,
            Err(e) => {
                tracing::error!(%pixel_id, error = %e, "failed to load dashboard stats");
                return error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Failed to get stats: {}", e),
                )
                .into_response();
            }
        },
        Err(_) => None,
    };

    let data = DashboardData {
        pixel_id: &raw_id,
        stats,
    };

    let template = match load_dashboard_template(state.static_dir.as_deref()).await {
        Some(template) => template,
        None => {
            tracing::error!("dashboard template index.html is missing");
            return error(StatusCode::INTERNAL_SERVER_ERROR, "Dashboard unavailable")
                .into_response();
        }
    };

    match render_dashboard(&template, &data) {
        Ok(page) => Html(page).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to serialize dashboard data");
            error(StatusCode::INTERNAL_SERVER_ERROR, "Dashboard unavailable").into_response()
        }
    }
}

/// Inline `data` as JSON into the template, safe inside a `<script>` element
fn render_dashboard<T: Serialize>(template: &str, data: &T) -> serde_json::Result<String> {
    let json = serde_json::to_string(data)?.replace('<', "\\u003c");
    Ok(template.replace(DASHBOARD_DATA_PLACEHOLDER, &json))
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        message: "OK".to_string(),
    })
}
