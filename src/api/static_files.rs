use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use mime_guess::from_path;
use rust_embed::RustEmbed;
use std::path::{Component, PathBuf};
use std::sync::Arc;

use super::handlers::AppState;

#[derive(RustEmbed)]
#[folder = "frontend/dist"]
pub struct Assets;

/// Relative asset path with no parent or root components
fn sanitize(path: &str) -> Option<PathBuf> {
    let path = PathBuf::from(path.trim_start_matches('/'));
    if path.components().all(|c| matches!(c, Component::Normal(_))) {
        Some(path)
    } else {
        None
    }
}

/// Read an asset, preferring the on-disk directory when one is configured
async fn load_asset(path: &str, static_dir: Option<&str>) -> Option<Vec<u8>> {
    let relative = sanitize(path)?;

    if let Some(dir) = static_dir {
        if let Ok(content) = tokio::fs::read(PathBuf::from(dir).join(&relative)).await {
            return Some(content);
        }
    }

    Assets::get(path.trim_start_matches('/')).map(|file| file.data.into_owned())
}

pub async fn load_dashboard_template(static_dir: Option<&str>) -> Option<String> {
    let bytes = load_asset("index.html", static_dir).await?;
    String::from_utf8(bytes).ok()
}

/// `GET /frontend/{*path}`
pub async fn serve_frontend(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
) -> Response {
    match load_asset(&path, state.static_dir.as_deref()).await {
        Some(content) => {
            let mime = from_path(&path).first_or_octet_stream();
            ([(header::CONTENT_TYPE, mime.as_ref().to_string())], content).into_response()
        }
        None => (StatusCode::NOT_FOUND, "404 Not Found").into_response(),
    }
}
