use anyhow::Result;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use beacon::analytics::{GeoIpService, IdentityClassifier};
use beacon::api;
use beacon::config::{Config, DatabaseBackend};
use beacon::service::{CleanupSweeper, TrackingService};
use beacon::storage::{CachedStorage, PostgresStorage, SqliteStorage, Storage};
use beacon::tracker;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("beacon=info")),
        )
        .init();

    let config = Config::from_env()?;
    info!("Loaded configuration");

    let backend: Arc<dyn Storage> = match config.database.backend {
        DatabaseBackend::Sqlite => {
            info!("Using SQLite storage: {}", config.database.url);
            Arc::new(
                SqliteStorage::new(&config.database.url, config.database.max_connections).await?,
            )
        }
        DatabaseBackend::Postgres => {
            info!("Using PostgreSQL storage: {}", config.database.url);
            Arc::new(
                PostgresStorage::new(&config.database.url, config.database.max_connections)
                    .await?,
            )
        }
    };

    let storage: Arc<dyn Storage> = Arc::new(CachedStorage::new(
        backend,
        config.cache.max_entries,
        config.cache.ttl_secs,
    ));

    info!("Initializing database...");
    storage.init().await?;
    info!("Database initialized successfully");

    let geoip = match config.analytics.geoip_db_path.as_deref() {
        Some(path) => {
            let service = GeoIpService::new(Some(path))?;
            info!("GeoIP lookups enabled using {}", path);
            service
        }
        None => {
            info!("GEOIP_DB_PATH not set; country and region will be Unknown");
            GeoIpService::disabled()
        }
    };
    let identity = IdentityClassifier::new(
        Arc::new(geoip),
        config.analytics.ip_hash_salt.as_deref(),
    )?;

    let service = Arc::new(TrackingService::new(
        Arc::clone(&storage),
        identity,
        config.tracking.clone(),
    ));

    let cleanup = CleanupSweeper::from_minutes(
        Arc::clone(&storage),
        config.tracking.cleanup_interval_minutes,
    )
    .start();

    let app = Router::new()
        .merge(tracker::create_tracker_router(
            Arc::clone(&service),
            config.analytics.clone(),
        ))
        .merge(api::create_api_router(
            Arc::clone(&service),
            config.public_base_url.clone(),
            config.frontend.clone(),
        ));

    if let Some(ref static_dir) = config.frontend.static_dir {
        info!("Serving dashboard from directory: {}", static_dir);
    } else {
        info!("Serving embedded dashboard");
    }

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Beacon listening on http://{}", addr);
    info!("   - Create a pixel at {}/create-pixel", config.public_base_url);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    cleanup.stop().await;
    info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
