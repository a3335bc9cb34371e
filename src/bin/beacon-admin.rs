use anyhow::{Context, Result};
use chrono::{TimeZone, Utc};
use clap::{Parser, Subcommand};
use std::sync::Arc;

use beacon::analytics::{GeoIpService, IdentityClassifier};
use beacon::config::{Config, DatabaseBackend};
use beacon::models::PixelId;
use beacon::service::{now_millis, CleanupSweeper, TrackingService};
use beacon::storage::{PostgresStorage, SqliteStorage, Storage};

#[derive(Parser)]
#[command(name = "beacon-admin")]
#[command(about = "Beacon pixel management CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new tracking pixel
    Create,
    /// Print a pixel's stats as JSON
    Stats {
        /// Pixel ID (UUID)
        pixel_id: String,
    },
    /// Delete a pixel and all of its events
    Delete {
        /// Pixel ID (UUID)
        pixel_id: String,
    },
    /// List all pixels
    List,
    /// Delete every expired pixel now
    Sweep,
}

fn format_millis(ms: i64) -> String {
    Utc.timestamp_millis_opt(ms)
        .single()
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| ms.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    let storage: Arc<dyn Storage> = match config.database.backend {
        DatabaseBackend::Sqlite => Arc::new(
            SqliteStorage::new(&config.database.url, config.database.max_connections).await?,
        ),
        DatabaseBackend::Postgres => Arc::new(
            PostgresStorage::new(&config.database.url, config.database.max_connections).await?,
        ),
    };

    // Ensure database is initialized
    storage.init().await?;

    let identity = IdentityClassifier::new(
        Arc::new(GeoIpService::disabled()),
        config.analytics.ip_hash_salt.as_deref(),
    )?;
    let service = TrackingService::new(Arc::clone(&storage), identity, config.tracking.clone());

    match cli.command {
        Commands::Create => {
            let pixel = service.create_pixel().await?;
            println!("✓ Created pixel {}", pixel.id);
            println!("  Embed:     {}/p/{}.gif", config.public_base_url, pixel.id);
            println!("  Dashboard: {}/{}", config.public_base_url, pixel.id);
            println!("  Expires:   {}", format_millis(pixel.expires_at));
        }
        Commands::Stats { pixel_id } => {
            let pixel_id = PixelId::parse(&pixel_id)?;
            match service.get_stats(&pixel_id).await? {
                Some(stats) => {
                    let json = serde_json::to_string_pretty(&stats)
                        .context("Failed to serialize stats")?;
                    println!("{}", json);
                }
                None => println!("⚠ Pixel '{}' not found", pixel_id),
            }
        }
        Commands::Delete { pixel_id } => {
            let pixel_id = PixelId::parse(&pixel_id)?;
            if service.delete_pixel(&pixel_id).await? {
                println!("✓ Deleted pixel '{}'", pixel_id);
            } else {
                println!("⚠ Pixel '{}' not found", pixel_id);
            }
        }
        Commands::List => {
            let pixels = storage.list_pixels().await?;
            if pixels.is_empty() {
                println!("No pixels found.");
            } else {
                let now = now_millis();
                println!("{:<38} {:<27} {:>8} {}", "Pixel ID", "Expires", "Events", "Status");
                println!("{}", "-".repeat(86));
                for pixel in pixels {
                    let events = storage.count_events(&pixel.id).await?;
                    let status = if pixel.is_expired_at(now) {
                        "expired"
                    } else {
                        "active"
                    };
                    println!(
                        "{:<38} {:<27} {:>8} {}",
                        pixel.id,
                        format_millis(pixel.expires_at),
                        events,
                        status
                    );
                }
            }
        }
        Commands::Sweep => {
            let sweeper = CleanupSweeper::from_minutes(
                Arc::clone(&storage),
                config.tracking.cleanup_interval_minutes,
            );
            let deleted = sweeper.sweep_once(now_millis()).await?;
            println!("✓ Deleted {} expired pixel(s)", deleted);
        }
    }

    Ok(())
}
