use anyhow::{bail, Context};
use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::str::FromStr;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    /// Base URL the pixel dashboard is reachable at (used for redirects)
    pub public_base_url: String,
    pub tracking: TrackingConfig,
    pub analytics: AnalyticsConfig,
    pub cache: CacheConfig,
    pub frontend: FrontendConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub backend: DatabaseBackend,
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    Sqlite,
    Postgres,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingConfig {
    /// Days a pixel accepts events after creation
    pub pixel_expiry_days: u32,
    /// Maximum number of distinct query parameters kept per event
    pub max_params: usize,
    /// Minutes between expired-pixel sweeps
    pub cleanup_interval_minutes: u64,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            pixel_expiry_days: 7,
            max_params: 10,
            cleanup_interval_minutes: 60,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustedProxyMode {
    /// Use the socket peer address only
    #[default]
    None,
    /// Trust `CF-Connecting-IP`
    Cloudflare,
    /// Trust `Forwarded` / `X-Forwarded-For`
    Standard,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    /// Path to a MaxMind GeoLite2-City / GeoIP2-City database
    pub geoip_db_path: Option<String>,
    /// When set, IP hashes are HMAC-SHA256 keyed by this salt
    pub ip_hash_salt: Option<String>,
    pub trusted_proxy_mode: TrustedProxyMode,
    pub trusted_proxies: Vec<IpNet>,
    pub num_trusted_proxies: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub max_entries: u64,
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            ttl_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FrontendConfig {
    /// Path to directory containing the dashboard files
    /// If None, uses the embedded dashboard
    pub static_dir: Option<String>,
}

/// Read an optional variable and parse it, naming the variable on failure.
fn parse_env<T>(key: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .with_context(|| format!("{key} has an invalid value: {raw}")),
        _ => Ok(None),
    }
}

/// Longest accepted sweep interval: one year
pub const MAX_CLEANUP_INTERVAL_MINUTES: u64 = 365 * 24 * 60;

fn validate_cleanup_interval(minutes: u64) -> anyhow::Result<u64> {
    if minutes == 0 {
        bail!("CLEANUP_INTERVAL_MINUTES must be at least 1");
    }
    if minutes > MAX_CLEANUP_INTERVAL_MINUTES {
        bail!(
            "CLEANUP_INTERVAL_MINUTES must be at most {MAX_CLEANUP_INTERVAL_MINUTES}, got {minutes}"
        );
    }
    Ok(minutes)
}

/// Parse a comma-separated list of CIDR ranges or bare addresses.
pub fn parse_trusted_proxies(raw: &str) -> anyhow::Result<Vec<IpNet>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|entry| {
            entry
                .parse::<IpNet>()
                .or_else(|_| entry.parse::<IpAddr>().map(IpNet::from))
                .with_context(|| format!("TRUSTED_PROXIES entry is not a CIDR or IP: {entry}"))
        })
        .collect()
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let backend_str =
            std::env::var("DATABASE_BACKEND").unwrap_or_else(|_| "sqlite".to_string());

        let backend = match backend_str.to_lowercase().as_str() {
            "postgres" | "postgresql" => DatabaseBackend::Postgres,
            "sqlite" => DatabaseBackend::Sqlite,
            other => {
                tracing::warn!(
                    "Unknown DATABASE_BACKEND '{other}', falling back to 'sqlite'. Supported values: sqlite, postgres"
                );
                DatabaseBackend::Sqlite
            }
        };

        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./beacon.db?mode=rwc".to_string());
        let max_connections = parse_env::<u32>("DATABASE_MAX_CONNECTIONS")?.unwrap_or(10);

        let host = std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = parse_env::<u16>("PORT")?.unwrap_or(3000);

        let public_base_url = std::env::var("PUBLIC_BASE_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_else(|_| format!("http://{host}:{port}"));

        let defaults = TrackingConfig::default();
        let pixel_expiry_days =
            parse_env::<u32>("PIXEL_EXPIRY_DAYS")?.unwrap_or(defaults.pixel_expiry_days);
        if pixel_expiry_days == 0 {
            bail!("PIXEL_EXPIRY_DAYS must be at least 1");
        }
        let max_params = parse_env::<usize>("MAX_PARAMS")?.unwrap_or(defaults.max_params);
        let cleanup_interval_minutes = validate_cleanup_interval(
            parse_env::<u64>("CLEANUP_INTERVAL_MINUTES")?
                .unwrap_or(defaults.cleanup_interval_minutes),
        )?;

        let trusted_proxy_mode = match std::env::var("TRUSTED_PROXY_MODE")
            .unwrap_or_else(|_| "none".to_string())
            .to_lowercase()
            .as_str()
        {
            "none" => TrustedProxyMode::None,
            "cloudflare" => TrustedProxyMode::Cloudflare,
            "standard" => TrustedProxyMode::Standard,
            other => {
                tracing::warn!(
                    "Unknown TRUSTED_PROXY_MODE '{other}', falling back to 'none'. Supported values: none, standard, cloudflare"
                );
                TrustedProxyMode::None
            }
        };

        let trusted_proxies = match std::env::var("TRUSTED_PROXIES") {
            Ok(raw) => parse_trusted_proxies(&raw)?,
            Err(_) => Vec::new(),
        };

        let cache_defaults = CacheConfig::default();

        Ok(Config {
            database: DatabaseConfig {
                backend,
                url: database_url,
                max_connections,
            },
            server: ServerConfig { host, port },
            public_base_url,
            tracking: TrackingConfig {
                pixel_expiry_days,
                max_params,
                cleanup_interval_minutes,
            },
            analytics: AnalyticsConfig {
                geoip_db_path: std::env::var("GEOIP_DB_PATH").ok().filter(|p| !p.is_empty()),
                ip_hash_salt: std::env::var("IP_HASH_SALT").ok().filter(|s| !s.is_empty()),
                trusted_proxy_mode,
                trusted_proxies,
                num_trusted_proxies: parse_env::<usize>("NUM_TRUSTED_PROXIES")?,
            },
            cache: CacheConfig {
                max_entries: parse_env::<u64>("CACHE_MAX_ENTRIES")?
                    .unwrap_or(cache_defaults.max_entries),
                ttl_secs: parse_env::<u64>("CACHE_TTL_SECS")?.unwrap_or(cache_defaults.ttl_secs),
            },
            frontend: FrontendConfig {
                static_dir: std::env::var("FRONTEND_STATIC_DIR").ok(),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_trusted_proxies_mixed() {
        let nets = parse_trusted_proxies("10.0.0.0/8, 192.168.1.5 ,,2001:db8::/32").unwrap();
        assert_eq!(nets.len(), 3);
        assert!(nets[1].contains(&"192.168.1.5".parse::<IpAddr>().unwrap()));
        assert!(!nets[1].contains(&"192.168.1.6".parse::<IpAddr>().unwrap()));
    }

    #[test]
    fn test_parse_trusted_proxies_rejects_garbage() {
        assert!(parse_trusted_proxies("10.0.0.0/8,not-an-ip").is_err());
    }

    #[test]
    fn test_cleanup_interval_bounds() {
        assert_eq!(validate_cleanup_interval(1).unwrap(), 1);
        assert_eq!(
            validate_cleanup_interval(MAX_CLEANUP_INTERVAL_MINUTES).unwrap(),
            MAX_CLEANUP_INTERVAL_MINUTES
        );
        assert!(validate_cleanup_interval(0).is_err());
        assert!(validate_cleanup_interval(MAX_CLEANUP_INTERVAL_MINUTES + 1).is_err());
        assert!(validate_cleanup_interval(u64::MAX).is_err());
    }

    #[test]
    fn test_tracking_defaults() {
        let tracking = TrackingConfig::default();
        assert_eq!(tracking.pixel_expiry_days, 7);
        assert_eq!(tracking.max_params, 10);
        assert_eq!(tracking.cleanup_interval_minutes, 60);
    }
}
