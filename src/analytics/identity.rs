//! Visitor identity derived from the client IP
//!
//! The raw address is never stored: events carry a one-way digest plus the
//! coarse location resolved from it.

use anyhow::{anyhow, Result};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::net::IpAddr;
use std::sync::Arc;

use crate::analytics::geoip::GeoIpService;
use crate::analytics::models::IpInfo;

pub const UNKNOWN: &str = "Unknown";

#[derive(Clone)]
pub struct IdentityClassifier {
    geoip: Arc<GeoIpService>,
    /// Pre-keyed MAC, cloned per hash
    keyed: Option<Hmac<Sha256>>,
}

impl IdentityClassifier {
    pub fn new(geoip: Arc<GeoIpService>, salt: Option<&str>) -> Result<Self> {
        let keyed = match salt {
            Some(salt) => Some(
                Hmac::<Sha256>::new_from_slice(salt.as_bytes())
                    .map_err(|e| anyhow!("Failed to create HMAC: {}", e))?,
            ),
            None => None,
        };

        Ok(Self { geoip, keyed })
    }

    /// Hash and geolocate a client IP string.
    ///
    /// Malformed input is hashed as-is and resolves to an unknown location.
    pub fn classify(&self, ip: &str) -> IpInfo {
        let location = match ip.trim().parse::<IpAddr>() {
            Ok(addr) => self.geoip.lookup(addr),
            Err(_) => {
                tracing::debug!("client IP is not an address, skipping geolocation");
                Default::default()
            }
        };

        IpInfo {
            ip_hash: self.hash_ip(ip),
            country: location.country.unwrap_or_else(|| UNKNOWN.to_string()),
            region: location.region.unwrap_or_else(|| UNKNOWN.to_string()),
        }
    }

    /// Lowercase hex SHA-256 of the IP, or HMAC-SHA256 when a salt is set.
    pub fn hash_ip(&self, ip: &str) -> String {
        match &self.keyed {
            Some(keyed) => {
                let mut mac = keyed.clone();
                mac.update(ip.as_bytes());
                hex::encode(mac.finalize().into_bytes())
            }
            None => hex::encode(Sha256::digest(ip.as_bytes())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier(salt: Option<&str>) -> IdentityClassifier {
        IdentityClassifier::new(Arc::new(GeoIpService::disabled()), salt).unwrap()
    }

    #[test]
    fn test_hash_is_plain_sha256_hex() {
        // sha256("127.0.0.1")
        assert_eq!(
            classifier(None).hash_ip("127.0.0.1"),
            "12ca17b49af2289436f303e0166030a21e525d266e209267433801a8fd4071a0"
        );
    }

    #[test]
    fn test_hash_is_deterministic_and_hides_input() {
        let c = classifier(None);
        let first = c.hash_ip("203.0.113.9");
        assert_eq!(first, c.hash_ip("203.0.113.9"));
        assert_ne!(first, c.hash_ip("203.0.113.10"));
        assert_eq!(first.len(), 64);
        assert!(!first.contains("203"));
    }

    #[test]
    fn test_salt_changes_digest() {
        let plain = classifier(None).hash_ip("198.51.100.7");
        let salted = classifier(Some("pepper")).hash_ip("198.51.100.7");
        let other_salt = classifier(Some("paprika")).hash_ip("198.51.100.7");

        assert_ne!(plain, salted);
        assert_ne!(salted, other_salt);
        assert_eq!(salted, classifier(Some("pepper")).hash_ip("198.51.100.7"));
    }

    #[test]
    fn test_unresolvable_ip_yields_unknown_location() {
        let info = classifier(None).classify("8.8.8.8");
        assert_eq!(info.country, UNKNOWN);
        assert_eq!(info.region, UNKNOWN);
    }

    #[test]
    fn test_malformed_ip_is_hashed_as_is() {
        let c = classifier(None);
        let info = c.classify("not an ip");
        assert_eq!(info.ip_hash, c.hash_ip("not an ip"));
        assert_eq!(info.country, UNKNOWN);
    }
}
