//! GeoIP lookup service using MaxMind GeoLite2/GeoIP2 MMDB
//!
//! Lookups are best-effort: a missing database, an address without a record,
//! or a decode failure all produce an empty [`GeoLocation`].

use anyhow::{Context, Result};
use maxminddb::{geoip2, Mmap, Reader};
use std::net::IpAddr;
use std::sync::Arc;

use crate::analytics::models::GeoLocation;

/// GeoIP lookup service backed by a memory-mapped City database
#[derive(Clone, Default)]
pub struct GeoIpService {
    city_reader: Option<Arc<Reader<Mmap>>>,
}

impl GeoIpService {
    /// Create a new GeoIP service
    ///
    /// # Arguments
    /// * `city_path` - Optional path to the MaxMind GeoLite2-City or GeoIP2-City .mmdb file
    ///
    /// Without a path every lookup resolves to an empty location.
    pub fn new(city_path: Option<&str>) -> Result<Self> {
        let city_reader = if let Some(path) = city_path {
            let reader = unsafe { Reader::open_mmap(path) }
                .with_context(|| format!("Failed to open GeoIP City database at {}", path))?;
            Some(Arc::new(reader))
        } else {
            None
        };

        Ok(Self { city_reader })
    }

    /// A service with no database attached
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.city_reader.is_some()
    }

    /// Lookup country and region for an IP address
    pub fn lookup(&self, ip: IpAddr) -> GeoLocation {
        let mut geo_location = GeoLocation::default();

        let Some(ref reader) = self.city_reader else {
            return geo_location;
        };

        if let Ok(result) = reader.lookup(ip) {
            if let Ok(Some(city)) = result.decode::<geoip2::City>() {
                Self::extract_from_city(&city, &mut geo_location);
            } else if let Ok(Some(country)) = result.decode::<geoip2::Country>() {
                // Country-only databases share the country layout
                geo_location.country = country.country.iso_code.map(|s| s.to_string());
            }
        }

        geo_location
    }

    fn extract_from_city(city: &geoip2::City, geo_location: &mut GeoLocation) {
        geo_location.country = city.country.iso_code.map(|s| s.to_string());

        if let Some(subdivision) = city.subdivisions.first() {
            geo_location.region = subdivision
                .iso_code
                .or(subdivision.names.english)
                .map(|s| s.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geoip_service_creation_invalid_path() {
        let result = GeoIpService::new(Some("/nonexistent/path.mmdb"));
        assert!(result.is_err());
    }

    #[test]
    fn test_geoip_service_without_database_resolves_nothing() {
        let service = GeoIpService::new(None).unwrap();
        assert!(!service.is_enabled());

        let location = service.lookup("8.8.8.8".parse().unwrap());
        assert_eq!(location.country, None);
        assert_eq!(location.region, None);
    }
}
