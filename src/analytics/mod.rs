//! Visitor analytics
//!
//! Enrichment of pixel loads (hashed identity, geolocation, user-agent
//! classification) and the per-pixel aggregation behind the stats endpoint.

pub mod aggregator;
pub mod geoip;
pub mod identity;
pub mod ip_extractor;
pub mod models;
pub mod user_agent;

pub use aggregator::{aggregate, AnalyticsAggregator};
pub use geoip::GeoIpService;
pub use identity::IdentityClassifier;
pub use ip_extractor::extract_client_ip;
pub use models::{
    EventAggregate, GeoLocation, IpInfo, ParameterRow, PixelMetadata, PixelStats, PublicEvent,
    StatsSummary, UserAgentInfo,
};
