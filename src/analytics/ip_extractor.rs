//! Client IP extraction from HTTP headers with trust validation
//!
//! This module implements client IP extraction that:
//! - Validates trust chains for X-Forwarded-For and Forwarded headers
//! - Supports vendor-specific headers (e.g., CF-Connecting-IP)
//! - Falls back to socket remote address when headers are untrusted
//! - Handles both IPv4 and IPv6

use axum::http::HeaderMap;
use std::net::IpAddr;
use tracing::warn;

use crate::config::{AnalyticsConfig, TrustedProxyMode};

/// Extract the client IP address from HTTP headers
///
/// # Arguments
/// * `headers` - HTTP request headers
/// * `socket_addr` - The socket remote address (fallback)
/// * `config` - Analytics configuration with trust settings
pub fn extract_client_ip(
    headers: &HeaderMap,
    socket_addr: IpAddr,
    config: &AnalyticsConfig,
) -> IpAddr {
    match config.trusted_proxy_mode {
        TrustedProxyMode::Cloudflare => extract_cloudflare_ip(headers).unwrap_or_else(|| {
            warn!("CF-Connecting-IP header missing in Cloudflare mode, using socket address");
            socket_addr
        }),
        TrustedProxyMode::Standard => {
            // With an explicit proxy list, only a trusted peer may speak for the client
            if !config.trusted_proxies.is_empty() && !is_trusted(socket_addr, config) {
                return socket_addr;
            }
            extract_standard_ip(headers, config).unwrap_or(socket_addr)
        }
        TrustedProxyMode::None => socket_addr,
    }
}

fn is_trusted(ip: IpAddr, config: &AnalyticsConfig) -> bool {
    config.trusted_proxies.iter().any(|net| net.contains(&ip))
}

/// Extract IP from Cloudflare-specific header
fn extract_cloudflare_ip(headers: &HeaderMap) -> Option<IpAddr> {
    headers
        .get("cf-connecting-ip")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.trim().parse::<IpAddr>().ok())
}

/// Extract IP from standard headers (Forwarded, X-Forwarded-For) with trust validation
fn extract_standard_ip(headers: &HeaderMap, config: &AnalyticsConfig) -> Option<IpAddr> {
    // Prefer RFC 7239 Forwarded header
    let chain = forwarded_chain(headers)
        .filter(|ips| !ips.is_empty())
        .or_else(|| x_forwarded_for_chain(headers))?;

    select_from_chain(&chain, config)
}

/// Addresses from the RFC 7239 `Forwarded` header, left to right
///
/// `Forwarded: for=192.0.2.60;proto=http, for="[2001:db8::1]:4711"`
fn forwarded_chain(headers: &HeaderMap) -> Option<Vec<IpAddr>> {
    let forwarded = headers.get("forwarded")?.to_str().ok()?;

    let ips = forwarded
        .split(',')
        .filter_map(|element| {
            element.split(';').find_map(|param| {
                let param = param.trim();
                let (key, value) = param.split_once('=')?;
                if !key.trim().eq_ignore_ascii_case("for") {
                    return None;
                }
                parse_forwarded_node(value.trim().trim_matches('"'))
            })
        })
        .collect();

    Some(ips)
}

/// Parse a `Forwarded` node: `1.2.3.4`, `1.2.3.4:80`, `[::1]` or `[::1]:80`
fn parse_forwarded_node(node: &str) -> Option<IpAddr> {
    if let Some(rest) = node.strip_prefix('[') {
        return rest.split(']').next()?.parse().ok();
    }
    node.parse()
        .ok()
        .or_else(|| node.rsplit_once(':')?.0.parse().ok())
}

/// Addresses from `X-Forwarded-For`, left to right
fn x_forwarded_for_chain(headers: &HeaderMap) -> Option<Vec<IpAddr>> {
    let xff = headers.get("x-forwarded-for")?.to_str().ok()?;

    let ips: Vec<IpAddr> = xff
        .split(',')
        .filter_map(|s| s.trim().parse::<IpAddr>().ok())
        .collect();

    if ips.is_empty() {
        None
    } else {
        Some(ips)
    }
}

/// Pick the client address from a proxy chain using right-to-left trust
fn select_from_chain(ips: &[IpAddr], config: &AnalyticsConfig) -> Option<IpAddr> {
    // If num_trusted_proxies is specified, skip that many from the right
    if let Some(num_trusted) = config.num_trusted_proxies {
        if ips.len() > num_trusted {
            return Some(ips[ips.len() - num_trusted - 1]);
        }
        // Not enough IPs in chain, return the leftmost (least trusted)
        return ips.first().copied();
    }

    // Walk from the right, skipping our own proxies
    if !config.trusted_proxies.is_empty() {
        return ips
            .iter()
            .rev()
            .find(|ip| !is_trusted(**ip, config))
            .or_else(|| ips.first())
            .copied();
    }

    // No trust configuration, return the rightmost IP
    ips.last().copied()
}
