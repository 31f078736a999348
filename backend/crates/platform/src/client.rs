//! Client identification utilities
//!
//! Common functions for identifying clients via HTTP headers.

use axum::http::{HeaderMap, header};
use std::net::IpAddr;

/// Maximum stored User-Agent length
const USER_AGENT_MAX_LEN: usize = 512;

/// Request provenance recorded alongside attendance and used for issuance limits
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientInfo {
    /// Client IP address (from X-Forwarded-For or direct connection)
    pub ip: Option<IpAddr>,
    /// User-Agent string, truncated
    pub user_agent: Option<String>,
}

impl ClientInfo {
    pub fn new(ip: Option<IpAddr>, user_agent: Option<String>) -> Self {
        Self { ip, user_agent }
    }

    /// Get IP as string (for storage and allowlist matching)
    pub fn ip_string(&self) -> Option<String> {
        self.ip.map(|ip| ip.to_string())
    }
}

/// Extract IP and User-Agent from a request
pub fn extract_client_info(headers: &HeaderMap, direct_ip: Option<IpAddr>) -> ClientInfo {
    ClientInfo::new(
        extract_client_ip(headers, direct_ip),
        extract_user_agent(headers),
    )
}

/// Extract client IP address from headers
///
/// Takes the first hop of X-Forwarded-For when it parses, otherwise the
/// transport peer. This trusts whatever reverse proxy sits in front of the
/// service; deployments without one must strip the header at the edge.
/// IPv4-mapped IPv6 addresses are returned as plain IPv4.
pub fn extract_client_ip(headers: &HeaderMap, direct_ip: Option<IpAddr>) -> Option<IpAddr> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|xff| xff.split(',').next())
        .and_then(|first| first.trim().parse::<IpAddr>().ok());

    forwarded.or(direct_ip).map(|ip| ip.to_canonical())
}

/// Extract the User-Agent header, truncated to a sane length
pub fn extract_user_agent(headers: &HeaderMap) -> Option<String> {
    let ua = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())?
        .trim();
    if ua.is_empty() {
        return None;
    }
    Some(ua.chars().take(USER_AGENT_MAX_LEN).collect())
}
