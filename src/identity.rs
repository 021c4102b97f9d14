//! Identity extraction from request headers.
//!
//! A request is limited by its API token when one is present and by its
//! client IP otherwise. The IP comes from the first proxy header found, in
//! this order: `X-Forwarded-For` (first entry), `X-Real-IP`, `X-Client-IP`,
//! then the socket peer address.
//!
//! These headers are supplied by the client and can be forged; deployments
//! that need a trustworthy IP must strip them at the edge proxy.

use http::HeaderMap;
use std::net::SocketAddr;

use crate::limiter::LimitType;

pub const DEFAULT_TOKEN_HEADER: &str = "API_KEY";
pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";
pub const REAL_IP_HEADER: &str = "x-real-ip";
pub const CLIENT_IP_HEADER: &str = "x-client-ip";

/// Fallback identity when no address can be determined
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Trim a raw token header value. An empty result means "no token".
pub fn extract_token(header_value: Option<&str>) -> String {
    header_value.map(str::trim).unwrap_or_default().to_string()
}

/// Read the token from `header_name`, if present and non-blank
pub fn token_from_headers(headers: &HeaderMap, header_name: &str) -> Option<String> {
    let token = extract_token(header_str(headers, header_name));
    (!token.is_empty()).then_some(token)
}

/// Resolve the client IP from proxy headers, falling back to `remote_addr`
pub fn resolve_client_ip(headers: &HeaderMap, remote_addr: Option<SocketAddr>) -> String {
    if let Some(forwarded) = non_empty(headers, FORWARDED_FOR_HEADER) {
        let first = forwarded.split(',').next().unwrap_or_default().trim();
        if !first.is_empty() {
            return first.to_string();
        }
    }
    if let Some(ip) = non_empty(headers, REAL_IP_HEADER) {
        return ip.to_string();
    }
    if let Some(ip) = non_empty(headers, CLIENT_IP_HEADER) {
        return ip.to_string();
    }

    remote_addr
        .map(|addr| addr.to_string())
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

/// Pick the identity and quota for a request. A token always wins over
/// the client IP.
pub fn resolve_identity(
    headers: &HeaderMap,
    remote_addr: Option<SocketAddr>,
    token_header: &str,
) -> (String, LimitType) {
    match token_from_headers(headers, token_header) {
        Some(token) => (token, LimitType::Token),
        None => (resolve_client_ip(headers, remote_addr), LimitType::Ip),
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn non_empty<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    header_str(headers, name)
        .map(str::trim)
        .filter(|v| !v.is_empty())
}
