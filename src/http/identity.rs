//! Client identity extraction.
//!
//! A request is rate limited either by its API token (when the `API_KEY`
//! header is present) or by its client IP address.

use axum::http::HeaderMap;
use std::net::{IpAddr, SocketAddr};

/// Header carrying the caller's API token.
pub const API_KEY_HEADER: &str = "api_key";

/// Prefix marking a rate limit key as a token key.
pub const TOKEN_KEY_PREFIX: &str = "token:";

/// Forwarding headers consulted for the client IP, in priority order.
const FORWARDED_IP_HEADERS: [&str; 3] = [X_FORWARDED_FOR, "x-real-ip", "cf-connecting-ip"];

const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Used when neither the headers nor the connection reveal an address.
const UNKNOWN_CLIENT: &str = "unknown";

/// Determine the client IP for a request.
///
/// The first valid address wins, checking the first entry of
/// `X-Forwarded-For`, then `X-Real-IP`, then `CF-Connecting-IP`, and finally
/// the peer address of the connection.
pub fn client_ip(headers: &HeaderMap, remote: Option<SocketAddr>) -> String {
    for name in FORWARDED_IP_HEADERS {
        let value = headers.get(name).and_then(|v| v.to_str().ok());
        // only X-Forwarded-For carries a proxy chain
        let candidate = if name == X_FORWARDED_FOR {
            value.and_then(|v| v.split(',').next())
        } else {
            value
        }
        .map(str::trim);

        if let Some(ip) = candidate.filter(|ip| is_valid_ip(ip)) {
            return ip.to_string();
        }
    }

    match remote {
        Some(addr) => addr.ip().to_string(),
        None => UNKNOWN_CLIENT.to_string(),
    }
}

/// The caller's API token, if one was sent.
pub fn api_key(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
}

/// Build the rate limit key for a request and whether it is a token key.
pub fn rate_limit_key(client_ip: &str, api_key: Option<&str>) -> (String, bool) {
    match api_key {
        Some(token) => (format!("{}{}", TOKEN_KEY_PREFIX, token), true),
        None => (client_ip.to_string(), false),
    }
}

/// Whether `ip` is a literal IPv4 or IPv6 address.
pub fn is_valid_ip(ip: &str) -> bool {
    ip.parse::<IpAddr>().is_ok()
}
