//! Header manipulation for proxied traffic.
//!
//! # Responsibilities
//! - Strip hop-by-hop and sensitive headers in both directions
//! - Append the client address to X-Forwarded-For
//! - Stamp Cache-Control and CORS headers on responses
//!
//! # Design Decisions
//! - Inputs are never mutated; a filtered copy is returned
//! - Header names compare case-insensitively (`HeaderName` is lowercase)

use std::net::IpAddr;

use axum::http::header::{ACCESS_CONTROL_ALLOW_ORIGIN, CACHE_CONTROL};
use axum::http::{HeaderMap, HeaderName, HeaderValue};

pub const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

/// Headers never forwarded in either direction.
pub const FILTERED_HEADERS: &[&str] = &[
    "host",
    "x-forwarded-host",
    "proxy-connection",
    "connection",
    "keep-alive",
    "transfer-encoding",
    "te",
    "trailer",
    "proxy-authorization",
    "proxy-authenticate",
    "upgrade",
    "expires",
    "pragma",
    "strict-transport-security",
    "content-length",
    "content-encoding",
];

/// Whether a header is dropped by the filter.
pub fn is_filtered(name: &HeaderName) -> bool {
    FILTERED_HEADERS.contains(&name.as_str())
}

/// Copy `headers`, leaving out every filtered header.
pub fn filter_headers(headers: &HeaderMap) -> HeaderMap {
    let mut filtered = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if !is_filtered(name) {
            filtered.append(name.clone(), value.clone());
        }
    }
    filtered
}

/// Filter inbound headers before forwarding them to the origin.
///
/// When `client` is given it is appended to `x-forwarded-for`, keeping any
/// addresses earlier proxies recorded.
pub fn filter_request_headers(headers: &HeaderMap, client: Option<IpAddr>) -> HeaderMap {
    let mut filtered = filter_headers(headers);

    if let Some(client) = client {
        let mut chain: Vec<String> = filtered
            .get_all(&X_FORWARDED_FOR)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .map(str::to_string)
            .collect();
        chain.push(client.to_string());

        if let Ok(value) = HeaderValue::from_str(&chain.join(", ")) {
            filtered.insert(X_FORWARDED_FOR, value);
        }
    }

    filtered
}

/// Filter origin headers and stamp the gateway's own response headers.
pub fn process_response_headers(headers: &HeaderMap, max_age_secs: Option<u64>) -> HeaderMap {
    let mut processed = filter_headers(headers);

    if let Some(max_age) = max_age_secs {
        if let Ok(value) = HeaderValue::from_str(&format!("public,max-age={}", max_age)) {
            processed.insert(CACHE_CONTROL, value);
        }
    }
    processed.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));

    processed
}
