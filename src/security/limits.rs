//! Request size limits.
//!
//! # Responsibilities
//! - Enforce maximum request body size for forwarded POSTs
//!
//! # Design Decisions
//! - A declared Content-Length over the limit is rejected before reading
//! - Streamed bytes are counted as they arrive; reading stops at the limit
//! - The accepted body is buffered so it can be replayed on auth retries

use axum::body::{Body, Bytes};
use axum::http::header::CONTENT_LENGTH;
use axum::http::HeaderMap;
use futures_util::StreamExt;

use crate::proxy::error::{ProxyError, ProxyResult};

fn declared_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

/// Read an inbound body, failing with 413 once it exceeds `limit` bytes.
pub async fn read_limited_body(headers: &HeaderMap, body: Body, limit: usize) -> ProxyResult<Bytes> {
    if declared_length(headers).is_some_and(|len| len > limit as u64) {
        return Err(ProxyError::PayloadTooLarge);
    }

    let mut stream = body.into_data_stream();
    let mut buffer = Vec::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk
            .map_err(|e| ProxyError::Validation(format!("Failed to read request body: {}", e)))?;
        if buffer.len() + chunk.len() > limit {
            return Err(ProxyError::PayloadTooLarge);
        }
        buffer.extend_from_slice(&chunk);
    }

    Ok(Bytes::from(buffer))
}
