//! Error responses.
//!
//! # Design Decisions
//! - Every [`ProxyError`] maps to exactly one status code
//! - Gateway and internal failures return a fixed body; detail is logged only

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::proxy::error::{ProxyError, FORBIDDEN_MESSAGE};

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::Validation(_) => StatusCode::BAD_REQUEST,
            ProxyError::Forbidden => StatusCode::FORBIDDEN,
            ProxyError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ProxyError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            ProxyError::GatewayTimeout => StatusCode::GATEWAY_TIMEOUT,
            ProxyError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            ProxyError::Validation(message) => message.clone(),
            ProxyError::Forbidden => FORBIDDEN_MESSAGE.to_string(),
            ProxyError::PayloadTooLarge => "Payload too large".to_string(),
            ProxyError::BadGateway(detail) => {
                tracing::warn!(error = %detail, "Origin unreachable");
                "Bad gateway".to_string()
            }
            ProxyError::GatewayTimeout => "Gateway timeout".to_string(),
            ProxyError::Internal(detail) => {
                tracing::error!(error = %detail, "Proxy request failed");
                "Proxy error".to_string()
            }
        };
        (status, body).into_response()
    }
}
