//! HTTP basic authentication guarding the whole server.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, HeaderValue, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::{engine::general_purpose::STANDARD, Engine};

use crate::config::BasicAuthConfig;

/// Expected `user:password` pair.
#[derive(Clone)]
pub struct BasicAuthState {
    credentials: Arc<str>,
}

impl BasicAuthState {
    pub fn new(config: &BasicAuthConfig) -> Self {
        Self {
            credentials: format!("{}:{}", config.username, config.password).into(),
        }
    }

    /// Whether the request carries the expected credentials.
    pub fn is_authorized(&self, headers: &HeaderMap) -> bool {
        decode_credentials(headers).is_some_and(|given| given == *self.credentials)
    }
}

fn decode_credentials(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, encoded) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    String::from_utf8(decoded).ok()
}

pub async fn basic_auth_middleware(
    State(state): State<BasicAuthState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if state.is_authorized(request.headers()) {
        return next.run(request).await;
    }

    tracing::debug!(path = %request.uri().path(), "Rejected request without valid basic auth");
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, HeaderValue::from_static("Basic realm=\"geoproxy\""))],
        "Unauthorized",
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> BasicAuthState {
        BasicAuthState::new(&BasicAuthConfig {
            username: "user".into(),
            password: "pa:ss".into(),
        })
    }

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_accepts_matching_credentials() {
        let encoded = STANDARD.encode("user:pa:ss");
        assert!(state().is_authorized(&headers(&format!("Basic {}", encoded))));
        assert!(state().is_authorized(&headers(&format!("basic {}", encoded))));
    }

    #[test]
    fn test_rejects_everything_else() {
        assert!(!state().is_authorized(&HeaderMap::new()));
        assert!(!state().is_authorized(&headers("Bearer token")));
        assert!(!state().is_authorized(&headers(&format!("Basic {}", STANDARD.encode("user:wrong")))));
        assert!(!state().is_authorized(&headers("Basic !!!not-base64")));
    }

    #[tokio::test]
    async fn test_middleware_challenges_unauthenticated_requests() {
        use axum::{routing::get, Router};
        use tower::ServiceExt;

        let app = Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(axum::middleware::from_fn_with_state(state(), basic_auth_middleware));

        let denied = app
            .clone()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(denied.headers()[header::WWW_AUTHENTICATE], "Basic realm=\"geoproxy\"");

        let allowed = app
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header(header::AUTHORIZATION, format!("Basic {}", STANDARD.encode("user:pa:ss")))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(allowed.status(), StatusCode::OK);
    }
}
