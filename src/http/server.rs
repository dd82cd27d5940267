//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Wire up middleware (basic auth, timeout, request ID, tracing)
//! - Bind server to listener
//! - Dispatch `/proxy/...` requests to the proxy service
//! - Observability (metrics, correlation IDs)

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::Instrument;

use crate::config::ProxyConfig;
use crate::http::request::{request_id, UuidRequestId, X_REQUEST_ID};
use crate::http::settings::SafeSettings;
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::proxy::{InboundRequest, ProxyService, SetupError};
use crate::security::access_control::HostAccessControl;
use crate::security::basic_auth::{basic_auth_middleware, BasicAuthState};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub proxy: Arc<ProxyService>,
}

/// HTTP server for the forward proxy.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(config: &ProxyConfig, acl: Arc<HostAccessControl>) -> Result<Self, SetupError> {
        let state = AppState {
            proxy: Arc::new(ProxyService::new(config, acl)?),
        };
        Ok(Self {
            router: Self::build_router(config, state),
        })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ProxyConfig, state: AppState) -> Router {
        let mut router = Router::new()
            .route("/proxy", get(proxy_handler).post(proxy_handler))
            .route("/proxy/", get(proxy_handler).post(proxy_handler))
            .route("/proxy/{*target}", get(proxy_handler).post(proxy_handler))
            .route("/serverconfig", get(server_config))
            .with_state(state);

        if let Some(auth) = &config.server.basic_authentication {
            router = router.layer(middleware::from_fn_with_state(
                BasicAuthState::new(auth),
                basic_auth_middleware,
            ));
        }

        router
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(PropagateRequestIdLayer::new(X_REQUEST_ID))
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::new(X_REQUEST_ID, UuidRequestId))
    }

    /// Run the server until `shutdown` fires, then drain in-flight requests.
    pub async fn run(
        self,
        listener: TcpListener,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(Shutdown::wait(shutdown))
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Forward one request to the target named in its path.
async fn proxy_handler(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    let start = Instant::now();
    let span = tracing::info_span!("proxy", request_id = %request_id(&request));

    let (parts, body) = request.into_parts();
    let method = parts.method.clone();
    let inbound = InboundRequest {
        method: parts.method,
        uri: parts.uri,
        headers: parts.headers,
        body,
        client: Some(addr.ip()),
    };

    let response = match state.proxy.handle(inbound).instrument(span.clone()).await {
        Ok(response) => response,
        Err(e) => span.in_scope(|| {
            tracing::debug!(error = %e, "Proxy request rejected");
            e.into_response()
        }),
    };

    metrics::record_request(method.as_str(), response.status().as_u16(), start);
    response
}

async fn server_config(State(state): State<AppState>) -> Json<SafeSettings> {
    Json(SafeSettings::from_access_control(state.proxy.access_control()))
}
