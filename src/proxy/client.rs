//! Outbound HTTP client and redirect guard.
//!
//! # Responsibilities
//! - Build the direct and upstream-proxy `reqwest` clients, both resolving
//!   through the DNS guard (the upstream client trusts the proxy's own name)
//! - Enforce connect and response-header timeouts
//! - Follow redirects by hand, re-running the access check on every hop
//! - Classify transport errors
//!
//! # Design Decisions
//! - Automatic redirects are disabled; a redirect to a forbidden host must
//!   fail the request rather than be followed
//! - Credentials are dropped when a redirect leaves the original host

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE, LOCATION};
use axum::http::{HeaderMap, Method, StatusCode};
use reqwest::redirect::Policy;
use reqwest::{Client, Proxy};
use url::Url;

use crate::config::{HostAuthRule, TimeoutConfig};
use crate::proxy::auth::strip_credentials;
use crate::proxy::error::{ProxyError, ProxyResult};
use crate::proxy::upstream::Transport;
use crate::security::access_control::HostAccessControl;
use crate::security::dns_guard::{is_blocked_address, GuardedResolver};

/// Redirect hops followed per attempt.
pub const MAX_REDIRECTS: usize = 10;

/// One outbound request, before redirects.
#[derive(Debug, Clone)]
pub struct OutboundRequest<'a> {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
    pub auth_rule: Option<&'a HostAuthRule>,
}

/// The clients used for outbound traffic.
#[derive(Clone)]
pub struct OutboundClients {
    direct: Client,
    upstream: Option<Client>,
    response_timeout: Duration,
}

impl OutboundClients {
    pub fn build(
        acl: Arc<HostAccessControl>,
        upstream_proxy: Option<&Url>,
        host_overrides: &HashMap<String, Vec<IpAddr>>,
        timeouts: &TimeoutConfig,
    ) -> reqwest::Result<Self> {
        let guarded = GuardedResolver::new(acl).with_overrides(host_overrides);
        let builder = |resolver: GuardedResolver| {
            Client::builder()
                .redirect(Policy::none())
                .connect_timeout(Duration::from_secs(timeouts.connect_secs))
                .dns_resolver(Arc::new(resolver))
        };

        let direct = builder(guarded.clone()).no_proxy().build()?;
        let upstream = upstream_proxy
            .map(|url| {
                let resolver = match url.host_str() {
                    Some(host) => guarded.clone().trusting(host),
                    None => guarded.clone(),
                };
                builder(resolver).proxy(Proxy::all(url.as_str())?).build()
            })
            .transpose()?;

        Ok(Self {
            direct,
            upstream,
            response_timeout: Duration::from_secs(timeouts.upstream_secs),
        })
    }

    pub fn client(&self, transport: Transport) -> &Client {
        match (transport, &self.upstream) {
            (Transport::Upstream, Some(upstream)) => upstream,
            _ => &self.direct,
        }
    }

    /// Send `request`, following redirects that pass the access check.
    pub async fn send(
        &self,
        transport: Transport,
        acl: &HostAccessControl,
        request: OutboundRequest<'_>,
    ) -> ProxyResult<reqwest::Response> {
        let client = self.client(transport);
        let OutboundRequest {
            mut method,
            mut url,
            mut headers,
            mut body,
            auth_rule,
        } = request;

        for hop in 0..=MAX_REDIRECTS {
            let mut builder = client
                .request(method.clone(), url.clone())
                .headers(headers.clone());
            if let Some(bytes) = &body {
                builder = builder.body(bytes.clone());
            }

            let response = match tokio::time::timeout(self.response_timeout, builder.send()).await {
                Ok(Ok(response)) => response,
                Ok(Err(e)) => return Err(classify_error(e)),
                Err(_) => {
                    tracing::warn!(url = %url, "Origin did not respond in time");
                    return Err(ProxyError::GatewayTimeout);
                }
            };

            let status = response.status();
            if !is_followed_redirect(status) {
                return Ok(response);
            }
            let Some(location) = response
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
            else {
                return Ok(response);
            };

            let next = url
                .join(location)
                .map_err(|_| ProxyError::BadGateway(format!("invalid redirect location: {}", location)))?;
            if !matches!(next.scheme(), "http" | "https") {
                tracing::warn!(from = %url, "Refusing redirect to non-http scheme");
                return Err(ProxyError::Forbidden);
            }
            if let Err(e) = acl.check_url(&next) {
                tracing::warn!(from = %url, "Refusing redirect to disallowed host");
                return Err(e);
            }

            if next.host_str() != url.host_str()
                || next.port_or_known_default() != url.port_or_known_default()
            {
                strip_credentials(&mut headers, auth_rule);
            }
            if (status == StatusCode::SEE_OTHER && method != Method::HEAD)
                || (matches!(status, StatusCode::MOVED_PERMANENTLY | StatusCode::FOUND)
                    && method == Method::POST)
            {
                method = Method::GET;
                body = None;
                headers.remove(CONTENT_TYPE);
                headers.remove(CONTENT_LENGTH);
            }

            tracing::debug!(hop = hop + 1, status = %status, "Following redirect");
            url = next;
        }

        Err(ProxyError::BadGateway("too many redirects".to_string()))
    }
}

fn is_followed_redirect(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::MOVED_PERMANENTLY
            | StatusCode::FOUND
            | StatusCode::SEE_OTHER
            | StatusCode::TEMPORARY_REDIRECT
            | StatusCode::PERMANENT_REDIRECT
    )
}

/// Map a transport error onto the gateway's error classes.
pub fn classify_error(err: reqwest::Error) -> ProxyError {
    if is_blocked_address(&err) {
        ProxyError::Forbidden
    } else if err.is_timeout() {
        ProxyError::GatewayTimeout
    } else if err.is_connect() {
        ProxyError::BadGateway(err.to_string())
    } else {
        ProxyError::Internal(err.to_string())
    }
}
