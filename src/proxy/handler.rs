//! Proxy request orchestration.
//!
//! # Flow
//! ```text
//! Validate → AccessCheck → BuildRequest → Dispatch(n)
//!     → Success                  (stream origin response)
//!     → RetryWithDifferentAuth   (origin 403, attempts left)
//!     → TerminalFailure          (ProxyError)
//! ```

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::http::header::{ACCEPT_ENCODING, AUTHORIZATION};
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::Response;
use url::Url;

use crate::config::{HostAuthRule, ProxyConfig};
use crate::proxy::auth::{AuthChoice, RetryState};
use crate::proxy::client::{OutboundClients, OutboundRequest};
use crate::proxy::duration::{process_duration, DEFAULT_MAX_AGE_SECS};
use crate::proxy::error::{ProxyError, ProxyResult, SetupError};
use crate::proxy::query::QueryAugmenter;
use crate::proxy::target::{host_and_port, split_route, validate_target};
use crate::proxy::upstream::{Transport, UpstreamSelector};
use crate::security::access_control::HostAccessControl;
use crate::security::headers::{filter_request_headers, process_response_headers};
use crate::security::limits::read_limited_body;

/// Path prefix of the proxy route.
pub const PROXY_PREFIX: &str = "/proxy";

/// An inbound proxy request, detached from axum's extractors.
#[derive(Debug)]
pub struct InboundRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Body,
    pub client: Option<IpAddr>,
}

/// Everything needed to serve `/proxy/...` requests.
pub struct ProxyService {
    acl: Arc<HostAccessControl>,
    augmenter: QueryAugmenter,
    selector: UpstreamSelector,
    clients: OutboundClients,
    auth_rules: HashMap<String, HostAuthRule>,
    post_size_limit: usize,
    strip_inbound_authorization: bool,
}

impl ProxyService {
    pub fn new(config: &ProxyConfig, acl: Arc<HostAccessControl>) -> Result<Self, SetupError> {
        let settings = &config.proxy;
        let augmenter = QueryAugmenter::from_config(&settings.append_param_to_query_string)?;
        let selector = UpstreamSelector::from_settings(settings)?;
        let clients = OutboundClients::build(
            acl.clone(),
            selector.proxy_url(),
            &settings.host_overrides,
            &config.timeouts,
        )?;
        let auth_rules = settings
            .proxy_auth
            .iter()
            .map(|(host, rule)| (host.to_ascii_lowercase(), rule.clone()))
            .collect();

        Ok(Self {
            acl,
            augmenter,
            selector,
            clients,
            auth_rules,
            post_size_limit: settings.post_size_limit,
            strip_inbound_authorization: config.server.basic_authentication.is_some(),
        })
    }

    pub fn access_control(&self) -> &Arc<HostAccessControl> {
        &self.acl
    }

    /// Serve one proxy request.
    pub async fn handle(&self, request: InboundRequest) -> ProxyResult<Response> {
        let InboundRequest {
            method,
            uri,
            headers,
            body,
            client,
        } = request;

        let tail = route_tail(uri.path());
        let route = split_route(tail);

        let mut url = validate_target(route.target)?;
        let host = host_and_port(&url).ok_or_else(ProxyError::invalid_url)?;
        self.acl.check_host(&host)?;

        let max_age = match route.duration {
            Some(duration) => process_duration(duration)?,
            None => DEFAULT_MAX_AGE_SECS,
        };

        merge_query(&mut url, uri.query());
        let augmented = self.augmenter.apply(&mut url);
        if augmented > 0 {
            tracing::debug!(host = %host, rules = augmented, "Applied query parameter rules");
        }

        let transport = self.selector.select(&host);

        let body = if method == Method::GET || method == Method::HEAD {
            None
        } else {
            Some(read_limited_body(&headers, body, self.post_size_limit).await?)
        };

        let mut outbound = filter_request_headers(&headers, client);
        // reqwest negotiates encodings itself and hands back decoded bytes.
        outbound.remove(ACCEPT_ENCODING);
        if self.strip_inbound_authorization {
            outbound.remove(AUTHORIZATION);
        }

        tracing::debug!(
            method = %method,
            host = %host,
            transport = ?transport,
            "Dispatching proxy request"
        );

        let response = self
            .dispatch(transport, method, url, outbound, body, &host)
            .await?;
        Ok(into_client_response(response, max_age))
    }

    /// Send the request, retrying with different credentials on origin 403.
    async fn dispatch(
        &self,
        transport: Transport,
        method: Method,
        url: Url,
        headers: HeaderMap,
        body: Option<Bytes>,
        host: &str,
    ) -> ProxyResult<reqwest::Response> {
        let rule = self.auth_rule(&url);
        let client_auth = headers.get(AUTHORIZATION).cloned();
        let mut state = RetryState::default();
        let mut choice = AuthChoice::initial(rule, client_auth.as_ref());

        loop {
            state.record(&choice);
            let mut attempt_headers = headers.clone();
            choice.apply(&mut attempt_headers, rule);

            let response = self
                .clients
                .send(
                    transport,
                    &self.acl,
                    OutboundRequest {
                        method: method.clone(),
                        url: url.clone(),
                        headers: attempt_headers,
                        body: body.clone(),
                        auth_rule: rule,
                    },
                )
                .await?;

            if response.status() == StatusCode::FORBIDDEN {
                if let Some(next) = state.next_after_forbidden(&choice, rule) {
                    tracing::info!(
                        host = %host,
                        attempt = state.attempts_used,
                        next = ?next,
                        "Origin refused credentials, retrying"
                    );
                    metrics::counter!("proxy_auth_retries_total").increment(1);
                    choice = next;
                    continue;
                }
            }
            return Ok(response);
        }
    }

    fn auth_rule(&self, url: &Url) -> Option<&HostAuthRule> {
        let with_port = host_and_port(url)?.to_ascii_lowercase();
        self.auth_rules.get(&with_port).or_else(|| {
            let host = url.host_str()?.to_ascii_lowercase();
            self.auth_rules.get(&host)
        })
    }
}

/// The part of a request path after `/proxy/`.
fn route_tail(path: &str) -> &str {
    let rest = path.strip_prefix(PROXY_PREFIX).unwrap_or(path);
    rest.strip_prefix('/').unwrap_or(rest)
}

/// Append the inbound query string to the target's own query.
fn merge_query(url: &mut Url, inbound: Option<&str>) {
    let Some(inbound) = inbound.filter(|q| !q.is_empty()) else {
        return;
    };
    let merged = match url.query() {
        Some(existing) if !existing.is_empty() => format!("{}&{}", existing, inbound),
        _ => inbound.to_string(),
    };
    url.set_query(Some(&merged));
}

fn into_client_response(response: reqwest::Response, max_age_secs: f64) -> Response {
    let status = response.status();
    let max_age = (status.as_u16() < 400).then_some(max_age_secs as u64);
    let headers = process_response_headers(response.headers(), max_age);

    let mut out = Response::new(Body::from_stream(response.bytes_stream()));
    *out.status_mut() = status;
    *out.headers_mut() = headers;
    out
}
