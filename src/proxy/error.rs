//! Error type shared by the proxy pipeline.

use thiserror::Error;

/// Message returned for every access-control rejection.
pub const FORBIDDEN_MESSAGE: &str = "Host is not in the list of allowed hosts";

/// Terminal outcomes of a proxy request other than an origin response.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// Malformed target URL or duration. Never retried.
    #[error("{0}")]
    Validation(String),

    /// Target (or redirect target, or resolved address) is not allowed.
    #[error("{}", FORBIDDEN_MESSAGE)]
    Forbidden,

    /// Inbound body exceeds `post_size_limit`.
    #[error("Payload too large")]
    PayloadTooLarge,

    /// The origin (or upstream proxy) could not be reached.
    #[error("Bad gateway: {0}")]
    BadGateway(String),

    /// The origin did not answer in time.
    #[error("Gateway timeout")]
    GatewayTimeout,

    /// Anything unclassified; detail is logged, never sent to the client.
    #[error("Proxy error: {0}")]
    Internal(String),
}

impl ProxyError {
    pub fn invalid_url() -> Self {
        Self::Validation("No URL or specified URL is not correct".to_string())
    }
}

/// Result type for proxy operations.
pub type ProxyResult<T> = Result<T, ProxyError>;

/// Failure to assemble the proxy pipeline from a validated configuration.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("invalid query rule pattern: {0}")]
    QueryRule(#[from] regex::Error),

    #[error("invalid upstream proxy URL: {0}")]
    UpstreamProxy(#[from] url::ParseError),

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}
