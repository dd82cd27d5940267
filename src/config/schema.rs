//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use std::collections::{BTreeMap, HashMap};
use std::net::IpAddr;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Server-wide settings shared with the rest of the backend.
    pub server: ServerConfig,

    /// Forward-proxy settings.
    pub proxy: ProxySettings,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Timeout configuration for inbound and outbound calls.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Outbound connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Time allowed for the origin to answer with response headers, in seconds.
    pub upstream_secs: u64,

    /// Deadline for producing a response to an inbound request, in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            upstream_secs: 30,
            request_secs: 120,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Server-wide settings.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    /// Credentials the server itself demands from browsers.
    pub basic_authentication: Option<BasicAuthConfig>,
}

/// Username/password pair for HTTP basic authentication.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BasicAuthConfig {
    pub username: String,
    pub password: String,
}

/// Forward-proxy configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProxySettings {
    /// Maximum accepted POST body in bytes.
    pub post_size_limit: usize,

    /// Skip the whitelist check entirely (blacklist still applies).
    pub proxy_all_domains: bool,

    /// Static whitelist of domain suffixes.
    pub allow_proxy_for: Vec<String>,

    /// Static blacklist of CIDR ranges / IP literals.
    /// `None` selects the built-in list of reserved ranges.
    pub blacklisted_addresses: Option<Vec<String>>,

    /// Watched file overriding `allow_proxy_for`.
    pub whitelist_path: Option<PathBuf>,

    /// Watched file overriding `blacklisted_addresses`.
    pub blacklist_path: Option<PathBuf>,

    /// Second-hop proxy all outbound traffic is relayed through.
    pub upstream_proxy: Option<String>,

    /// Hosts reached directly even when an upstream proxy is configured.
    pub bypass_upstream_proxy_hosts: HashMap<String, bool>,

    /// Per-host query parameters appended to matching target URLs.
    pub append_param_to_query_string: HashMap<String, Vec<QueryParamRule>>,

    /// Per-host credentials injected on behalf of the browser.
    pub proxy_auth: HashMap<String, HostAuthRule>,

    /// Static host → address map consulted before DNS. Overridden addresses
    /// still pass through the blacklist.
    pub host_overrides: HashMap<String, Vec<IpAddr>>,
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            post_size_limit: 102_400,
            proxy_all_domains: false,
            allow_proxy_for: Vec::new(),
            blacklisted_addresses: None,
            whitelist_path: None,
            blacklist_path: None,
            upstream_proxy: None,
            bypass_upstream_proxy_hosts: HashMap::new(),
            append_param_to_query_string: HashMap::new(),
            proxy_auth: HashMap::new(),
            host_overrides: HashMap::new(),
        }
    }
}

/// One query augmentation rule.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueryParamRule {
    /// Regex matched against the full target URL.
    pub regex_pattern: String,

    /// Parameters appended when the pattern matches.
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

/// A single header to inject.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct HeaderPair {
    pub name: String,
    pub value: String,
}

/// Credentials injected for one host.
///
/// In the config file a rule is written as either `{ authorization = "..." }`
/// or `{ headers = [{ name = "...", value = "..." }] }`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(try_from = "RawHostAuthRule", into = "RawHostAuthRule")]
pub enum HostAuthRule {
    /// Static `Authorization` header value.
    Authorization(String),
    /// Arbitrary headers.
    Headers(Vec<HeaderPair>),
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
struct RawHostAuthRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    authorization: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    headers: Option<Vec<HeaderPair>>,
}

impl TryFrom<RawHostAuthRule> for HostAuthRule {
    type Error = String;

    fn try_from(raw: RawHostAuthRule) -> Result<Self, Self::Error> {
        match (raw.authorization, raw.headers) {
            (Some(value), None) => Ok(HostAuthRule::Authorization(value)),
            (None, Some(headers)) => Ok(HostAuthRule::Headers(headers)),
            (Some(_), Some(_)) => {
                Err("proxy_auth rule must set either `authorization` or `headers`, not both".to_string())
            }
            (None, None) => Err("proxy_auth rule must set `authorization` or `headers`".to_string()),
        }
    }
}

impl From<HostAuthRule> for RawHostAuthRule {
    fn from(rule: HostAuthRule) -> Self {
        match rule {
            HostAuthRule::Authorization(value) => Self {
                authorization: Some(value),
                headers: None,
            },
            HostAuthRule::Headers(headers) => Self {
                authorization: None,
                headers: Some(headers),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ProxyConfig::default();
        assert_eq!(config.proxy.post_size_limit, 102_400);
        assert!(!config.proxy.proxy_all_domains);
        assert!(config.proxy.blacklisted_addresses.is_none());
        assert!(config.server.basic_authentication.is_none());
    }

    #[test]
    fn test_parse_full_proxy_section() {
        let config: ProxyConfig = toml::from_str(
            r#"
            [proxy]
            proxy_all_domains = true
            allow_proxy_for = ["example.com"]
            blacklisted_addresses = []
            bypass_upstream_proxy_hosts = { "intranet.example.com" = true }

            [[proxy.append_param_to_query_string."tiles.example.com"]]
            regex_pattern = "wmts"
            params = { key = "abc" }

            [proxy.proxy_auth."a.example.com"]
            authorization = "Basic Zm9vOmJhcg=="

            [proxy.proxy_auth."b.example.com"]
            headers = [{ name = "x-api-key", value = "k" }]
            "#,
        )
        .unwrap();

        assert!(config.proxy.proxy_all_domains);
        assert_eq!(config.proxy.blacklisted_addresses, Some(vec![]));
        assert_eq!(config.proxy.bypass_upstream_proxy_hosts.get("intranet.example.com"), Some(&true));
        let rules = &config.proxy.append_param_to_query_string["tiles.example.com"];
        assert_eq!(rules[0].params["key"], "abc");
        assert_eq!(
            config.proxy.proxy_auth["a.example.com"],
            HostAuthRule::Authorization("Basic Zm9vOmJhcg==".into())
        );
        assert_eq!(
            config.proxy.proxy_auth["b.example.com"],
            HostAuthRule::Headers(vec![HeaderPair { name: "x-api-key".into(), value: "k".into() }])
        );
    }

    #[test]
    fn test_auth_rule_requires_exactly_one_form() {
        let both = toml::from_str::<ProxyConfig>(
            r#"
            [proxy.proxy_auth."x.example.com"]
            authorization = "a"
            headers = []
            "#,
        );
        assert!(both.is_err());

        let neither = toml::from_str::<ProxyConfig>(
            r#"
            [proxy.proxy_auth."x.example.com"]
            "#,
        );
        assert!(neither.is_err());
    }
}
