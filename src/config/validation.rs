//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (limits and timeouts > 0)
//! - Check that regexes, URLs and header names compile/parse
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use axum::http::{HeaderName, HeaderValue};
use regex::Regex;
use url::Url;

use crate::config::schema::{HostAuthRule, ProxyConfig};

/// A single semantic problem found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }

    let timeouts = &config.timeouts;
    for (field, value) in [
        ("timeouts.connect_secs", timeouts.connect_secs),
        ("timeouts.upstream_secs", timeouts.upstream_secs),
        ("timeouts.request_secs", timeouts.request_secs),
    ] {
        if value == 0 {
            errors.push(ValidationError::new(field, "must be greater than zero"));
        }
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            "is not a socket address",
        ));
    }

    if let Some(auth) = &config.server.basic_authentication {
        if auth.username.is_empty() {
            errors.push(ValidationError::new(
                "server.basic_authentication.username",
                "must not be empty",
            ));
        }
    }

    let proxy = &config.proxy;
    if proxy.post_size_limit == 0 {
        errors.push(ValidationError::new("proxy.post_size_limit", "must be greater than zero"));
    }

    if let Some(upstream) = &proxy.upstream_proxy {
        match Url::parse(upstream) {
            Ok(url) if matches!(url.scheme(), "http" | "https") && url.host_str().is_some() => {}
            _ => errors.push(ValidationError::new(
                "proxy.upstream_proxy",
                format!("'{}' is not an http(s) proxy URL", upstream),
            )),
        }
    }

    for (host, ips) in &proxy.host_overrides {
        if ips.is_empty() {
            errors.push(ValidationError::new(
                format!("proxy.host_overrides.{}", host),
                "must list at least one address",
            ));
        }
    }

    for (host, rules) in &proxy.append_param_to_query_string {
        for (i, rule) in rules.iter().enumerate() {
            if let Err(e) = Regex::new(&rule.regex_pattern) {
                errors.push(ValidationError::new(
                    format!("proxy.append_param_to_query_string.{}[{}].regex_pattern", host, i),
                    e.to_string(),
                ));
            }
        }
    }

    for (host, rule) in &proxy.proxy_auth {
        let field = format!("proxy.proxy_auth.{}", host);
        match rule {
            HostAuthRule::Authorization(value) => {
                if HeaderValue::from_str(value).is_err() {
                    errors.push(ValidationError::new(
                        format!("{}.authorization", field),
                        "is not a valid header value",
                    ));
                }
            }
            HostAuthRule::Headers(headers) => {
                for pair in headers {
                    if HeaderName::from_bytes(pair.name.as_bytes()).is_err()
                        || HeaderValue::from_str(&pair.value).is_err()
                    {
                        errors.push(ValidationError::new(
                            format!("{}.headers", field),
                            format!("'{}' is not a valid header", pair.name),
                        ));
                    }
                }
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{HeaderPair, QueryParamRule};

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&ProxyConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = ProxyConfig::default();
        config.proxy.post_size_limit = 0;
        config.proxy.upstream_proxy = Some("socks5://nope".into());
        config.proxy.append_param_to_query_string.insert(
            "example.com".into(),
            vec![QueryParamRule {
                regex_pattern: "(unclosed".into(),
                params: Default::default(),
            }],
        );
        config.proxy.proxy_auth.insert(
            "example.com".into(),
            HostAuthRule::Headers(vec![HeaderPair {
                name: "bad header".into(),
                value: "v".into(),
            }]),
        );

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(errors.iter().any(|e| e.field == "proxy.post_size_limit"));
        assert!(errors.iter().any(|e| e.field == "proxy.upstream_proxy"));
    }

    #[test]
    fn test_empty_host_override_is_rejected() {
        let mut config = ProxyConfig::default();
        config.proxy.host_overrides.insert("tiles.example.com".into(), Vec::new());
        config
            .proxy
            .host_overrides
            .insert("maps.example.com".into(), vec!["192.0.2.10".parse().unwrap()]);

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "proxy.host_overrides.tiles.example.com");
    }
}
