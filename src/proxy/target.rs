//! Target URL extraction, normalization and validation.
//!
//! The target arrives as the raw path tail after `/proxy/`, optionally
//! prefixed by a `_<duration>/` segment. Intermediaries (and some browsers)
//! collapse `//` into `/`, so `https:/example.com` is repaired before parsing.

use std::sync::LazyLock;

use regex::Regex;
use url::{Host, Url};

use crate::proxy::error::{ProxyError, ProxyResult};

static SCHEME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\w+:/").expect("scheme regex is valid"));

/// The two parts of a proxy route tail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProxyRoute<'a> {
    /// Duration segment without its leading underscore.
    pub duration: Option<&'a str>,
    /// Raw, unvalidated target.
    pub target: &'a str,
}

/// Split `_2h/example.com/a` into its duration and target parts.
pub fn split_route(tail: &str) -> ProxyRoute<'_> {
    match tail.strip_prefix('_') {
        Some(rest) => match rest.split_once('/') {
            Some((duration, target)) => ProxyRoute {
                duration: Some(duration),
                target,
            },
            None => ProxyRoute {
                duration: Some(rest),
                target: "",
            },
        },
        None => ProxyRoute {
            duration: None,
            target: tail,
        },
    }
}

/// Repair the scheme of a raw target.
///
/// Adds `http://` when no scheme is present and restores a collapsed second
/// slash after the scheme.
pub fn normalize_target(raw: &str) -> String {
    match SCHEME_RE.find(raw) {
        Some(scheme) => {
            let (head, rest) = raw.split_at(scheme.end());
            if rest.starts_with('/') {
                raw.to_string()
            } else {
                format!("{}/{}", head, rest)
            }
        }
        None => format!("http://{}", raw),
    }
}

/// Normalize and validate a raw target into an absolute http(s) URL.
pub fn validate_target(raw: &str) -> ProxyResult<Url> {
    if raw.trim().is_empty() {
        return Err(ProxyError::invalid_url());
    }

    let url = Url::parse(&normalize_target(raw)).map_err(|_| ProxyError::invalid_url())?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ProxyError::invalid_url());
    }

    match url.host() {
        Some(Host::Domain(domain)) if is_qualified_domain(domain) => Ok(url),
        Some(Host::Ipv4(_)) | Some(Host::Ipv6(_)) => Ok(url),
        _ => Err(ProxyError::invalid_url()),
    }
}

/// A domain qualifies when it has at least two non-empty labels.
fn is_qualified_domain(domain: &str) -> bool {
    domain.contains('.') && domain.split('.').all(|label| !label.is_empty())
}

/// `host[:port]` of a URL, the form access checks and rule lookups use.
pub fn host_and_port(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    Some(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}
