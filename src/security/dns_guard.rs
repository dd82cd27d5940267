//! DNS-rebinding guard for outbound connections.
//!
//! The host name passes the access check before dispatch, but the address it
//! resolves to at connect time may differ. The outbound client resolves
//! through [`GuardedResolver`], which refuses to hand back any address when
//! one of them is blacklisted.

use std::collections::HashMap;
use std::error::Error as StdError;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use reqwest::dns::{Addrs, Name, Resolve, Resolving};
use thiserror::Error;

use crate::security::access_control::HostAccessControl;

type BoxError = Box<dyn StdError + Send + Sync>;

/// A host resolved to a blacklisted address.
#[derive(Debug, Error)]
#[error("{host} resolved to blacklisted address {ip}")]
pub struct BlockedAddress {
    pub host: String,
    pub ip: IpAddr,
}

/// `reqwest` resolver that checks every resolved address against the blacklist.
///
/// A client relaying through an upstream proxy only ever resolves the proxy's
/// own name; that name is configured by the operator and marked trusted so
/// its (usually private) address is not rejected.
#[derive(Clone)]
pub struct GuardedResolver {
    acl: Arc<HostAccessControl>,
    overrides: Arc<HashMap<String, Vec<IpAddr>>>,
    trusted_host: Option<Arc<str>>,
}

impl GuardedResolver {
    pub fn new(acl: Arc<HostAccessControl>) -> Self {
        Self {
            acl,
            overrides: Arc::new(HashMap::new()),
            trusted_host: None,
        }
    }

    /// Answer these names from a static map instead of DNS.
    pub fn with_overrides(mut self, overrides: &HashMap<String, Vec<IpAddr>>) -> Self {
        self.overrides = Arc::new(
            overrides
                .iter()
                .map(|(host, ips)| (host.to_ascii_lowercase(), ips.clone()))
                .collect(),
        );
        self
    }

    /// Skip the blacklist for `host`, the configured upstream proxy.
    pub fn trusting(mut self, host: &str) -> Self {
        self.trusted_host = Some(host.to_ascii_lowercase().into());
        self
    }

    pub async fn lookup(&self, host: &str) -> Result<Vec<SocketAddr>, BoxError> {
        let host = host.to_ascii_lowercase();
        let addrs = match self.overrides.get(&host) {
            Some(ips) => ips.iter().map(|ip| SocketAddr::new(*ip, 0)).collect(),
            None => tokio::net::lookup_host((host.as_str(), 0)).await?.collect(),
        };

        if self.trusted_host.as_deref() == Some(host.as_str()) {
            tracing::debug!(host = %host, "Resolved upstream proxy");
            return Ok(addrs);
        }
        Ok(check_resolved(&self.acl, &host, addrs)?)
    }
}

impl Resolve for GuardedResolver {
    fn resolve(&self, name: Name) -> Resolving {
        let resolver = self.clone();
        Box::pin(async move {
            let addrs = resolver.lookup(name.as_str()).await?;
            Ok(Box::new(addrs.into_iter()) as Addrs)
        })
    }
}

/// Resolve `host` and reject the result if any address is blacklisted.
pub async fn resolve_checked(
    acl: &Arc<HostAccessControl>,
    host: &str,
) -> Result<Vec<SocketAddr>, BoxError> {
    GuardedResolver::new(acl.clone()).lookup(host).await
}

/// Pass `addrs` through unless one of them is blacklisted.
pub fn check_resolved(
    acl: &HostAccessControl,
    host: &str,
    addrs: Vec<SocketAddr>,
) -> Result<Vec<SocketAddr>, BlockedAddress> {
    if let Some(blocked) = addrs.iter().find(|addr| acl.is_ip_blacklisted(addr.ip())) {
        tracing::warn!(host = %host, ip = %blocked.ip(), "Resolved address is blacklisted, aborting connection");
        metrics::counter!("proxy_blocked_total", "reason" => "dns").increment(1);
        return Err(BlockedAddress {
            host: host.to_string(),
            ip: blocked.ip(),
        });
    }
    Ok(addrs)
}

/// Whether a [`BlockedAddress`] appears anywhere in an error's source chain.
pub fn is_blocked_address(err: &(dyn StdError + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if e.downcast_ref::<BlockedAddress>().is_some() {
            return true;
        }
        // io::Error::source skips the error it wraps.
        current = match e.downcast_ref::<std::io::Error>().and_then(|io| io.get_ref()) {
            Some(inner) => Some(inner as &(dyn StdError + 'static)),
            None => e.source(),
        };
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProxySettings;

    fn default_acl() -> Arc<HostAccessControl> {
        Arc::new(HostAccessControl::new(&ProxySettings::default()))
    }

    #[test]
    fn test_public_addresses_pass() {
        let acl = default_acl();
        let addrs = vec!["93.184.216.34:0".parse().unwrap(), "[2606:2800:220:1::]:0".parse().unwrap()];
        assert_eq!(check_resolved(&acl, "example.com", addrs.clone()).unwrap(), addrs);
    }

    #[test]
    fn test_any_blacklisted_address_blocks() {
        let acl = default_acl();
        let addrs = vec!["93.184.216.34:0".parse().unwrap(), "10.0.0.5:0".parse().unwrap()];
        let err = check_resolved(&acl, "rebind.example.com", addrs).unwrap_err();
        assert_eq!(err.ip, "10.0.0.5".parse::<IpAddr>().unwrap());
        assert!(err.to_string().contains("rebind.example.com"));
    }

    #[derive(Debug, Error)]
    #[error("connect failed")]
    struct Wrapper(#[source] BlockedAddress);

    #[test]
    fn test_blocked_address_found_in_chain() {
        let wrapped = Wrapper(BlockedAddress {
            host: "h".into(),
            ip: "127.0.0.1".parse().unwrap(),
        });
        assert!(is_blocked_address(&wrapped));

        let other = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        assert!(!is_blocked_address(&other));

        let io = std::io::Error::new(
            std::io::ErrorKind::Other,
            BlockedAddress {
                host: "h".into(),
                ip: "10.0.0.1".parse().unwrap(),
            },
        );
        assert!(is_blocked_address(&io));
    }

    #[tokio::test]
    async fn test_localhost_is_rejected_at_resolution() {
        let acl = default_acl();
        let result = resolve_checked(&acl, "localhost").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_overrides_are_still_checked() {
        let mut overrides = HashMap::new();
        overrides.insert("Tiles.Example.com".to_string(), vec!["127.0.0.1".parse().unwrap()]);
        overrides.insert("maps.example.com".to_string(), vec!["93.184.216.34".parse().unwrap()]);
        let resolver = GuardedResolver::new(default_acl()).with_overrides(&overrides);

        let err = resolver.lookup("tiles.example.com").await.unwrap_err();
        assert!(is_blocked_address(err.as_ref()));

        let addrs = resolver.lookup("maps.example.com").await.unwrap();
        assert_eq!(addrs, vec!["93.184.216.34:0".parse::<SocketAddr>().unwrap()]);
    }

    #[tokio::test]
    async fn test_trusted_proxy_host_skips_blacklist() {
        let mut overrides = HashMap::new();
        overrides.insert("corp-proxy.internal".to_string(), vec!["10.0.0.8".parse().unwrap()]);
        overrides.insert("other.internal".to_string(), vec!["10.0.0.9".parse().unwrap()]);
        let resolver = GuardedResolver::new(default_acl())
            .with_overrides(&overrides)
            .trusting("CORP-PROXY.internal");

        let addrs = resolver.lookup("corp-proxy.internal").await.unwrap();
        assert_eq!(addrs, vec!["10.0.0.8:0".parse::<SocketAddr>().unwrap()]);
        assert!(resolver.lookup("other.internal").await.is_err());
    }
}
