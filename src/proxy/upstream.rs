//! Second-hop (corporate) proxy selection.

use std::collections::HashSet;

use url::Url;

use crate::config::ProxySettings;
use crate::security::access_control::strip_port;

/// How an outbound request leaves the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    /// Connect to the origin directly.
    Direct,
    /// Relay through the configured upstream proxy.
    Upstream,
}

/// Decides per host whether to use the upstream proxy.
#[derive(Debug, Clone, Default)]
pub struct UpstreamSelector {
    proxy: Option<Url>,
    bypass: HashSet<String>,
}

impl UpstreamSelector {
    pub fn from_settings(settings: &ProxySettings) -> Result<Self, url::ParseError> {
        let proxy = settings
            .upstream_proxy
            .as_deref()
            .map(Url::parse)
            .transpose()?;
        let bypass = settings
            .bypass_upstream_proxy_hosts
            .iter()
            .filter(|(_, bypass)| **bypass)
            .map(|(host, _)| host.to_ascii_lowercase())
            .collect();
        Ok(Self { proxy, bypass })
    }

    pub fn proxy_url(&self) -> Option<&Url> {
        self.proxy.as_ref()
    }

    pub fn select(&self, host: &str) -> Transport {
        if self.proxy.is_none() {
            return Transport::Direct;
        }
        let host = strip_port(host).to_ascii_lowercase();
        if self.bypass.contains(&host) {
            Transport::Direct
        } else {
            Transport::Upstream
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_proxy_means_direct() {
        let selector = UpstreamSelector::from_settings(&ProxySettings::default()).unwrap();
        assert_eq!(selector.select("example.com"), Transport::Direct);
        assert!(selector.proxy_url().is_none());
    }

    #[test]
    fn test_bypass_hosts() {
        let mut settings = ProxySettings::default();
        settings.upstream_proxy = Some("http://corp-proxy.example.com:3128".into());
        settings
            .bypass_upstream_proxy_hosts
            .insert("Intranet.example.com".into(), true);
        settings
            .bypass_upstream_proxy_hosts
            .insert("disabled.example.com".into(), false);
        let selector = UpstreamSelector::from_settings(&settings).unwrap();

        assert_eq!(selector.select("tiles.example.org"), Transport::Upstream);
        assert_eq!(selector.select("intranet.example.com:8080"), Transport::Direct);
        assert_eq!(selector.select("disabled.example.com"), Transport::Upstream);
    }
}
