//! `GET /serverconfig`: the settings a browser client may see.

use serde::Serialize;

use crate::security::access_control::HostAccessControl;

/// Client-safe view of the access settings. Never carries the blacklist,
/// credentials or upstream proxy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SafeSettings {
    pub proxy_all_domains: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_proxy_for: Option<Vec<String>>,
}

impl SafeSettings {
    pub fn from_access_control(acl: &HostAccessControl) -> Self {
        let proxy_all_domains = acl.proxy_all_domains();
        Self {
            proxy_all_domains,
            allow_proxy_for: (!proxy_all_domains).then(|| acl.whitelist().to_vec()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProxySettings;

    #[test]
    fn test_whitelist_included_when_restricted() {
        let mut settings = ProxySettings::default();
        settings.allow_proxy_for = vec!["example.com".into()];
        let json = serde_json::to_value(SafeSettings::from_access_control(&HostAccessControl::new(
            &settings,
        )))
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({"proxyAllDomains": false, "allowProxyFor": ["example.com"]})
        );
    }

    #[test]
    fn test_whitelist_omitted_when_open() {
        let mut settings = ProxySettings::default();
        settings.proxy_all_domains = true;
        settings.allow_proxy_for = vec!["example.com".into()];
        let json = serde_json::to_value(SafeSettings::from_access_control(&HostAccessControl::new(
            &settings,
        )))
        .unwrap();
        assert_eq!(json, serde_json::json!({"proxyAllDomains": true}));
    }
}
