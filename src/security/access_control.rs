//! Host access control: whitelist of domain suffixes and blacklist of
//! CIDR/IP ranges.
//!
//! # Responsibilities
//! - Load both lists from a watched file or the static configuration
//! - Answer host/IP membership queries for requests, redirects and
//!   resolved addresses
//! - Swap in new lists when the watched files change
//!
//! # Design Decisions
//! - Each list lives in an `ArcSwap`; a reload builds a fresh immutable list
//!   and swaps it in whole, so readers never observe a partial update
//! - Loading never fails: a missing or unreadable file degrades to the
//!   static list (or the built-in reserved ranges for the blacklist)

use std::fmt;
use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwap;
use cidr::{IpCidr, IpInet};
use url::Url;

use crate::config::ProxySettings;
use crate::lifecycle::Shutdown;
use crate::proxy::error::{ProxyError, ProxyResult};
use crate::security::list_watcher::{self, RELOAD_DEBOUNCE};

/// Reserved, private, loopback, link-local and multicast ranges.
pub const DEFAULT_BLACKLIST: &[&str] = &[
    "127.0.0.0/8",
    "::1/128",
    "169.254.0.0/16",
    "fe80::/10",
    "10.0.0.0/8",
    "172.16.0.0/12",
    "192.168.0.0/16",
    "fc00::/7",
    "0.0.0.0/8",
    "100.64.0.0/10",
    "192.0.0.0/24",
    "192.0.2.0/24",
    "198.18.0.0/15",
    "192.88.99.0/24",
    "198.51.100.0/24",
    "203.0.113.0/24",
    "224.0.0.0/4",
    "240.0.0.0/4",
    "255.255.255.255/32",
    "::/128",
    "2001:db8::/32",
    "ff00::/8",
];

/// Which of the two access lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListKind {
    Whitelist,
    Blacklist,
}

impl ListKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListKind::Whitelist => "whitelist",
            ListKind::Blacklist => "blacklist",
        }
    }
}

impl fmt::Display for ListKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the active contents of a list came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListSource {
    File(PathBuf),
    Static,
    BuiltIn,
}

/// Immutable, parsed blacklist snapshot.
#[derive(Debug, Clone, Default)]
pub struct Blacklist {
    entries: Vec<String>,
    networks: Vec<IpCidr>,
    hosts: Vec<String>,
}

impl Blacklist {
    pub fn from_entries(entries: Vec<String>) -> Self {
        let mut networks = Vec::new();
        let mut hosts = Vec::new();

        for entry in &entries {
            if let Some(network) = parse_network(entry) {
                networks.push(network);
            } else if entry.contains('/') {
                tracing::warn!(entry = %entry, "Ignoring malformed CIDR in blacklist");
            } else {
                hosts.push(entry.to_ascii_lowercase());
            }
        }

        Self {
            entries,
            networks,
            hosts,
        }
    }

    /// Entries as they were written.
    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    /// Whether a host, IP literal, or `host:port` is blacklisted.
    pub fn contains(&self, host_or_ip: &str) -> bool {
        let host = strip_port(host_or_ip);
        match host.parse::<IpAddr>() {
            Ok(ip) => self.contains_ip(ip),
            Err(_) => self.hosts.iter().any(|h| h.eq_ignore_ascii_case(host)),
        }
    }

    pub fn contains_ip(&self, ip: IpAddr) -> bool {
        let mapped = match ip {
            IpAddr::V6(v6) => v6.to_ipv4_mapped().map(IpAddr::V4),
            IpAddr::V4(_) => None,
        };

        self.networks.iter().any(|network| {
            network.contains(&ip) || mapped.is_some_and(|v4| network.contains(&v4))
        })
    }
}

fn parse_network(entry: &str) -> Option<IpCidr> {
    if entry.contains('/') {
        entry.parse::<IpInet>().ok().map(|inet| inet.network())
    } else {
        entry.parse::<IpAddr>().ok().map(IpCidr::new_host)
    }
}

/// Strip a trailing `:port` and IPv6 brackets.
pub fn strip_port(host: &str) -> &str {
    if let Some(rest) = host.strip_prefix('[') {
        return rest.split_once(']').map(|(h, _)| h).unwrap_or(rest);
    }
    match host.rsplit_once(':') {
        Some((h, port)) if !h.contains(':') && port.bytes().all(|b| b.is_ascii_digit()) => h,
        _ => host,
    }
}

/// Parse a list file: one entry per line, blank and `//` lines dropped.
pub fn parse_list(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("//"))
        .map(str::to_string)
        .collect()
}

fn read_list_file(path: &Path) -> std::io::Result<Vec<String>> {
    fs::read_to_string(path).map(|content| parse_list(&content))
}

fn normalize_suffix(entry: &str) -> String {
    entry.trim().trim_start_matches('.').to_ascii_lowercase()
}

/// Process-wide owner of the whitelist and blacklist.
pub struct HostAccessControl {
    proxy_all_domains: bool,
    whitelist: ArcSwap<Vec<String>>,
    blacklist: ArcSwap<Blacklist>,
    static_whitelist: Vec<String>,
    static_blacklist: Option<Vec<String>>,
    whitelist_path: Option<PathBuf>,
    blacklist_path: Option<PathBuf>,
}

impl HostAccessControl {
    /// Load both lists. Does not start watching; see [`HostAccessControl::watch`].
    pub fn new(settings: &ProxySettings) -> Self {
        let acl = Self {
            proxy_all_domains: settings.proxy_all_domains,
            whitelist: ArcSwap::from_pointee(Vec::new()),
            blacklist: ArcSwap::from_pointee(Blacklist::default()),
            static_whitelist: settings.allow_proxy_for.clone(),
            static_blacklist: settings.blacklisted_addresses.clone(),
            whitelist_path: settings.whitelist_path.clone(),
            blacklist_path: settings.blacklist_path.clone(),
        };
        acl.reload(ListKind::Whitelist);
        acl.reload(ListKind::Blacklist);
        acl
    }

    /// Start watching the configured list files until `shutdown` fires.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn watch(self: &Arc<Self>, shutdown: &Shutdown) {
        for kind in [ListKind::Whitelist, ListKind::Blacklist] {
            if let Some(path) = self.path(kind) {
                list_watcher::spawn(
                    Arc::downgrade(self),
                    kind,
                    path.to_path_buf(),
                    shutdown.subscribe(),
                    RELOAD_DEBOUNCE,
                );
            }
        }
    }

    pub fn path(&self, kind: ListKind) -> Option<&Path> {
        match kind {
            ListKind::Whitelist => self.whitelist_path.as_deref(),
            ListKind::Blacklist => self.blacklist_path.as_deref(),
        }
    }

    /// Re-read one list from its file, or fall back when the file is absent
    /// or unreadable. Returns where the new contents came from.
    pub fn reload(&self, kind: ListKind) -> ListSource {
        let from_file = self.path(kind).and_then(|path| {
            if !path.exists() {
                tracing::info!(list = %kind, path = ?path, "List file not found, using fallback");
                return None;
            }
            match read_list_file(path) {
                Ok(entries) => Some((entries, ListSource::File(path.to_path_buf()))),
                Err(e) => {
                    tracing::warn!(list = %kind, path = ?path, error = %e, "Failed to read list file, using fallback");
                    None
                }
            }
        });

        let (entries, source) = from_file.unwrap_or_else(|| self.fallback(kind));
        tracing::info!(list = %kind, source = ?source, entries = entries.len(), "Access list loaded");
        metrics::counter!("proxy_access_list_reloads_total", "list" => kind.as_str()).increment(1);

        match kind {
            ListKind::Whitelist => self.whitelist.store(Arc::new(entries)),
            ListKind::Blacklist => self.blacklist.store(Arc::new(Blacklist::from_entries(entries))),
        }
        source
    }

    fn fallback(&self, kind: ListKind) -> (Vec<String>, ListSource) {
        match kind {
            ListKind::Whitelist => (self.static_whitelist.clone(), ListSource::Static),
            ListKind::Blacklist => match &self.static_blacklist {
                Some(entries) => (entries.clone(), ListSource::Static),
                None => (
                    DEFAULT_BLACKLIST.iter().map(|s| s.to_string()).collect(),
                    ListSource::BuiltIn,
                ),
            },
        }
    }

    pub fn proxy_all_domains(&self) -> bool {
        self.proxy_all_domains
    }

    /// Current whitelist snapshot.
    pub fn whitelist(&self) -> Arc<Vec<String>> {
        self.whitelist.load_full()
    }

    /// Current blacklist entries.
    pub fn blacklist(&self) -> Vec<String> {
        self.blacklist.load().entries().to_vec()
    }

    pub fn is_blacklisted(&self, host_or_ip: &str) -> bool {
        self.blacklist.load().contains(host_or_ip)
    }

    pub fn is_ip_blacklisted(&self, ip: IpAddr) -> bool {
        self.blacklist.load().contains_ip(ip)
    }

    /// Whether a host ends with a whitelisted domain suffix.
    pub fn is_whitelisted(&self, host: &str) -> bool {
        let host = strip_port(host).to_ascii_lowercase();
        self.whitelist.load().iter().any(|entry| {
            let suffix = normalize_suffix(entry);
            !suffix.is_empty()
                && (host == suffix
                    || (host.ends_with(&suffix)
                        && host.as_bytes()[host.len() - suffix.len() - 1] == b'.'))
        })
    }

    /// Full access check for a host (with or without port).
    pub fn check_host(&self, host: &str) -> ProxyResult<()> {
        if self.is_blacklisted(host) {
            tracing::warn!(host = %host, "Rejected blacklisted host");
            metrics::counter!("proxy_blocked_total", "reason" => "blacklist").increment(1);
            return Err(ProxyError::Forbidden);
        }
        if !self.proxy_all_domains && !self.is_whitelisted(host) {
            tracing::warn!(host = %host, "Rejected host outside whitelist");
            metrics::counter!("proxy_blocked_total", "reason" => "whitelist").increment(1);
            return Err(ProxyError::Forbidden);
        }
        Ok(())
    }

    /// Access check for an absolute URL.
    pub fn check_url(&self, url: &Url) -> ProxyResult<()> {
        let host = url.host_str().ok_or(ProxyError::Forbidden)?;
        self.check_host(host)
    }
}
