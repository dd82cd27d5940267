//! Geoportal forward proxy.
//!
//! Relays browser requests of the form `/proxy/[_<duration>/]<target>` to
//! whitelisted map servers, guarding against server-side request forgery
//! at request time, on every redirect hop and after DNS resolution.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod proxy;
pub mod security;

pub use config::schema::ProxyConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use security::HostAccessControl;
