//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use geoproxy::{HostAccessControl, HttpServer, ProxyConfig, Shutdown};
use tokio::net::TcpListener;

/// Start a mock origin serving `app` on an ephemeral loopback port.
pub async fn start_origin(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// An address nothing listens on.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

/// A config that proxies every host, loopback included.
pub fn open_config() -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.proxy.proxy_all_domains = true;
    config.proxy.blacklisted_addresses = Some(Vec::new());
    config.timeouts.connect_secs = 2;
    config.timeouts.upstream_secs = 5;
    config
}

/// A running proxy, shut down on drop.
pub struct TestProxy {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
}

impl TestProxy {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// URL proxying `target` through `/proxy/`.
    pub fn proxied(&self, target: &str) -> String {
        self.url(&format!("/proxy/{}", target))
    }
}

impl Drop for TestProxy {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

pub async fn start_proxy(config: ProxyConfig) -> TestProxy {
    let shutdown = Shutdown::new();
    let acl = Arc::new(HostAccessControl::new(&config.proxy));
    acl.watch(&shutdown);

    let server = HttpServer::new(&config, acl).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let rx = shutdown.subscribe();
    tokio::spawn(async move {
        server.run(listener, rx).await.unwrap();
    });

    TestProxy { addr, shutdown }
}

/// Test client that talks to the proxy directly and never follows redirects.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap()
}
