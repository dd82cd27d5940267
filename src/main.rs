//! geoproxy: a forward proxy for geoportal map clients.
//!
//! ```text
//!     Browser ──▶ /proxy/_2h/https://tiles.example.com/wmts?...
//!                     │
//!                     ├─ target + access checks (whitelist, blacklist)
//!                     ├─ query rules, per-host credentials
//!                     ├─ direct or via upstream proxy
//!                     │      └─ DNS guard on every connection
//!                     ▼
//!                 Map server ──▶ streamed back with Cache-Control + CORS
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use geoproxy::config::{load_config, ProxyConfig};
use geoproxy::lifecycle::{shutdown_signal, Shutdown};
use geoproxy::observability::{logging, metrics};
use geoproxy::{HostAccessControl, HttpServer};

#[derive(Debug, Parser)]
#[command(name = "geoproxy", version, about = "Forward proxy for geoportal map services")]
struct Cli {
    /// Path to the TOML configuration file. Built-in defaults when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };

    logging::init(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "geoproxy starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        proxy_all_domains = config.proxy.proxy_all_domains,
        upstream_proxy = config.proxy.upstream_proxy.is_some(),
        basic_auth = config.server.basic_authentication.is_some(),
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        let addr: SocketAddr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr)?;
    }

    let shutdown = Shutdown::new();
    let acl = Arc::new(HostAccessControl::new(&config.proxy));
    acl.watch(&shutdown);

    let server = HttpServer::new(&config, acl)?;
    let listener = TcpListener::bind(&config.listener.bind_address).await?;

    let server_shutdown = shutdown.subscribe();
    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_shutdown.trigger();
    });

    server.run(listener, server_shutdown).await?;
    shutdown.trigger();

    tracing::info!("Shutdown complete");
    Ok(())
}
