//! Forward proxy pipeline.
//!
//! # Data Flow
//! ```text
//! /proxy/[_<duration>/]<target>
//!     → target.rs (split route, repair scheme, validate URL)
//!     → security::access_control (blacklist, whitelist)
//!     → duration.rs (cache max-age)
//!     → query.rs (per-host query parameters)
//!     → upstream.rs (direct or via upstream proxy)
//!     → auth.rs (credentials per attempt, 403 retries)
//!     → client.rs (send, guarded redirects)
//!     → stream response back with rewritten headers
//! ```

pub mod auth;
pub mod client;
pub mod duration;
pub mod error;
pub mod handler;
pub mod query;
pub mod target;
pub mod upstream;

pub use error::{ProxyError, ProxyResult, SetupError};
pub use handler::{InboundRequest, ProxyService};
