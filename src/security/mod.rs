//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → basic_auth.rs (server credentials, when configured)
//!     → limits.rs (POST body size)
//!     → access_control.rs (target host vs blacklist/whitelist)
//!     → headers.rs (strip hop-by-hop, add X-Forwarded-For)
//! Outbound connection:
//!     → dns_guard.rs (resolved address vs blacklist)
//! Background:
//!     → list_watcher.rs (hot reload of list files)
//! ```
//!
//! # Design Decisions
//! - Defense in depth: the host is checked before dispatch, on every
//!   redirect hop, and again after DNS resolution
//! - Fail closed: list loading always ends with *some* list

pub mod access_control;
pub mod basic_auth;
pub mod dns_guard;
pub mod headers;
pub mod limits;
pub mod list_watcher;

pub use access_control::{HostAccessControl, ListKind, DEFAULT_BLACKLIST};
