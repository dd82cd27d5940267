//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated, immutable)
//!     → shared via Arc to all subsystems
//! ```
//!
//! Only the host access lists change at runtime; they are watched and
//! swapped by `security::access_control`, not by reloading this config.
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    BasicAuthConfig, HeaderPair, HostAuthRule, ListenerConfig, ObservabilityConfig, ProxyConfig,
    ProxySettings, QueryParamRule, ServerConfig, TimeoutConfig,
};
