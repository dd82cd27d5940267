//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware)
//!     → request.rs (request ID)
//!     → proxy::ProxyService (target, access checks, dispatch)
//!     → response.rs (errors to status codes)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;
pub mod settings;

pub use request::{UuidRequestId, X_REQUEST_ID};
pub use server::HttpServer;
pub use settings::SafeSettings;
