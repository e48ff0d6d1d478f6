//! Mockup HTTP server module.
//!
//! # Module Structure
//!
//! - `core` - MockServer struct and main run loop
//! - `handler` - Request routing and per-method handling
//! - `headers` - Per-resource `headers.json` loading
//! - `response` - Response construction helpers
//! - `tls` - TLS acceptor construction

mod core;
mod handler;
mod headers;
mod response;
mod tls;

pub use self::core::{AppState, MockServer};
pub use self::response::{build_response, error_response, json_response};
