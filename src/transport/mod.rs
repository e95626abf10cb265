//! Transport layer for the gateway.
//!
//! - `http`: listener, middleware stack and graceful shutdown
//! - `routes`: the `/api/v1` endpoints and their shared state

pub mod http;
pub mod routes;

pub use http::{HttpSettings, HttpTransport, build_app};
pub use routes::{API_PREFIX, AppState, router};
