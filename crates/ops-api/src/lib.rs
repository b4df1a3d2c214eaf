//! # ops-api
//!
//! REST API handlers for OpsConsole. JSON request and response bodies use
//! camelCase field names; everything is served under `/api/v1`.

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod routes;

pub use extractors::AppState;
pub use routes::router;
