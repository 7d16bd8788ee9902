//! Server library: configuration, logging, metrics, and the HTTP/WS
//! API. The binary in `main.rs` wires these together; integration
//! tests drive the router directly.

pub mod api;
pub mod config;
pub mod logging;
pub mod metrics;
