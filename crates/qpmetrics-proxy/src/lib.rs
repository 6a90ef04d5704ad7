//! qpmetrics sidecar library entry.
//!
//! Wires the request metrics handlers, the metric registry, configuration,
//! and the axum surface into a servable stack. Consumed by the binary
//! (`main.rs`) and by integration tests.

pub mod app_state;
pub mod config;
pub mod handler;
pub mod limiter;
pub mod obs;
pub mod ops;
pub mod router;
pub mod services;
pub mod transport;
