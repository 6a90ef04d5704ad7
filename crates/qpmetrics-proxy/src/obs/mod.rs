//! In-process metric instruments.
//!
//! Instruments are stored as atomics and rendered by the `/metrics` handler.

pub mod metrics;
