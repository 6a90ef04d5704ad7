//! Top-level facade crate for qpmetrics.
//!
//! Re-exports core types and the proxy library so users can depend on a single crate.

pub mod core {
    pub use qpmetrics_core::*;
}

pub mod proxy {
    pub use qpmetrics_proxy::*;
}
