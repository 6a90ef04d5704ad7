//! qpmetrics core: label names, tag sets, route-tag classification, and the
//! revision resource descriptor shared by the request metrics handlers.
//!
//! This crate carries no HTTP or runtime dependencies. Header values are
//! passed in as plain `Option<&str>` so the same classification logic can sit
//! behind any transport.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here. Invalid identity
//! strings surface as `QueueProxyError` at construction time.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod resource;
pub mod tags;

pub use error::{ErrorCode, QueueProxyError, Result};
pub use resource::{ResourceDescriptor, RevisionIdentity};
pub use tags::{response_code_class, RouteTag, TagSet};
