//! Shared error type across qpmetrics crates.

use thiserror::Error;

/// Stable diagnostic codes (printed by the startup CLI, asserted by tests).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// An identity string cannot be used as a metric label value.
    InvalidTagValue,
    /// Record/observe against an instrument that was never registered.
    UnknownInstrument,
    /// Instrument exists but with a different kind.
    InstrumentKindMismatch,
    /// Malformed or out-of-range configuration.
    BadConfig,
    /// Unsupported config version.
    UnsupportedVersion,
    /// Internal failure (I/O, bind, ...).
    Internal,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::InvalidTagValue => "INVALID_TAG_VALUE",
            ErrorCode::UnknownInstrument => "UNKNOWN_INSTRUMENT",
            ErrorCode::InstrumentKindMismatch => "INSTRUMENT_KIND_MISMATCH",
            ErrorCode::BadConfig => "BAD_CONFIG",
            ErrorCode::UnsupportedVersion => "UNSUPPORTED_VERSION",
            ErrorCode::Internal => "INTERNAL",
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, QueueProxyError>;

/// Unified error type used by core and proxy.
#[derive(Debug, Error)]
pub enum QueueProxyError {
    #[error("invalid value for label {label}: {value:?} is not ASCII")]
    InvalidTagValue { label: &'static str, value: String },
    #[error("unknown instrument: {0}")]
    UnknownInstrument(String),
    #[error("instrument {name} is registered as a {actual}, not a {expected}")]
    InstrumentKindMismatch {
        name: String,
        expected: &'static str,
        actual: &'static str,
    },
    #[error("bad config: {0}")]
    BadConfig(String),
    #[error("unsupported config version")]
    UnsupportedVersion,
    #[error("internal: {0}")]
    Internal(String),
}

impl QueueProxyError {
    pub fn code(&self) -> ErrorCode {
        match self {
            QueueProxyError::InvalidTagValue { .. } => ErrorCode::InvalidTagValue,
            QueueProxyError::UnknownInstrument(_) => ErrorCode::UnknownInstrument,
            QueueProxyError::InstrumentKindMismatch { .. } => ErrorCode::InstrumentKindMismatch,
            QueueProxyError::BadConfig(_) => ErrorCode::BadConfig,
            QueueProxyError::UnsupportedVersion => ErrorCode::UnsupportedVersion,
            QueueProxyError::Internal(_) => ErrorCode::Internal,
        }
    }
}
