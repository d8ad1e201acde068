//! Custom error types for the anemometer core.
//!
//! `AnemometerError` is the single error type used across the crate. It separates
//! three very different failure classes:
//!
//! - **Configuration invariant violations** (`Config`, `Configuration`, `Geometry`):
//!   detected while loading settings or building the [`Geometry`](crate::geometry::Geometry).
//!   These abort initialisation and are never produced per event.
//! - **Malformed input** (`InvalidPrimary`, `MalformedPayload`): the transport handed us
//!   an event we cannot interpret. The burst is dropped before any device state is touched.
//! - **Degenerate bursts** (`Degenerate`): the samples were well formed but carry no usable
//!   half-max crossing. The burst processor recovers from these locally by skipping the
//!   affected transducer pair.

use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type AppResult<T> = std::result::Result<T, AnemometerError>;

/// Reasons a single 16-sample burst cannot yield a time-of-flight.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DegenerateBurst {
    #[error("burst carries no signal energy (peak magnitude is zero)")]
    NoSignal,

    #[error("no sample exceeds the half-maximum threshold")]
    NoThresholdCrossing,

    #[error("interpolation is undefined between samples {less_index} and {greater_index} (equal magnitudes)")]
    FlatInterpolation {
        less_index: usize,
        greater_index: usize,
    },

    #[error("effective sampling frequency {0} is not positive")]
    NonPositiveFrequency(f64),

    #[error("time of flight {0} s is not a positive finite value")]
    NonPositiveTof(f64),
}

/// Errors raised by the anemometer core.
#[derive(Error, Debug)]
pub enum AnemometerError {
    #[error("Configuration error: {0}")]
    Config(#[from] figment::Error),

    #[error("Configuration validation error: {0}")]
    Configuration(String),

    #[error("Geometry invariant violated: {0}")]
    Geometry(String),

    #[error("Primary port {0} is out of range (expected 0-3)")]
    InvalidPrimary(u8),

    #[error("Malformed payload on port {port}: {len} bytes, at least {required} required")]
    MalformedPayload {
        port: usize,
        len: usize,
        required: usize,
    },

    #[error("Degenerate burst: {0}")]
    Degenerate(#[from] DegenerateBurst),

    #[error("Output sink error: {0}")]
    Sink(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AnemometerError {
    /// Whether processing can continue with the next event after this error.
    ///
    /// Errors tied to a single event (malformed input, degenerate bursts, a record
    /// that fails to serialise) are recoverable. Configuration errors and a sink that
    /// can no longer accept records are fatal.
    pub fn is_recoverable(&self) -> bool {
        match self {
            AnemometerError::InvalidPrimary(_)
            | AnemometerError::MalformedPayload { .. }
            | AnemometerError::Degenerate(_)
            | AnemometerError::Json(_) => true,
            AnemometerError::Config(_)
            | AnemometerError::Configuration(_)
            | AnemometerError::Geometry(_)
            | AnemometerError::Sink(_)
            | AnemometerError::Io(_) => false,
        }
    }
}
