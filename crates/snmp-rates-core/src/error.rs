//! Error types for the rate engine

use alloc::string::String;
use thiserror_no_std::Error;

/// Errors surfaced by the rate engine.
///
/// Only caller mistakes end up here. Abnormal measurements (no baseline yet,
/// clock regression, stale sequence, unknown delta) degrade to the caller's
/// faulty return value instead.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RateError {
    /// `minDelta`/`maxDelta` violate the configuration rules
    #[error("Invalid rate configuration: {reason}")]
    InvalidConfiguration {
        /// Which rule was violated
        reason: &'static str,
    },

    /// The host reported a calculation method other than Fast (1) or Accurate (2)
    #[error("Unsupported rate calculation mode: {0}")]
    UnsupportedCalculationMode(i64),

    /// A non-blank persisted blob could not be restored
    #[error("Corrupt rate state: {0}")]
    CorruptState(String),

    /// The current state could not be serialized
    #[error("Failed to serialize rate state: {0}")]
    Serialization(String),
}

/// Result type for rate engine operations
pub type RateResult<T> = Result<T, RateError>;
