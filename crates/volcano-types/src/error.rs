//! Error types for frame decoding and command validation.

use thiserror::Error;

/// Errors that can occur when decoding a characteristic frame.
///
/// Decode errors are diagnostic, not fatal: a malformed frame is dropped by
/// the ingest path without disturbing an otherwise healthy session.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// Frame length does not match any layout for the characteristic.
    #[error("unexpected frame length: expected {expected} bytes, got {actual}")]
    UnexpectedLength {
        /// Accepted length(s), rendered for diagnostics (e.g. "2 or 4").
        expected: &'static str,
        /// Actual frame length received.
        actual: usize,
    },

    /// Frame had a valid length but an impossible value.
    #[error("invalid value: {0}")]
    InvalidValue(String),
}

/// Errors raised when a command parameter fails range validation.
///
/// Validation happens before any bytes are produced; no partially-valid
/// encode is ever returned.
#[derive(Debug, Error, PartialEq)]
#[non_exhaustive]
pub enum ValidationError {
    /// Temperature setpoint outside the supported range.
    #[error("temperature {0} °C out of range (40-230 °C)")]
    TemperatureOutOfRange(f32),

    /// LED brightness outside 0-100 percent.
    #[error("brightness {0}% out of range (0-100%)")]
    BrightnessOutOfRange(u8),

    /// Auto-shutoff timer outside the supported range.
    #[error("auto-shutoff {0} min out of range (30-360 min)")]
    ShutoffOutOfRange(u16),
}

/// Result type alias for decode operations.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
