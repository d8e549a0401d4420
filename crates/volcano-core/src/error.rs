//! Error types for volcano-core.
//!
//! # Recovery strategies
//!
//! | Error | Strategy | Rationale |
//! |-------|----------|-----------|
//! | [`Error::NotConnected`] | Reconnect first | Commands are never queued across disconnects |
//! | [`Error::ConnectionFailed`] | Nothing to do | The coordinator retries on its own timer |
//! | [`Error::Timeout`] | Re-issue the wait | The underlying command may still have landed |
//! | [`Error::Cancelled`] | Expected | Wait was superseded by disconnect or a newer command |
//! | [`Error::Validation`] | Fix the parameter | Raised before any write is attempted |
//! | [`Error::Bluetooth`] | Retry or wait for reconnect | Often transient |
//!
//! Frame decode failures ([`volcano_types::ParseError`]) never surface here:
//! the ingest path absorbs them, logs, and keeps the session alive.

use std::time::Duration;

use thiserror::Error;

use volcano_types::ValidationError;

/// Errors returned by coordinator commands and waits.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Bluetooth Low Energy error.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// Command issued while the link is not established.
    #[error("not connected to device")]
    NotConnected,

    /// Connection attempt failed with a structured reason.
    #[error("connection failed: {reason}")]
    ConnectionFailed {
        /// Configured device address, if known.
        device: Option<String>,
        /// The structured reason for the failure.
        reason: ConnectionFailureReason,
    },

    /// Required GATT characteristic not present on the device.
    #[error("characteristic not found: {uuid}")]
    CharacteristicNotFound {
        /// The UUID that was not found.
        uuid: String,
    },

    /// Blocking operation exceeded its deadline.
    #[error("operation '{operation}' timed out after {duration:?}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The timeout duration.
        duration: Duration,
    },

    /// Wait released by disconnect or a newer conflicting command.
    #[error("operation cancelled")]
    Cancelled,

    /// Command parameter failed range validation; no write was attempted.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Invalid coordinator configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Structured reasons for connection failures.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new reasons
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConnectionFailureReason {
    /// Bluetooth adapter not available or powered off.
    AdapterUnavailable,
    /// Configured address did not show up during the lookup window.
    DeviceNotFound,
    /// Connection attempt timed out.
    Timeout,
    /// Device refused the connection (e.g. claimed by another client).
    Rejected,
    /// Generic BLE error.
    BleError(String),
    /// Other/unknown error.
    Other(String),
}

impl std::fmt::Display for ConnectionFailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AdapterUnavailable => write!(f, "Bluetooth adapter unavailable"),
            Self::DeviceNotFound => write!(f, "device not found"),
            Self::Timeout => write!(f, "connection timed out"),
            Self::Rejected => write!(f, "connection refused by device"),
            Self::BleError(msg) => write!(f, "BLE error: {}", msg),
            Self::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl Error {
    /// Create a timeout error with operation context.
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Create a characteristic not found error.
    pub fn characteristic_not_found(uuid: impl Into<String>) -> Self {
        Self::CharacteristicNotFound { uuid: uuid.into() }
    }

    /// Create a connection failure with structured reason.
    pub fn connection_failed(device: Option<String>, reason: ConnectionFailureReason) -> Self {
        Self::ConnectionFailed { device, reason }
    }
}

/// Result type alias using volcano-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::NotConnected;
        assert_eq!(err.to_string(), "not connected to device");

        let err = Error::timeout("wait for target temperature", Duration::from_secs(30));
        assert!(err.to_string().contains("wait for target temperature"));
        assert!(err.to_string().contains("30s"));

        let err = Error::connection_failed(
            Some("CE:9E:A6:43:25:F3".to_string()),
            ConnectionFailureReason::Rejected,
        );
        assert!(err.to_string().contains("refused"));
    }

    #[test]
    fn test_validation_error_passthrough() {
        let err: Error = volcano_types::codec::encode_led_brightness(150).unwrap_err().into();
        assert!(matches!(err, Error::Validation(_)));
        assert!(err.to_string().contains("150"));
    }

    #[test]
    fn test_btleplug_error_conversion() {
        fn _assert_from_impl<T: From<btleplug::Error>>() {}
        _assert_from_impl::<Error>();
    }
}
