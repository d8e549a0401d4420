//! Transport abstraction over the physical GATT link.
//!
//! The coordinator talks to the device exclusively through
//! [`DeviceTransport`], so the connection manager, command dispatcher, and
//! tests are independent of the Bluetooth stack. [`crate::ble::BleTransport`]
//! is the btleplug implementation; [`crate::mock::MockTransport`] drives the
//! test suites.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::Stream;
use uuid::Uuid;

use crate::error::Result;

/// Stream of raw notification frames for one characteristic.
pub type NotificationStream = Pin<Box<dyn Stream<Item = Vec<u8>> + Send>>;

/// Operations against one physical GATT link.
///
/// Implementations do not serialize calls themselves; the coordinator
/// enforces single-flight access, so at most one operation is in flight
/// against the link at any time.
#[async_trait]
pub trait DeviceTransport: Send + Sync {
    /// Establish a fresh link to the configured device.
    async fn connect(&self) -> Result<()>;

    /// Tear the link down. Idempotent.
    async fn disconnect(&self) -> Result<()>;

    /// Whether the stack currently reports a live link.
    async fn is_connected(&self) -> bool;

    /// Read a characteristic value.
    async fn read(&self, characteristic: Uuid) -> Result<Vec<u8>>;

    /// Write a characteristic value.
    async fn write(&self, characteristic: Uuid, data: &[u8]) -> Result<()>;

    /// Subscribe to notifications for a characteristic.
    ///
    /// The stream ends when the link drops or the transport disconnects.
    async fn subscribe(&self, characteristic: Uuid) -> Result<NotificationStream>;

    /// Current signal strength in dBm, when the platform exposes it.
    async fn rssi(&self) -> Result<Option<i16>>;
}

/// Signal strength quality levels based on RSSI values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SignalQuality {
    /// Signal too weak for reliable operation (< -85 dBm).
    Poor,
    /// Usable but may have issues (-85 to -75 dBm).
    Fair,
    /// Good signal strength (-75 to -60 dBm).
    Good,
    /// Excellent signal strength (> -60 dBm).
    Excellent,
}

impl SignalQuality {
    /// Determine signal quality from an RSSI value in dBm.
    pub fn from_rssi(rssi: i16) -> Self {
        match rssi {
            r if r > -60 => SignalQuality::Excellent,
            r if r > -75 => SignalQuality::Good,
            r if r > -85 => SignalQuality::Fair,
            _ => SignalQuality::Poor,
        }
    }

    /// Human-readable description of the signal quality.
    pub fn description(&self) -> &'static str {
        match self {
            SignalQuality::Excellent => "Excellent signal",
            SignalQuality::Good => "Good signal",
            SignalQuality::Fair => "Fair signal - connection may be unstable",
            SignalQuality::Poor => "Poor signal - consider moving closer",
        }
    }

    /// Whether the signal is strong enough for reliable operation.
    pub fn is_usable(&self) -> bool {
        matches!(
            self,
            SignalQuality::Excellent | SignalQuality::Good | SignalQuality::Fair
        )
    }

    /// Suggested slow-poll stretch factor for weak links.
    pub fn recommended_poll_backoff(&self) -> Duration {
        match self {
            SignalQuality::Excellent | SignalQuality::Good => Duration::ZERO,
            SignalQuality::Fair => Duration::from_millis(250),
            SignalQuality::Poor => Duration::from_secs(1),
        }
    }
}
