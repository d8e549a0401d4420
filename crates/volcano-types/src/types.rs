//! Core types for decoded Volcano state.

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Connection status of the Bluetooth link.
///
/// `Error` is entered after repeated consecutive connection failures. It is
/// a visible status, not a dead end: the retry timer keeps firing from it.
///
/// # Display
///
/// `Display` renders the uppercase status strings the appliance integrations
/// expose (`CONNECTED`, `DISCONNECTED`, ...); serde uses the variant names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[non_exhaustive]
pub enum ConnectionStatus {
    /// No link; either idle or waiting for the next reconnect attempt.
    #[default]
    Disconnected,
    /// A connection attempt is in flight.
    Connecting,
    /// Link established, characteristics subscribed, snapshot seeded.
    Connected,
    /// Too many consecutive failed attempts; still retrying.
    Error,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Disconnected => write!(f, "DISCONNECTED"),
            ConnectionStatus::Connecting => write!(f, "CONNECTING"),
            ConnectionStatus::Connected => write!(f, "CONNECTED"),
            ConnectionStatus::Error => write!(f, "ERROR"),
        }
    }
}

/// On/off state of a switched subsystem (heater, pump, fan).
///
/// `Unknown` is the initial state and the decode result for unrecognized
/// status-register patterns; a field only leaves `Unknown` after a
/// successfully decoded frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum PowerState {
    /// Subsystem is running.
    On,
    /// Subsystem is off.
    Off,
    /// No decoded frame yet, or the pattern was not recognized.
    #[default]
    Unknown,
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PowerState::On => write!(f, "ON"),
            PowerState::Off => write!(f, "OFF"),
            PowerState::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Decoded status-register frame.
///
/// `unrecognized` carries the raw register value when any field decoded to
/// `Unknown` because its masked bits matched no table entry, so the ingest
/// layer can log each unseen pattern once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StatusFlags {
    /// Heater state.
    pub heat: PowerState,
    /// Pump state.
    pub pump: PowerState,
    /// Fan state.
    pub fan: PowerState,
    /// Raw register value, present when any field fell back to `Unknown`.
    pub unrecognized: Option<u16>,
}

/// Auto-shutoff timer setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AutoShutoff {
    /// Whether the timer is armed.
    pub enabled: bool,
    /// Timer duration in minutes (30-360 when enabled, 0 when disabled).
    pub minutes: u16,
}

/// Accumulated operating time of the heater.
///
/// Monotonically non-decreasing while connected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct OperatingTime {
    /// Whole hours of operation.
    pub hours: u32,
    /// Minutes past the hour (0-59).
    pub minutes: u8,
}

impl fmt::Display for OperatingTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}h{:02}m", self.hours, self.minutes)
    }
}
