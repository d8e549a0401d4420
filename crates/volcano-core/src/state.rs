//! Authoritative in-memory device state with change notification.
//!
//! The [`StateStore`] holds the single live [`DeviceState`] snapshot. All
//! mutation funnels through [`StateStore::apply`], which is the sole
//! serialization point: it merges a partial update, stamps `last_updated`
//! for the fields that actually changed, and fans the change out to
//! subscribers over a broadcast channel.
//!
//! Subscribers are decoupled from ingestion: a slow subscriber lags and
//! drops messages instead of stalling `apply`, so one misbehaving observer
//! cannot block new device frames.

use std::collections::BTreeMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::sync::broadcast;
use tracing::debug;

use volcano_types::{AutoShutoff, ConnectionStatus, OperatingTime, PowerState};

/// Broadcast capacity for state changes. Laggards drop beyond this.
const EVENT_CAPACITY: usize = 64;

/// Identifies one mutable field of [`DeviceState`] for change reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum Field {
    /// Bluetooth link status.
    ConnectionStatus,
    /// Current chamber temperature.
    CurrentTemperature,
    /// Heater setpoint as last read back from the device.
    TargetTemperature,
    /// Heater on/off state.
    Heat,
    /// Pump on/off state.
    Pump,
    /// Fan on/off state.
    Fan,
    /// LED display brightness.
    LedBrightness,
    /// Auto-shutoff timer setting.
    AutoShutoff,
    /// BLE module firmware version.
    BleFirmwareVersion,
    /// Appliance firmware version.
    FirmwareVersion,
    /// Serial number.
    SerialNumber,
    /// Accumulated operating time.
    OperatingTime,
    /// Link signal strength in dBm.
    SignalStrength,
}

/// Snapshot of everything known about the device.
///
/// Fields hold the last successfully decoded value; `None`/`Unknown` means
/// no successful read yet. Values are never reset on link loss — they
/// freeze, and `last_updated` lets consumers detect staleness.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceState {
    /// Bluetooth link status. Written only by the connection manager.
    pub connection_status: ConnectionStatus,
    /// Current chamber temperature in °C, quantized to 0.1.
    pub current_temperature: Option<f32>,
    /// Heater setpoint in °C as last read from the device.
    pub target_temperature: Option<f32>,
    /// Heater state.
    pub heat: PowerState,
    /// Pump state.
    pub pump: PowerState,
    /// Fan state.
    pub fan: PowerState,
    /// LED display brightness percent.
    pub led_brightness: Option<u8>,
    /// Auto-shutoff timer.
    pub auto_shutoff: Option<AutoShutoff>,
    /// BLE module firmware version; immutable after first read.
    pub ble_firmware_version: Option<String>,
    /// Appliance firmware version; immutable after first read.
    pub firmware_version: Option<String>,
    /// Serial number; immutable after first read.
    pub serial_number: Option<String>,
    /// Accumulated operating time.
    pub operating_time: Option<OperatingTime>,
    /// Link signal strength in dBm, refreshed opportunistically.
    pub signal_strength_dbm: Option<i16>,
    /// When each field last changed.
    pub last_updated: BTreeMap<Field, OffsetDateTime>,
}

impl DeviceState {
    /// When `field` last changed, if it ever has.
    pub fn last_updated(&self, field: Field) -> Option<OffsetDateTime> {
        self.last_updated.get(&field).copied()
    }

    /// Age of `field` relative to now, if it has ever been updated.
    pub fn age(&self, field: Field) -> Option<time::Duration> {
        self.last_updated(field)
            .map(|at| OffsetDateTime::now_utc() - at)
    }
}

/// Partial update merged into the snapshot by [`StateStore::apply`].
///
/// Only `Some` fields are touched; everything else keeps its value.
#[derive(Debug, Clone, Default)]
pub struct StateUpdate {
    /// New link status.
    pub connection_status: Option<ConnectionStatus>,
    /// New chamber temperature.
    pub current_temperature: Option<f32>,
    /// New heater setpoint reading.
    pub target_temperature: Option<f32>,
    /// New heater state.
    pub heat: Option<PowerState>,
    /// New pump state.
    pub pump: Option<PowerState>,
    /// New fan state.
    pub fan: Option<PowerState>,
    /// New LED brightness.
    pub led_brightness: Option<u8>,
    /// New auto-shutoff setting.
    pub auto_shutoff: Option<AutoShutoff>,
    /// BLE firmware version (applied once).
    pub ble_firmware_version: Option<String>,
    /// Appliance firmware version (applied once).
    pub firmware_version: Option<String>,
    /// Serial number (applied once).
    pub serial_number: Option<String>,
    /// New operating time.
    pub operating_time: Option<OperatingTime>,
    /// New signal strength.
    pub signal_strength_dbm: Option<i16>,
}

impl StateUpdate {
    /// Update carrying only a link-status transition.
    pub fn status(status: ConnectionStatus) -> Self {
        Self {
            connection_status: Some(status),
            ..Default::default()
        }
    }

    /// Update carrying only a temperature reading.
    pub fn temperature(celsius: f32) -> Self {
        Self {
            current_temperature: Some(celsius),
            ..Default::default()
        }
    }

    /// Update carrying decoded status-register flags.
    pub fn flags(heat: PowerState, pump: PowerState, fan: PowerState) -> Self {
        Self {
            heat: Some(heat),
            pump: Some(pump),
            fan: Some(fan),
            ..Default::default()
        }
    }
}

/// A state change delivered to subscribers.
#[derive(Debug, Clone)]
pub struct StateChange {
    /// Fields whose values actually changed, in declaration order.
    pub changed: Vec<Field>,
    /// Snapshot after the change.
    pub state: DeviceState,
}

/// Receiver half of the state-change broadcast.
///
/// Dropping the receiver unsubscribes.
pub type StateReceiver = broadcast::Receiver<StateChange>;

/// The single authoritative state store for one device.
pub struct StateStore {
    state: RwLock<DeviceState>,
    events: broadcast::Sender<StateChange>,
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StateStore {
    /// Create an empty store.
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state: RwLock::new(DeviceState::default()),
            events,
        }
    }

    /// Return an owned copy of the current snapshot.
    pub fn snapshot(&self) -> DeviceState {
        self.state.read().expect("state lock poisoned").clone()
    }

    /// Subscribe to state changes.
    ///
    /// Each change carries the changed-field set and the new snapshot.
    /// Slow subscribers lag and drop old changes rather than stalling
    /// ingestion; resynchronize with [`snapshot`](Self::snapshot) after a
    /// [`broadcast::error::RecvError::Lagged`].
    pub fn subscribe(&self) -> StateReceiver {
        self.events.subscribe()
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.events.receiver_count()
    }

    /// Merge a partial update into the snapshot.
    ///
    /// Returns the fields whose values actually changed (value inequality,
    /// not mere touch); subscribers are only notified when that set is
    /// non-empty. Firmware and serial fields are set-once: later differing
    /// reads are ignored.
    pub fn apply(&self, update: StateUpdate) -> Vec<Field> {
        let (changed, state) = {
            let mut state = self.state.write().expect("state lock poisoned");
            let mut changed = Vec::new();

            macro_rules! merge {
                ($field:ident, $tag:expr) => {
                    if let Some(value) = update.$field {
                        if state.$field != Some(value) {
                            state.$field = Some(value);
                            changed.push($tag);
                        }
                    }
                };
            }
            macro_rules! merge_plain {
                ($field:ident, $tag:expr) => {
                    if let Some(value) = update.$field {
                        if state.$field != value {
                            state.$field = value;
                            changed.push($tag);
                        }
                    }
                };
            }
            macro_rules! merge_once {
                ($field:ident, $tag:expr) => {
                    if let Some(value) = update.$field {
                        match &state.$field {
                            Some(existing) if *existing != value => {
                                // Device info is immutable per session; a differing
                                // re-read is noise, not a new identity.
                                debug!(
                                    field = ?$tag,
                                    "ignoring changed device-info value after first read"
                                );
                            }
                            Some(_) => {}
                            None => {
                                state.$field = Some(value);
                                changed.push($tag);
                            }
                        }
                    }
                };
            }

            merge_plain!(connection_status, Field::ConnectionStatus);
            merge!(current_temperature, Field::CurrentTemperature);
            merge!(target_temperature, Field::TargetTemperature);
            merge_plain!(heat, Field::Heat);
            merge_plain!(pump, Field::Pump);
            merge_plain!(fan, Field::Fan);
            merge!(led_brightness, Field::LedBrightness);
            merge!(auto_shutoff, Field::AutoShutoff);
            merge_once!(ble_firmware_version, Field::BleFirmwareVersion);
            merge_once!(firmware_version, Field::FirmwareVersion);
            merge_once!(serial_number, Field::SerialNumber);
            merge!(operating_time, Field::OperatingTime);
            merge!(signal_strength_dbm, Field::SignalStrength);

            if changed.is_empty() {
                return changed;
            }

            let now = OffsetDateTime::now_utc();
            for field in &changed {
                state.last_updated.insert(*field, now);
            }

            (changed, state.clone())
        };

        // Ignore send errors: no subscribers is fine.
        let _ = self.events.send(StateChange {
            changed: changed.clone(),
            state,
        });
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_reports_changed_fields() {
        let store = StateStore::new();
        let changed = store.apply(StateUpdate::temperature(180.0));
        assert_eq!(changed, vec![Field::CurrentTemperature]);
        assert_eq!(store.snapshot().current_temperature, Some(180.0));
    }

    #[test]
    fn test_apply_equal_value_changes_nothing() {
        let store = StateStore::new();
        store.apply(StateUpdate::temperature(180.0));
        let before = store.snapshot().last_updated(Field::CurrentTemperature);

        let changed = store.apply(StateUpdate::temperature(180.0));
        assert!(changed.is_empty());
        // Timestamp untouched when the value did not change.
        assert_eq!(
            store.snapshot().last_updated(Field::CurrentTemperature),
            before
        );
    }

    #[tokio::test]
    async fn test_no_spurious_notification() {
        let store = StateStore::new();
        store.apply(StateUpdate::temperature(180.0));

        let mut rx = store.subscribe();
        store.apply(StateUpdate::temperature(180.0));
        assert!(matches!(
            rx.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn test_subscriber_receives_change_and_snapshot() {
        let store = StateStore::new();
        let mut rx = store.subscribe();

        store.apply(StateUpdate::flags(
            PowerState::On,
            PowerState::Off,
            PowerState::Off,
        ));

        let change = rx.recv().await.unwrap();
        assert!(change.changed.contains(&Field::Heat));
        assert_eq!(change.state.heat, PowerState::On);
        // Pump/fan changed too: they left Unknown.
        assert!(change.changed.contains(&Field::Pump));
        assert!(change.changed.contains(&Field::Fan));
    }

    #[test]
    fn test_device_info_is_set_once() {
        let store = StateStore::new();
        let changed = store.apply(StateUpdate {
            serial_number: Some("SN-0001".to_string()),
            ..Default::default()
        });
        assert_eq!(changed, vec![Field::SerialNumber]);

        let changed = store.apply(StateUpdate {
            serial_number: Some("SN-9999".to_string()),
            ..Default::default()
        });
        assert!(changed.is_empty());
        assert_eq!(store.snapshot().serial_number.as_deref(), Some("SN-0001"));
    }

    #[test]
    fn test_disconnect_freezes_other_fields() {
        let store = StateStore::new();
        store.apply(StateUpdate {
            connection_status: Some(ConnectionStatus::Connected),
            current_temperature: Some(175.5),
            heat: Some(PowerState::On),
            ..Default::default()
        });

        let changed = store.apply(StateUpdate::status(ConnectionStatus::Disconnected));
        assert_eq!(changed, vec![Field::ConnectionStatus]);

        let state = store.snapshot();
        assert_eq!(state.connection_status, ConnectionStatus::Disconnected);
        assert_eq!(state.current_temperature, Some(175.5));
        assert_eq!(state.heat, PowerState::On);
    }

    #[test]
    fn test_snapshot_is_serializable() {
        let store = StateStore::new();
        store.apply(StateUpdate::temperature(182.3));
        let json = serde_json::to_string(&store.snapshot()).unwrap();
        assert!(json.contains("182.3"));
    }
}
