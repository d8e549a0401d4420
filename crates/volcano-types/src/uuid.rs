//! Bluetooth UUIDs for the Volcano vaporizer.
//!
//! All vendor characteristics share the Storz & Bickel suffix
//! `5354-4f52-5a26-4249434b454c` ("STORZ&BICKEL" in ASCII). The device
//! exposes two vendor services: one for device information and the status
//! register, one for heater/pump control.
//!
//! Each constant documents its direction (read, write, notify) and wire
//! layout; the layouts themselves are implemented in [`crate::codec`].

use uuid::{Uuid, uuid};

// --- Storz & Bickel Service UUIDs ---

/// Device-information service (firmware, serial, status register).
pub const INFO_SERVICE: Uuid = uuid!("10100000-5354-4f52-5a26-4249434b454c");

/// Heater/pump control service (temperature, setpoints, switches).
pub const CONTROL_SERVICE: Uuid = uuid!("10110000-5354-4f52-5a26-4249434b454c");

// --- Control Characteristic UUIDs ---

/// Current chamber temperature. Read/notify; u16 LE tenths of °C or f32 LE.
pub const CURRENT_TEMPERATURE: Uuid = uuid!("10110001-5354-4f52-5a26-4249434b454c");

/// Heater temperature setpoint. Read/write; u16 LE tenths of °C.
pub const TARGET_TEMPERATURE: Uuid = uuid!("10110003-5354-4f52-5a26-4249434b454c");

/// LED display brightness. Read/write; u8 percent (0-100).
pub const LED_BRIGHTNESS: Uuid = uuid!("10110005-5354-4f52-5a26-4249434b454c");

/// Auto-shutoff timer. Read/write; u16 LE seconds, zero when disabled.
pub const AUTO_SHUTOFF: Uuid = uuid!("1011000d-5354-4f52-5a26-4249434b454c");

/// Heater on switch. Write; single byte `0x01`.
pub const HEAT_ON: Uuid = uuid!("1011000f-5354-4f52-5a26-4249434b454c");

/// Heater off switch. Write; single byte `0x00`.
pub const HEAT_OFF: Uuid = uuid!("10110010-5354-4f52-5a26-4249434b454c");

/// Pump on switch. Write; single byte `0x01`.
pub const PUMP_ON: Uuid = uuid!("10110013-5354-4f52-5a26-4249434b454c");

/// Pump off switch. Write; single byte `0x00`.
pub const PUMP_OFF: Uuid = uuid!("10110014-5354-4f52-5a26-4249434b454c");

/// Hours and minutes of operation. Read; u16 LE hours + u8 minutes.
pub const HOURS_OF_OPERATION: Uuid = uuid!("10110015-5354-4f52-5a26-4249434b454c");

// --- Info Characteristic UUIDs ---

/// Firmware version of the appliance. Read; padded ASCII string.
pub const FIRMWARE_VERSION: Uuid = uuid!("10100003-5354-4f52-5a26-4249434b454c");

/// Firmware version of the BLE module. Read; padded ASCII string.
pub const BLE_FIRMWARE_VERSION: Uuid = uuid!("10100004-5354-4f52-5a26-4249434b454c");

/// Serial number. Read; padded ASCII string.
pub const SERIAL_NUMBER: Uuid = uuid!("10100008-5354-4f52-5a26-4249434b454c");

/// Status register carrying heat/pump/fan flags. Read/notify; u16 LE bitmask.
pub const STATUS_REGISTER: Uuid = uuid!("1010000c-5354-4f52-5a26-4249434b454c");

/// Haptic feedback switch. Write; single byte `0x00`/`0x01`.
pub const VIBRATION: Uuid = uuid!("1010000e-5354-4f52-5a26-4249434b454c");

/// Characteristics read once per connection to seed the state snapshot
/// before the link is declared connected. The status register is also
/// notify-driven afterwards; temperature moves to the fast poll cycle.
pub const INITIAL_READ_CHARACTERISTICS: &[Uuid] = &[
    CURRENT_TEMPERATURE,
    TARGET_TEMPERATURE,
    LED_BRIGHTNESS,
    AUTO_SHUTOFF,
    HOURS_OF_OPERATION,
    FIRMWARE_VERSION,
    BLE_FIRMWARE_VERSION,
    SERIAL_NUMBER,
    STATUS_REGISTER,
];
