//! Binary codec for Volcano characteristic frames.
//!
//! One decode/encode pair per characteristic. All functions are pure:
//! decoding never touches state, encoding validates its input range before
//! producing bytes, and no partially-valid encode is ever returned.
//!
//! The status-register decoding is table-driven. The vendor encoding is
//! reverse-engineered and has been observed to use more than one bit
//! pattern for the same logical state, so recognition lives in an explicit,
//! appendable table ([`STATUS_PATTERNS`]) instead of bit arithmetic. An
//! unrecognized pattern decodes to [`PowerState::Unknown`] for the affected
//! field; it is never an error.

use bytes::Buf;

use crate::error::{ParseError, ParseResult, ValidationError};
use crate::types::{AutoShutoff, OperatingTime, PowerState, StatusFlags};

/// Lowest accepted heater setpoint in °C.
pub const MIN_TARGET_CELSIUS: f32 = 40.0;

/// Highest accepted heater setpoint in °C.
pub const MAX_TARGET_CELSIUS: f32 = 230.0;

/// Lowest accepted auto-shutoff timer in minutes.
pub const MIN_SHUTOFF_MINUTES: u16 = 30;

/// Highest accepted auto-shutoff timer in minutes.
pub const MAX_SHUTOFF_MINUTES: u16 = 360;

// --- Status register ---

/// Subsystem a status-register pattern applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusField {
    /// Heater flag bits.
    Heat,
    /// Pump flag bits.
    Pump,
    /// Fan flag bits.
    Fan,
}

impl StatusField {
    /// Register bits belonging to this field.
    pub const fn mask(self) -> u16 {
        match self {
            StatusField::Heat => 0x0030,
            StatusField::Pump => 0x6000,
            StatusField::Fan => 0x1800,
        }
    }
}

/// One recognized masked pattern of the status register.
#[derive(Debug, Clone, Copy)]
pub struct StatusPattern {
    /// Field the pattern belongs to.
    pub field: StatusField,
    /// Register value under [`StatusField::mask`].
    pub pattern: u16,
    /// Logical state the pattern encodes.
    pub state: PowerState,
}

const fn pat(field: StatusField, pattern: u16, state: PowerState) -> StatusPattern {
    StatusPattern {
        field,
        pattern,
        state,
    }
}

/// Recognized status-register patterns.
///
/// Append here when a firmware revision surfaces a new representation;
/// nothing else needs to change. Duplicate states per field are expected.
pub const STATUS_PATTERNS: &[StatusPattern] = &[
    pat(StatusField::Heat, 0x0000, PowerState::Off),
    pat(StatusField::Heat, 0x0020, PowerState::On),
    // Firmware >= 3.0 sets the adjacent bit while the heater ramps.
    pat(StatusField::Heat, 0x0030, PowerState::On),
    pat(StatusField::Pump, 0x0000, PowerState::Off),
    pat(StatusField::Pump, 0x2000, PowerState::On),
    pat(StatusField::Pump, 0x6000, PowerState::On),
    pat(StatusField::Fan, 0x0000, PowerState::Off),
    pat(StatusField::Fan, 0x1000, PowerState::On),
    pat(StatusField::Fan, 0x1800, PowerState::On),
];

fn lookup_status(field: StatusField, register: u16) -> Option<PowerState> {
    let masked = register & field.mask();
    STATUS_PATTERNS
        .iter()
        .find(|p| p.field == field && p.pattern == masked)
        .map(|p| p.state)
}

/// Decode the status register into heat/pump/fan flags.
///
/// The frame is a little-endian u16 bitmask; trailing bytes are ignored.
/// Fields whose masked bits match no [`STATUS_PATTERNS`] entry come back as
/// [`PowerState::Unknown`] with the raw register exposed in
/// [`StatusFlags::unrecognized`] for log-once diagnostics upstream.
///
/// # Errors
///
/// Returns [`ParseError::UnexpectedLength`] for frames shorter than 2 bytes.
pub fn decode_status_flags(data: &[u8]) -> ParseResult<StatusFlags> {
    if data.len() < 2 {
        return Err(ParseError::UnexpectedLength {
            expected: "at least 2",
            actual: data.len(),
        });
    }

    let mut buf = data;
    let register = buf.get_u16_le();

    let heat = lookup_status(StatusField::Heat, register);
    let pump = lookup_status(StatusField::Pump, register);
    let fan = lookup_status(StatusField::Fan, register);
    let recognized = heat.is_some() && pump.is_some() && fan.is_some();

    Ok(StatusFlags {
        heat: heat.unwrap_or(PowerState::Unknown),
        pump: pump.unwrap_or(PowerState::Unknown),
        fan: fan.unwrap_or(PowerState::Unknown),
        unrecognized: (!recognized).then_some(register),
    })
}

// --- Temperature ---

/// Decode a temperature frame in °C.
///
/// The device uses two layouts, selected by frame length:
/// - 2 bytes: unsigned little-endian tenths of a degree
/// - 4 bytes: little-endian IEEE-754 float
///
/// # Errors
///
/// Returns [`ParseError::UnexpectedLength`] for any other length and
/// [`ParseError::InvalidValue`] for a non-finite float.
pub fn decode_temperature(data: &[u8]) -> ParseResult<f32> {
    match data.len() {
        2 => {
            let mut buf = data;
            Ok(f32::from(buf.get_u16_le()) / 10.0)
        }
        4 => {
            let mut buf = data;
            let value = buf.get_f32_le();
            if !value.is_finite() {
                return Err(ParseError::InvalidValue(format!(
                    "non-finite temperature: {value}"
                )));
            }
            Ok(value)
        }
        other => Err(ParseError::UnexpectedLength {
            expected: "2 or 4",
            actual: other,
        }),
    }
}

/// Encode a heater setpoint as little-endian tenths of a degree.
///
/// # Errors
///
/// Returns [`ValidationError::TemperatureOutOfRange`] outside
/// [`MIN_TARGET_CELSIUS`]..=[`MAX_TARGET_CELSIUS`].
pub fn encode_temperature_setpoint(celsius: f32) -> Result<[u8; 2], ValidationError> {
    if !celsius.is_finite() || !(MIN_TARGET_CELSIUS..=MAX_TARGET_CELSIUS).contains(&celsius) {
        return Err(ValidationError::TemperatureOutOfRange(celsius));
    }
    let tenths = (celsius * 10.0).round() as u16;
    Ok(tenths.to_le_bytes())
}

// --- Strings ---

/// Decode a firmware/serial string characteristic.
///
/// Informational fields only, so this never fails: invalid UTF-8 decodes
/// lossily and trailing NUL/space padding is trimmed.
pub fn decode_firmware_string(data: &[u8]) -> String {
    String::from_utf8_lossy(data)
        .trim_end_matches(['\0', ' '])
        .to_string()
}

// --- Auto shutoff ---

/// Decode the auto-shutoff characteristic.
///
/// Wire format is a little-endian u16 holding the timer in seconds; zero
/// means the timer is disabled.
///
/// # Errors
///
/// Returns [`ParseError::UnexpectedLength`] unless the frame is 2 bytes.
pub fn decode_auto_shutoff(data: &[u8]) -> ParseResult<AutoShutoff> {
    if data.len() != 2 {
        return Err(ParseError::UnexpectedLength {
            expected: "2",
            actual: data.len(),
        });
    }
    let mut buf = data;
    let seconds = buf.get_u16_le();
    Ok(AutoShutoff {
        enabled: seconds > 0,
        minutes: seconds / 60,
    })
}

/// Encode the auto-shutoff characteristic.
///
/// Disabled encodes as zero seconds regardless of `minutes`.
///
/// # Errors
///
/// Returns [`ValidationError::ShutoffOutOfRange`] when enabled with minutes
/// outside [`MIN_SHUTOFF_MINUTES`]..=[`MAX_SHUTOFF_MINUTES`].
pub fn encode_auto_shutoff(enabled: bool, minutes: u16) -> Result<[u8; 2], ValidationError> {
    if !enabled {
        return Ok(0u16.to_le_bytes());
    }
    if !(MIN_SHUTOFF_MINUTES..=MAX_SHUTOFF_MINUTES).contains(&minutes) {
        return Err(ValidationError::ShutoffOutOfRange(minutes));
    }
    Ok((minutes * 60).to_le_bytes())
}

// --- LED brightness ---

/// Decode the LED brightness characteristic (percent).
///
/// # Errors
///
/// Returns [`ParseError::UnexpectedLength`] unless the frame is a single
/// byte, and [`ParseError::InvalidValue`] above 100.
pub fn decode_led_brightness(data: &[u8]) -> ParseResult<u8> {
    if data.len() != 1 {
        return Err(ParseError::UnexpectedLength {
            expected: "1",
            actual: data.len(),
        });
    }
    if data[0] > 100 {
        return Err(ParseError::InvalidValue(format!(
            "brightness {}% above 100%",
            data[0]
        )));
    }
    Ok(data[0])
}

/// Encode the LED brightness characteristic.
///
/// # Errors
///
/// Returns [`ValidationError::BrightnessOutOfRange`] above 100.
pub fn encode_led_brightness(percent: u8) -> Result<[u8; 1], ValidationError> {
    if percent > 100 {
        return Err(ValidationError::BrightnessOutOfRange(percent));
    }
    Ok([percent])
}

// --- Operating time ---

/// Decode the hours-of-operation characteristic.
///
/// Wire format: u16 LE whole hours followed by u8 minutes past the hour.
///
/// # Errors
///
/// Returns [`ParseError::UnexpectedLength`] unless the frame is 3 bytes and
/// [`ParseError::InvalidValue`] for minutes above 59.
pub fn decode_operating_hours(data: &[u8]) -> ParseResult<OperatingTime> {
    if data.len() != 3 {
        return Err(ParseError::UnexpectedLength {
            expected: "3",
            actual: data.len(),
        });
    }
    let mut buf = data;
    let hours = u32::from(buf.get_u16_le());
    let minutes = buf.get_u8();
    if minutes > 59 {
        return Err(ParseError::InvalidValue(format!(
            "operating minutes {minutes} above 59"
        )));
    }
    Ok(OperatingTime { hours, minutes })
}

// --- Switches ---

/// Encode a heat/pump switch payload.
pub fn encode_on_off(on: bool) -> [u8; 1] {
    [u8::from(on)]
}

/// Encode the vibration switch payload.
pub fn encode_vibration(enabled: bool) -> [u8; 1] {
    [u8::from(enabled)]
}

#[cfg(test)]
mod tests {
    use super::*;

    // --- Temperature ---

    #[test]
    fn test_decode_temperature_u16_tenths() {
        // 1805 tenths -> 180.5 °C
        let temp = decode_temperature(&[0x0D, 0x07]).unwrap();
        assert!((temp - 180.5).abs() < 0.01);
    }

    #[test]
    fn test_decode_temperature_f32() {
        let temp = decode_temperature(&185.0f32.to_le_bytes()).unwrap();
        assert!((temp - 185.0).abs() < 0.01);
    }

    #[test]
    fn test_decode_temperature_bad_length() {
        for frame in [&[][..], &[0x01][..], &[0, 0, 0][..], &[0; 5][..]] {
            assert!(matches!(
                decode_temperature(frame),
                Err(ParseError::UnexpectedLength { .. })
            ));
        }
    }

    #[test]
    fn test_decode_temperature_rejects_nan() {
        assert!(matches!(
            decode_temperature(&f32::NAN.to_le_bytes()),
            Err(ParseError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_setpoint_roundtrip_within_tenth() {
        for celsius in [40.0f32, 170.0, 180.0, 185.5, 229.9, 230.0] {
            let bytes = encode_temperature_setpoint(celsius).unwrap();
            let decoded = decode_temperature(&bytes).unwrap();
            assert!(
                (decoded - celsius).abs() <= 0.1,
                "round trip drifted: {celsius} -> {decoded}"
            );
        }
    }

    #[test]
    fn test_setpoint_out_of_range() {
        assert_eq!(
            encode_temperature_setpoint(39.9),
            Err(ValidationError::TemperatureOutOfRange(39.9))
        );
        assert_eq!(
            encode_temperature_setpoint(230.1),
            Err(ValidationError::TemperatureOutOfRange(230.1))
        );
        assert!(encode_temperature_setpoint(f32::NAN).is_err());
    }

    // --- Status register ---

    #[test]
    fn test_status_all_off() {
        let flags = decode_status_flags(&[0x00, 0x00]).unwrap();
        assert_eq!(flags.heat, PowerState::Off);
        assert_eq!(flags.pump, PowerState::Off);
        assert_eq!(flags.fan, PowerState::Off);
        assert_eq!(flags.unrecognized, None);
    }

    #[test]
    fn test_status_heat_and_pump_on() {
        // 0x2020: heat bit + pump bit
        let flags = decode_status_flags(&[0x20, 0x20]).unwrap();
        assert_eq!(flags.heat, PowerState::On);
        assert_eq!(flags.pump, PowerState::On);
        assert_eq!(flags.fan, PowerState::Off);
    }

    #[test]
    fn test_status_alternate_representations() {
        // Every table entry must decode to its tagged state.
        for entry in STATUS_PATTERNS {
            let flags = decode_status_flags(&entry.pattern.to_le_bytes()).unwrap();
            let decoded = match entry.field {
                StatusField::Heat => flags.heat,
                StatusField::Pump => flags.pump,
                StatusField::Fan => flags.fan,
            };
            assert_eq!(
                decoded, entry.state,
                "pattern {:#06x} for {:?}",
                entry.pattern, entry.field
            );
        }
    }

    #[test]
    fn test_status_unrecognized_pattern_is_not_an_error() {
        // 0x0010 sits inside the heat mask but matches no entry.
        let flags = decode_status_flags(&[0x10, 0x00]).unwrap();
        assert_eq!(flags.heat, PowerState::Unknown);
        assert_eq!(flags.pump, PowerState::Off);
        assert_eq!(flags.fan, PowerState::Off);
        assert_eq!(flags.unrecognized, Some(0x0010));
    }

    #[test]
    fn test_status_extra_bytes_ignored() {
        let flags = decode_status_flags(&[0x20, 0x00, 0xAA, 0xBB]).unwrap();
        assert_eq!(flags.heat, PowerState::On);
    }

    #[test]
    fn test_status_short_frame() {
        assert!(matches!(
            decode_status_flags(&[0x01]),
            Err(ParseError::UnexpectedLength { .. })
        ));
    }

    #[test]
    fn test_status_field_masks_do_not_overlap() {
        assert_eq!(StatusField::Heat.mask() & StatusField::Pump.mask(), 0);
        assert_eq!(StatusField::Heat.mask() & StatusField::Fan.mask(), 0);
        assert_eq!(StatusField::Pump.mask() & StatusField::Fan.mask(), 0);
    }

    // --- Strings ---

    #[test]
    fn test_firmware_string_trims_padding() {
        assert_eq!(decode_firmware_string(b"V03.44\0\0\0"), "V03.44");
        assert_eq!(decode_firmware_string(b"SN-1234   "), "SN-1234");
    }

    #[test]
    fn test_firmware_string_lossy() {
        let s = decode_firmware_string(&[0x56, 0x31, 0xFF, 0x00]);
        assert!(s.starts_with("V1"));
    }

    // --- Auto shutoff ---

    #[test]
    fn test_auto_shutoff_roundtrip() {
        let bytes = encode_auto_shutoff(true, 45).unwrap();
        let decoded = decode_auto_shutoff(&bytes).unwrap();
        assert!(decoded.enabled);
        assert_eq!(decoded.minutes, 45);
    }

    #[test]
    fn test_auto_shutoff_disabled_is_zero() {
        assert_eq!(encode_auto_shutoff(false, 999).unwrap(), [0, 0]);
        let decoded = decode_auto_shutoff(&[0, 0]).unwrap();
        assert!(!decoded.enabled);
        assert_eq!(decoded.minutes, 0);
    }

    #[test]
    fn test_auto_shutoff_range() {
        assert_eq!(
            encode_auto_shutoff(true, 10),
            Err(ValidationError::ShutoffOutOfRange(10))
        );
        assert_eq!(
            encode_auto_shutoff(true, 361),
            Err(ValidationError::ShutoffOutOfRange(361))
        );
        assert!(encode_auto_shutoff(true, 30).is_ok());
        assert!(encode_auto_shutoff(true, 360).is_ok());
    }

    // --- LED brightness ---

    #[test]
    fn test_led_brightness_roundtrip() {
        let bytes = encode_led_brightness(70).unwrap();
        assert_eq!(decode_led_brightness(&bytes).unwrap(), 70);
    }

    #[test]
    fn test_led_brightness_range() {
        assert_eq!(
            encode_led_brightness(150),
            Err(ValidationError::BrightnessOutOfRange(150))
        );
        assert!(matches!(
            decode_led_brightness(&[120]),
            Err(ParseError::InvalidValue(_))
        ));
    }

    // --- Operating time ---

    #[test]
    fn test_operating_hours() {
        // 152 hours, 7 minutes
        let t = decode_operating_hours(&[0x98, 0x00, 0x07]).unwrap();
        assert_eq!(t.hours, 152);
        assert_eq!(t.minutes, 7);
    }

    #[test]
    fn test_operating_hours_bad_minutes() {
        assert!(matches!(
            decode_operating_hours(&[0x00, 0x00, 60]),
            Err(ParseError::InvalidValue(_))
        ));
    }

    // --- Switches ---

    #[test]
    fn test_on_off_payloads() {
        assert_eq!(encode_on_off(true), [0x01]);
        assert_eq!(encode_on_off(false), [0x00]);
        assert_eq!(encode_vibration(true), [0x01]);
    }
}
