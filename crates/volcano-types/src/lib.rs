//! Platform-agnostic protocol layer for the Volcano vaporizer.
//!
//! This crate holds everything needed to talk the device's vendor-specific
//! GATT protocol without touching a Bluetooth stack:
//!
//! - Characteristic UUID constants with documented direction and layout
//! - Typed decode results (power states, auto-shutoff, operating time)
//! - The binary codec: one decode/encode pair per characteristic
//! - Decode and validation error types
//!
//! The codec is pure and side-effect free; the async coordinator in
//! `volcano-core` does all I/O.
//!
//! # Example
//!
//! ```
//! use volcano_types::codec;
//!
//! let bytes = codec::encode_temperature_setpoint(180.0).unwrap();
//! let echoed = codec::decode_temperature(&bytes).unwrap();
//! assert!((echoed - 180.0).abs() <= 0.1);
//! ```

pub mod codec;
pub mod error;
pub mod types;
pub mod uuid;

pub use error::{ParseError, ParseResult, ValidationError};
pub use types::{AutoShutoff, ConnectionStatus, OperatingTime, PowerState, StatusFlags};
pub use uuid as uuids;
