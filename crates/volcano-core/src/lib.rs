//! Persistent BLE coordinator for the Volcano vaporizer.
//!
//! This crate keeps a long-lived connection to one heater/pump appliance,
//! decodes its vendor-specific characteristic payloads into a typed state
//! snapshot, accepts imperative commands, and lets callers block until an
//! observable condition holds — all while the physical link is unreliable.
//!
//! # Features
//!
//! - **Connection lifecycle**: unbounded reconnect loop with a fixed retry
//!   delay; a visible `Error` status after repeated failures
//! - **Live state store**: one authoritative snapshot with changed-field
//!   notification and per-field staleness timestamps
//! - **Command API**: heat/pump switches, temperature setpoint, LED
//!   brightness, auto-shutoff, vibration — validated before any write
//! - **Blocking waits**: wait-until-connected and wait-until-temperature
//!   with timeouts, cancellation, and supersession
//! - **Transport seam**: btleplug behind a trait, with a scriptable mock
//!   for hardware-free tests
//!
//! # Quick Start
//!
//! ```no_run
//! use volcano_core::{Coordinator, CoordinatorConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let coordinator = Coordinator::new(CoordinatorConfig::new("CE:9E:A6:43:25:F3"))?;
//!     coordinator.connect();
//!
//!     let mut changes = coordinator.subscribe();
//!     while let Ok(change) = changes.recv().await {
//!         println!("{:?} -> {:?}", change.changed, change.state.current_temperature);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Concurrency model
//!
//! The system is single-device, single-connection: all GATT operations are
//! serialized through one async mutex, because the underlying transport
//! does not guarantee safe interleaving. Everything else is cooperative
//! tokio tasks that yield at I/O boundaries; the state store snapshot is
//! the only structure shared with callers, and all mutation goes through
//! its `apply`.

pub mod ble;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod mock;
pub mod state;
pub mod transport;

// Core exports
pub use ble::BleTransport;
pub use config::{CoordinatorConfig, TargetPolicy};
pub use coordinator::Coordinator;
pub use error::{ConnectionFailureReason, Error, Result};
pub use mock::MockTransport;
pub use state::{DeviceState, Field, StateChange, StateReceiver, StateStore, StateUpdate};
pub use transport::{DeviceTransport, NotificationStream, SignalQuality};

// Re-export the protocol layer
pub use volcano_types::uuid as uuids;
pub use volcano_types::{
    AutoShutoff, ConnectionStatus, OperatingTime, ParseError, PowerState, StatusFlags,
    ValidationError, codec,
};
