//! BLE HID-over-GATT to USB HID bridge.
//!
//! The library holds everything that does not touch hardware: the session
//! state machine, peripheral selection, metadata parsing and the report
//! translation engine, plus the supervisor that ties them together.  It is
//! `no_std` and runs on the host for tests.
//!
//! The firmware binary (`src/main.rs`, feature `embedded`) binds the
//! [`ble::Central`], [`hid::WiredHid`] and [`bridge::StatusSink`] traits to
//! the SoftDevice, `embassy-usb` and the OLED.
//!
//! Usage: `cargo test --lib` on the host.

#![cfg_attr(not(test), no_std)]

#[macro_use]
mod fmt;

pub mod ble;
pub mod bridge;
pub mod config;
pub mod error;
pub mod hid;
pub mod session;

pub use bridge::{BridgeEvent, BridgeSupervisor, EventQueues, Status, StatusSink};
pub use error::{BleError, TransitionError};
pub use session::{Session, SessionState, SessionStateMachine, Trigger};
