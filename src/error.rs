//! Error types shared by the bridge core and the firmware glue.
//!
//! We avoid `alloc` - all error variants carry only fixed-size data.
//! Derives `defmt::Format` when the `defmt` feature is enabled.

use core::fmt;

use crate::session::{SessionState, Trigger};

/// Errors reported by the wireless transport ([`crate::ble::Central`]).
///
/// None of these are fatal to the bridge: the supervisor logs them and
/// falls back to rescanning or monitor-only operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BleError {
    /// Scan was cancelled or could not start.
    ScanFailed,
    /// Connection attempt failed or was rejected by the peer.
    ConnectFailed,
    /// There is no live link (never connected, or dropped mid-operation).
    NotConnected,
    /// Pairing / encryption did not complete.
    SecurityFailed,
    /// The service or characteristic is not present on the peer.
    NotFound,
    /// The characteristic exists but could not be read.
    ReadFailed,
    /// The characteristic supports neither notify nor indicate.
    NotifyUnsupported,
    /// Writing the CCCD to enable notifications failed.
    NotifyFailed,
    /// Raw error code from the underlying stack.
    Raw(u32),
}

impl BleError {
    /// Whether the error means the link itself is gone, as opposed to a
    /// single operation failing on a live link.
    pub fn is_link_loss(&self) -> bool {
        matches!(self, BleError::NotConnected)
    }
}

impl fmt::Display for BleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BleError::ScanFailed => f.write_str("scan failed"),
            BleError::ConnectFailed => f.write_str("connect failed"),
            BleError::NotConnected => f.write_str("not connected"),
            BleError::SecurityFailed => f.write_str("security setup failed"),
            BleError::NotFound => f.write_str("attribute not found"),
            BleError::ReadFailed => f.write_str("read failed"),
            BleError::NotifyUnsupported => f.write_str("notifications unsupported"),
            BleError::NotifyFailed => f.write_str("enabling notifications failed"),
            BleError::Raw(code) => write!(f, "stack error {:#x}", code),
        }
    }
}

/// A trigger that is not legal in the current session state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TransitionError {
    pub from: SessionState,
    pub trigger: Trigger,
}

impl fmt::Display for TransitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} is not valid in state {:?}", self.trigger, self.from)
    }
}
