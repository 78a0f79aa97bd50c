//! Peripheral selection - first HID advertiser in a scan window wins.

use super::PeripheralHandle;

/// Retains at most one connection candidate per scan window.
#[derive(Debug, Default)]
pub struct PeripheralSelector {
    candidate: Option<PeripheralHandle>,
}

impl PeripheralSelector {
    pub const fn new() -> Self {
        Self { candidate: None }
    }

    /// Offer one discovery result.
    ///
    /// Returns `true` if the handle was retained: it advertises the HID
    /// service and nothing was retained before it.
    pub fn offer(&mut self, handle: PeripheralHandle) -> bool {
        if self.candidate.is_some() || !handle.advertises_hid() {
            return false;
        }
        info!("HID peripheral selected (RSSI {})", handle.rssi);
        self.candidate = Some(handle);
        true
    }

    /// Whether a candidate is waiting for a connection attempt.
    pub fn is_connect_ready(&self) -> bool {
        self.candidate.is_some()
    }

    pub fn candidate(&self) -> Option<&PeripheralHandle> {
        self.candidate.as_ref()
    }

    /// Hand the candidate over to a connection attempt.
    pub fn take(&mut self) -> Option<PeripheralHandle> {
        self.candidate.take()
    }

    /// Forget any candidate (new scan window).
    pub fn clear(&mut self) {
        self.candidate = None;
    }
}
