//! BLE → USB report translation.
//!
//! BLE input notifications carry no guaranteed report-id framing, while the
//! USB side needs every report tagged with an id from the registered
//! descriptor.  [`classify`] bridges the two with a length/shape heuristic;
//! [`ReportForwarder`] pushes the result to the wired transport,
//! fire-and-forget.

pub mod report_protocol;


pub use report_protocol::{ReportSchema, ReportUsages};

/// Wired report ids used for the length-classified shapes.
pub const KEYBOARD_REPORT_ID: u8 = 1;
pub const MOUSE_REPORT_ID: u8 = 2;
pub const CONSUMER_REPORT_ID: u8 = 3;

/// Report ids accepted when embedded as the first payload byte.
pub const EMBEDDED_REPORT_IDS: core::ops::RangeInclusive<u8> = 1..=7;

/// Boot keyboard report: modifiers, reserved, six keycodes.
pub const KEYBOARD_REPORT_SIZE: usize = 8;
/// Mouse reports: buttons, X, Y, optional wheel and pan.
pub const MOUSE_REPORT_MIN: usize = 3;
pub const MOUSE_REPORT_MAX: usize = 5;
/// Consumer control: one 16-bit usage.
pub const CONSUMER_REPORT_SIZE: usize = 2;
/// Any other report: one full-speed packet minus the report id byte.
pub const GENERIC_REPORT_MAX: usize = crate::config::USB_HID_PACKET_SIZE - 1;

/// One outbound USB report, borrowed from the notification that produced it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct WireReport<'a> {
    pub report_id: u8,
    pub payload: &'a [u8],
}

/// How a notification was recognised.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ReportShape {
    Keyboard,
    Mouse,
    Consumer,
    /// First byte was a report id in [`EMBEDDED_REPORT_IDS`].
    EmbeddedId,
    /// Matched nothing; forwarded whole under id 0.
    Unrecognized,
}

impl ReportShape {
    /// Largest payload the wired transport accepts for this shape.  Only
    /// the embedded-id and unrecognized shapes can exceed it.
    pub const fn max_payload_len(self) -> usize {
        match self {
            Self::Keyboard => KEYBOARD_REPORT_SIZE,
            Self::Mouse => MOUSE_REPORT_MAX,
            Self::Consumer => CONSUMER_REPORT_SIZE,
            Self::EmbeddedId | Self::Unrecognized => GENERIC_REPORT_MAX,
        }
    }
}

/// Result of classifying one notification.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Classified<'a> {
    pub report: WireReport<'a>,
    pub shape: ReportShape,
    /// Payload was cut to [`ReportShape::max_payload_len`].
    pub truncated: bool,
}

impl Classified<'_> {
    pub fn is_unrecognized(&self) -> bool {
        self.shape == ReportShape::Unrecognized
    }
}

/// Classify a raw BLE input notification.
///
/// Precedence: length 8 → keyboard, 3..=5 → mouse, 2 → consumer, leading
/// byte in 1..=7 → embedded report id (stripped), otherwise id 0 with the
/// payload unchanged.  A pure function of length and first byte.
pub fn classify(data: &[u8]) -> Classified<'_> {
    let (report_id, payload, shape) = match data.len() {
        KEYBOARD_REPORT_SIZE => (KEYBOARD_REPORT_ID, data, ReportShape::Keyboard),
        MOUSE_REPORT_MIN..=MOUSE_REPORT_MAX => (MOUSE_REPORT_ID, data, ReportShape::Mouse),
        CONSUMER_REPORT_SIZE => (CONSUMER_REPORT_ID, data, ReportShape::Consumer),
        _ => match data.split_first() {
            Some((&id, rest)) if EMBEDDED_REPORT_IDS.contains(&id) => {
                (id, rest, ReportShape::EmbeddedId)
            }
            _ => (0, data, ReportShape::Unrecognized),
        },
    };

    let max = shape.max_payload_len();
    let truncated = payload.len() > max;
    let payload = if truncated { &payload[..max] } else { payload };

    Classified {
        report: WireReport { report_id, payload },
        shape,
        truncated,
    }
}

/// The USB HID device as seen by the bridge.
pub trait WiredHid {
    /// Register the report descriptor and bring the interface up.
    /// Returns `false` if the transport refused it.
    fn register_descriptor(&mut self, descriptor: &[u8]) -> bool;

    /// Queue one report without blocking.  Returns `false` if it was not
    /// accepted (queue full, not configured, ...).
    fn send_report(&mut self, report: &WireReport<'_>) -> bool;
}

/// Counters for everything that went through the forwarder.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ForwardStats {
    pub forwarded: u32,
    pub failed: u32,
    pub unrecognized: u32,
    pub truncated: u32,
    /// Seen while no descriptor was registered (monitor-only).
    pub monitored: u32,
}

/// What happened to one notification.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ForwardOutcome {
    Sent,
    Rejected,
    /// No wired interface; the report was only logged.
    MonitorOnly,
}

/// Classifies notifications and hands them to the wired transport.
#[derive(Debug, Default)]
pub struct ReportForwarder {
    stats: ForwardStats,
}

impl ReportForwarder {
    pub const fn new() -> Self {
        Self {
            stats: ForwardStats {
                forwarded: 0,
                failed: 0,
                unrecognized: 0,
                truncated: 0,
                monitored: 0,
            },
        }
    }

    pub fn stats(&self) -> ForwardStats {
        self.stats
    }

    /// Classify `data` and forward it if a wired interface is up.
    ///
    /// Never retries and never blocks; a rejected report is counted and the
    /// next notification is handled independently.
    pub fn forward<W: WiredHid>(
        &mut self,
        wired: Option<&mut W>,
        data: &[u8],
    ) -> ForwardOutcome {
        let classified = classify(data);
        let report = classified.report;

        if classified.is_unrecognized() {
            self.stats.unrecognized = self.stats.unrecognized.wrapping_add(1);
            warn!(
                "Unrecognized report shape ({} bytes), forwarding under id 0",
                data.len()
            );
        }
        if classified.truncated {
            self.stats.truncated = self.stats.truncated.wrapping_add(1);
            warn!(
                "Report id {} truncated from {} to {} bytes",
                report.report_id,
                data.len(),
                report.payload.len()
            );
        }

        let Some(wired) = wired else {
            self.stats.monitored = self.stats.monitored.wrapping_add(1);
            trace!("monitor: {} id={} {:02x}", classified.shape, report.report_id, report.payload);
            return ForwardOutcome::MonitorOnly;
        };

        if wired.send_report(&report) {
            self.stats.forwarded = self.stats.forwarded.wrapping_add(1);
            trace!("-> USB id={} {:02x}", report.report_id, report.payload);
            ForwardOutcome::Sent
        } else {
            self.stats.failed = self.stats.failed.wrapping_add(1);
            warn!("USB report id {} not accepted", report.report_id);
            ForwardOutcome::Rejected
        }
    }
}
