//! Minimal HID Report Descriptor inspection.
//!
//! The bridge forwards the peripheral's report map to the USB host
//! verbatim; all it needs to know up front is which kinds of input the
//! device declares (keyboard, mouse, consumer control) and, where the
//! descriptor uses them, the report ids of each.
//!
//! ## Item format
//!
//! Each short item is a prefix byte `tttt ttss` (tag, type, size code)
//! followed by 0, 1, 2 or 4 data bytes.  Long items (`0xFE`) carry their
//! own length and are skipped.
//!
//! ## Limitations
//!
//! - Push/Pop state is not supported
//! - Delimiter tags are ignored
//! - Extended (32-bit) usages are truncated to their usage id

use heapless::Vec;

use crate::ble::MAX_ATT_VALUE;

/// Upper bound on the descriptor we keep (one ATT value).
pub const MAX_DESCRIPTOR_LEN: usize = MAX_ATT_VALUE;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ReportKind {
    Keyboard,
    Mouse,
    Consumer,
}

/// Usage page codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UsagePage {
    /// Generic Desktop (mouse, keyboard, joystick).
    GenericDesktop,
    /// Keyboard/Keypad.
    Keyboard,
    /// LEDs.
    Led,
    /// Button.
    Button,
    /// Consumer Control.
    Consumer,
    /// Unknown/unsupported.
    Unknown(u16),
}

impl From<u16> for UsagePage {
    fn from(code: u16) -> Self {
        match code {
            0x01 => UsagePage::GenericDesktop,
            0x07 => UsagePage::Keyboard,
            0x08 => UsagePage::Led,
            0x09 => UsagePage::Button,
            0x0C => UsagePage::Consumer,
            other => UsagePage::Unknown(other),
        }
    }
}

/// Generic Desktop usage codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DesktopUsage {
    Pointer,
    Mouse,
    Keyboard,
    Keypad,
    Unknown(u16),
}

impl From<u16> for DesktopUsage {
    fn from(code: u16) -> Self {
        match code {
            0x01 => DesktopUsage::Pointer,
            0x02 => DesktopUsage::Mouse,
            0x06 => DesktopUsage::Keyboard,
            0x07 => DesktopUsage::Keypad,
            other => DesktopUsage::Unknown(other),
        }
    }
}

/// Input kinds declared by a report descriptor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ReportUsages {
    /// Does this device have a keyboard input report?
    pub has_keyboard: bool,
    /// Does this device have a mouse input report?
    pub has_mouse: bool,
    /// Does this device have consumer control input?
    pub has_consumer: bool,
    /// Report ID for keyboard input, when present.
    pub keyboard_report_id: Option<u8>,
    /// Report ID for mouse input, when present.
    pub mouse_report_id: Option<u8>,
    /// Report ID for consumer input, when present.
    pub consumer_report_id: Option<u8>,
}

impl ReportUsages {
    fn record(&mut self, kind: ReportKind, report_id: u8) {
        let (flag, id) = match kind {
            ReportKind::Keyboard => (&mut self.has_keyboard, &mut self.keyboard_report_id),
            ReportKind::Mouse => (&mut self.has_mouse, &mut self.mouse_report_id),
            ReportKind::Consumer => (&mut self.has_consumer, &mut self.consumer_report_id),
        };
        *flag = true;
        if report_id != 0 && id.is_none() {
            *id = Some(report_id);
        }
    }

    /// Walk a report descriptor and collect the input kinds it declares.
    pub fn parse(data: &[u8]) -> Self {
        let mut usages = ReportUsages::default();

        // Global state.
        let mut usage_page = UsagePage::Unknown(0);
        let mut report_id: u8 = 0;
        // Local state: first usage since the last main item.
        let mut usage: Option<u16> = None;
        // Collection state.
        let mut depth: u8 = 0;
        let mut application: Option<ReportKind> = None;

        let mut i = 0;
        while i < data.len() {
            let prefix = data[i];

            if prefix == 0xFE {
                // Long item: [0xFE][data size][long tag][data...]
                let Some(&size) = data.get(i + 1) else { break };
                i += 3 + size as usize;
                continue;
            }

            let tag = (prefix >> 4) & 0x0F;
            let item_type = (prefix >> 2) & 0x03;
            let size = match prefix & 0x03 {
                0 => 0,
                1 => 1,
                2 => 2,
                _ => 4,
            };

            if i + 1 + size > data.len() {
                break;
            }

            let value: u32 = match size {
                0 => 0,
                1 => data[i + 1] as u32,
                2 => u16::from_le_bytes([data[i + 1], data[i + 2]]) as u32,
                _ => u32::from_le_bytes([data[i + 1], data[i + 2], data[i + 3], data[i + 4]]),
            };

            match item_type {
                // Main items
                0 => {
                    match tag {
                        // Input
                        0x08 => {
                            let kind = match usage_page {
                                UsagePage::Keyboard => Some(ReportKind::Keyboard),
                                UsagePage::Consumer => Some(ReportKind::Consumer),
                                _ => application,
                            };
                            if let Some(kind) = kind {
                                usages.record(kind, report_id);
                            }
                        }
                        // Collection
                        0x0A => {
                            if depth == 0 && value == 0x01 {
                                application = application_kind(usage_page, usage);
                            }
                            depth = depth.saturating_add(1);
                        }
                        // End Collection
                        0x0C => {
                            depth = depth.saturating_sub(1);
                            if depth == 0 {
                                application = None;
                            }
                        }
                        _ => {}
                    }
                    usage = None;
                }
                // Global items
                1 => match tag {
                    0x00 => usage_page = UsagePage::from(value as u16),
                    0x08 => report_id = value as u8,
                    _ => {}
                },
                // Local items
                2 => {
                    if tag == 0x00 && usage.is_none() {
                        usage = Some(value as u16);
                    }
                }
                _ => {}
            }

            i += 1 + size;
        }

        if !(usages.has_keyboard || usages.has_mouse || usages.has_consumer) {
            debug!("HID descriptor: no recognized usages found");
        }
        usages
    }
}

/// Kind of a top-level application collection, from the usage that opened it.
fn application_kind(page: UsagePage, usage: Option<u16>) -> Option<ReportKind> {
    let usage = usage?;
    match page {
        UsagePage::GenericDesktop => match DesktopUsage::from(usage) {
            DesktopUsage::Mouse | DesktopUsage::Pointer => Some(ReportKind::Mouse),
            DesktopUsage::Keyboard | DesktopUsage::Keypad => Some(ReportKind::Keyboard),
            DesktopUsage::Unknown(_) => None,
        },
        UsagePage::Consumer => Some(ReportKind::Consumer),
        _ => None,
    }
}

/// A peripheral's report map plus what it declares.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReportSchema {
    descriptor: Vec<u8, MAX_DESCRIPTOR_LEN>,
    usages: ReportUsages,
}

impl ReportSchema {
    /// Build a schema from raw report-map bytes.
    ///
    /// Returns `None` for an empty or oversized map: neither can be
    /// registered with the USB host.
    pub fn from_descriptor(bytes: &[u8]) -> Option<Self> {
        if bytes.is_empty() {
            return None;
        }
        let descriptor = Vec::from_slice(bytes).ok()?;
        Some(Self {
            usages: ReportUsages::parse(bytes),
            descriptor,
        })
    }

    pub fn descriptor(&self) -> &[u8] {
        &self.descriptor
    }

    pub fn usages(&self) -> &ReportUsages {
        &self.usages
    }
}
