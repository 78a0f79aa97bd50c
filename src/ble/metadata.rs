//! Device metadata and report-map retrieval.
//!
//! Runs once per session while it is in the Discovering state.  Every read
//! is best effort: a missing or unreadable characteristic, or a record too
//! short for its format, simply leaves the corresponding field unset.  The
//! report map is the only value the bridge needs to forward anything.

use heapless::String;

use super::{AttValue, Central, Characteristic};
use crate::hid::ReportSchema;

/// PnP ID record (Device Information 0x2A50).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PnpId {
    /// 1 = Bluetooth SIG assigned, 2 = USB-IF assigned.
    pub vendor_id_source: u8,
    pub vendor_id: u16,
    pub product_id: u16,
    pub version: u16,
}

impl PnpId {
    pub const LEN: usize = 7;

    /// Parse `[source][vid LE][pid LE][version LE]`; shorter records are
    /// rejected, trailing bytes ignored.
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < Self::LEN {
            return None;
        }
        Some(Self {
            vendor_id_source: data[0],
            vendor_id: u16::from_le_bytes([data[1], data[2]]),
            product_id: u16::from_le_bytes([data[3], data[4]]),
            version: u16::from_le_bytes([data[5], data[6]]),
        })
    }
}

/// HID Information record (0x2A4A).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HidInformation {
    pub version_major: u8,
    pub version_minor: u8,
    pub country_code: u8,
    /// Bit 0 = remote wake, bit 1 = normally connectable.
    pub flags: u8,
}

impl HidInformation {
    pub const LEN: usize = 4;

    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < Self::LEN {
            return None;
        }
        Some(Self {
            version_major: data[0],
            version_minor: data[1],
            country_code: data[2],
            flags: data[3],
        })
    }
}

/// Identity and status of the connected peripheral.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DeviceMetadata {
    pub name: Option<String<64>>,
    pub manufacturer: Option<String<64>>,
    pub pnp_id: Option<PnpId>,
    /// Battery percentage; the only field updated after discovery.
    pub battery_percent: Option<u8>,
    pub hid_info: Option<HidInformation>,
}

impl DeviceMetadata {
    /// Apply a battery notification.  Empty payloads are ignored.
    pub fn update_battery(&mut self, data: &[u8]) -> Option<u8> {
        let level = parse_battery_level(data)?;
        self.battery_percent = Some(level);
        Some(level)
    }
}

/// Battery Level (0x2A19) is a single percentage byte.
pub fn parse_battery_level(data: &[u8]) -> Option<u8> {
    data.first().copied()
}

/// Decode a UTF-8 string characteristic, truncated at a character boundary.
/// Invalid UTF-8 yields `None`; trailing NULs (common padding) are dropped.
pub fn parse_utf8<const N: usize>(data: &[u8]) -> Option<String<N>> {
    let text = core::str::from_utf8(data).ok()?;
    let text = text.trim_end_matches('\0');
    let mut out = String::new();
    for c in text.chars() {
        if out.push(c).is_err() {
            break;
        }
    }
    Some(out)
}

/// Everything learned while discovering one session.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Discovery {
    pub metadata: DeviceMetadata,
    pub schema: Option<ReportSchema>,
    /// A read reported that the link is gone; later reads were skipped.
    pub link_lost: bool,
}

async fn read_optional<C: Central>(
    central: &mut C,
    characteristic: Characteristic,
    link_lost: &mut bool,
) -> Option<AttValue> {
    if *link_lost {
        return None;
    }
    match central.read(characteristic).await {
        Ok(value) => Some(value),
        Err(e) => {
            *link_lost = e.is_link_loss();
            debug!("{} not readable: {}", characteristic, e);
            None
        }
    }
}

/// Read metadata and the report map from a connected peripheral.
///
/// Never fails: each value is independently optional.  The battery level
/// subscription is attempted only after a successful battery read.  If the
/// link drops part-way, the remaining reads are skipped and `link_lost` is
/// set.
pub async fn extract<C: Central>(central: &mut C) -> Discovery {
    let mut discovery = Discovery::default();
    let mut lost = false;
    let mut battery_live = false;
    let meta = &mut discovery.metadata;

    if let Some(v) = read_optional(central, Characteristic::DeviceName, &mut lost).await {
        meta.name = parse_utf8(&v);
    }
    if let Some(v) = read_optional(central, Characteristic::ManufacturerName, &mut lost).await {
        meta.manufacturer = parse_utf8(&v);
    }
    if let Some(v) = read_optional(central, Characteristic::PnpId, &mut lost).await {
        meta.pnp_id = PnpId::parse(&v);
        if meta.pnp_id.is_none() {
            debug!("PnP ID record too short ({} bytes)", v.len());
        }
    }
    if let Some(v) = read_optional(central, Characteristic::BatteryLevel, &mut lost).await {
        meta.battery_percent = parse_battery_level(&v);
        if meta.battery_percent.is_some() {
            battery_live = match central.subscribe(Characteristic::BatteryLevel).await {
                Ok(n) => n > 0,
                Err(e) => {
                    lost = e.is_link_loss();
                    debug!("Battery notifications unavailable: {}", e);
                    false
                }
            };
        }
    }
    if let Some(v) = read_optional(central, Characteristic::HidInformation, &mut lost).await {
        meta.hid_info = HidInformation::parse(&v);
    }
    if let Some(v) = read_optional(central, Characteristic::ReportMap, &mut lost).await {
        discovery.schema = ReportSchema::from_descriptor(&v);
    }

    discovery.link_lost = lost;
    if lost {
        warn!("Link lost during discovery");
    } else {
        log_summary(&discovery, battery_live);
    }
    discovery
}

fn log_summary(discovery: &Discovery, battery_live: bool) {
    let meta = &discovery.metadata;
    info!("========== Device Information ==========");
    if let Some(name) = &meta.name {
        info!("Device Name: {}", name.as_str());
    }
    if let Some(manufacturer) = &meta.manufacturer {
        info!("Manufacturer: {}", manufacturer.as_str());
    }
    if let Some(pnp) = &meta.pnp_id {
        info!(
            "VID: {=u16:#x}, PID: {=u16:#x}, Version: {=u16:#x}",
            pnp.vendor_id,
            pnp.product_id,
            pnp.version
        );
    }
    if let Some(level) = meta.battery_percent {
        info!("Battery: {}% (live: {})", level, battery_live);
    }
    if let Some(hid) = &meta.hid_info {
        info!(
            "HID Version: {}.{}, Country: {}, Flags: {=u8:#x}",
            hid.version_major,
            hid.version_minor,
            hid.country_code,
            hid.flags
        );
    }
    match &discovery.schema {
        Some(schema) => {
            let u = schema.usages();
            info!(
                "Report Map: {} bytes (keyboard={} mouse={} consumer={})",
                schema.descriptor().len(),
                u.has_keyboard,
                u.has_mouse,
                u.has_consumer
            );
        }
        None => warn!("No report map - monitor-only mode"),
    }
    info!("=========================================");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pnp_id_parses_little_endian_fields() {
        let record = [0x02, 0x5E, 0x04, 0x17, 0x09, 0x10, 0x01];
        let pnp = PnpId::parse(&record).unwrap();
        assert_eq!(pnp.vendor_id_source, 2);
        assert_eq!(pnp.vendor_id, 0x045E);
        assert_eq!(pnp.product_id, 0x0917);
        assert_eq!(pnp.version, 0x0110);

        // Same record twice, same identifiers.
        assert_eq!(PnpId::parse(&record), Some(pnp));
    }

    #[test]
    fn short_pnp_id_sets_nothing() {
        for len in 0..PnpId::LEN {
            assert!(PnpId::parse(&[0xFF; 7][..len]).is_none());
        }
        // Trailing bytes are ignored.
        assert!(PnpId::parse(&[0x01; 9]).is_some());
    }

    #[test]
    fn hid_information_needs_four_bytes() {
        let info = HidInformation::parse(&[0x11, 0x01, 0x00, 0x02]).unwrap();
        assert_eq!(info.version_major, 0x11);
        assert_eq!(info.version_minor, 0x01);
        assert_eq!(info.country_code, 0);
        assert_eq!(info.flags, 0x02);
        assert!(HidInformation::parse(&[0x11, 0x01, 0x00]).is_none());
    }

    #[test]
    fn battery_update_overwrites_level() {
        let mut meta = DeviceMetadata {
            battery_percent: Some(80),
            ..Default::default()
        };
        assert_eq!(meta.update_battery(&[75]), Some(75));
        assert_eq!(meta.battery_percent, Some(75));
        assert_eq!(meta.update_battery(&[]), None);
        assert_eq!(meta.battery_percent, Some(75));
    }

    #[test]
    fn utf8_strings_are_trimmed_and_truncated() {
        let name: String<8> = parse_utf8(b"Keyboard K380\0\0").unwrap();
        assert_eq!(name.as_str(), "Keyboard");
        let padded: String<64> = parse_utf8(b"MX\0").unwrap();
        assert_eq!(padded.as_str(), "MX");
        assert!(parse_utf8::<64>(&[0xC3, 0x28]).is_none());
    }
}
