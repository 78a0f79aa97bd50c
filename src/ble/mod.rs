//! Bluetooth Low Energy side of the bridge (Central role, GATT client).
//!
//! 1. **Advertisement parser** - pulls the service list and local name out
//!    of raw advertising data.
//! 2. **Selector** - keeps the first peripheral advertising the HID service.
//! 3. **Metadata** - reads identity, battery and report-map characteristics
//!    once a link is up.
//! 4. **Link hand-off** - commands from the supervisor to the task that
//!    watches the live connection.
//!
//! The radio itself sits behind the [`Central`] trait; the firmware binds it
//! to the Nordic SoftDevice, tests bind it to an in-memory fake.

pub mod adv_parser;
pub mod link;
pub mod metadata;
pub mod selector;

use heapless::{String, Vec};

use crate::error::BleError;

/// 16-bit assigned numbers for the services and characteristics we touch.
pub mod uuid {
    pub const GAP_SERVICE: u16 = 0x1800;
    pub const DEVICE_NAME: u16 = 0x2A00;

    pub const DEVICE_INFO_SERVICE: u16 = 0x180A;
    pub const MANUFACTURER_NAME: u16 = 0x2A29;
    pub const PNP_ID: u16 = 0x2A50;

    pub const BATTERY_SERVICE: u16 = 0x180F;
    pub const BATTERY_LEVEL: u16 = 0x2A19;

    pub const HID_SERVICE: u16 = 0x1812;
    pub const HID_INFORMATION: u16 = 0x2A4A;
    pub const REPORT_MAP: u16 = 0x2A4B;
    pub const REPORT: u16 = 0x2A4D;
}

/// Largest attribute value we read (report maps are the big ones).
pub const MAX_ATT_VALUE: usize = 512;

/// Largest notification payload carried through the event queue.
pub const MAX_NOTIFICATION_LEN: usize = 64;

/// Maximum number of 16-bit service UUIDs remembered per advertisement.
pub const MAX_ADVERTISED_SERVICES: usize = 8;

/// An attribute value as returned by a GATT read.
pub type AttValue = Vec<u8, MAX_ATT_VALUE>;

/// BLE device address.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PeerAddress {
    /// Stack-specific address type (public, random static, ...).
    pub kind: u8,
    /// Address bytes, least significant first (over-the-air order).
    pub bytes: [u8; 6],
}

impl PeerAddress {
    pub const fn new(kind: u8, bytes: [u8; 6]) -> Self {
        Self { kind, bytes }
    }
}

impl core::fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let b = &self.bytes;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            b[5], b[4], b[3], b[2], b[1], b[0]
        )
    }
}

/// A discovered, not yet connected peripheral.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PeripheralHandle {
    pub address: PeerAddress,
    /// Advertised local name (truncated to 32 bytes), if any.
    pub name: Option<String<32>>,
    /// Received Signal Strength Indicator (dBm).
    pub rssi: i8,
    /// Advertised 16-bit service UUIDs.
    pub services: Vec<u16, MAX_ADVERTISED_SERVICES>,
}

impl PeripheralHandle {
    /// Build a handle from one advertising report.
    pub fn from_advertisement(address: PeerAddress, rssi: i8, ad_data: &[u8]) -> Self {
        Self {
            address,
            name: adv_parser::extract_device_name(ad_data),
            rssi,
            services: adv_parser::advertised_services(ad_data),
        }
    }

    pub fn advertises(&self, service: u16) -> bool {
        self.services.contains(&service)
    }

    pub fn advertises_hid(&self) -> bool {
        self.advertises(uuid::HID_SERVICE)
    }
}

/// Characteristics the bridge reads or subscribes to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Characteristic {
    DeviceName,
    ManufacturerName,
    PnpId,
    BatteryLevel,
    HidInformation,
    ReportMap,
    /// HID input report(s); subscribing covers every instance.
    Report,
}

impl Characteristic {
    /// Owning service UUID.
    pub const fn service(&self) -> u16 {
        match self {
            Characteristic::DeviceName => uuid::GAP_SERVICE,
            Characteristic::ManufacturerName | Characteristic::PnpId => uuid::DEVICE_INFO_SERVICE,
            Characteristic::BatteryLevel => uuid::BATTERY_SERVICE,
            Characteristic::HidInformation | Characteristic::ReportMap | Characteristic::Report => {
                uuid::HID_SERVICE
            }
        }
    }

    /// Characteristic UUID.
    pub const fn uuid(&self) -> u16 {
        match self {
            Characteristic::DeviceName => uuid::DEVICE_NAME,
            Characteristic::ManufacturerName => uuid::MANUFACTURER_NAME,
            Characteristic::PnpId => uuid::PNP_ID,
            Characteristic::BatteryLevel => uuid::BATTERY_LEVEL,
            Characteristic::HidInformation => uuid::HID_INFORMATION,
            Characteristic::ReportMap => uuid::REPORT_MAP,
            Characteristic::Report => uuid::REPORT,
        }
    }
}

/// Scan configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ScanParams {
    /// Active scan to retrieve scan-response data (device names).
    pub active: bool,
    /// Scan interval (0.625 ms units).
    pub interval: u16,
    /// Scan window (0.625 ms units).
    pub window: u16,
    /// Length of one scan window (ms).
    pub duration_ms: u32,
    /// Report each address at most once per window.
    pub filter_duplicates: bool,
}

/// Connection parameters requested when connecting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConnParams {
    /// Minimum connection interval (1.25 ms units).
    pub min_interval: u16,
    /// Maximum connection interval (1.25 ms units).
    pub max_interval: u16,
    pub slave_latency: u16,
    /// Supervision timeout (10 ms units).
    pub supervision_timeout: u16,
}

/// Pairing I/O capability advertised to the peer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum IoCapability {
    NoInputNoOutput,
    DisplayOnly,
    DisplayYesNo,
}

/// Security requirements for the link.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SecurityParams {
    pub bond: bool,
    pub mitm: bool,
    /// LE Secure Connections.
    pub secure_connections: bool,
    pub io_capability: IoCapability,
    pub att_mtu: u16,
}

/// GATT central operations the bridge needs from the radio stack.
///
/// Methods that start a procedure (`start_scan`, `connect`, `secure`) only
/// report whether it could be started; its outcome arrives later as a
/// [`crate::bridge::BridgeEvent`].  Reads and subscriptions complete inline.
#[allow(async_fn_in_trait)]
pub trait Central {
    /// Open a scan window.  Results arrive as `Discovered`, the end as
    /// `ScanEnded`.
    async fn start_scan(&mut self, params: &ScanParams) -> Result<(), BleError>;

    /// Start connecting.  Outcome arrives as `Connected` / `ConnectFailed`.
    async fn connect(
        &mut self,
        peer: &PeripheralHandle,
        params: &ConnParams,
    ) -> Result<(), BleError>;

    /// Start pairing / encryption.  Outcome arrives as
    /// `AuthenticationComplete`.
    async fn secure(&mut self, params: &SecurityParams) -> Result<(), BleError>;

    /// Answer a numeric-comparison request.
    async fn confirm_passkey(&mut self, accept: bool) -> Result<(), BleError>;

    /// Read a characteristic value.
    async fn read(&mut self, characteristic: Characteristic) -> Result<AttValue, BleError>;

    /// Enable notifications (or indications) on every instance of the
    /// characteristic.  Returns how many instances were subscribed.
    async fn subscribe(&mut self, characteristic: Characteristic) -> Result<usize, BleError>;
}
