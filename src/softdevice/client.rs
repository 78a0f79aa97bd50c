//! GATT clients for the services the bridge reads.
//!
//! The `#[gatt_client]` macro keeps exactly one handle per characteristic
//! UUID, but HID peripherals usually expose several Report (0x2A4D)
//! instances.  [`ServiceClient`] implements [`gatt_client::Client`] by hand
//! and keeps every characteristic of the service together with its CCCD.

use heapless::Vec;
use nrf_softdevice::ble::gatt_client::{self, Characteristic, Descriptor, DiscoverError, HvxType};
use nrf_softdevice::ble::{Connection, Uuid};

use hogp_bridge::ble::link::WatchList;
use hogp_bridge::ble::{uuid, MAX_NOTIFICATION_LEN};
use hogp_bridge::BleError;

const CCCD_UUID: u16 = 0x2902;
const CCCD_NOTIFY: u16 = 0x0001;
const CCCD_INDICATE: u16 = 0x0002;

/// Characteristics remembered per service.
const MAX_CHARACTERISTICS: usize = 12;

/// One discovered characteristic.
#[derive(Clone, Copy)]
pub struct Attribute {
    pub uuid: Uuid,
    pub value_handle: u16,
    pub cccd_handle: Option<u16>,
    pub notify: bool,
    pub indicate: bool,
}

/// Every characteristic of the 16-bit service `SERVICE`.
pub struct ServiceClient<const SERVICE: u16> {
    attributes: Vec<Attribute, MAX_CHARACTERISTICS>,
}

pub type GapClient = ServiceClient<{ uuid::GAP_SERVICE }>;
pub type DeviceInfoClient = ServiceClient<{ uuid::DEVICE_INFO_SERVICE }>;
pub type BatteryClient = ServiceClient<{ uuid::BATTERY_SERVICE }>;
pub type HidClient = ServiceClient<{ uuid::HID_SERVICE }>;

impl<const SERVICE: u16> ServiceClient<SERVICE> {
    /// First instance of a characteristic.
    pub fn find(&self, uuid: u16) -> Option<Attribute> {
        let uuid = Uuid::new_16(uuid);
        self.attributes.iter().find(|a| a.uuid == uuid).copied()
    }

    /// All instances of a characteristic.
    pub fn all(&self, uuid: u16) -> impl Iterator<Item = &Attribute> {
        let uuid = Uuid::new_16(uuid);
        self.attributes.iter().filter(move |a| a.uuid == uuid)
    }
}

impl<const SERVICE: u16> gatt_client::Client for ServiceClient<SERVICE> {
    type Event = ();

    fn on_hvx(&self, _conn: &Connection, _type: HvxType, _handle: u16, _data: &[u8]) -> Option<()> {
        None
    }

    fn uuid() -> Uuid {
        Uuid::new_16(SERVICE)
    }

    fn new_undiscovered(_conn: Connection) -> Self {
        Self {
            attributes: Vec::new(),
        }
    }

    fn discovered_characteristic(&mut self, characteristic: &Characteristic, descriptors: &[Descriptor]) {
        let Some(uuid) = characteristic.uuid else {
            return;
        };
        let cccd = Uuid::new_16(CCCD_UUID);
        let attribute = Attribute {
            uuid,
            value_handle: characteristic.handle_value,
            cccd_handle: descriptors
                .iter()
                .find(|d| d.uuid == Some(cccd))
                .map(|d| d.handle),
            notify: characteristic.props.notify() != 0,
            indicate: characteristic.props.indicate() != 0,
        };
        if self.attributes.push(attribute).is_err() {
            defmt::warn!("Service {=u16:#x}: too many characteristics", SERVICE);
        }
    }

    fn discovery_complete(&mut self) -> Result<(), DiscoverError> {
        Ok(())
    }
}

/// Enable notifications (or indications) on one attribute.
pub async fn enable_cccd(conn: &Connection, attribute: &Attribute) -> Result<(), BleError> {
    let value = if attribute.notify {
        CCCD_NOTIFY
    } else if attribute.indicate {
        CCCD_INDICATE
    } else {
        return Err(BleError::NotifyUnsupported);
    };
    let handle = attribute.cccd_handle.ok_or(BleError::NotifyUnsupported)?;
    gatt_client::write(conn, handle, &value.to_le_bytes())
        .await
        .map_err(|e| match e {
            gatt_client::WriteError::Disconnected => BleError::NotConnected,
            _ => BleError::NotifyFailed,
        })
}

/// A notification routed to the characteristic it came from.
pub enum RoutedNotification {
    Report(Vec<u8, MAX_NOTIFICATION_LEN>),
    Battery(u8),
}

/// Client used only to receive notifications for a [`WatchList`] during
/// `gatt_client::run`; it spans services, so it never discovers anything.
pub struct NotificationRouter {
    pub watch: WatchList,
}

impl gatt_client::Client for NotificationRouter {
    type Event = RoutedNotification;

    fn on_hvx(&self, _conn: &Connection, _type: HvxType, handle: u16, data: &[u8]) -> Option<Self::Event> {
        if self.watch.battery == Some(handle) {
            return data.first().map(|level| RoutedNotification::Battery(*level));
        }
        if self.watch.reports.contains(&handle) {
            let len = data.len().min(MAX_NOTIFICATION_LEN);
            if len < data.len() {
                defmt::warn!("Report notification cut from {} to {} bytes", data.len(), len);
            }
            return Vec::from_slice(&data[..len]).ok().map(RoutedNotification::Report);
        }
        None
    }

    fn uuid() -> Uuid {
        Uuid::new_16(uuid::HID_SERVICE)
    }

    fn new_undiscovered(_conn: Connection) -> Self {
        Self {
            watch: WatchList::default(),
        }
    }

    fn discovered_characteristic(&mut self, _characteristic: &Characteristic, _descriptors: &[Descriptor]) {}

    fn discovery_complete(&mut self) -> Result<(), DiscoverError> {
        Ok(())
    }
}
