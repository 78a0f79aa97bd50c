//! Nordic SoftDevice S140 binding for the bridge's wireless side.
//!
//! ## Tasks
//!
//! - **softdevice_task**: runs the SoftDevice event loop and feeds USB power
//!   events to the VBUS detector.
//! - **radio_task**: performs scans and connection attempts requested by
//!   [`central::SoftdeviceCentral`].
//! - **link_task**: watches one connection: pairing outcome, notifications,
//!   and finally the disconnect.
//!
//! Everything they observe is pushed into [`EVENTS`] for the supervisor.

pub mod central;
pub mod client;
pub mod security;

use core::cell::RefCell;
use core::mem;

use defmt::{info, warn};
use embassy_nrf::usb::vbus_detect::SoftwareVbusDetect;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use nrf_softdevice::ble::Connection;
use nrf_softdevice::{raw, SocEvent, Softdevice};

use hogp_bridge::config::BLE_ATT_MTU;
use hogp_bridge::{BridgeEvent, EventQueues};

/// Transport → supervisor event queues.
pub static EVENTS: EventQueues<CriticalSectionRawMutex> = EventQueues::new();

/// The live connection, if any.  Shared by the supervisor (reads) and the
/// link task (notifications).
static LINK: Mutex<CriticalSectionRawMutex, RefCell<Option<Connection>>> =
    Mutex::new(RefCell::new(None));

/// Queue an event from a context that cannot await.
pub fn push_event(event: BridgeEvent) {
    if let Err(event) = EVENTS.try_push(event) {
        warn!("Event queue full - dropping {}", event);
    }
}

pub fn current_link() -> Option<Connection> {
    LINK.lock(|link| link.borrow().clone())
}

/// Configure and enable the SoftDevice for a single central link.
pub fn enable() -> &'static mut Softdevice {
    let config = nrf_softdevice::Config {
        clock: Some(raw::nrf_clock_lf_cfg_t {
            source: raw::NRF_CLOCK_LF_SRC_RC as u8,
            rc_ctiv: 16,
            rc_temp_ctiv: 2,
            accuracy: raw::NRF_CLOCK_LF_ACCURACY_500_PPM as u8,
        }),
        conn_gap: Some(raw::ble_gap_conn_cfg_t {
            conn_count: 1,
            event_length: 24,
        }),
        conn_gatt: Some(raw::ble_gatt_conn_cfg_t {
            att_mtu: BLE_ATT_MTU,
        }),
        gap_role_count: Some(raw::ble_gap_cfg_role_count_t {
            adv_set_count: 0,
            periph_role_count: 0,
            central_role_count: 1,
            central_sec_count: 1,
            _bitfield_1: raw::ble_gap_cfg_role_count_t::new_bitfield_1(0),
        }),
        ..Default::default()
    };

    let sd = Softdevice::enable(&config);
    info!("SoftDevice enabled");
    sd
}

/// USBREGSTATUS bits.
const USB_VBUS_DETECTED: u32 = 1 << 0;
const USB_OUTPUT_READY: u32 = 1 << 1;

/// Current (detected, ready) state of USB power, for seeding the VBUS
/// detector before the first SoC event arrives.
pub fn usb_power_status() -> (bool, bool) {
    let mut status: u32 = 0;
    // SAFETY: the SoftDevice is enabled and `status` outlives the call.
    let ret = unsafe { raw::sd_power_usbregstatus_get(&mut status) };
    if ret != raw::NRF_SUCCESS {
        warn!("USB power status unavailable ({})", ret);
        return (false, false);
    }
    (status & USB_VBUS_DETECTED != 0, status & USB_OUTPUT_READY != 0)
}

/// Run the SoftDevice.  The POWER peripheral belongs to the SoftDevice, so
/// USB VBUS events arrive here as SoC events.
pub async fn run_softdevice(sd: &'static Softdevice, vbus: &'static SoftwareVbusDetect) -> ! {
    // SAFETY: plain SoftDevice calls, made once the SoftDevice is enabled.
    unsafe {
        raw::sd_power_usbdetected_enable(1);
        raw::sd_power_usbpwrrdy_enable(1);
        raw::sd_power_usbremoved_enable(1);
    }

    sd.run_with_callback(|event| match event {
        SocEvent::PowerUsbDetected => vbus.detected(true),
        SocEvent::PowerUsbRemoved => vbus.detected(false),
        SocEvent::PowerUsbPowerReady => vbus.ready(),
        _ => {}
    })
    .await
}

/// Publish a freshly connected link.
pub(crate) fn link_up(conn: Connection) {
    LINK.lock(|link| *link.borrow_mut() = Some(conn));
}

/// Forget the link (disconnect observed).
pub(crate) fn link_down() -> Option<Connection> {
    LINK.lock(|link| mem::take(&mut *link.borrow_mut()))
}
