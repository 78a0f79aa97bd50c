//! Application-wide constants and compile-time configuration.
//!
//! Radio timing, security policy and USB identity live here so they can be
//! tuned in one place.  Nothing in this file is runtime-configurable.

use crate::ble::{ConnParams, IoCapability, ScanParams, SecurityParams};

// BLE scanning

/// Duration of one scan window (ms).
pub const BLE_SCAN_DURATION_MS: u32 = 2_000;

/// Scan interval / window in 0.625 ms units (50 ms / 30 ms).
pub const BLE_SCAN_INTERVAL: u16 = 80;
pub const BLE_SCAN_WINDOW: u16 = 48;

/// Maximum number of distinct addresses remembered for duplicate filtering
/// within one scan window.
pub const BLE_SCAN_DEDUP_CAPACITY: usize = 16;

pub const SCAN: ScanParams = ScanParams {
    active: true,
    interval: BLE_SCAN_INTERVAL,
    window: BLE_SCAN_WINDOW,
    duration_ms: BLE_SCAN_DURATION_MS,
    filter_duplicates: true,
};

// BLE connection

/// Connection interval range (in 1.25 ms units).
/// 6 = 7.5 ms (lowest latency for HID).
pub const BLE_CONN_INTERVAL_MIN: u16 = 6;
pub const BLE_CONN_INTERVAL_MAX: u16 = 12;

/// Slave latency (number of connection events the peripheral can skip).
pub const BLE_SLAVE_LATENCY: u16 = 0;

/// Supervision timeout (in 10 ms units). 400 = 4 s.
pub const BLE_SUP_TIMEOUT: u16 = 400;

/// Give up on a connection attempt after this long (ms).
pub const BLE_CONNECT_TIMEOUT_MS: u32 = 5_000;

pub const CONNECTION: ConnParams = ConnParams {
    min_interval: BLE_CONN_INTERVAL_MIN,
    max_interval: BLE_CONN_INTERVAL_MAX,
    slave_latency: BLE_SLAVE_LATENCY,
    supervision_timeout: BLE_SUP_TIMEOUT,
};

// BLE security

/// ATT MTU requested after connecting (protocol maximum).
pub const BLE_ATT_MTU: u16 = 517;

pub const SECURITY: SecurityParams = SecurityParams {
    bond: true,
    mitm: true,
    secure_connections: true,
    io_capability: IoCapability::DisplayYesNo,
    att_mtu: BLE_ATT_MTU,
};

/// Bonds kept in RAM; the oldest is dropped when full.
pub const BLE_MAX_BONDS: usize = 4;

/// How long the firmware waits for an encrypted link after requesting
/// pairing before reporting the attempt as failed (200 ms steps).
pub const BLE_SECURITY_POLL_MS: u64 = 200;
pub const BLE_SECURITY_POLL_STEPS: u32 = 25;

// Supervisor

/// Fixed delay between a session ending (or an empty scan window) and the
/// next scan window (ms).
pub const RESCAN_DELAY_MS: u64 = 2_000;

/// Supervisor tick when no event is pending (ms).
pub const SUPERVISOR_TICK_MS: u64 = 10;

/// Depth of the transport → supervisor control-event queue.
pub const EVENT_QUEUE_DEPTH: usize = 16;

/// Depth of the transport → supervisor queue for report and battery
/// notifications.
pub const INPUT_QUEUE_DEPTH: usize = 32;

/// Depth of the supervisor → USB report queue.
pub const REPORT_QUEUE_DEPTH: usize = 16;

// USB

/// USB VID/PID - use the "pid.codes" open-source test VID.
/// Replace with your own allocated VID/PID for production.
pub const USB_VID: u16 = 0x1209;
pub const USB_PID: u16 = 0x0001;

/// USB device strings.
pub const USB_MANUFACTURER: &str = "hogp-bridge";
pub const USB_PRODUCT: &str = "BLE HID Bridge";
pub const USB_SERIAL_NUMBER: &str = "000001";

/// USB HID polling interval (ms). 1 ms = 1000 Hz for lowest latency.
pub const USB_HID_POLL_MS: u8 = 1;

/// Full-speed interrupt endpoint size; one byte is the report id.
pub const USB_HID_PACKET_SIZE: usize = 64;
