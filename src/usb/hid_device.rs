//! USB HID device carrying the peripheral's own report descriptor.
//!
//! The descriptor is only known after the first peripheral has been
//! discovered, so the USB stack is built lazily: [`run_usb`] waits for
//! [`UsbHidLink::register_descriptor`] before enumerating.

use core::sync::atomic::{AtomicBool, Ordering};

use defmt::{info, warn};
use embassy_futures::select::{select, Either};
use embassy_nrf::usb::vbus_detect::SoftwareVbusDetect;
use embassy_nrf::usb::Driver;
use embassy_nrf::{self, bind_interrupts, peripherals};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;
use embassy_usb::class::hid::{Config as HidConfig, HidWriter, State};
use embassy_usb::{Builder, Config};
use heapless::Vec;
use static_cell::StaticCell;

use hogp_bridge::ble::MAX_ATT_VALUE;
use hogp_bridge::config::{self, REPORT_QUEUE_DEPTH, USB_HID_PACKET_SIZE};
use hogp_bridge::hid::{WireReport, WiredHid};

bind_interrupts!(struct Irqs {
    USBD => embassy_nrf::usb::InterruptHandler<peripherals::USBD>;
});

type UsbDriver = Driver<'static, peripherals::USBD, &'static SoftwareVbusDetect>;

/// One report as it goes on the wire, id byte included.
type Packet = Vec<u8, USB_HID_PACKET_SIZE>;

static DESCRIPTOR: Signal<CriticalSectionRawMutex, Vec<u8, MAX_ATT_VALUE>> = Signal::new();
static REPORTS: Channel<CriticalSectionRawMutex, Packet, REPORT_QUEUE_DEPTH> = Channel::new();
static CONFIGURED: AtomicBool = AtomicBool::new(false);

static HID_STATE: StaticCell<State> = StaticCell::new();
static REPORT_DESC: StaticCell<Vec<u8, MAX_ATT_VALUE>> = StaticCell::new();
static USB_CONFIG_DESC: StaticCell<[u8; 256]> = StaticCell::new();
static USB_BOS_DESC: StaticCell<[u8; 256]> = StaticCell::new();
static USB_MSOS_DESC: StaticCell<[u8; 256]> = StaticCell::new();
static USB_CTRL_BUF: StaticCell<[u8; 128]> = StaticCell::new();
static USB_STATE_HANDLER: StaticCell<UsbStateHandler> = StaticCell::new();

struct UsbStateHandler;

impl embassy_usb::Handler for UsbStateHandler {
    fn configured(&mut self, configured: bool) {
        info!("USB configured: {}", configured);
        CONFIGURED.store(configured, Ordering::Relaxed);
    }

    fn reset(&mut self) {
        CONFIGURED.store(false, Ordering::Relaxed);
    }

    fn suspended(&mut self, suspended: bool) {
        if suspended {
            info!("USB suspended");
        }
    }
}

/// Supervisor-side handle on the USB HID interface.
pub struct UsbHidLink {
    registered: bool,
}

impl UsbHidLink {
    pub const fn new() -> Self {
        Self { registered: false }
    }
}

impl WiredHid for UsbHidLink {
    fn register_descriptor(&mut self, descriptor: &[u8]) -> bool {
        // The interface cannot be rebuilt once enumerated.
        if self.registered {
            return false;
        }
        match Vec::from_slice(descriptor) {
            Ok(descriptor) => {
                DESCRIPTOR.signal(descriptor);
                self.registered = true;
                true
            }
            Err(()) => {
                warn!("Report descriptor too large ({} bytes)", descriptor.len());
                false
            }
        }
    }

    fn send_report(&mut self, report: &WireReport<'_>) -> bool {
        if !CONFIGURED.load(Ordering::Relaxed) {
            return false;
        }

        let mut packet = Packet::new();
        // Id 0: the descriptor declares no report ids.
        if report.report_id != 0 && packet.push(report.report_id).is_err() {
            return false;
        }
        if packet.extend_from_slice(report.payload).is_err() {
            return false;
        }
        REPORTS.try_send(packet).is_ok()
    }
}

/// Wait for the report descriptor, then run the USB device and the report
/// writer for good.
pub async fn run_usb(usbd: peripherals::USBD, vbus: &'static SoftwareVbusDetect) -> ! {
    let descriptor = REPORT_DESC.init(DESCRIPTOR.wait().await);
    info!("USB HID starting with a {} byte report descriptor", descriptor.len());

    let driver = Driver::new(usbd, Irqs, vbus);

    let mut usb_config = Config::new(config::USB_VID, config::USB_PID);
    usb_config.manufacturer = Some(config::USB_MANUFACTURER);
    usb_config.product = Some(config::USB_PRODUCT);
    usb_config.serial_number = Some(config::USB_SERIAL_NUMBER);
    usb_config.max_power = 100; // mA
    usb_config.max_packet_size_0 = 64;

    let mut builder = Builder::new(
        driver,
        usb_config,
        USB_CONFIG_DESC.init([0u8; 256]),
        USB_BOS_DESC.init([0u8; 256]),
        USB_MSOS_DESC.init([0u8; 256]),
        USB_CTRL_BUF.init([0u8; 128]),
    );
    builder.handler(USB_STATE_HANDLER.init(UsbStateHandler));

    let hid_config = HidConfig {
        report_descriptor: descriptor.as_slice(),
        request_handler: None,
        poll_ms: config::USB_HID_POLL_MS,
        max_packet_size: USB_HID_PACKET_SIZE as u16,
    };
    let writer = HidWriter::<_, USB_HID_PACKET_SIZE>::new(&mut builder, HID_STATE.init(State::new()), hid_config);

    let mut device = builder.build();

    match select(device.run(), write_reports(writer)).await {
        Either::First(never) | Either::Second(never) => never,
    }
}

async fn write_reports(mut writer: HidWriter<'static, UsbDriver, USB_HID_PACKET_SIZE>) -> ! {
    info!("HID writer started");
    loop {
        let packet = REPORTS.receive().await;
        if writer.write(&packet).await.is_err() {
            warn!("USB report write failed");
        }
    }
}
