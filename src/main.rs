//! hogp-bridge firmware for the nRF52840.
//!
//! Connects to one BLE HID peripheral, mirrors its report descriptor on
//! the USB port and forwards every input report to the host.

#![no_std]
#![no_main]

mod softdevice;
mod ui;
mod usb;

use defmt::{info, unwrap};
use embassy_executor::Spawner;
use embassy_futures::select::{select, Either};
use embassy_nrf::interrupt::{self, InterruptExt, Priority};
use embassy_nrf::twim::{self, Twim};
use embassy_nrf::usb::vbus_detect::SoftwareVbusDetect;
use embassy_nrf::{bind_interrupts, peripherals};
use embassy_time::{Instant, Timer};
use nrf_softdevice::Softdevice;
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

use hogp_bridge::config::SUPERVISOR_TICK_MS;
use hogp_bridge::BridgeSupervisor;

use softdevice::central::SoftdeviceCentral;
use softdevice::EVENTS;
use ui::StatusQueue;
use usb::hid_device::UsbHidLink;

bind_interrupts!(struct Irqs {
    SPIM0_SPIS0_TWIM0_TWIS0_SPI0_TWI0 => twim::InterruptHandler<peripherals::TWISPI0>;
});

static VBUS: StaticCell<SoftwareVbusDetect> = StaticCell::new();

#[embassy_executor::task]
async fn softdevice_task(sd: &'static Softdevice, vbus: &'static SoftwareVbusDetect) -> ! {
    softdevice::run_softdevice(sd, vbus).await
}

#[embassy_executor::task]
async fn radio_task(sd: &'static Softdevice) -> ! {
    softdevice::central::run_radio(sd).await
}

#[embassy_executor::task]
async fn link_task() -> ! {
    softdevice::central::run_link().await
}

#[embassy_executor::task]
async fn usb_task(usbd: peripherals::USBD, vbus: &'static SoftwareVbusDetect) -> ! {
    usb::hid_device::run_usb(usbd, vbus).await
}

#[embassy_executor::task]
async fn display_task(i2c: Twim<'static, peripherals::TWISPI0>) -> ! {
    ui::run_display(i2c).await
}

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("hogp-bridge starting");

    // Priorities 0, 1 and 4 are reserved for the SoftDevice.
    let mut config = embassy_nrf::config::Config::default();
    config.gpiote_interrupt_priority = Priority::P2;
    config.time_interrupt_priority = Priority::P2;
    let p = embassy_nrf::init(config);
    interrupt::USBD.set_priority(Priority::P2);
    interrupt::SPIM0_SPIS0_TWIM0_TWIS0_SPI0_TWI0.set_priority(Priority::P3);

    let sd: &'static Softdevice = softdevice::enable();
    let (detected, ready) = softdevice::usb_power_status();
    let vbus = VBUS.init(SoftwareVbusDetect::new(detected, ready));

    unwrap!(spawner.spawn(softdevice_task(sd, vbus)));
    unwrap!(spawner.spawn(radio_task(sd)));
    unwrap!(spawner.spawn(link_task()));
    unwrap!(spawner.spawn(usb_task(p.USBD, vbus)));

    // SSD1306 on SDA = P0.26, SCL = P0.27.
    let i2c = Twim::new(p.TWISPI0, Irqs, p.P0_26, p.P0_27, twim::Config::default());
    unwrap!(spawner.spawn(display_task(i2c)));

    let mut supervisor = BridgeSupervisor::new(SoftdeviceCentral::new(), UsbHidLink::new(), StatusQueue);

    loop {
        if let Either::First(event) =
            select(EVENTS.next(), Timer::after_millis(SUPERVISOR_TICK_MS)).await
        {
            supervisor.handle(event).await;
        }
        supervisor.poll(Instant::now().as_millis()).await;
    }
}
