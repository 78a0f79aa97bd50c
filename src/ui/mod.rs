//! User interface subsystem - status on the SSD1306 OLED.
//!
//! The supervisor publishes [`Status`] updates through [`StatusQueue`];
//! the display task redraws whenever one arrives.  Updates that find the
//! queue full are dropped; the next one repaints the whole screen anyway.

pub mod display;

use embassy_nrf::peripherals;
use embassy_nrf::twim::Twim;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;

use hogp_bridge::{Status, StatusSink};

use display::Screen;

static STATUS: Channel<CriticalSectionRawMutex, Status, 8> = Channel::new();

/// [`StatusSink`] that hands updates to the display task.
pub struct StatusQueue;

impl StatusSink for StatusQueue {
    fn show(&mut self, status: Status) {
        let _ = STATUS.try_send(status);
    }
}

pub async fn run_display(i2c: Twim<'static, peripherals::TWISPI0>) -> ! {
    let mut display = display::init(i2c);
    let mut screen = Screen::new();
    display::draw(&mut display, &screen);

    loop {
        screen.apply(STATUS.receive().await);
        display::draw(&mut display, &screen);
    }
}
