//! SSD1306 OLED display wrapper.

use core::fmt::Write as _;

use embedded_graphics::mono_font::ascii::FONT_6X10;
use embedded_graphics::mono_font::MonoTextStyleBuilder;
use embedded_graphics::pixelcolor::BinaryColor;
use embedded_graphics::prelude::*;
use embedded_graphics::text::Text;
use heapless::String;
use ssd1306::mode::BufferedGraphicsMode;
use ssd1306::prelude::*;
use ssd1306::I2CDisplayInterface;
use ssd1306::Ssd1306;

use hogp_bridge::Status;

/// Type alias for the concrete display driver.
///
/// Generic over the I²C implementation so callers pass in their HAL's
/// I²C peripheral.
pub type Display<I2C> =
    Ssd1306<I2CInterface<I2C>, DisplaySize128x64, BufferedGraphicsMode<DisplaySize128x64>>;

/// What is on screen: the latest bridge status plus the last battery
/// reading, which outlives the status line.
#[derive(Clone, Copy)]
pub struct Screen {
    pub status: Status,
    pub battery: Option<u8>,
}

impl Screen {
    pub const fn new() -> Self {
        Self {
            status: Status::Idle,
            battery: None,
        }
    }

    pub fn apply(&mut self, status: Status) {
        match status {
            Status::Battery(level) => self.battery = Some(level),
            Status::Disconnected | Status::Idle | Status::Error => {
                self.battery = None;
                self.status = status;
            }
            _ => self.status = status,
        }
    }
}

/// Initialise the SSD1306 display and clear the screen.
pub fn init<I2C>(i2c: I2C) -> Display<I2C>
where
    I2C: embedded_hal::i2c::I2c,
{
    let interface = I2CDisplayInterface::new(i2c);
    let mut display = Ssd1306::new(interface, DisplaySize128x64, DisplayRotation::Rotate0)
        .into_buffered_graphics_mode();
    let _ = display.init();
    display.clear_buffer();
    let _ = display.flush();
    display
}

fn text_style() -> embedded_graphics::mono_font::MonoTextStyle<'static, BinaryColor> {
    MonoTextStyleBuilder::new()
        .font(&FONT_6X10)
        .text_color(BinaryColor::On)
        .build()
}

fn headline(status: Status) -> &'static str {
    match status {
        Status::Idle => "Idle",
        Status::Scanning => "Scanning...",
        Status::Connecting => "Connecting...",
        Status::Pairing | Status::Passkey(_) => "Pairing",
        Status::Discovering => "Reading device",
        Status::Bridging { monitor_only: false } => "Bridging",
        Status::Bridging { monitor_only: true } => "Monitor only",
        // Never stored as the status line.
        Status::Battery(_) => "",
        Status::Disconnected => "Disconnected",
        Status::Error => "ERROR",
    }
}

/// Render the whole screen.
pub fn draw<I2C>(display: &mut Display<I2C>, screen: &Screen)
where
    I2C: embedded_hal::i2c::I2c,
{
    display.clear_buffer();

    let _ = Text::new("hogp-bridge", Point::new(0, 10), text_style()).draw(display);
    let _ = Text::new(headline(screen.status), Point::new(0, 26), text_style()).draw(display);

    let mut line: String<24> = String::new();
    match screen.status {
        Status::Passkey(passkey) => {
            let _ = write!(line, "Code {:06}", passkey);
        }
        Status::Bridging { monitor_only: false } => {
            let _ = line.push_str("HID active");
        }
        _ => {}
    }
    if !line.is_empty() {
        let _ = Text::new(line.as_str(), Point::new(0, 40), text_style()).draw(display);
    }

    if let Some(level) = screen.battery {
        let mut battery: String<16> = String::new();
        let _ = write!(battery, "Battery {}%", level);
        let _ = Text::new(battery.as_str(), Point::new(0, 54), text_style()).draw(display);
    }

    let _ = display.flush();
}
