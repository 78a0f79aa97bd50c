//! USB device subsystem - presents the bridged peripheral to the host.
//!
//! The nRF52840's built-in USB 2.0 Full-Speed controller is driven by
//! `embassy-usb`.  A single HID interface is created with the report
//! descriptor read from the BLE peripheral, so the host parses reports
//! exactly as the peripheral defines them.
//!
//! VBUS is tracked in software: the POWER peripheral belongs to the
//! SoftDevice, which reports USB power changes as SoC events.

pub mod hid_device;
