//! ESP32-specific half of the weather station
//!
//! Peripheral bring-up, Wi-Fi and the embassy task wrappers around the
//! portable logic in `weather_core`. Nothing here builds for the host.

#![no_std]

extern crate alloc;

pub mod hardware;
pub mod tasks;
pub mod wifi;
pub mod wifi_secrets;
