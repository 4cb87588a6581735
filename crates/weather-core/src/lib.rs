//! Hardware-independent core of the weather station firmware
//!
//! This crate holds everything that does not touch ESP32 peripherals
//! directly: the shared weather record, the BMP180 and HMC5883L drivers
//! (generic over `embedded-hal-async`), the polling state machines, the HTTP
//! server with its websocket push channel, and page rendering.
//!
//! It is `#![no_std]` with `extern crate alloc` so it builds for the ESP32
//! and for the host, where the tests run.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod app_state;
pub mod async_i2c_bus;
pub mod config;
pub mod http;
pub mod polling;
pub mod presentation;
pub mod push;
pub mod sensors;
pub mod session;
pub mod weather;
pub mod ws;

#[cfg(test)]
mod testing;
