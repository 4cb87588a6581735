//! Compile-time configuration for the weather station
//!
//! Pin numbers and sizing constants are fixed at build time. Network
//! credentials come from the firmware build script and are handed to the
//! Wi-Fi task through [`Config`].

use embassy_time::Duration;
use serde::{Deserialize, Serialize};

/// I2C data pin shared by the BMP180 and the HMC5883L
pub const I2C_SDA_PIN: u8 = 21;
/// I2C clock pin shared by the BMP180 and the HMC5883L
pub const I2C_SCL_PIN: u8 = 22;
/// Sensor bus clock
pub const I2C_FREQUENCY_KHZ: u32 = 100;
/// Status LED
pub const LED_PIN: u8 = 2;

/// Standard sea-level pressure used for the altitude calculation
pub const REFERENCE_PRESSURE_PA: u32 = 101_325;

/// Period of both sensor polling tasks
pub const POLL_PERIOD: Duration = Duration::from_secs(1);
/// Half period of the LED heartbeat
pub const HEARTBEAT_PERIOD: Duration = Duration::from_secs(1);

pub const HOSTNAME: &str = "weather1";
pub const HTTP_PORT: u16 = 80;

/// Number of HTTP worker tasks, each serving one socket at a time.
/// One worker can be parked in a websocket session while the others keep
/// accepting page requests.
pub const HTTP_WORKER_COUNT: usize = 3;
/// Idle timeout for reads on an HTTP connection
pub const HTTP_READ_TIMEOUT: Duration = Duration::from_secs(10);
/// Upper bound on live per-connection sessions
pub const MAX_SESSIONS: usize = 8;
/// Pending push jobs per worker
pub const PUSH_QUEUE_DEPTH: usize = 2;

const _: () = assert!(HTTP_WORKER_COUNT >= 2 && HTTP_WORKER_COUNT <= u8::MAX as usize);
const _: () = assert!(MAX_SESSIONS >= HTTP_WORKER_COUNT);

#[derive(Serialize, Deserialize, Debug, Default)]
#[serde(bound(deserialize = "'de: 'a"))]
pub struct Config<'a> {
    pub internet: InternetConfig<'a>,
}

#[derive(Serialize, Deserialize, Debug, Default)]
pub struct InternetConfig<'a> {
    pub ssid: &'a str,
    pub password: &'a str,
}
