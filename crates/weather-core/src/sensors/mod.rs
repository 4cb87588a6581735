//! Sensor drivers and the trait the polling tasks consume

mod bmp180;
mod hmc5883l;

pub use bmp180::*;
pub use hmc5883l::*;

use thiserror_no_std::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    #[error("{sensor}: failed to {operation} ({details})")]
    ReadFailed {
        sensor: &'static str,
        operation: &'static str,
        details: &'static str,
    },
    #[error("{sensor}: initialization failed ({details})")]
    InitializationFailed {
        sensor: &'static str,
        details: &'static str,
    },
    #[error("{sensor}: unexpected device id {found:02x?}")]
    UnexpectedDevice { sensor: &'static str, found: [u8; 3] },
    #[error("{sensor}: measurement out of range")]
    Overflow { sensor: &'static str },
}

/// A device that is configured once and then read periodically.
pub trait Sensor {
    /// The type of readings this sensor produces.
    type Readings: Copy;

    /// Probe and configure the device. Called once before the first read.
    fn init(&mut self) -> impl Future<Output = Result<(), SensorError>>;

    /// Take one measurement.
    fn read(&mut self) -> impl Future<Output = Result<Self::Readings, SensorError>>;
}

/// One BMP180 measurement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PressureReadings {
    pub temperature_celsius: f32,
    pub pressure_pa: u32,
}

/// One HMC5883L measurement in milligauss.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MagneticReadings {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}
