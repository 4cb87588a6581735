use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::i2c::I2c;
use log::{error, info, warn};

use super::{MagneticReadings, Sensor, SensorError};

const SENSOR: &str = "HMC5883L";

pub const HMC5883L_ADDRESS: u8 = 0x1E;

const REG_CONFIG_A: u8 = 0x00;
const REG_CONFIG_B: u8 = 0x01;
const REG_MODE: u8 = 0x02;
const REG_DATA_X_MSB: u8 = 0x03;
const REG_STATUS: u8 = 0x09;
const REG_ID_A: u8 = 0x0A;

const DEVICE_ID: [u8; 3] = *b"H43";
const STATUS_READY: u8 = 0x01;
/// Raw value the device reports when an axis saturates
const OVERFLOW: i16 = -4096;

/// Single-measurement conversion time with some margin
const MEASUREMENT_US: u32 = 6_000;
const READY_POLLS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatingMode {
    Continuous = 0,
    Single = 1,
    Idle = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplesAveraged {
    One = 0,
    Two = 1,
    Four = 2,
    Eight = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataRate {
    Hz0_75 = 0,
    Hz1_5 = 1,
    Hz3 = 2,
    Hz7_5 = 3,
    Hz15 = 4,
    Hz30 = 5,
    Hz75 = 6,
}

/// Gain in LSB per gauss
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gain {
    G1370 = 0,
    G1090 = 1,
    G820 = 2,
    G660 = 3,
    G440 = 4,
    G390 = 5,
    G330 = 6,
    G230 = 7,
}

impl Gain {
    /// Resolution for this gain as listed in the datasheet
    pub const fn milligauss_per_lsb(self) -> f32 {
        match self {
            Self::G1370 => 0.73,
            Self::G1090 => 0.92,
            Self::G820 => 1.22,
            Self::G660 => 1.52,
            Self::G440 => 2.27,
            Self::G390 => 2.56,
            Self::G330 => 3.03,
            Self::G230 => 4.35,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MagnetometerConfig {
    pub mode: OperatingMode,
    pub samples: SamplesAveraged,
    pub rate: DataRate,
    pub gain: Gain,
}

impl MagnetometerConfig {
    /// The configuration the weather station always runs with.
    pub const STATION: Self = Self {
        mode: OperatingMode::Single,
        samples: SamplesAveraged::Eight,
        rate: DataRate::Hz7_5,
        gain: Gain::G1090,
    };

    const fn config_a(&self) -> u8 {
        (self.samples as u8) << 5 | (self.rate as u8) << 2
    }

    const fn config_b(&self) -> u8 {
        (self.gain as u8) << 5
    }
}

/// Honeywell HMC5883L three-axis magnetometer.
pub struct Hmc5883l<I, D> {
    i2c: I,
    delay: D,
    config: MagnetometerConfig,
}

impl<I: I2c, D: DelayNs> Hmc5883l<I, D> {
    pub fn new(i2c: I, delay: D, config: MagnetometerConfig) -> Self {
        Self { i2c, delay, config }
    }

    async fn write_register(
        &mut self,
        register: u8,
        value: u8,
        operation: &'static str,
    ) -> Result<(), SensorError> {
        self.i2c
            .write(HMC5883L_ADDRESS, &[register, value])
            .await
            .map_err(|e| {
                error!("HMC5883L write to {:#04x} failed: {:?}", register, e);
                SensorError::ReadFailed {
                    sensor: SENSOR,
                    operation,
                    details: "I2C communication error",
                }
            })
    }

    async fn read_registers(
        &mut self,
        register: u8,
        buf: &mut [u8],
        operation: &'static str,
    ) -> Result<(), SensorError> {
        self.i2c
            .write_read(HMC5883L_ADDRESS, &[register], buf)
            .await
            .map_err(|e| {
                error!("HMC5883L read of {:#04x} failed: {:?}", register, e);
                SensorError::ReadFailed {
                    sensor: SENSOR,
                    operation,
                    details: "I2C communication error or sensor not responding",
                }
            })
    }

    async fn wait_ready(&mut self) -> Result<(), SensorError> {
        for _ in 0..READY_POLLS {
            let mut status = [0u8; 1];
            self.read_registers(REG_STATUS, &mut status, "read status")
                .await?;
            if status[0] & STATUS_READY != 0 {
                return Ok(());
            }
            self.delay.delay_us(MEASUREMENT_US / 2).await;
        }
        warn!("HMC5883L data not ready after {} polls", READY_POLLS);
        Err(SensorError::ReadFailed {
            sensor: SENSOR,
            operation: "wait for data ready",
            details: "timed out",
        })
    }
}

impl<I: I2c, D: DelayNs> Sensor for Hmc5883l<I, D> {
    type Readings = MagneticReadings;

    async fn init(&mut self) -> Result<(), SensorError> {
        let mut id = [0u8; 3];
        self.read_registers(REG_ID_A, &mut id, "read identification")
            .await
            .map_err(|_| SensorError::InitializationFailed {
                sensor: SENSOR,
                details: "device did not answer on the bus",
            })?;
        if id != DEVICE_ID {
            return Err(SensorError::UnexpectedDevice {
                sensor: SENSOR,
                found: id,
            });
        }

        let config = self.config;
        let configure = async {
            self.write_register(REG_CONFIG_A, config.config_a(), "configure averaging and rate")
                .await?;
            self.write_register(REG_CONFIG_B, config.config_b(), "configure gain")
                .await?;
            self.write_register(REG_MODE, config.mode as u8, "configure mode")
                .await
        };
        configure
            .await
            .map_err(|_| SensorError::InitializationFailed {
                sensor: SENSOR,
                details: "failed to write configuration registers",
            })?;

        info!("HMC5883L ready ({:?})", config);
        Ok(())
    }

    async fn read(&mut self) -> Result<MagneticReadings, SensorError> {
        if self.config.mode == OperatingMode::Single {
            // The device drops back to idle after every single measurement
            self.write_register(REG_MODE, OperatingMode::Single as u8, "trigger measurement")
                .await?;
            self.delay.delay_us(MEASUREMENT_US).await;
        }
        self.wait_ready().await?;

        let mut raw = [0u8; 6];
        self.read_registers(REG_DATA_X_MSB, &mut raw, "read field data")
            .await?;

        // Output registers are ordered X, Z, Y
        let x = i16::from_be_bytes([raw[0], raw[1]]);
        let z = i16::from_be_bytes([raw[2], raw[3]]);
        let y = i16::from_be_bytes([raw[4], raw[5]]);
        if [x, y, z].contains(&OVERFLOW) {
            return Err(SensorError::Overflow { sensor: SENSOR });
        }

        let scale = self.config.gain.milligauss_per_lsb();
        Ok(MagneticReadings {
            x: f32::from(x) * scale,
            y: f32::from(y) * scale,
            z: f32::from(z) * scale,
        })
    }
}
