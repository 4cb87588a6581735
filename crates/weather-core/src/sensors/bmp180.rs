use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::i2c::I2c;
use log::{debug, error, info};

use super::{PressureReadings, Sensor, SensorError};

const SENSOR: &str = "BMP180";

pub const BMP180_ADDRESS: u8 = 0x77;

const REG_CALIBRATION: u8 = 0xAA;
const REG_CHIP_ID: u8 = 0xD0;
const REG_CONTROL: u8 = 0xF4;
const REG_OUT_MSB: u8 = 0xF6;

const CHIP_ID: u8 = 0x55;
const CMD_TEMPERATURE: u8 = 0x2E;
const CMD_PRESSURE: u8 = 0x34;

const TEMPERATURE_CONVERSION_US: u32 = 4_500;

/// Pressure oversampling setting (`oss` in the datasheet)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Oversampling {
    UltraLowPower = 0,
    Standard = 1,
    HighResolution = 2,
    UltraHighResolution = 3,
}

impl Oversampling {
    const fn shift(self) -> u8 {
        self as u8
    }

    /// Maximum conversion time for a pressure measurement
    const fn conversion_us(self) -> u32 {
        match self {
            Self::UltraLowPower => 4_500,
            Self::Standard => 7_500,
            Self::HighResolution => 13_500,
            Self::UltraHighResolution => 25_500,
        }
    }
}

/// Factory calibration coefficients stored in the device EEPROM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Calibration {
    pub ac1: i16,
    pub ac2: i16,
    pub ac3: i16,
    pub ac4: u16,
    pub ac5: u16,
    pub ac6: u16,
    pub b1: i16,
    pub b2: i16,
    pub mb: i16,
    pub mc: i16,
    pub md: i16,
}

impl Calibration {
    /// Decode the 22 big-endian bytes starting at register `0xAA`.
    pub fn from_bytes(raw: &[u8; 22]) -> Result<Self, SensorError> {
        let word = |i: usize| u16::from_be_bytes([raw[2 * i], raw[2 * i + 1]]);

        // An erased or disconnected EEPROM reads back as all zeros or all ones
        if (0..11).any(|i| word(i) == 0x0000 || word(i) == 0xFFFF) {
            return Err(SensorError::InitializationFailed {
                sensor: SENSOR,
                details: "calibration EEPROM is blank",
            });
        }

        Ok(Self {
            ac1: word(0) as i16,
            ac2: word(1) as i16,
            ac3: word(2) as i16,
            ac4: word(3),
            ac5: word(4),
            ac6: word(5),
            b1: word(6) as i16,
            b2: word(7) as i16,
            mb: word(8) as i16,
            mc: word(9) as i16,
            md: word(10) as i16,
        })
    }

    /// Compensated temperature in 0.1 °C, plus the `B5` term reused by the
    /// pressure calculation.
    pub fn temperature(&self, ut: i32) -> (i32, i32) {
        let x1 = ((ut as i64 - self.ac6 as i64) * self.ac5 as i64) >> 15;
        let denominator = x1 + self.md as i64;
        let x2 = if denominator == 0 {
            0
        } else {
            ((self.mc as i64) << 11) / denominator
        };
        let b5 = x1 + x2;
        (((b5 + 8) >> 4) as i32, b5 as i32)
    }

    /// Compensated pressure in Pa.
    pub fn pressure(&self, up: i32, b5: i32, oss: Oversampling) -> u32 {
        let oss = oss.shift();
        let b6 = b5 as i64 - 4000;

        let x1 = (self.b2 as i64 * ((b6 * b6) >> 12)) >> 11;
        let x2 = (self.ac2 as i64 * b6) >> 11;
        let x3 = x1 + x2;
        let b3 = (((self.ac1 as i64 * 4 + x3) << oss) + 2) / 4;

        let x1 = (self.ac3 as i64 * b6) >> 13;
        let x2 = (self.b1 as i64 * ((b6 * b6) >> 12)) >> 16;
        let x3 = ((x1 + x2) + 2) >> 2;
        let b4 = (self.ac4 as u32).wrapping_mul((x3 + 32768) as u32) >> 15;
        let b7 = (up as i64 - b3) as u32;
        let b7 = b7.wrapping_mul(50_000 >> oss);

        if b4 == 0 {
            return 0;
        }
        let p = if b7 < 0x8000_0000 {
            (b7 * 2) / b4
        } else {
            (b7 / b4) * 2
        } as i64;

        let x1 = (p >> 8) * (p >> 8);
        let x1 = (x1 * 3038) >> 16;
        let x2 = (-7357 * p) >> 16;
        (p + ((x1 + x2 + 3791) >> 4)) as u32
    }
}

/// Bosch BMP180 barometric pressure and temperature sensor.
pub struct Bmp180<I, D> {
    i2c: I,
    delay: D,
    oversampling: Oversampling,
    calibration: Option<Calibration>,
}

impl<I: I2c, D: DelayNs> Bmp180<I, D> {
    pub fn new(i2c: I, delay: D, oversampling: Oversampling) -> Self {
        Self {
            i2c,
            delay,
            oversampling,
            calibration: None,
        }
    }

    pub fn calibration(&self) -> Option<&Calibration> {
        self.calibration.as_ref()
    }

    async fn read_registers(
        &mut self,
        register: u8,
        buf: &mut [u8],
        operation: &'static str,
    ) -> Result<(), SensorError> {
        self.i2c
            .write_read(BMP180_ADDRESS, &[register], buf)
            .await
            .map_err(|e| {
                error!("BMP180 register {:#04x} read failed: {:?}", register, e);
                SensorError::ReadFailed {
                    sensor: SENSOR,
                    operation,
                    details: "I2C communication error or sensor not responding",
                }
            })
    }

    async fn start_conversion(
        &mut self,
        command: u8,
        operation: &'static str,
    ) -> Result<(), SensorError> {
        self.i2c
            .write(BMP180_ADDRESS, &[REG_CONTROL, command])
            .await
            .map_err(|e| {
                error!("BMP180 conversion command {:#04x} failed: {:?}", command, e);
                SensorError::ReadFailed {
                    sensor: SENSOR,
                    operation,
                    details: "I2C communication error",
                }
            })
    }

    async fn raw_temperature(&mut self) -> Result<i32, SensorError> {
        self.start_conversion(CMD_TEMPERATURE, "start temperature conversion")
            .await?;
        self.delay.delay_us(TEMPERATURE_CONVERSION_US).await;

        let mut raw = [0u8; 2];
        self.read_registers(REG_OUT_MSB, &mut raw, "read raw temperature")
            .await?;
        Ok(i32::from(u16::from_be_bytes(raw)))
    }

    async fn raw_pressure(&mut self) -> Result<i32, SensorError> {
        let oss = self.oversampling;
        self.start_conversion(CMD_PRESSURE | (oss.shift() << 6), "start pressure conversion")
            .await?;
        self.delay.delay_us(oss.conversion_us()).await;

        let mut raw = [0u8; 3];
        self.read_registers(REG_OUT_MSB, &mut raw, "read raw pressure")
            .await?;
        let up = (u32::from(raw[0]) << 16 | u32::from(raw[1]) << 8 | u32::from(raw[2]))
            >> (8 - oss.shift());
        Ok(up as i32)
    }
}

impl<I: I2c, D: DelayNs> Sensor for Bmp180<I, D> {
    type Readings = PressureReadings;

    async fn init(&mut self) -> Result<(), SensorError> {
        let mut id = [0u8; 1];
        self.read_registers(REG_CHIP_ID, &mut id, "read chip id")
            .await
            .map_err(|_| SensorError::InitializationFailed {
                sensor: SENSOR,
                details: "device did not answer on the bus",
            })?;
        if id[0] != CHIP_ID {
            return Err(SensorError::UnexpectedDevice {
                sensor: SENSOR,
                found: [id[0], 0, 0],
            });
        }

        let mut raw = [0u8; 22];
        self.read_registers(REG_CALIBRATION, &mut raw, "read calibration")
            .await
            .map_err(|_| SensorError::InitializationFailed {
                sensor: SENSOR,
                details: "failed to read calibration EEPROM",
            })?;
        let calibration = Calibration::from_bytes(&raw)?;
        debug!("BMP180 calibration: {:?}", calibration);
        self.calibration = Some(calibration);

        info!("BMP180 ready (oversampling {:?})", self.oversampling);
        Ok(())
    }

    async fn read(&mut self) -> Result<PressureReadings, SensorError> {
        let calibration = self.calibration.ok_or(SensorError::ReadFailed {
            sensor: SENSOR,
            operation: "measure",
            details: "calibration not loaded",
        })?;

        let ut = self.raw_temperature().await?;
        let up = self.raw_pressure().await?;

        let (deci_celsius, b5) = calibration.temperature(ut);
        let pressure_pa = calibration.pressure(up, b5, self.oversampling);

        Ok(PressureReadings {
            temperature_celsius: deci_celsius as f32 / 10.0,
            pressure_pa,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeI2c, NoDelay, block_on};

    /// Coefficients from the worked example in the BMP180 datasheet
    const DATASHEET: Calibration = Calibration {
        ac1: 408,
        ac2: -72,
        ac3: -14383,
        ac4: 32741,
        ac5: 32757,
        ac6: 23153,
        b1: 6190,
        b2: 4,
        mb: -32768,
        mc: -8711,
        md: 2868,
    };

    fn calibration_bytes(c: &Calibration) -> [u8; 22] {
        let words = [
            c.ac1 as u16,
            c.ac2 as u16,
            c.ac3 as u16,
            c.ac4,
            c.ac5,
            c.ac6,
            c.b1 as u16,
            c.b2 as u16,
            c.mb as u16,
            c.mc as u16,
            c.md as u16,
        ];
        let mut raw = [0u8; 22];
        for (i, w) in words.iter().enumerate() {
            raw[2 * i..2 * i + 2].copy_from_slice(&w.to_be_bytes());
        }
        raw
    }

    /// Register map that answers conversions with fixed raw values.
    fn device(ut: u16, up: u32, oss: Oversampling) -> FakeI2c {
        let mut fake = FakeI2c::new(BMP180_ADDRESS);
        fake.regs[REG_CHIP_ID as usize] = CHIP_ID;
        fake.load(REG_CALIBRATION, &calibration_bytes(&DATASHEET));
        fake.on_write(REG_CONTROL, CMD_TEMPERATURE, REG_OUT_MSB, &ut.to_be_bytes());
        let raw = (up << (8 - oss.shift())).to_be_bytes();
        fake.on_write(
            REG_CONTROL,
            CMD_PRESSURE | (oss.shift() << 6),
            REG_OUT_MSB,
            &raw[1..],
        );
        fake
    }

    #[test]
    fn test_datasheet_compensation() {
        let (t, b5) = DATASHEET.temperature(27898);
        assert_eq!(t, 150);
        assert_eq!(b5, 2400);
        assert_eq!(DATASHEET.pressure(23843, b5, Oversampling::UltraLowPower), 69964);
    }

    #[test]
    fn test_calibration_decode() {
        let decoded = Calibration::from_bytes(&calibration_bytes(&DATASHEET)).unwrap();
        assert_eq!(decoded, DATASHEET);
    }

    #[test]
    fn test_blank_calibration_rejected() {
        assert!(matches!(
            Calibration::from_bytes(&[0xFF; 22]),
            Err(SensorError::InitializationFailed { .. })
        ));
    }

    #[test]
    fn test_init_and_read() {
        let mut sensor = Bmp180::new(
            device(27898, 23843, Oversampling::UltraLowPower),
            NoDelay,
            Oversampling::UltraLowPower,
        );
        block_on(sensor.init()).unwrap();
        assert_eq!(sensor.calibration(), Some(&DATASHEET));

        let readings = block_on(sensor.read()).unwrap();
        assert_eq!(readings.pressure_pa, 69964);
        assert!((readings.temperature_celsius - 15.0).abs() < 1e-4);
    }

    #[test]
    fn test_ultra_high_resolution_shifts_raw_pressure() {
        let mut sensor = Bmp180::new(
            device(27898, 23843 << 3, Oversampling::UltraHighResolution),
            NoDelay,
            Oversampling::UltraHighResolution,
        );
        block_on(sensor.init()).unwrap();
        let readings = block_on(sensor.read()).unwrap();
        let (_, b5) = DATASHEET.temperature(27898);
        assert_eq!(
            readings.pressure_pa,
            DATASHEET.pressure(23843 << 3, b5, Oversampling::UltraHighResolution)
        );
    }

    #[test]
    fn test_wrong_chip_id() {
        let mut fake = device(0, 0, Oversampling::Standard);
        fake.regs[REG_CHIP_ID as usize] = 0x58;
        let mut sensor = Bmp180::new(fake, NoDelay, Oversampling::Standard);
        assert_eq!(
            block_on(sensor.init()),
            Err(SensorError::UnexpectedDevice {
                sensor: "BMP180",
                found: [0x58, 0, 0]
            })
        );
    }

    #[test]
    fn test_bus_failure_during_init() {
        let mut fake = device(0, 0, Oversampling::Standard);
        fake.fail = true;
        let mut sensor = Bmp180::new(fake, NoDelay, Oversampling::Standard);
        assert!(matches!(
            block_on(sensor.init()),
            Err(SensorError::InitializationFailed { .. })
        ));
    }

    #[test]
    fn test_read_before_init() {
        let mut sensor = Bmp180::new(
            device(0, 0, Oversampling::Standard),
            NoDelay,
            Oversampling::Standard,
        );
        assert!(matches!(
            block_on(sensor.read()),
            Err(SensorError::ReadFailed { .. })
        ));
    }
}
