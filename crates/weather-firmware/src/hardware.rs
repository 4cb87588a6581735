//! Peripheral bring-up for the weather station
//!
//! Both sensors share I2C0. The bus lives in a `StaticCell` so each polling
//! task can hold its own [`I2cBusDevice`] for the life of the program.

use embassy_time::Delay;
use esp_hal::Async;
use esp_hal::gpio::{Level, Output, OutputConfig};
use esp_hal::i2c::master::{Config as I2cConfig, ConfigError, I2c};
use esp_hal::peripherals::{GPIO2, GPIO21, GPIO22, I2C0};
use esp_hal::time::Rate;
use log::info;
use static_cell::StaticCell;
use weather_core::async_i2c_bus::{I2cBusDevice, SharedI2cBus};
use weather_core::config::{I2C_FREQUENCY_KHZ, I2C_SCL_PIN, I2C_SDA_PIN, LED_PIN};
use weather_core::sensors::{Bmp180, Hmc5883l, MagnetometerConfig, Oversampling};

pub type SensorBus = I2c<'static, Async>;
pub type SensorDevice = I2cBusDevice<'static, SensorBus>;
pub type PressureSensor = Bmp180<SensorDevice, Delay>;
pub type Magnetometer = Hmc5883l<SensorDevice, Delay>;

/// Sensor drivers ready to be handed to their polling tasks
pub struct Sensors {
    pub pressure: PressureSensor,
    pub magnetometer: Magnetometer,
}

/// Bring up I2C0 and build one driver per sensor on it.
///
/// The drivers are not initialized here; that happens in the polling tasks.
pub fn init_sensors(
    i2c0: I2C0<'static>,
    sda: GPIO21<'static>,
    scl: GPIO22<'static>,
) -> Result<Sensors, ConfigError> {
    static SENSOR_BUS: StaticCell<SharedI2cBus<SensorBus>> = StaticCell::new();

    let bus = I2c::new(
        i2c0,
        I2cConfig::default().with_frequency(Rate::from_khz(I2C_FREQUENCY_KHZ)),
    )?
    .with_sda(sda)
    .with_scl(scl)
    .into_async();
    info!(
        "I2C0 up on SDA=GPIO{} SCL=GPIO{} at {} kHz",
        I2C_SDA_PIN, I2C_SCL_PIN, I2C_FREQUENCY_KHZ
    );

    let bus = SENSOR_BUS.init(SharedI2cBus::new(bus));

    Ok(Sensors {
        pressure: Bmp180::new(I2cBusDevice::new(bus), Delay, Oversampling::UltraHighResolution),
        magnetometer: Hmc5883l::new(
            I2cBusDevice::new(bus),
            Delay,
            MagnetometerConfig::STATION,
        ),
    })
}

/// Status LED, off at boot.
pub fn init_led(pin: GPIO2<'static>) -> Output<'static> {
    info!("status LED on GPIO{}", LED_PIN);
    Output::new(pin, Level::Low, OutputConfig::default())
}
