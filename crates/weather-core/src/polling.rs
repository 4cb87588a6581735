//! Periodic sensor polling
//!
//! Each sensor gets its own [`Poller`]. A poller initializes its device once,
//! then reads it on a fixed period, stores the derived group in the shared
//! [`WeatherState`] and asks the push dispatcher to send the new values.
//!
//! ```text
//! Initializing --init ok--> Polling
//!      |
//!      +-------init err---> Faulted
//! ```

use embassy_time::{Duration, Ticker};
use log::{debug, error, info, warn};
use thiserror_no_std::Error;

use crate::app_state::AppState;
use crate::push::Publish;
use crate::sensors::{MagneticReadings, PressureReadings, Sensor, SensorError};
use crate::weather::WeatherState;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollError {
    #[error("sensor initialization failed: {0}")]
    InitFailed(SensorError),
    #[error("sensor read failed: {0}")]
    Read(SensorError),
    #[error("poller is faulted")]
    Faulted,
    #[error("poller is not initialized")]
    NotInitialized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    Initializing,
    Polling,
    Faulted,
}

/// Readings that know which group of the weather record they update.
pub trait StoreReading {
    fn store(&self, state: &WeatherState);
}

impl StoreReading for PressureReadings {
    fn store(&self, state: &WeatherState) {
        state.write_pressure_group(self.temperature_celsius, self.pressure_pa);
        info!(
            "temperature {:.2} C, pressure {} Pa",
            self.temperature_celsius, self.pressure_pa
        );
    }
}

impl StoreReading for MagneticReadings {
    fn store(&self, state: &WeatherState) {
        state.write_magnetic_group(self.x, self.y, self.z);
        info!(
            "magnetic field x {:.2} y {:.2} z {:.2} mG",
            self.x, self.y, self.z
        );
    }
}

pub struct Poller<'a, S> {
    name: &'static str,
    sensor: S,
    app: &'a AppState,
    state: PollerState,
}

impl<'a, S> Poller<'a, S>
where
    S: Sensor,
    S::Readings: StoreReading,
{
    pub fn new(name: &'static str, sensor: S, app: &'a AppState) -> Self {
        Self {
            name,
            sensor,
            app,
            state: PollerState::Initializing,
        }
    }

    pub fn state(&self) -> PollerState {
        self.state
    }

    /// Bring up the device. Only valid once, from `Initializing`.
    pub async fn init(&mut self) -> Result<(), PollError> {
        match self.state {
            PollerState::Initializing => {}
            PollerState::Polling => return Ok(()),
            PollerState::Faulted => return Err(PollError::Faulted),
        }

        match self.sensor.init().await {
            Ok(()) => {
                info!("{}: sensor initialized", self.name);
                self.state = PollerState::Polling;
                Ok(())
            }
            Err(e) => {
                error!("{}: sensor initialization failed: {}", self.name, e);
                self.state = PollerState::Faulted;
                Err(PollError::InitFailed(e))
            }
        }
    }

    /// Take one reading, store it and publish it.
    ///
    /// A failed read leaves the previously stored values in place.
    pub async fn tick(&mut self) -> Result<S::Readings, PollError> {
        match self.state {
            PollerState::Polling => {}
            PollerState::Initializing => return Err(PollError::NotInitialized),
            PollerState::Faulted => return Err(PollError::Faulted),
        }

        let readings = self.sensor.read().await.map_err(|e| {
            error!("{}: read failed: {}", self.name, e);
            PollError::Read(e)
        })?;
        readings.store(&self.app.weather);

        match self.app.push().publish() {
            Ok(Publish::NoClient) => {}
            Ok(Publish::Queued(client)) => debug!("{}: push queued for {:?}", self.name, client),
            Err(e) => warn!("{}: push not queued: {}", self.name, e),
        }
        Ok(readings)
    }

    /// Initialize, then poll every `period` forever.
    ///
    /// Only returns if initialization fails.
    pub async fn run(&mut self, period: Duration) -> PollError {
        if let Err(e) = self.init().await {
            return e;
        }

        let mut ticker = Ticker::every(period);
        loop {
            // Errors are logged in tick and the next period retries
            let _ = self.tick().await;
            ticker.next().await;
        }
    }
}
