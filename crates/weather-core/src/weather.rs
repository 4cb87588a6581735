//! Shared weather state
//!
//! One [`WeatherState`] lives for the whole process. The two polling tasks
//! write into it, the HTTP and websocket handlers read copies out of it.
//!
//! The record is split into two groups that are written independently:
//!
//! - pressure group: `temperature`, `pressure`, `altitude`
//! - magnetic group: `heading`, `x`, `y`, `z`
//!
//! Each group is stored as a unit, so a reader never sees half of a group.
//! There is no transaction across groups: a reader may see a fresh pressure
//! group next to a magnetic group from the previous polling cycle.

use core::cell::Cell;
use core::f32::consts::PI;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

use crate::config::REFERENCE_PRESSURE_PA;

/// Point-in-time copy of the shared weather record.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WeatherSnapshot {
    /// Degrees Celsius
    pub temperature: f32,
    /// Pascals
    pub pressure: u32,
    /// Meters above the reference pressure level
    pub altitude: f32,
    /// Compass heading in whole degrees, `0..360`
    pub heading: i32,
    /// Raw magnetic field components in milligauss (uncalibrated)
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl WeatherSnapshot {
    /// All-zero record used before the first successful reading.
    pub const ZERO: Self = Self {
        temperature: 0.0,
        pressure: 0,
        altitude: 0.0,
        heading: 0,
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };
}

/// Barometric altitude for a pressure reading, relative to [`REFERENCE_PRESSURE_PA`].
pub fn altitude_from_pressure(pressure_pa: u32) -> f32 {
    let ratio = pressure_pa as f32 / REFERENCE_PRESSURE_PA as f32;
    44330.0 * (1.0 - libm::powf(ratio, 0.190_295))
}

/// Compass heading in whole degrees for a horizontal field vector.
///
/// The result is truncated toward zero and always falls in `0..360`.
pub fn heading_from_field(x: f32, y: f32) -> i32 {
    let degrees = libm::atan2f(y, x) * (180.0 / PI) + 180.0;
    let heading = degrees as i32;
    if heading >= 360 { heading - 360 } else { heading.max(0) }
}

/// Process-wide weather record guarded by a critical-section mutex.
pub struct WeatherState {
    inner: Mutex<CriticalSectionRawMutex, Cell<WeatherSnapshot>>,
}

impl WeatherState {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(Cell::new(WeatherSnapshot::ZERO)),
        }
    }

    /// Copy out the current record.
    pub fn read(&self) -> WeatherSnapshot {
        self.inner.lock(|cell| cell.get())
    }

    /// Store a new pressure group. Altitude is derived from `pressure`.
    pub fn write_pressure_group(&self, temperature: f32, pressure: u32) {
        let altitude = altitude_from_pressure(pressure);
        self.inner.lock(|cell| {
            let mut snapshot = cell.get();
            snapshot.temperature = temperature;
            snapshot.pressure = pressure;
            snapshot.altitude = altitude;
            cell.set(snapshot);
        });
    }

    /// Store a new magnetic group. Heading is derived from `x` and `y`.
    pub fn write_magnetic_group(&self, x: f32, y: f32, z: f32) {
        let heading = heading_from_field(x, y);
        self.inner.lock(|cell| {
            let mut snapshot = cell.get();
            snapshot.heading = heading;
            snapshot.x = x;
            snapshot.y = y;
            snapshot.z = z;
            cell.set(snapshot);
        });
    }
}

impl Default for WeatherState {
    fn default() -> Self {
        Self::new()
    }
}
