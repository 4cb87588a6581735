//! Shared async I2C bus
//!
//! The BMP180 and the HMC5883L sit on the same two wires but are polled by
//! separate tasks. Each task gets its own [`I2cBusDevice`]; the device locks
//! the bus for the length of one transaction and yields to the executor while
//! the transfer is in flight.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex;
use embedded_hal_async::i2c::{ErrorType, I2c, Operation};

/// A bus shared between tasks.
pub type SharedI2cBus<T> = Mutex<CriticalSectionRawMutex, T>;

/// Handle on a [`SharedI2cBus`] for one driver.
pub struct I2cBusDevice<'a, T> {
    bus: &'a SharedI2cBus<T>,
}

impl<'a, T> I2cBusDevice<'a, T> {
    #[inline]
    pub const fn new(bus: &'a SharedI2cBus<T>) -> Self {
        Self { bus }
    }
}

impl<T: ErrorType> ErrorType for I2cBusDevice<'_, T> {
    type Error = T::Error;
}

impl<T: I2c> I2c for I2cBusDevice<'_, T> {
    /// The provided `read`, `write` and `write_read` all funnel into this, so
    /// each of them holds the lock for exactly one bus transaction.
    #[inline]
    async fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        let mut bus = self.bus.lock().await;
        bus.transaction(address, operations).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeI2c, block_on};

    #[test]
    fn test_devices_share_one_bus() {
        let mut fake = FakeI2c::new(0x40);
        fake.load(0x10, &[0xAB, 0xCD]);
        let bus: SharedI2cBus<FakeI2c> = Mutex::new(fake);

        let mut first = I2cBusDevice::new(&bus);
        let mut second = I2cBusDevice::new(&bus);

        block_on(first.write(0x40, &[0x20, 0x55])).unwrap();
        let mut out = [0u8; 2];
        block_on(second.write_read(0x40, &[0x10], &mut out)).unwrap();
        assert_eq!(out, [0xAB, 0xCD]);

        let mut out = [0u8; 1];
        block_on(second.write_read(0x40, &[0x20], &mut out)).unwrap();
        assert_eq!(out, [0x55]);
    }

    #[test]
    fn test_errors_pass_through() {
        let bus: SharedI2cBus<FakeI2c> = Mutex::new(FakeI2c::new(0x40));
        let mut device = I2cBusDevice::new(&bus);
        assert!(block_on(device.write(0x41, &[0])).is_err());
    }
}
