//! Capability traits for the hardware the pipeline talks to
//!
//! The pipeline never touches registers. Each board supplies these traits
//! (the simulated implementations in the runtime crate are one such board).
//! Keep them small: one method per hardware action.

use crate::errors::{SensorResult, StoreError};
use crate::thermistor::ThermistorConfig;

/// One channel of an analog-to-digital converter
pub trait AdcChannel {
    /// Channel identity, used in error reports
    fn channel(&self) -> u8;

    /// Perform one conversion and return the raw code
    fn read_raw(&mut self) -> SensorResult<u16>;
}

/// Output line switching a sensor's supply
pub trait PowerLine {
    /// Line identity, used in error reports
    fn id(&self) -> u8;

    /// Drive the line high (`true`) or low (`false`)
    fn set_powered(&mut self, on: bool) -> SensorResult<()>;
}

/// Blocking millisecond delay
pub trait DelayMs {
    /// Block the caller for at least `ms` milliseconds
    fn delay_ms(&mut self, ms: u32);
}

/// Temperature sensor capability consumed by the sampler
///
/// Implementations must not return a reading before the sensor has settled
/// after `power_on`.
pub trait TemperatureSensor {
    /// Calibration and identity of this sensor
    fn config(&self) -> &ThermistorConfig;

    /// Switch the sensor on and wait until it is stable
    fn power_on(&mut self) -> SensorResult<()>;

    /// Switch the sensor off
    fn power_off(&mut self) -> SensorResult<()>;

    /// Whether the sensor is currently powered
    fn is_powered(&self) -> bool;

    /// Raw converter code of one conversion
    fn read_raw(&mut self) -> SensorResult<u16>;

    /// Temperature in degrees Celsius
    fn read_temperature(&mut self) -> SensorResult<f32>;
}

impl<T: TemperatureSensor + ?Sized> TemperatureSensor for &mut T {
    fn config(&self) -> &ThermistorConfig {
        (**self).config()
    }

    fn power_on(&mut self) -> SensorResult<()> {
        (**self).power_on()
    }

    fn power_off(&mut self) -> SensorResult<()> {
        (**self).power_off()
    }

    fn is_powered(&self) -> bool {
        (**self).is_powered()
    }

    fn read_raw(&mut self) -> SensorResult<u16> {
        (**self).read_raw()
    }

    fn read_temperature(&mut self) -> SensorResult<f32> {
        (**self).read_temperature()
    }
}

impl<T: TemperatureSensor + ?Sized> TemperatureSensor for alloc::boxed::Box<T> {
    fn config(&self) -> &ThermistorConfig {
        (**self).config()
    }

    fn power_on(&mut self) -> SensorResult<()> {
        (**self).power_on()
    }

    fn power_off(&mut self) -> SensorResult<()> {
        (**self).power_off()
    }

    fn is_powered(&self) -> bool {
        (**self).is_powered()
    }

    fn read_raw(&mut self) -> SensorResult<u16> {
        (**self).read_raw()
    }

    fn read_temperature(&mut self) -> SensorResult<f32> {
        (**self).read_temperature()
    }
}

/// Non-volatile storage that must be brought up once during INIT
pub trait PersistentStore {
    /// Initialize the store
    fn init(&mut self) -> Result<(), StoreError>;

    /// Erase all stored data
    fn erase(&mut self) -> Result<(), StoreError>;
}
