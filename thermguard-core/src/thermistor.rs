//! NTC Thermistor Conversion and Power Sequencing
//!
//! ## Signal Chain
//!
//! ```text
//!  V_ref ──┬── R_series ──┬── R_ntc ── GND
//!          │              │
//!          │              └──► ADC (12-bit) ──► code
//! ```
//!
//! A reading goes through two pure steps:
//!
//! 1. **Code to voltage**: a linear transfer function of the converter,
//!    `V = code · V_ref / full_scale`.
//! 2. **Voltage to temperature**: the divider gives
//!    `R_ntc = R_series · (V_ref − V) / V`, and the Beta-parameter equation
//!    gives `T = 1 / (1/T0 + (1/B) · ln(R_ntc / R0)) − 273.15`.
//!
//! Both steps are exposed as free functions so the monitor can convert voted
//! raw codes back to degrees with the same calibration.
//!
//! ## Power Sequencing
//!
//! Sensors are powered only while they are read. [`Thermistor::power_on`]
//! asserts the power line and then waits [`POWER_SETTLE_MS`] before returning,
//! and every read on an unpowered thermistor fails. [`PowerGuard`] ties the
//! powered window to a scope:
//!
//! ```rust
//! use thermguard_core::thermistor::PowerGuard;
//! use thermguard_core::traits::TemperatureSensor;
//! # use thermguard_core::errors::SensorResult;
//!
//! fn read_once<S: TemperatureSensor>(sensor: &mut S) -> SensorResult<f32> {
//!     let mut powered = PowerGuard::engage(sensor)?;
//!     powered.read_temperature()
//!     // power line released here, on success and on error
//! }
//! ```
//!
//! [`POWER_SETTLE_MS`]: crate::constants::sensors::POWER_SETTLE_MS

use core::ops::{Deref, DerefMut};

use crate::constants::sensors::{
    ADC_FULL_SCALE_CODE, ADC_REFERENCE_VOLTS, BETA_COEFFICIENT_K, KELVIN_OFFSET,
    NOMINAL_RESISTANCE_OHM, NOMINAL_TEMPERATURE_K, POWER_SETTLE_MS, PRIMARY_ADC_CHANNEL,
    PRIMARY_POWER_LINE, SERIES_RESISTANCE_OHM,
};
use crate::errors::{SensorError, SensorResult};
use crate::traits::{AdcChannel, DelayMs, PowerLine, TemperatureSensor};

/// Calibration and identity of one thermistor channel
///
/// Set once when the owning task configures the sensor and never shared.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ThermistorConfig {
    /// ADC channel the divider is wired to
    pub channel: u8,
    /// Power control line of the sensor
    pub power_control: u8,
    /// Series resistor (Ω)
    pub series_resistance: f32,
    /// Thermistor resistance at the nominal temperature (Ω)
    pub nominal_resistance: f32,
    /// Nominal temperature (K)
    pub nominal_temperature: f32,
    /// Beta coefficient (K)
    pub beta_coefficient: f32,
    /// Divider supply and ADC reference (V)
    pub reference_volts: f32,
    /// Largest raw code of the converter
    pub full_scale: u16,
}

impl Default for ThermistorConfig {
    fn default() -> Self {
        Self {
            channel: PRIMARY_ADC_CHANNEL,
            power_control: PRIMARY_POWER_LINE,
            series_resistance: SERIES_RESISTANCE_OHM,
            nominal_resistance: NOMINAL_RESISTANCE_OHM,
            nominal_temperature: NOMINAL_TEMPERATURE_K,
            beta_coefficient: BETA_COEFFICIENT_K,
            reference_volts: ADC_REFERENCE_VOLTS,
            full_scale: ADC_FULL_SCALE_CODE,
        }
    }
}

impl ThermistorConfig {
    /// Default calibration on the given channel and power line
    pub fn on_channel(channel: u8, power_control: u8) -> Self {
        Self {
            channel,
            power_control,
            ..Self::default()
        }
    }

    /// Replace the calibration constants
    pub fn with_calibration(
        mut self,
        series_resistance: f32,
        nominal_resistance: f32,
        nominal_temperature: f32,
        beta_coefficient: f32,
    ) -> Self {
        self.series_resistance = series_resistance;
        self.nominal_resistance = nominal_resistance;
        self.nominal_temperature = nominal_temperature;
        self.beta_coefficient = beta_coefficient;
        self
    }

    /// Voltage for a raw code
    pub fn code_to_voltage(&self, code: u16) -> f32 {
        code_to_voltage(code, self.reference_volts, self.full_scale)
    }

    /// Temperature for a divider voltage
    pub fn voltage_to_celsius(&self, volts: f32) -> SensorResult<f32> {
        voltage_to_celsius(volts, self)
    }

    /// Temperature for a raw code
    pub fn code_to_celsius(&self, code: u16) -> SensorResult<f32> {
        self.voltage_to_celsius(self.code_to_voltage(code))
    }
}

/// Linear transfer function of the converter
pub fn code_to_voltage(code: u16, reference_volts: f32, full_scale: u16) -> f32 {
    code as f32 * reference_volts / full_scale.max(1) as f32
}

/// Beta-parameter curve fit of the divider voltage
///
/// Fails when the voltage sits on either rail, since the divider then has no
/// finite thermistor resistance.
pub fn voltage_to_celsius(volts: f32, config: &ThermistorConfig) -> SensorResult<f32> {
    if !(volts > 0.0 && volts < config.reference_volts) {
        return Err(SensorError::VoltageOutOfRange {
            volts,
            reference: config.reference_volts,
        });
    }

    let r_ntc = config.series_resistance * (config.reference_volts - volts) / volts;
    let inv_t = 1.0 / config.nominal_temperature
        + (1.0 / config.beta_coefficient) * libm::logf(r_ntc / config.nominal_resistance);
    let celsius = 1.0 / inv_t - KELVIN_OFFSET;

    if celsius.is_finite() {
        Ok(celsius)
    } else {
        Err(SensorError::NonFinite)
    }
}

/// Thermistor on an ADC channel with a switched supply
pub struct Thermistor<A, P, D> {
    config: ThermistorConfig,
    adc: A,
    power: P,
    delay: D,
    powered: bool,
}

impl<A, P, D> Thermistor<A, P, D>
where
    A: AdcChannel,
    P: PowerLine,
    D: DelayMs,
{
    /// Configure a thermistor; the sensor starts unpowered
    pub fn new(config: ThermistorConfig, adc: A, power: P, delay: D) -> Self {
        Self {
            config,
            adc,
            power,
            delay,
            powered: false,
        }
    }

    /// Divider voltage of one conversion
    pub fn read_voltage(&mut self) -> SensorResult<f32> {
        let code = self.read_raw()?;
        Ok(self.config.code_to_voltage(code))
    }

    fn ensure_powered(&self) -> SensorResult<()> {
        if self.powered {
            Ok(())
        } else {
            Err(SensorError::Power {
                power_control: self.config.power_control,
                reason: "read while unpowered",
            })
        }
    }
}

impl<A, P, D> TemperatureSensor for Thermistor<A, P, D>
where
    A: AdcChannel,
    P: PowerLine,
    D: DelayMs,
{
    fn config(&self) -> &ThermistorConfig {
        &self.config
    }

    fn power_on(&mut self) -> SensorResult<()> {
        if self.powered {
            return Ok(());
        }
        self.power.set_powered(true)?;
        self.delay.delay_ms(POWER_SETTLE_MS);
        self.powered = true;
        Ok(())
    }

    fn power_off(&mut self) -> SensorResult<()> {
        // Marked off first so a failing line never leaves reads enabled
        self.powered = false;
        self.power.set_powered(false)
    }

    fn is_powered(&self) -> bool {
        self.powered
    }

    fn read_raw(&mut self) -> SensorResult<u16> {
        self.ensure_powered()?;
        self.adc.read_raw()
    }

    fn read_temperature(&mut self) -> SensorResult<f32> {
        let volts = self.read_voltage()?;
        self.config.voltage_to_celsius(volts)
    }
}

/// Powers a sensor for the lifetime of the guard
///
/// The supply is released on drop, whichever path leaves the scope.
pub struct PowerGuard<S: TemperatureSensor> {
    sensor: S,
}

impl<S: TemperatureSensor> PowerGuard<S> {
    /// Power the sensor on and wait for it to settle
    pub fn engage(mut sensor: S) -> SensorResult<Self> {
        if let Err(e) = sensor.power_on() {
            let _ = sensor.power_off();
            return Err(e);
        }
        Ok(Self { sensor })
    }
}

impl<S: TemperatureSensor> Deref for PowerGuard<S> {
    type Target = S;

    fn deref(&self) -> &S {
        &self.sensor
    }
}

impl<S: TemperatureSensor> DerefMut for PowerGuard<S> {
    fn deref_mut(&mut self) -> &mut S {
        &mut self.sensor
    }
}

impl<S: TemperatureSensor> Drop for PowerGuard<S> {
    fn drop(&mut self) {
        if let Err(_e) = self.sensor.power_off() {
            log_warn!(
                "failed to power off sensor on channel {}: {}",
                self.sensor.config().channel,
                _e
            );
        }
    }
}
