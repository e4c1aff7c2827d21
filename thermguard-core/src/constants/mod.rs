//! Constants for ThermGuard Core
//!
//! Centralized defaults for the pipeline. Every value here is the default of
//! a configuration field; deployments override them through the runtime
//! configuration rather than editing this module.
//!
//! ## Organization
//!
//! - **Sensors**: thermistor divider, ADC and power sequencing
//! - **Time**: sampling cadence, watchdog and stop timeouts
//! - **Buffers**: relay arena sizes
//!
//! Names include their units.

/// Thermistor, ADC and power line defaults.
pub mod sensors;

/// Sampling cadence, deadlines and stop timeouts.
pub mod time;

/// Relay arena sizes.
pub mod buffers;

pub use sensors::{
    SERIES_RESISTANCE_OHM, NOMINAL_RESISTANCE_OHM, NOMINAL_TEMPERATURE_K,
    BETA_COEFFICIENT_K, ADC_REFERENCE_VOLTS, ADC_FULL_SCALE_CODE, POWER_SETTLE_MS,
};

pub use time::{
    SENSOR_FREQUENCY_HZ, CHECKER_PERIOD_TICKS, WATCHDOG_PERIOD_FACTOR,
    SEND_TIMEOUT_MS, STARTUP_SETTLE_MS,
};

pub use buffers::DEFAULT_RELAY_CAPACITY;
