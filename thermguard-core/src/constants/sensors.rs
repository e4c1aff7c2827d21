//! Thermistor and ADC Specifications
//!
//! Defaults for the NTC divider used on every sensor channel. Each sensor is a
//! 10 kΩ NTC thermistor on the low side of a divider with a 10 kΩ series
//! resistor, read by a 12-bit ADC referenced to the 3.3 V rail.

// ===== DIVIDER =====

/// Series resistor in the divider (Ω).
pub const SERIES_RESISTANCE_OHM: f32 = 10_000.0;

/// Thermistor resistance at the nominal temperature (Ω).
///
/// Source: 10K3950 NTC datasheets
pub const NOMINAL_RESISTANCE_OHM: f32 = 10_000.0;

/// Nominal temperature of the thermistor (K), i.e. 25 °C.
pub const NOMINAL_TEMPERATURE_K: f32 = 298.15;

/// Beta coefficient of the thermistor (K).
///
/// Adjust per part number. 3950 is the common value for 10K NTC beads.
pub const BETA_COEFFICIENT_K: f32 = 3950.0;

/// Offset between kelvin and degrees Celsius.
pub const KELVIN_OFFSET: f32 = 273.15;

// ===== ADC =====

/// Reference voltage of the ADC and the divider supply (V).
pub const ADC_REFERENCE_VOLTS: f32 = 3.3;

/// Largest raw code of the 12-bit converter.
pub const ADC_FULL_SCALE_CODE: u16 = 4095;

// ===== POWER SEQUENCING =====

/// Settling time after asserting a sensor power line (ms).
///
/// No conversion may start before this has elapsed. The divider and the
/// thermistor self-heating both need a few milliseconds to stabilise.
pub const POWER_SETTLE_MS: u32 = 10;

// ===== CHANNEL ASSIGNMENT =====

/// ADC channel of the primary thermistor (GPIO34 on the reference board).
pub const PRIMARY_ADC_CHANNEL: u8 = 6;

/// ADC channel of the secondary thermistor.
pub const SECONDARY_ADC_CHANNEL: u8 = 7;

/// ADC channel of the tertiary thermistor (triple topology only).
pub const TERTIARY_ADC_CHANNEL: u8 = 4;

/// Power control line of the primary thermistor (GPIO25).
pub const PRIMARY_POWER_LINE: u8 = 25;

/// Power control line of the secondary thermistor (GPIO26).
pub const SECONDARY_POWER_LINE: u8 = 26;

/// Power control line of the tertiary thermistor (GPIO27).
pub const TERTIARY_POWER_LINE: u8 = 27;
