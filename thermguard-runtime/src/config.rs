//! Pipeline configuration
//!
//! All fields default to the values in `thermguard_core::constants`, so an empty JSON
//! object is a valid configuration:
//!
//! ```rust
//! use thermguard_runtime::config::{PipelineConfig, Topology};
//!
//! let json = r#"{ "topology": { "kind": "triple_majority", "mask": 4080 } }"#;
//! let cfg = PipelineConfig::from_json(json)?;
//! assert_eq!(cfg.sampling_frequency_hz, 1);
//! assert_eq!(cfg.topology, Topology::TripleMajority { mask: 0x0FF0 });
//! # Ok::<(), thermguard_runtime::ConfigError>(())
//! ```
//!
//! The topology is fixed for the lifetime of a supervisor; there is no
//! runtime reconfiguration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thermguard_core::constants::buffers::MIN_RELAY_CAPACITY;
use thermguard_core::constants::sensors::{
    PRIMARY_ADC_CHANNEL, PRIMARY_POWER_LINE, SECONDARY_ADC_CHANNEL, SECONDARY_POWER_LINE,
    TERTIARY_ADC_CHANNEL, TERTIARY_POWER_LINE,
};
use thermguard_core::constants::time::{
    CHECKER_PERIOD_TICKS, CHECKER_STOP_TIMEOUT_MS, MIN_SAMPLING_PERIOD_MS,
    MONITOR_IDLE_YIELD_MS, MONITOR_STOP_TIMEOUT_MS, SAMPLER_STOP_TIMEOUT_MS, SEND_TIMEOUT_MS,
    SENSOR_FREQUENCY_HZ, STARTUP_SETTLE_MS, WATCHDOG_PERIOD_FACTOR,
};
use thermguard_core::constants::DEFAULT_RELAY_CAPACITY;
use thermguard_core::{Record, SensorSample, ThermistorConfig, TripleSample};

use crate::error::ConfigError;

/// Which redundancy arrangement the pipeline runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Topology {
    /// Primary every tick, primary + secondary every Nth tick to the checker
    Dual,
    /// Three sensors per tick, mean of the temperatures
    TripleAveraging,
    /// Three sensors per tick, per-bit majority of the masked raw codes
    TripleMajority {
        /// Bits that take part in the vote
        mask: u16,
    },
}

impl Default for Topology {
    fn default() -> Self {
        Topology::Dual
    }
}

impl Topology {
    /// Number of sensors the sampler owns
    pub fn sensor_count(&self) -> usize {
        match self {
            Topology::Dual => 2,
            Topology::TripleAveraging | Topology::TripleMajority { .. } => 3,
        }
    }

    /// Largest frame any relay of this topology carries
    pub fn largest_frame(&self) -> usize {
        match self {
            Topology::Dual => SensorSample::FRAME_LEN,
            Topology::TripleAveraging | Topology::TripleMajority { .. } => TripleSample::FRAME_LEN,
        }
    }
}

/// Process configuration of the pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Sampling frequency (Hz)
    pub sampling_frequency_hz: u32,
    /// Ticks between paired reads for the checker
    pub checker_period_ticks: u32,
    /// Capacity of each relay arena (bytes)
    pub relay_capacity_bytes: usize,
    /// Producer send timeout before dropping (ms)
    pub send_timeout_ms: u64,
    /// Watchdog deadline as a multiple of the sampling period
    pub watchdog_factor: f32,
    /// Delay between spawning the tasks and entering RUNNING (ms)
    pub settle_delay_ms: u64,
    /// Sampler stop timeout (ms)
    pub sampler_stop_timeout_ms: u64,
    /// Checker/voter stop timeout (ms)
    pub checker_stop_timeout_ms: u64,
    /// Monitor stop timeout (ms)
    pub monitor_stop_timeout_ms: u64,
    /// Monitor yield while the state is not reporting (ms)
    pub monitor_idle_yield_ms: u64,
    /// Redundancy arrangement
    pub topology: Topology,
    /// Primary sensor calibration
    pub primary: ThermistorConfig,
    /// Secondary sensor calibration
    pub secondary: ThermistorConfig,
    /// Third sensor calibration, triple topologies only
    pub tertiary: ThermistorConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sampling_frequency_hz: SENSOR_FREQUENCY_HZ,
            checker_period_ticks: CHECKER_PERIOD_TICKS,
            relay_capacity_bytes: DEFAULT_RELAY_CAPACITY,
            send_timeout_ms: SEND_TIMEOUT_MS,
            watchdog_factor: WATCHDOG_PERIOD_FACTOR,
            settle_delay_ms: STARTUP_SETTLE_MS,
            sampler_stop_timeout_ms: SAMPLER_STOP_TIMEOUT_MS,
            checker_stop_timeout_ms: CHECKER_STOP_TIMEOUT_MS,
            monitor_stop_timeout_ms: MONITOR_STOP_TIMEOUT_MS,
            monitor_idle_yield_ms: MONITOR_IDLE_YIELD_MS,
            topology: Topology::default(),
            primary: ThermistorConfig::on_channel(PRIMARY_ADC_CHANNEL, PRIMARY_POWER_LINE),
            secondary: ThermistorConfig::on_channel(SECONDARY_ADC_CHANNEL, SECONDARY_POWER_LINE),
            tertiary: ThermistorConfig::on_channel(TERTIARY_ADC_CHANNEL, TERTIARY_POWER_LINE),
        }
    }
}

impl PipelineConfig {
    /// Parse and validate a JSON configuration
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let cfg: PipelineConfig = serde_json::from_str(json)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sampling_frequency_hz == 0 {
            return Err(ConfigError::invalid("sampling_frequency_hz", "must be > 0"));
        }
        if self.checker_period_ticks == 0 {
            return Err(ConfigError::invalid("checker_period_ticks", "must be > 0"));
        }
        if !self.watchdog_factor.is_finite() || self.watchdog_factor <= 1.0 {
            return Err(ConfigError::invalid(
                "watchdog_factor",
                format!("{} must be finite and > 1.0", self.watchdog_factor),
            ));
        }
        let minimum = Duration::from_millis(MIN_SAMPLING_PERIOD_MS);
        if self.period() < minimum {
            return Err(ConfigError::PeriodTooShort { period: self.period(), minimum });
        }
        if self.watchdog_deadline() <= self.period() {
            return Err(ConfigError::invalid(
                "watchdog_factor",
                format!(
                    "deadline {:?} does not exceed period {:?}",
                    self.watchdog_deadline(),
                    self.period()
                ),
            ));
        }
        let needed = MIN_RELAY_CAPACITY.max(self.topology.largest_frame());
        if self.relay_capacity_bytes < needed {
            return Err(ConfigError::invalid(
                "relay_capacity_bytes",
                format!("{} < {} bytes", self.relay_capacity_bytes, needed),
            ));
        }
        for (field, cal) in [
            ("primary", &self.primary),
            ("secondary", &self.secondary),
            ("tertiary", &self.tertiary),
        ] {
            if cal.reference_volts <= 0.0 || cal.full_scale == 0 || cal.beta_coefficient <= 0.0 {
                return Err(ConfigError::invalid(field, "calibration constants must be positive"));
            }
        }
        Ok(())
    }

    /// Sampling period, truncated to whole nanoseconds
    pub fn period(&self) -> Duration {
        Duration::from_secs(1) / self.sampling_frequency_hz.max(1)
    }

    /// Deadline the sampler allows for each tick
    ///
    /// Scaled from the period in nanoseconds, then rounded to whole
    /// microseconds so `1 s × 1.2` is exactly 1200 ms.
    pub fn watchdog_deadline(&self) -> Duration {
        let nanos = self.period().as_nanos() as f64 * f64::from(self.watchdog_factor);
        Duration::from_micros((nanos / 1000.0).round() as u64)
    }

    /// Producer send timeout
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    /// Delay before leaving INIT
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// Sampler stop timeout
    pub fn sampler_stop_timeout(&self) -> Duration {
        Duration::from_millis(self.sampler_stop_timeout_ms)
    }

    /// Checker/voter stop timeout
    pub fn checker_stop_timeout(&self) -> Duration {
        Duration::from_millis(self.checker_stop_timeout_ms)
    }

    /// Monitor stop timeout
    pub fn monitor_stop_timeout(&self) -> Duration {
        Duration::from_millis(self.monitor_stop_timeout_ms)
    }

    /// Monitor idle yield
    pub fn monitor_idle_yield(&self) -> Duration {
        Duration::from_millis(self.monitor_idle_yield_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_board() {
        let cfg = PipelineConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.period(), Duration::from_secs(1));
        assert_eq!(cfg.watchdog_deadline(), Duration::from_millis(1200));
        assert_eq!(cfg.send_timeout(), Duration::from_millis(100));
        assert_eq!(cfg.relay_capacity_bytes, 2048);
        assert_eq!(cfg.checker_period_ticks, 10);
        assert_eq!(cfg.primary.channel, 6);
        assert_eq!(cfg.secondary.power_control, 26);
    }

    #[test]
    fn empty_json_is_default() {
        assert_eq!(PipelineConfig::from_json("{}").unwrap(), PipelineConfig::default());
    }

    #[test]
    fn partial_calibration_keeps_other_defaults() {
        let cfg = PipelineConfig::from_json(
            r#"{ "sampling_frequency_hz": 4, "primary": { "beta_coefficient": 3435.0 } }"#,
        )
        .unwrap();
        assert_eq!(cfg.period(), Duration::from_millis(250));
        assert_eq!(cfg.primary.beta_coefficient, 3435.0);
        assert_eq!(cfg.primary.series_resistance, 10_000.0);
    }

    #[test]
    fn rejects_unusable_values() {
        let bad = |f: fn(&mut PipelineConfig)| {
            let mut cfg = PipelineConfig::default();
            f(&mut cfg);
            cfg.validate().unwrap_err()
        };

        assert!(matches!(
            bad(|c| c.sampling_frequency_hz = 0),
            ConfigError::Invalid { field: "sampling_frequency_hz", .. }
        ));
        assert!(matches!(
            bad(|c| c.checker_period_ticks = 0),
            ConfigError::Invalid { field: "checker_period_ticks", .. }
        ));
        assert!(matches!(
            bad(|c| c.watchdog_factor = 1.0),
            ConfigError::Invalid { field: "watchdog_factor", .. }
        ));
        assert!(matches!(
            bad(|c| c.relay_capacity_bytes = 0),
            ConfigError::Invalid { field: "relay_capacity_bytes", .. }
        ));
    }

    #[test]
    fn sampling_period_has_a_floor() {
        let at = |hz: u32| PipelineConfig {
            sampling_frequency_hz: hz,
            ..PipelineConfig::default()
        };

        let fastest = at(1_000);
        fastest.validate().unwrap();
        assert_eq!(fastest.period(), Duration::from_millis(1));
        assert_eq!(fastest.watchdog_deadline(), Duration::from_micros(1200));

        for hz in [1_001, 2_000_000, 3_000_000_000, u32::MAX] {
            let cfg = at(hz);
            assert!(
                matches!(cfg.validate(), Err(ConfigError::PeriodTooShort { .. })),
                "{} Hz accepted",
                hz
            );
        }
    }

    #[test]
    fn deadline_scales_with_period() {
        for hz in [1, 3, 7, 50, 999, 1_000] {
            let cfg = PipelineConfig { sampling_frequency_hz: hz, ..PipelineConfig::default() };
            cfg.validate().unwrap();
            assert!(cfg.watchdog_deadline() > cfg.period(), "{} Hz", hz);
            let ratio = cfg.watchdog_deadline().as_secs_f64() / cfg.period().as_secs_f64();
            // within half a microsecond of rounding on a deadline of at least 1.2 ms
            assert!((ratio - 1.2).abs() < 1e-3, "{} Hz: ratio {}", hz, ratio);
        }
    }

    #[test]
    fn deadline_equal_to_period_is_rejected() {
        // 1 ms × 1.00000012 rounds back to 1 ms
        let cfg = PipelineConfig {
            sampling_frequency_hz: 1_000,
            watchdog_factor: 1.000_000_1,
            ..PipelineConfig::default()
        };
        assert_eq!(cfg.watchdog_deadline(), cfg.period());
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::Invalid { field: "watchdog_factor", .. })
        ));
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        assert!(matches!(
            PipelineConfig::from_json("{ not json"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn topology_round_trips_through_json() {
        let json = serde_json::to_string(&Topology::TripleMajority { mask: 0xFF }).unwrap();
        assert_eq!(json, r#"{"kind":"triple_majority","mask":255}"#);
        assert_eq!(Topology::TripleAveraging.sensor_count(), 3);
    }
}
