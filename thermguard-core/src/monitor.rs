//! State-gated interpretation of monitor-bound records
//!
//! The monitor task does three things per iteration: look at the system
//! state, maybe take a record, and turn that record into something a human
//! reads. Everything except the waiting lives here, so it can be tested
//! without a runtime.
//!
//! | State | Gate | Sensor / voted record | Checker record |
//! |-------|------|-----------------------|----------------|
//! | NORMAL | consume | point value | informational |
//! | DEGRADED | consume | band around the value | updates `last_deviation` |
//! | ERROR | terminate | - | - |
//! | INIT, RUNNING | idle | - | - |
//!
//! In DEGRADED the band is `[T·(1−d), T·(1+d)]` using the most recent
//! deviation reported by the checker. Deviation updates and band reports are
//! independent: whichever record arrives last wins.

use crate::record::{DataSource, Observation};
use crate::state::SystemState;
use crate::thermistor::ThermistorConfig;

/// What the monitor loop does in the current state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    /// Take the next record
    Consume,
    /// Yield briefly without touching the channel
    Idle,
    /// Leave the loop
    Terminate,
}

impl Gate {
    /// Gate for a state snapshot
    pub const fn for_state(state: SystemState) -> Self {
        if state.is_reporting() {
            Gate::Consume
        } else if matches!(state, SystemState::Error) {
            Gate::Terminate
        } else {
            Gate::Idle
        }
    }
}

/// Human-facing result of one consumed record
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Report {
    /// Single temperature (°C)
    Point {
        /// Reported temperature
        celsius: f32,
    },
    /// Temperature band widened by the last known deviation
    Band {
        /// Lower bound (°C)
        low: f32,
        /// Upper bound (°C)
        high: f32,
        /// Deviation used to widen the band
        deviation: f32,
    },
    /// Cross-check result from the deviation checker
    CrossCheck {
        /// Primary reading (°C)
        temperature1: f32,
        /// Secondary reading (°C)
        temperature2: f32,
        /// `|temperature1 - temperature2|`
        deviation: f32,
    },
    /// Voted raw code that could not be converted to °C
    RawCode {
        /// Voted code
        code: u16,
    },
}

/// Band `[T·(1−d), T·(1+d)]`, ordered so that `low <= high`
pub fn degraded_band(temperature: f32, deviation: f32) -> (f32, f32) {
    let a = temperature * (1.0 - deviation);
    let b = temperature * (1.0 + deviation);
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Per-task interpretation state of the monitor
#[derive(Debug, Clone, Default)]
pub struct ReadingInterpreter {
    last_deviation: f32,
    calibration: Option<ThermistorConfig>,
}

impl ReadingInterpreter {
    /// Interpreter with no calibration; voted codes are reported raw
    pub fn new() -> Self {
        Self::default()
    }

    /// Convert voted codes to °C with this calibration
    pub fn with_calibration(calibration: ThermistorConfig) -> Self {
        Self {
            last_deviation: 0.0,
            calibration: Some(calibration),
        }
    }

    /// Most recent deviation seen in DEGRADED mode
    pub fn last_deviation(&self) -> f32 {
        self.last_deviation
    }

    /// Interpret one record consumed in `state`
    ///
    /// Returns `None` for states that do not consume records.
    pub fn interpret(&mut self, state: SystemState, observation: Observation) -> Option<Report> {
        let degraded = match state {
            SystemState::Normal => false,
            SystemState::Degraded => true,
            _ => return None,
        };

        let temperature = match observation {
            Observation::Sample(sample) if sample.source == DataSource::Checker => {
                if degraded {
                    self.last_deviation = sample.deviation;
                }
                return Some(Report::CrossCheck {
                    temperature1: sample.temperature1,
                    temperature2: sample.temperature2,
                    deviation: sample.deviation,
                });
            }
            Observation::Sample(sample) => sample.temperature1,
            Observation::Averaged(averaged) => averaged.0,
            Observation::Voted(voted) => {
                let converted = self
                    .calibration
                    .as_ref()
                    .and_then(|cal| cal.code_to_celsius(voted.0).ok());
                match converted {
                    Some(celsius) => celsius,
                    None => return Some(Report::RawCode { code: voted.0 }),
                }
            }
        };

        Some(if degraded {
            let (low, high) = degraded_band(temperature, self.last_deviation);
            Report::Band { low, high, deviation: self.last_deviation }
        } else {
            Report::Point { celsius: temperature }
        })
    }
}
