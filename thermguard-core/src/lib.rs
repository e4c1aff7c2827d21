//! Core algorithms for ThermGuard
//!
//! Redundant thermistor sampling, cross-checking and state-gated reporting
//! for devices where a single sensor cannot be trusted.
//! Everything here is synchronous and allocation-light so it runs unchanged
//! on a microcontroller; the concurrent pipeline lives in `thermguard-runtime`.
//!
//! Key constraints:
//! - Builds `no_std` (with `alloc`) for ESP32-class targets
//! - Records are fixed-size frames, encoded straight into relay slots
//! - Hardware is reached only through capability traits
//!
//! ```no_run
//! use thermguard_core::{majority_vote, SensorSample, Record, RelayArena};
//!
//! let mut arena = RelayArena::new(2048);
//! let slot = arena.try_reserve(SensorSample::FRAME_LEN).unwrap();
//! SensorSample::from_sensor(21.5).encode(arena.slot_mut(slot).unwrap()).unwrap();
//! arena.commit(slot).unwrap();
//!
//! assert_eq!(majority_vote(0x0FFF, 0x7A5, 0x7A5, 0x025), 0x7A5);
//! ```

#![cfg_attr(not(feature = "std"), no_std)]
#![deny(unsafe_code)]
#![warn(missing_docs)]

extern crate alloc;

// Macros for optional logging
#[cfg(feature = "log")]
macro_rules! log_warn {
    ($($arg:tt)*) => { log::warn!($($arg)*) };
}

#[cfg(not(feature = "log"))]
macro_rules! log_warn {
    ($($arg:tt)*) => {};
}

pub mod constants;
pub mod errors;
pub mod monitor;
pub mod record;
pub mod redundancy;
pub mod relay;
pub mod state;
pub mod store;
pub mod thermistor;
pub mod traits;

// Public API
pub use errors::{
    RecordError, RecordResult, RelayError, RelayResult, SensorError, SensorResult, StoreError,
    TransitionError,
};
pub use monitor::{degraded_band, Gate, ReadingInterpreter, Report};
pub use record::{
    AveragedSample, DataSource, Observation, Record, RecordKind, SensorSample,
    TripleSample, VotedSample,
};
pub use redundancy::{
    average, deviation, majority_vote, AveragingVote, BitmaskMajorityVote, DeviationCheck,
    RedundancyStrategy,
};
pub use relay::{RelayArena, RelayStats, SlotId};
pub use state::SystemState;
pub use store::{init_store, StoreInit};
pub use thermistor::{PowerGuard, Thermistor, ThermistorConfig};
pub use traits::{AdcChannel, DelayMs, PersistentStore, PowerLine, TemperatureSensor};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_exists() {
        assert!(!VERSION.is_empty());
    }
}
