//! Error Types for the Telemetry Pipeline
//!
//! ## Design Philosophy
//!
//! Errors here travel through channels, task results and log lines on a
//! device with a few hundred kilobytes of RAM, so they follow the same rules
//! as the rest of the core:
//!
//! 1. **Small Size**: every variant fits in 24 bytes.
//! 2. **No Heap Allocation**: messages are `&'static str` only.
//! 3. **Copy Semantics**: errors are returned from hot paths by value.
//!
//! ## Error Categories
//!
//! The categories map one-to-one onto how the pipeline reacts:
//!
//! | Error | Severity | Reaction |
//! |-------|----------|----------|
//! | [`RelayError::Busy`] | transient | producer drops the newest record and logs |
//! | [`RelayError::TimedOut`] | transient | consumer re-checks producer liveness |
//! | [`RecordError`] | non-fatal | consumer logs and skips the record |
//! | [`SensorError`] | fatal to the task | propagated out of the owning task |
//! | [`StoreError::IncompatibleFormat`] | recoverable once | erase and reinitialize |
//! | [`TransitionError`] | rejected | supervisor state unchanged |
//!
//! ```rust
//! use thermguard_core::RelayError;
//!
//! fn on_send(result: Result<(), RelayError>) {
//!     match result {
//!         Ok(()) => {}
//!         Err(RelayError::Busy { .. }) => {
//!             // Consumer is behind - drop this sample, never block the sampler
//!         }
//!         Err(_) => {
//!             // Programming error - handle or escalate
//!         }
//!     }
//! }
//! ```

use thiserror_no_std::Error;

use crate::state::SystemState;

/// Result type for sensor operations
pub type SensorResult<T> = Result<T, SensorError>;

/// Result type for relay operations
pub type RelayResult<T> = Result<T, RelayError>;

/// Result type for record decoding
pub type RecordResult<T> = Result<T, RecordError>;

/// Faults raised by the thermistor capability
///
/// Any of these is fatal to the task that owns the sensor. Corrupted wiring or
/// calibration does not heal by retrying, so nothing in the pipeline retries.
#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum SensorError {
    /// The analog-to-digital converter reported a failure
    #[error("ADC conversion failed on channel {channel}: {reason}")]
    Conversion {
        /// Channel identity of the failing sensor
        channel: u8,
        /// Driver supplied reason
        reason: &'static str,
    },

    /// The measured voltage cannot be mapped to a resistance
    #[error("Voltage {volts} V outside divider range (0, {reference}) V")]
    VoltageOutOfRange {
        /// Voltage computed from the raw code
        volts: f32,
        /// Reference voltage of the divider
        reference: f32,
    },

    /// The curve fit produced NaN or infinity
    #[error("Temperature conversion produced a non-finite value")]
    NonFinite,

    /// The power control line could not be driven
    #[error("Power control {power_control} failed: {reason}")]
    Power {
        /// Identity of the power control line
        power_control: u8,
        /// Driver supplied reason
        reason: &'static str,
    },
}

/// Errors raised by the bounded relay channel
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayError {
    /// Not enough contiguous free space before the deadline
    #[error("Relay busy: requested {requested} bytes, {free} free")]
    Busy {
        /// Bytes the producer asked for
        requested: usize,
        /// Free bytes at the moment the request gave up
        free: usize,
    },

    /// No record arrived before the receive deadline
    #[error("Relay receive timed out")]
    TimedOut,

    /// The record can never fit, whatever the consumer does
    #[error("Record of {requested} bytes exceeds relay capacity {capacity}")]
    Oversized {
        /// Bytes the producer asked for
        requested: usize,
        /// Total arena capacity
        capacity: usize,
    },

    /// The handle no longer refers to a live slot in the expected phase
    #[error("Stale relay handle (generation {generation})")]
    StaleHandle {
        /// Generation carried by the handle
        generation: u32,
    },

    /// Payload length differs from the acquired slot length
    #[error("Payload of {actual} bytes does not match slot of {expected} bytes")]
    LengthMismatch {
        /// Slot length
        expected: usize,
        /// Payload length
        actual: usize,
    },
}

/// Errors raised while decoding a framed record
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordError {
    /// Frame is shorter or longer than the record layout
    #[error("Record length {actual} does not match expected {expected}")]
    Length {
        /// Encoded length of the record kind
        expected: usize,
        /// Length actually received
        actual: usize,
    },

    /// Frame carries a kind tag that is not the one expected here
    #[error("Unexpected record kind {found}")]
    UnexpectedKind {
        /// Tag byte found at the start of the frame
        found: u8,
    },

    /// Sensor sample carries an unknown provenance byte
    #[error("Unknown data source {0}")]
    UnknownSource(u8),

    /// Frame is empty
    #[error("Empty record")]
    Empty,
}

/// Errors raised by the persistent store capability
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreError {
    /// Stored data was written by an incompatible format version
    #[error("Persistent store has an incompatible format")]
    IncompatibleFormat,

    /// The store has no free pages left to initialize into
    #[error("Persistent store has no free pages")]
    NoFreePages,

    /// Any other driver failure
    #[error("Persistent store failure: {0}")]
    Io(&'static str),
}

impl StoreError {
    /// Whether an erase followed by a fresh init may clear this error
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, StoreError::IncompatibleFormat | StoreError::NoFreePages)
    }
}

/// Rejected supervisory state transition
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Illegal state transition {from:?} -> {to:?}")]
pub struct TransitionError {
    /// State the machine was in
    pub from: SystemState,
    /// State that was requested
    pub to: SystemState,
}

#[cfg(feature = "defmt")]
impl defmt::Format for SensorError {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            Self::Conversion { channel, reason } =>
                defmt::write!(fmt, "ADC channel {}: {}", channel, reason),
            Self::VoltageOutOfRange { volts, reference } =>
                defmt::write!(fmt, "Voltage {} outside (0, {})", volts, reference),
            Self::NonFinite =>
                defmt::write!(fmt, "Non-finite temperature"),
            Self::Power { power_control, reason } =>
                defmt::write!(fmt, "Power control {}: {}", power_control, reason),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for RelayError {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            Self::Busy { requested, free } =>
                defmt::write!(fmt, "Relay busy: {} requested, {} free", requested, free),
            Self::TimedOut =>
                defmt::write!(fmt, "Relay receive timed out"),
            Self::Oversized { requested, capacity } =>
                defmt::write!(fmt, "Record {} exceeds capacity {}", requested, capacity),
            Self::StaleHandle { generation } =>
                defmt::write!(fmt, "Stale handle {}", generation),
            Self::LengthMismatch { expected, actual } =>
                defmt::write!(fmt, "Payload {} != slot {}", actual, expected),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for RecordError {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            Self::Length { expected, actual } =>
                defmt::write!(fmt, "Record length {} != {}", actual, expected),
            Self::UnexpectedKind { found } =>
                defmt::write!(fmt, "Unexpected record kind {}", found),
            Self::UnknownSource(source) =>
                defmt::write!(fmt, "Unknown data source {}", source),
            Self::Empty =>
                defmt::write!(fmt, "Empty record"),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for StoreError {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            Self::IncompatibleFormat =>
                defmt::write!(fmt, "Store format incompatible"),
            Self::NoFreePages =>
                defmt::write!(fmt, "Store has no free pages"),
            Self::Io(reason) =>
                defmt::write!(fmt, "Store failure: {}", reason),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for TransitionError {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "Illegal state transition {} -> {}", self.from.name(), self.to.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_recoverability() {
        assert!(StoreError::IncompatibleFormat.is_recoverable());
        assert!(StoreError::NoFreePages.is_recoverable());
        assert!(!StoreError::Io("flash").is_recoverable());
    }

    #[test]
    fn errors_stay_small() {
        assert!(core::mem::size_of::<SensorError>() <= 24);
        assert!(core::mem::size_of::<RelayError>() <= 24);
        assert!(core::mem::size_of::<RecordError>() <= 24);
    }

    #[cfg(feature = "defmt")]
    #[test]
    fn every_error_formats_over_defmt() {
        fn assert_format<T: defmt::Format>() {}

        assert_format::<SensorError>();
        assert_format::<RelayError>();
        assert_format::<RecordError>();
        assert_format::<StoreError>();
        assert_format::<TransitionError>();
    }
}
