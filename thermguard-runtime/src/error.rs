//! Error types of the task runtime
//!
//! - [`TaskError`]: why a pipeline task left its loop.
//! - [`SupervisorError`]: failures of the supervisor itself.
//! - [`ConfigError`]: rejected configuration.
//!
//! Core errors (`SensorError`, `RelayError`, ...) convert into these with `?`.

use std::time::Duration;

use thermguard_core::{RecordError, RelayError, SensorError, StoreError, TransitionError};
use thiserror::Error;

use crate::relay::SendError;

/// Reasons a pipeline task stopped other than a stop request
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TaskError {
    /// A sensor read or power switch failed
    #[error("sensor fault: {0}")]
    Sensor(#[from] SensorError),

    /// No sampling tick arrived before the deadline
    #[error("watchdog expired: no tick within {deadline:?}")]
    WatchdogExpired {
        /// Deadline that was missed
        deadline: Duration,
    },

    /// Relay misuse that cannot be recovered by dropping a record
    #[error("relay fault: {0}")]
    Relay(#[from] RelayError),

    /// A record could not be encoded
    #[error("record fault: {0}")]
    Record(#[from] RecordError),
}

impl From<SendError> for TaskError {
    fn from(err: SendError) -> Self {
        match err {
            SendError::Relay(err) => TaskError::Relay(err),
            SendError::Record(err) => TaskError::Record(err),
        }
    }
}

impl TaskError {
    /// Short stable label for log lines
    pub fn as_label(&self) -> &'static str {
        match self {
            TaskError::Sensor(_) => "task_sensor_fault",
            TaskError::WatchdogExpired { .. } => "task_watchdog_expired",
            TaskError::Relay(_) => "task_relay_fault",
            TaskError::Record(_) => "task_record_fault",
        }
    }

    /// Whether this error has already restarted the device
    pub fn restarts_device(&self) -> bool {
        matches!(self, TaskError::WatchdogExpired { .. })
    }
}

/// Failures of the supervisor
#[derive(Error, Debug)]
pub enum SupervisorError {
    /// Persistent store could not be brought up, even after erasing it
    #[error("store init failed: {0}")]
    Store(#[from] StoreError),

    /// Requested state change is not allowed
    #[error(transparent)]
    Transition(#[from] TransitionError),

    /// An execution context could not be started
    #[error("failed to start execution context {context}: {source}")]
    Executor {
        /// Context name
        context: &'static str,
        /// Underlying OS error
        #[source]
        source: std::io::Error,
    },

    /// Configuration rejected before start
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Rejected pipeline configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A field has an unusable value
    #[error("invalid {field}: {reason}")]
    Invalid {
        /// Field name
        field: &'static str,
        /// What is wrong with it
        reason: String,
    },

    /// Sampling frequency too high for the timer and watchdog
    #[error("sampling period {period:?} is shorter than {minimum:?}")]
    PeriodTooShort {
        /// Period derived from the frequency
        period: Duration,
        /// Shortest period accepted
        minimum: Duration,
    },

    /// JSON could not be parsed
    #[error("config parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid { field, reason: reason.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use thermguard_core::SystemState;

    #[test]
    fn labels_are_stable() {
        let err = TaskError::WatchdogExpired { deadline: Duration::from_millis(1200) };
        assert_eq!(err.as_label(), "task_watchdog_expired");
        assert!(err.restarts_device());

        let err: TaskError = SensorError::NonFinite.into();
        assert_eq!(err.as_label(), "task_sensor_fault");
        assert!(!err.restarts_device());
    }

    #[test]
    fn messages_carry_context() {
        let err = ConfigError::invalid("sampling_frequency_hz", "must be > 0");
        assert_eq!(err.to_string(), "invalid sampling_frequency_hz: must be > 0");

        let err = ConfigError::PeriodTooShort {
            period: Duration::from_nanos(500),
            minimum: Duration::from_millis(1),
        };
        assert_eq!(err.to_string(), "sampling period 500ns is shorter than 1ms");

        let err = SupervisorError::from(TransitionError {
            from: SystemState::Error,
            to: SystemState::Normal,
        });
        assert_eq!(err.to_string(), "Illegal state transition Error -> Normal");
    }
}
