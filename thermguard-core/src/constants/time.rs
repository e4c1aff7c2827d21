//! Timing Constants
//!
//! Cadences, deadlines and stop timeouts of the pipeline tasks.

// ===== SAMPLING =====

/// Default sampling frequency of the primary sensor (Hz).
pub const SENSOR_FREQUENCY_HZ: u32 = 1;

/// Shortest sampling period a configuration may ask for (ms).
pub const MIN_SAMPLING_PERIOD_MS: u64 = 1;

/// Number of sampling ticks between two paired reads for the checker.
pub const CHECKER_PERIOD_TICKS: u32 = 10;

/// Watchdog deadline as a multiple of the sampling period.
///
/// A wakeup that arrives more than 20% late means the timer or the
/// scheduler is broken and the device restarts.
pub const WATCHDOG_PERIOD_FACTOR: f32 = 1.2;

// ===== RELAY TIMEOUTS =====

/// Producer-side send timeout before a record is dropped (ms).
pub const SEND_TIMEOUT_MS: u64 = 100;

/// Monitor idle yield when the state is not a reporting state (ms).
pub const MONITOR_IDLE_YIELD_MS: u64 = 10;

// ===== SUPERVISOR =====

/// Delay after spawning the workers before leaving INIT (ms).
pub const STARTUP_SETTLE_MS: u64 = 1000;

/// Time the sampler has to acknowledge a stop request (ms).
pub const SAMPLER_STOP_TIMEOUT_MS: u64 = 2000;

/// Time the checker or voter has to acknowledge a stop request (ms).
pub const CHECKER_STOP_TIMEOUT_MS: u64 = 2000;

/// Time the monitor has to acknowledge a stop request (ms).
pub const MONITOR_STOP_TIMEOUT_MS: u64 = 2000;
