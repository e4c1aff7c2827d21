//! Relay Buffer Sizes
//!
//! Arena sizes for the relay channels between tasks.

/// Default capacity of each relay arena (bytes).
///
/// Sized for the ESP32 reference board: two arenas of 2 KiB hold roughly
/// 140 sensor samples each, far more than a 1 Hz pipeline ever queues.
pub const DEFAULT_RELAY_CAPACITY: usize = 2048;

/// Smallest arena the configuration accepts (bytes).
///
/// Must hold at least one frame of the largest record kind.
pub const MIN_RELAY_CAPACITY: usize = 32;
