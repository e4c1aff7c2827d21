//! Whole-device restart capability
//!
//! Only two faults restart the device: a missed sampling deadline and an
//! unrecoverable INIT failure. Both go through [`DeviceRestart`], so tests
//! can observe the restart instead of losing the process.

use std::sync::Arc;

use log::error;
use parking_lot::Mutex;

/// Restarts the whole device
pub trait DeviceRestart: Send + Sync {
    /// Restart because of `reason`
    ///
    /// Real implementations do not return; test doubles record and return.
    fn restart(&self, reason: &str);
}

/// Restart by exiting the process and letting the service manager respawn it
#[derive(Debug, Clone, Copy)]
pub struct ProcessRestart {
    exit_code: i32,
}

impl ProcessRestart {
    /// Exit with `exit_code` on restart
    pub const fn new(exit_code: i32) -> Self {
        Self { exit_code }
    }
}

impl Default for ProcessRestart {
    fn default() -> Self {
        Self::new(70)
    }
}

impl DeviceRestart for ProcessRestart {
    fn restart(&self, reason: &str) {
        error!("restarting device: {}", reason);
        log::logger().flush();
        std::process::exit(self.exit_code);
    }
}

/// Records restart requests instead of acting on them
#[derive(Debug, Clone, Default)]
pub struct RecordingRestart {
    reasons: Arc<Mutex<Vec<String>>>,
}

impl RecordingRestart {
    /// Recorder with no restarts yet
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of restarts requested so far
    pub fn count(&self) -> usize {
        self.reasons.lock().len()
    }

    /// Reasons of all requested restarts, oldest first
    pub fn reasons(&self) -> Vec<String> {
        self.reasons.lock().clone()
    }
}

impl DeviceRestart for RecordingRestart {
    fn restart(&self, reason: &str) {
        error!("restart requested: {}", reason);
        self.reasons.lock().push(reason.to_owned());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_restart_is_shared_between_clones() {
        let restart = RecordingRestart::new();
        let handle: Arc<dyn DeviceRestart> = Arc::new(restart.clone());
        handle.restart("watchdog");
        assert_eq!(restart.count(), 1);
        assert_eq!(restart.reasons(), vec!["watchdog".to_owned()]);
    }
}
