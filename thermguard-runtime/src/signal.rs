//! Binary wakeup signal between the tick source and the sampler
//!
//! At most one wakeup is stored: giving an already-given signal does
//! nothing, so ticks missed while the sampler is busy do not queue up.

use std::sync::Arc;

use tokio::sync::Notify;

/// Single-slot wakeup shared by a tick source and one waiter
#[derive(Debug, Clone, Default)]
pub struct WakeupSignal {
    notify: Arc<Notify>,
}

impl WakeupSignal {
    /// Create an empty signal
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a wakeup, or wake the waiter if one is parked
    pub fn give(&self) {
        self.notify.notify_one();
    }

    /// Wait for and consume one wakeup
    pub async fn wait(&self) {
        self.notify.notified().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn missed_ticks_do_not_queue() {
        let signal = WakeupSignal::new();
        signal.give();
        signal.give();
        signal.give();

        signal.wait().await;
        let second = tokio::time::timeout(Duration::from_millis(10), signal.wait()).await;
        assert!(second.is_err());
    }

    #[tokio::test]
    async fn wakes_a_parked_waiter() {
        let signal = WakeupSignal::new();
        let waiter = {
            let signal = signal.clone();
            tokio::spawn(async move { signal.wait().await })
        };
        tokio::task::yield_now().await;
        signal.give();
        waiter.await.unwrap();
    }
}
