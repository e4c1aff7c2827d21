//! Periodic tick sources for the sampler
//!
//! A [`Ticker`] plays the role of a hardware timer whose interrupt gives the
//! sampler's [`WakeupSignal`]. The sampler arms it on start and disarms it on
//! every exit path.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::debug;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::signal::WakeupSignal;

/// Source of periodic wakeups
pub trait Ticker: Send {
    /// Start giving `signal` every `period`; the first tick is one period out
    fn arm(&mut self, period: Duration, signal: WakeupSignal);

    /// Stop ticking; idempotent
    fn disarm(&mut self);
}

impl<T: Ticker + ?Sized> Ticker for Box<T> {
    fn arm(&mut self, period: Duration, signal: WakeupSignal) {
        (**self).arm(period, signal)
    }

    fn disarm(&mut self) {
        (**self).disarm()
    }
}

/// Ticker backed by a tokio interval on the current runtime
#[derive(Debug, Default)]
pub struct IntervalTicker {
    task: Option<JoinHandle<()>>,
}

impl IntervalTicker {
    /// Unarmed ticker
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the ticker is armed
    pub fn is_armed(&self) -> bool {
        self.task.is_some()
    }
}

impl Ticker for IntervalTicker {
    fn arm(&mut self, period: Duration, signal: WakeupSignal) {
        self.disarm();
        debug!("arming interval ticker at {:?}", period);
        self.task = Some(tokio::spawn(async move {
            let mut interval = time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                signal.give();
            }
        }));
    }

    fn disarm(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            debug!("interval ticker disarmed");
        }
    }
}

impl Drop for IntervalTicker {
    fn drop(&mut self) {
        self.disarm();
    }
}

/// Ticker driven by hand, for tests and fault injection
///
/// Clones share state: keep one clone to call [`tick`](ManualTicker::tick)
/// and hand the other to the sampler.
#[derive(Debug, Clone, Default)]
pub struct ManualTicker {
    signal: Arc<Mutex<Option<WakeupSignal>>>,
    armed: Arc<AtomicBool>,
}

impl ManualTicker {
    /// Unarmed ticker
    pub fn new() -> Self {
        Self::default()
    }

    /// Give the armed signal once; returns false when disarmed
    pub fn tick(&self) -> bool {
        match self.signal.lock().as_ref() {
            Some(signal) => {
                signal.give();
                true
            }
            None => false,
        }
    }

    /// Whether a sampler currently has the ticker armed
    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::Acquire)
    }
}

impl Ticker for ManualTicker {
    fn arm(&mut self, _period: Duration, signal: WakeupSignal) {
        *self.signal.lock() = Some(signal);
        self.armed.store(true, Ordering::Release);
    }

    fn disarm(&mut self) {
        self.signal.lock().take();
        self.armed.store(false, Ordering::Release);
    }
}
