//! Periodic, watchdog-protected sampler
//!
//! ## Lifecycle
//!
//! ```text
//! Starting ──► Sampling ──► Stopping
//!   │            │   ▲         │
//!   │            └───┘         └─ disarm ticker, power off every sensor
//!   │     wait(tick, 1.2 × period)
//!   └─ power primary, arm ticker
//! ```
//!
//! Each iteration waits for the ticker's wakeup with a deadline. A wakeup in
//! time produces one sample; a missed deadline means the timer or scheduler
//! is broken, so the sampler restarts the device and samples no more.
//!
//! ## Routing
//!
//! | Topology | Every tick | Every Nth tick |
//! |----------|------------|----------------|
//! | dual | primary → monitor relay | primary + secondary → checker relay |
//! | triple | three readings → voter relay | - |
//!
//! Sends wait at most the configured send timeout; a busy relay drops the
//! sample with a warning, it never stalls sampling.
//!
//! Sensors are powered off on every exit path, including a force-terminated
//! task: the sampler powers them off when dropped.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use thermguard_core::{PowerGuard, SensorSample, TemperatureSensor, TripleSample};
use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::config::PipelineConfig;
use crate::error::TaskError;
use crate::relay::RelayChannel;
use crate::restart::DeviceRestart;
use crate::signal::WakeupSignal;
use crate::ticker::Ticker;

/// Sensor owned by the sampler task
pub type BoxedSensor = Box<dyn TemperatureSensor + Send>;

/// Sampler lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplerPhase {
    /// Sensors and ticker being set up
    Starting,
    /// Waiting for ticks and sampling
    Sampling,
    /// Ticker disarmed, sensors powered off
    Stopping,
}

/// Sensors and the relays their samples go to
pub enum SensorBank {
    /// Primary every tick, secondary every Nth tick
    Dual {
        /// Sampled every tick, powered while sampling
        primary: BoxedSensor,
        /// Powered only for paired reads
        secondary: BoxedSensor,
        /// Destination of primary samples
        monitor: RelayChannel,
        /// Destination of paired samples
        checker: RelayChannel,
    },
    /// Three sensors every tick
    Triple {
        /// Sensors in vote order
        sensors: [BoxedSensor; 3],
        /// Destination of triple samples
        voter: RelayChannel,
    },
}

impl SensorBank {
    fn sensors_mut(&mut self) -> Vec<&mut BoxedSensor> {
        match self {
            SensorBank::Dual { primary, secondary, .. } => vec![primary, secondary],
            SensorBank::Triple { sensors, .. } => sensors.iter_mut().collect(),
        }
    }
}

/// Timing of the sampler
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplerSettings {
    /// Tick period
    pub period: Duration,
    /// Longest acceptable wait for a tick
    pub deadline: Duration,
    /// Relay send timeout
    pub send_timeout: Duration,
    /// Ticks between paired reads (dual topology)
    pub checker_period_ticks: u32,
}

impl From<&PipelineConfig> for SamplerSettings {
    fn from(cfg: &PipelineConfig) -> Self {
        Self {
            period: cfg.period(),
            deadline: cfg.watchdog_deadline(),
            send_timeout: cfg.send_timeout(),
            checker_period_ticks: cfg.checker_period_ticks,
        }
    }
}

/// Sampler task state
pub struct Sampler {
    bank: SensorBank,
    ticker: Box<dyn Ticker>,
    restart: Arc<dyn DeviceRestart>,
    settings: SamplerSettings,
    phase: SamplerPhase,
    ticks: u64,
}

impl Sampler {
    /// Sampler over `bank`, woken by `ticker`
    pub fn new(
        bank: SensorBank,
        ticker: Box<dyn Ticker>,
        restart: Arc<dyn DeviceRestart>,
        settings: SamplerSettings,
    ) -> Self {
        Self {
            bank,
            ticker,
            restart,
            settings,
            phase: SamplerPhase::Starting,
            ticks: 0,
        }
    }

    /// Current phase
    pub fn phase(&self) -> SamplerPhase {
        self.phase
    }

    /// Run until cancelled, a sensor fault, or a missed deadline
    pub async fn run(mut self, cancel: CancellationToken) -> Result<(), TaskError> {
        let signal = WakeupSignal::new();
        let result = match self.start(&signal) {
            Ok(()) => self.sample_loop(&signal, &cancel).await,
            Err(err) => Err(err),
        };
        self.stop();
        result
    }

    fn enter(&mut self, phase: SamplerPhase) {
        if self.phase != phase {
            info!("sampler: {:?} -> {:?}", self.phase, phase);
            self.phase = phase;
        }
    }

    fn start(&mut self, signal: &WakeupSignal) -> Result<(), TaskError> {
        match &mut self.bank {
            SensorBank::Dual { primary, .. } => primary.power_on()?,
            SensorBank::Triple { sensors, .. } => {
                for sensor in sensors.iter_mut() {
                    sensor.power_on()?;
                }
            }
        }
        self.ticker.arm(self.settings.period, signal.clone());
        self.enter(SamplerPhase::Sampling);
        Ok(())
    }

    async fn sample_loop(
        &mut self,
        signal: &WakeupSignal,
        cancel: &CancellationToken,
    ) -> Result<(), TaskError> {
        let deadline = self.settings.deadline;
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(()),
                tick = time::timeout(deadline, signal.wait()) => {
                    if tick.is_err() {
                        error!("sampler: no tick within {:?}, watchdog expired", deadline);
                        self.ticker.disarm();
                        self.restart.restart("sampler watchdog expired");
                        return Err(TaskError::WatchdogExpired { deadline });
                    }
                }
            }

            self.ticks += 1;
            self.sample_once().await?;
        }
    }

    async fn sample_once(&mut self) -> Result<(), TaskError> {
        let send_timeout = self.settings.send_timeout;
        let paired_tick = self.ticks % u64::from(self.settings.checker_period_ticks.max(1)) == 0;

        match &mut self.bank {
            SensorBank::Dual { primary, secondary, monitor, checker } => {
                let t1 = primary.read_temperature()?;
                debug!("sampler: tick {} primary {:.2} °C", self.ticks, t1);
                monitor.send_or_drop(&SensorSample::from_sensor(t1), send_timeout).await?;

                if paired_tick {
                    let t2 = {
                        let mut guard = PowerGuard::engage(&mut *secondary)?;
                        guard.read_temperature()?
                    };
                    debug!("sampler: tick {} paired {:.2} / {:.2} °C", self.ticks, t1, t2);
                    checker.send_or_drop(&SensorSample::paired(t1, t2), send_timeout).await?;
                }
            }
            SensorBank::Triple { sensors, voter } => {
                let mut sample = TripleSample { raw: [0; 3], celsius: [0.0; 3] };
                for (i, sensor) in sensors.iter_mut().enumerate() {
                    let raw = sensor.read_raw()?;
                    sample.raw[i] = raw;
                    sample.celsius[i] = sensor.config().code_to_celsius(raw)?;
                }
                debug!("sampler: tick {} triple {:?}", self.ticks, sample);
                voter.send_or_drop(&sample, send_timeout).await?;
            }
        }
        Ok(())
    }

    fn stop(&mut self) {
        self.enter(SamplerPhase::Stopping);
        self.ticker.disarm();
        for sensor in self.bank.sensors_mut() {
            if let Err(err) = sensor.power_off() {
                warn!("sampler: power off failed: {}", err);
            }
        }
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        if self.phase != SamplerPhase::Stopping {
            self.stop();
        }
    }
}
