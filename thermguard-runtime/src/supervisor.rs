//! Supervisory state machine
//!
//! ## Overview
//!
//! The supervisor owns the system state and the task handles. It is the only
//! writer of the state; tasks read snapshots.
//!
//! ```text
//!  INIT ──► RUNNING ──► NORMAL ◄──► DEGRADED
//!   │          │          │            │
//!   └──────────┴──────────┴────────────┴──► ERROR (terminal)
//! ```
//!
//! | State | Supervisor action |
//! |-------|-------------------|
//! | INIT | store bring-up, relays, spawn tasks on their contexts, settle |
//! | RUNNING | passthrough until told NORMAL or DEGRADED |
//! | NORMAL / DEGRADED | steady operation, external input switches between them |
//! | ERROR | stop sampler and checker/voter, each within its stop timeout |
//!
//! ## Faults
//!
//! Tasks report error exits on a fault channel. [`Supervisor::supervise`]
//! waits for the first one and moves the system to ERROR. A store that stays
//! unusable after one erase is fatal to INIT and restarts the device; so does
//! a missed sampling deadline (the sampler does that itself).

use std::fmt::Debug;
use std::sync::Arc;

use log::{error, info, warn};
use thermguard_core::{
    init_store, AveragingVote, BitmaskMajorityVote, DeviationCheck, PersistentStore,
    ReadingInterpreter, RedundancyStrategy, StoreInit, SystemState,
};
use tokio::sync::mpsc;
use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::config::{PipelineConfig, Topology};
use crate::context::{ExecutionContext, Executors};
use crate::error::{ConfigError, SupervisorError};
use crate::monitor::{Monitor, ReportSink};
use crate::relay::RelayChannel;
use crate::restart::DeviceRestart;
use crate::sampler::{BoxedSensor, Sampler, SamplerSettings, SensorBank};
use crate::state::{state_register, StateReader, StateWriter};
use crate::task::{spawn_task, StopOutcome, TaskFault, TaskHandle};
use crate::ticker::Ticker;
use crate::worker::CrossCheckWorker;

/// Board capabilities handed to the supervisor at INIT
pub struct Hardware {
    /// Primary sensor
    pub primary: BoxedSensor,
    /// Secondary sensor
    pub secondary: BoxedSensor,
    /// Third sensor, required by the triple topologies
    pub tertiary: Option<BoxedSensor>,
    /// Sampling tick source
    pub ticker: Box<dyn Ticker>,
    /// Whole-device restart
    pub restart: Arc<dyn DeviceRestart>,
    /// Persistent store brought up during INIT
    pub store: Box<dyn PersistentStore + Send>,
    /// Destination of monitor reports
    pub sink: Box<dyn ReportSink>,
}

/// Outcome of stopping the pipeline tasks
///
/// `None` means the task had already been stopped earlier.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StopReport {
    /// Sampler
    pub sampler: Option<StopOutcome>,
    /// Checker or voter
    pub checker: Option<StopOutcome>,
    /// Monitor
    pub monitor: Option<StopOutcome>,
}

impl StopReport {
    /// Whether any task had to be force-terminated
    pub fn any_forced(&self) -> bool {
        [&self.sampler, &self.checker, &self.monitor]
            .into_iter()
            .flatten()
            .any(StopOutcome::was_forced)
    }
}

/// Owner of the system state and the pipeline tasks
pub struct Supervisor {
    config: PipelineConfig,
    state: StateWriter,
    executors: Executors,
    root: CancellationToken,
    faults: mpsc::UnboundedReceiver<TaskFault>,
    upstream: RelayChannel,
    monitor_relay: RelayChannel,
    sampler: Option<TaskHandle>,
    checker: Option<TaskHandle>,
    monitor: Option<TaskHandle>,
}

impl Supervisor {
    /// Run INIT and enter RUNNING
    pub async fn init(
        config: PipelineConfig,
        hardware: Hardware,
        executors: Executors,
    ) -> Result<Self, SupervisorError> {
        config.validate()?;
        let Hardware { primary, secondary, tertiary, ticker, restart, mut store, sink } = hardware;

        let provided = 2 + usize::from(tertiary.is_some());
        let needed = config.topology.sensor_count();
        if provided < needed {
            let reason = format!(
                "{:?} topology needs {} sensors, {} provided",
                config.topology, needed, provided
            );
            return Err(ConfigError::invalid("tertiary", reason).into());
        }
        if provided > needed {
            warn!("supervisor: {} sensors provided, {} used", provided, needed);
        }

        let (state, reader) = state_register();
        info!("supervisor: {} ({:?} topology)", state.current(), config.topology);

        match init_store(&mut *store) {
            Ok(StoreInit::Ready) => info!("supervisor: store ready"),
            Ok(StoreInit::Recovered) => warn!("supervisor: store erased and reinitialized"),
            Err(err) => {
                error!("supervisor: store init failed after erase: {}", err);
                restart.restart("persistent store init failed");
                return Err(err.into());
            }
        }

        let upstream_name = match config.topology {
            Topology::Dual => "checker",
            Topology::TripleAveraging | Topology::TripleMajority { .. } => "voter",
        };
        let upstream = RelayChannel::new(upstream_name, config.relay_capacity_bytes);
        let monitor_relay = RelayChannel::new("monitor", config.relay_capacity_bytes);

        let bank = match config.topology {
            Topology::Dual => SensorBank::Dual {
                primary,
                secondary,
                monitor: monitor_relay.clone(),
                checker: upstream.clone(),
            },
            Topology::TripleAveraging | Topology::TripleMajority { .. } => {
                let tertiary = tertiary.ok_or_else(|| {
                    ConfigError::invalid("tertiary", "triple topology needs a third sensor")
                })?;
                SensorBank::Triple {
                    sensors: [primary, secondary, tertiary],
                    voter: upstream.clone(),
                }
            }
        };

        let root = CancellationToken::new();
        let (fault_tx, faults) = mpsc::unbounded_channel();
        let producers = executors.handle(ExecutionContext::Producers);

        let sampler = Sampler::new(bank, ticker, restart, SamplerSettings::from(&config));
        let sampler = spawn_task("sampler", producers, &root, fault_tx.clone(), |cancel| {
            sampler.run(cancel)
        });

        let send_timeout = config.send_timeout();
        let checker = match config.topology {
            Topology::Dual => spawn_worker(
                upstream_name,
                DeviationCheck,
                &upstream,
                &monitor_relay,
                send_timeout,
                &executors,
                &root,
                &fault_tx,
            ),
            Topology::TripleAveraging => spawn_worker(
                upstream_name,
                AveragingVote,
                &upstream,
                &monitor_relay,
                send_timeout,
                &executors,
                &root,
                &fault_tx,
            ),
            Topology::TripleMajority { mask } => spawn_worker(
                upstream_name,
                BitmaskMajorityVote::new(mask),
                &upstream,
                &monitor_relay,
                send_timeout,
                &executors,
                &root,
                &fault_tx,
            ),
        };

        let monitor = Monitor::new(
            monitor_relay.clone(),
            reader,
            ReadingInterpreter::with_calibration(config.primary),
            sink,
            config.monitor_idle_yield(),
        );
        let monitor = spawn_task(
            "monitor",
            executors.handle(ExecutionContext::Sink),
            &root,
            fault_tx,
            |cancel| monitor.run(cancel),
        );

        time::sleep(config.settle_delay()).await;
        state.transition(SystemState::Running)?;
        info!("supervisor: {}", SystemState::Running);

        Ok(Self {
            config,
            state,
            executors,
            root,
            faults,
            upstream,
            monitor_relay,
            sampler: Some(sampler),
            checker: Some(checker),
            monitor: Some(monitor),
        })
    }

    /// Current state
    pub fn state(&self) -> SystemState {
        self.state.current()
    }

    /// New read-only state handle
    pub fn subscribe(&self) -> StateReader {
        self.state.subscribe()
    }

    /// Relay feeding the checker or voter
    pub fn upstream_relay(&self) -> &RelayChannel {
        &self.upstream
    }

    /// Relay feeding the monitor
    pub fn monitor_relay(&self) -> &RelayChannel {
        &self.monitor_relay
    }

    /// Configuration the pipeline runs with
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Apply an externally requested state
    ///
    /// ERROR goes through [`enter_error`](Self::enter_error) so the
    /// producers are stopped.
    pub async fn transition(&mut self, next: SystemState) -> Result<SystemState, SupervisorError> {
        if next == SystemState::Error {
            let previous = self.state();
            self.enter_error("requested").await;
            return Ok(previous);
        }
        let previous = self.state.transition(next)?;
        if previous != next {
            info!("supervisor: {} -> {}", previous, next);
        }
        Ok(previous)
    }

    /// Enter ERROR and stop the sampler and the checker/voter
    ///
    /// Each task gets its own stop timeout; a task that misses it is
    /// force-terminated. The monitor leaves on its own when it sees ERROR.
    pub async fn enter_error(&mut self, reason: &str) -> StopReport {
        match self.state.transition(SystemState::Error) {
            Ok(previous) if previous != SystemState::Error => {
                error!("supervisor: {} -> ERROR ({})", previous, reason)
            }
            Ok(_) => {}
            Err(err) => warn!("supervisor: {}", err),
        }

        let sampler_timeout = self.config.sampler_stop_timeout();
        let checker_timeout = self.config.checker_stop_timeout();
        let (sampler, checker) = tokio::join!(
            stop(self.sampler.take(), sampler_timeout),
            stop(self.checker.take(), checker_timeout),
        );
        StopReport { sampler, checker, monitor: None }
    }

    /// Wait for the first task fault, then enter ERROR
    ///
    /// Returns `None` once every task has finished without a fault.
    pub async fn supervise(&mut self) -> Option<(TaskFault, StopReport)> {
        let fault = self.faults.recv().await?;
        error!("supervisor: {} failed: {}", fault.task, fault.error);
        let report = self.enter_error(fault.error.as_label()).await;
        Some((fault, report))
    }

    /// Stop every task, each within its own timeout
    pub async fn shutdown(mut self) -> StopReport {
        info!("supervisor: shutting down from {}", self.state());
        let (sampler, checker, monitor) = tokio::join!(
            stop(self.sampler.take(), self.config.sampler_stop_timeout()),
            stop(self.checker.take(), self.config.checker_stop_timeout()),
            stop(self.monitor.take(), self.config.monitor_stop_timeout()),
        );
        self.root.cancel();
        StopReport { sampler, checker, monitor }
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        self.root.cancel();
    }
}

impl Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("state", &self.state())
            .field("topology", &self.config.topology)
            .field("executors", &self.executors)
            .finish()
    }
}

async fn stop(handle: Option<TaskHandle>, timeout: std::time::Duration) -> Option<StopOutcome> {
    Some(handle?.stop(timeout).await)
}

#[allow(clippy::too_many_arguments)]
fn spawn_worker<S>(
    name: &'static str,
    strategy: S,
    input: &RelayChannel,
    output: &RelayChannel,
    send_timeout: std::time::Duration,
    executors: &Executors,
    root: &CancellationToken,
    faults: &mpsc::UnboundedSender<TaskFault>,
) -> TaskHandle
where
    S: RedundancyStrategy + Send + 'static,
    S::Input: Send,
    S::Output: Debug + Send + Sync,
{
    let worker = CrossCheckWorker::new(strategy, input.clone(), output.clone(), send_timeout);
    spawn_task(
        name,
        executors.handle(ExecutionContext::Producers),
        root,
        faults.clone(),
        |cancel| worker.run(cancel),
    )
}
