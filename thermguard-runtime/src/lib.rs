//! Task Runtime for the ThermGuard Telemetry Pipeline
//!
//! ## Overview
//!
//! This crate runs the algorithms of `thermguard-core` as a fixed set of
//! concurrent tasks on tokio. The topology is chosen at startup and never
//! changes:
//!
//! ```text
//!  producers context                                      sink context
//!  ─────────────────                                      ────────────
//!  ticker ─► Sampler ─paired─► [checker relay] ─► Checker ─┐
//!               │                                          ├─► [monitor relay] ─► Monitor
//!               └──────────────── primary ─────────────────┘        (ReportSink)
//!
//!  Supervisor: owns SystemState, starts and stops every task
//! ```
//!
//! The triple topologies replace the checker with a voter and send every
//! tick's three readings through the upstream relay.
//!
//! ## Task Model
//!
//! | Task | Context | Suspends on | Fatal faults |
//! |------|---------|-------------|--------------|
//! | sampler | producers | ticker wakeup (with watchdog deadline) | sensor fault, missed deadline |
//! | checker / voter | producers | upstream receive | relay misuse |
//! | monitor | sink | monitor receive, state change, idle yield | relay misuse |
//!
//! Every task takes a cancellation token and is stopped with a deadline; a
//! task that misses it is force-terminated.
//!
//! ## Backpressure
//!
//! Producers never block longer than the send timeout. A relay that stays
//! full drops the newest record and logs a warning with the free space left.
//! Consumers release every record they take, so space comes back as soon as
//! a record has been interpreted.
//!
//! ## Example Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use thermguard_runtime::{
//!     config::PipelineConfig, context::Executors, monitor::LogSink, restart::ProcessRestart,
//!     sim::{sim_thermistor, MemoryStore}, supervisor::{Hardware, Supervisor},
//!     ticker::IntervalTicker,
//! };
//! use thermguard_core::SystemState;
//!
//! # async fn run() -> Result<(), thermguard_runtime::SupervisorError> {
//! let config = PipelineConfig::default();
//! let (primary, _) = sim_thermistor(config.primary, 21.0);
//! let (secondary, _) = sim_thermistor(config.secondary, 21.3);
//!
//! let hardware = Hardware {
//!     primary: Box::new(primary),
//!     secondary: Box::new(secondary),
//!     tertiary: None,
//!     ticker: Box::new(IntervalTicker::new()),
//!     restart: Arc::new(ProcessRestart::default()),
//!     store: Box::new(MemoryStore::new()),
//!     sink: Box::new(LogSink),
//! };
//!
//! let mut supervisor = Supervisor::init(config, hardware, Executors::pinned()?).await?;
//! supervisor.transition(SystemState::Normal).await?;
//! if let Some((fault, _report)) = supervisor.supervise().await {
//!     eprintln!("pipeline stopped: {}", fault.error);
//! }
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod context;
pub mod error;
pub mod monitor;
pub mod relay;
pub mod restart;
pub mod sampler;
pub mod signal;
pub mod sim;
pub mod state;
pub mod supervisor;
pub mod task;
pub mod ticker;
pub mod worker;

// Re-export common types
pub use config::{PipelineConfig, Topology};
pub use error::{ConfigError, SupervisorError, TaskError};
pub use relay::{Received, RelayChannel, SendError, WriteSlot};
pub use supervisor::{Hardware, StopReport, Supervisor};
pub use task::{StopOutcome, TaskFault};
