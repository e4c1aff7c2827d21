//! Monitor task: the pipeline's terminal consumer
//!
//! The state is re-read on every iteration and decides what happens next:
//! consume a record (NORMAL, DEGRADED), yield briefly without touching the
//! relay (INIT, RUNNING), or leave the loop (ERROR). While waiting for a
//! record the monitor also watches the state, so ERROR ends it promptly even
//! when no record arrives.
//!
//! Interpretation itself lives in [`ReadingInterpreter`]; this module only
//! waits, decodes and hands [`Report`]s to a [`ReportSink`].

use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};
use parking_lot::Mutex;
use thermguard_core::{Gate, Observation, ReadingInterpreter, Report, SystemState};
use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::error::TaskError;
use crate::relay::RelayChannel;
use crate::state::StateReader;

/// Destination of monitor reports
pub trait ReportSink: Send {
    /// Handle one report produced in `state`
    fn report(&mut self, state: SystemState, report: &Report);
}

/// Writes reports to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl ReportSink for LogSink {
    fn report(&mut self, state: SystemState, report: &Report) {
        match *report {
            Report::Point { celsius } => info!("[{}] temperature {:.2} °C", state, celsius),
            Report::Band { low, high, deviation } => info!(
                "[{}] temperature in [{:.2}, {:.2}] °C (deviation {:.3})",
                state, low, high, deviation
            ),
            Report::CrossCheck { temperature1, temperature2, deviation } => info!(
                "[{}] cross-check {:.2} / {:.2} °C, deviation {:.3}",
                state, temperature1, temperature2, deviation
            ),
            Report::RawCode { code } => info!("[{}] voted code {}", state, code),
        }
    }
}

/// Keeps every report in memory
#[derive(Debug, Clone, Default)]
pub struct CollectingSink {
    reports: Arc<Mutex<Vec<(SystemState, Report)>>>,
}

impl CollectingSink {
    /// Empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Reports received so far, oldest first
    pub fn reports(&self) -> Vec<(SystemState, Report)> {
        self.reports.lock().clone()
    }
}

impl ReportSink for CollectingSink {
    fn report(&mut self, state: SystemState, report: &Report) {
        self.reports.lock().push((state, *report));
    }
}

impl<K: ReportSink + ?Sized> ReportSink for Box<K> {
    fn report(&mut self, state: SystemState, report: &Report) {
        (**self).report(state, report)
    }
}

/// Monitor task state
pub struct Monitor<K> {
    input: RelayChannel,
    state: StateReader,
    interpreter: ReadingInterpreter,
    sink: K,
    idle_yield: Duration,
}

impl<K: ReportSink> Monitor<K> {
    /// Monitor consuming `input`, gated by `state`
    pub fn new(
        input: RelayChannel,
        state: StateReader,
        interpreter: ReadingInterpreter,
        sink: K,
        idle_yield: Duration,
    ) -> Self {
        Self { input, state, interpreter, sink, idle_yield }
    }

    /// Run until the state is ERROR or a stop is requested
    pub async fn run(mut self, cancel: CancellationToken) -> Result<(), TaskError> {
        loop {
            let state = self.state.current();
            match Gate::for_state(state) {
                Gate::Terminate => {
                    info!("monitor: state is {}, leaving", state);
                    return Ok(());
                }
                Gate::Idle => {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Ok(()),
                        _ = time::sleep(self.idle_yield) => {}
                    }
                    continue;
                }
                Gate::Consume => {}
            }

            let received = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(()),
                _ = self.state.changed() => continue,
                received = self.input.receive(None) => received?,
            };

            match received.with_bytes(Observation::decode)? {
                Ok(observation) => {
                    if let Some(report) = self.interpreter.interpret(state, observation) {
                        self.sink.report(state, &report);
                    }
                }
                Err(err) => {
                    warn!("monitor: skipping malformed {}-byte record: {}", received.len(), err)
                }
            }
            received.release()?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::state_register;
    use thermguard_core::SensorSample;

    fn monitor_on(
        input: &RelayChannel,
        state: StateReader,
        sink: &CollectingSink,
    ) -> Monitor<CollectingSink> {
        let idle = Duration::from_millis(10);
        Monitor::new(input.clone(), state, ReadingInterpreter::new(), sink.clone(), idle)
    }

    #[tokio::test(start_paused = true)]
    async fn idles_until_reporting_state_then_reports() {
        let (writer, reader) = state_register();
        let input = RelayChannel::new("monitor", 128);
        let sink = CollectingSink::new();
        let monitor = monitor_on(&input, reader, &sink);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(monitor.run(cancel.clone()));

        input.send_record(&SensorSample::from_sensor(100.0), Duration::ZERO).await.unwrap();
        writer.transition(SystemState::Running).unwrap();
        time::sleep(Duration::from_millis(50)).await;
        // Not consumed outside NORMAL/DEGRADED
        assert_eq!(input.pending(), 1);

        writer.transition(SystemState::Normal).unwrap();
        time::sleep(Duration::from_millis(50)).await;
        assert_eq!(sink.reports(), vec![(SystemState::Normal, Report::Point { celsius: 100.0 })]);
        assert_eq!(input.in_flight_bytes(), 0);

        cancel.cancel();
        task.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn error_state_ends_the_loop_without_a_record() {
        let (writer, reader) = state_register();
        let monitor = Monitor::new(
            RelayChannel::new("monitor", 128),
            reader,
            ReadingInterpreter::new(),
            CollectingSink::new(),
            Duration::from_millis(10),
        );
        writer.transition(SystemState::Running).unwrap();
        writer.transition(SystemState::Normal).unwrap();
        let task = tokio::spawn(monitor.run(CancellationToken::new()));
        time::sleep(Duration::from_millis(20)).await;

        writer.transition(SystemState::Error).unwrap();
        time::timeout(Duration::from_millis(100), task).await.unwrap().unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_record_is_released_and_skipped() {
        let (writer, reader) = state_register();
        writer.transition(SystemState::Running).unwrap();
        writer.transition(SystemState::Normal).unwrap();
        let input = RelayChannel::new("monitor", 128);
        let sink = CollectingSink::new();
        let task = tokio::spawn(monitor_on(&input, reader, &sink).run(CancellationToken::new()));

        input.send(&[42; 5], Duration::ZERO).await.unwrap();
        input.send_record(&SensorSample::from_sensor(21.0), Duration::ZERO).await.unwrap();
        time::sleep(Duration::from_millis(20)).await;

        assert_eq!(sink.reports().len(), 1);
        assert_eq!(input.stats().released, 2);
        writer.transition(SystemState::Error).unwrap();
        task.await.unwrap().unwrap();
    }
}
