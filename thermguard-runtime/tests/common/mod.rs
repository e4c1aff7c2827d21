//! Shared rigs for the pipeline integration tests
//!
//! A [`Rig`] wires simulated sensors, a manual ticker, a recording restart
//! and a collecting sink into a [`Hardware`] bundle, and keeps the test-side
//! handles so scenarios can steer the sensors and inspect the results.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use thermguard_core::{Report, SystemState};
use thermguard_runtime::config::{PipelineConfig, Topology};
use thermguard_runtime::context::Executors;
use thermguard_runtime::monitor::CollectingSink;
use thermguard_runtime::restart::RecordingRestart;
use thermguard_runtime::sampler::BoxedSensor;
use thermguard_runtime::sim::{sim_thermistor, MemoryStore, SimProbe};
use thermguard_runtime::supervisor::{Hardware, Supervisor};
use thermguard_runtime::SupervisorError;
use thermguard_runtime::ticker::ManualTicker;
use tokio::time;

/// Gap left between manual ticks so every task gets to run
pub const TICK_GAP: Duration = Duration::from_millis(20);

/// Config with short timings for paused-time tests
pub fn test_config(topology: Topology) -> PipelineConfig {
    PipelineConfig {
        sampling_frequency_hz: 1,
        checker_period_ticks: 2,
        settle_delay_ms: 10,
        send_timeout_ms: 20,
        sampler_stop_timeout_ms: 200,
        checker_stop_timeout_ms: 200,
        monitor_stop_timeout_ms: 200,
        monitor_idle_yield_ms: 5,
        topology,
        ..PipelineConfig::default()
    }
}

/// Simulated board plus the handles a test needs to drive it
pub struct Rig {
    /// Bundle handed to `Supervisor::init`
    pub hardware: Hardware,
    /// Probes in sensor order: primary, secondary, tertiary
    pub probes: Vec<SimProbe>,
    /// Test side of the sampling ticker
    pub ticker: ManualTicker,
    /// Restart requests made by the pipeline
    pub restart: Arc<RecordingRestart>,
    /// Test side of the persistent store
    pub store: MemoryStore,
    /// Reports produced by the monitor
    pub sink: CollectingSink,
}

/// Rig whose sensors start at `temperatures` (two or three values)
pub fn rig(config: &PipelineConfig, temperatures: &[f32], store: MemoryStore) -> Rig {
    let calibrations = [config.primary, config.secondary, config.tertiary];
    let mut sensors = Vec::new();
    let mut probes = Vec::new();
    for (cal, &celsius) in calibrations.iter().zip(temperatures) {
        let (sensor, probe) = sim_thermistor(*cal, celsius);
        sensors.push(sensor);
        probes.push(probe);
    }
    let mut sensors = sensors.into_iter();

    let ticker = ManualTicker::new();
    let restart = Arc::new(RecordingRestart::new());
    let sink = CollectingSink::new();
    let hardware = Hardware {
        primary: Box::new(sensors.next().expect("primary sensor")),
        secondary: Box::new(sensors.next().expect("secondary sensor")),
        tertiary: sensors.next().map(|s| -> BoxedSensor { Box::new(s) }),
        ticker: Box::new(ticker.clone()),
        restart: restart.clone(),
        store: Box::new(store.clone()),
        sink: Box::new(sink.clone()),
    };

    Rig { hardware, probes, ticker, restart, store, sink }
}

/// Run INIT on the test's own runtime
pub async fn start(config: PipelineConfig, hardware: Hardware) -> Supervisor {
    Supervisor::init(config, hardware, Executors::current()).await.expect("supervisor init")
}

/// Run INIT expecting it to fail
pub async fn start_err(config: PipelineConfig, hardware: Hardware) -> SupervisorError {
    match Supervisor::init(config, hardware, Executors::current()).await {
        Ok(_) => panic!("supervisor init succeeded"),
        Err(err) => err,
    }
}

/// Give `count` sampling ticks, letting the pipeline drain after each
pub async fn tick(ticker: &ManualTicker, count: usize) {
    for _ in 0..count {
        assert!(ticker.tick(), "sampler has not armed the ticker");
        time::sleep(TICK_GAP).await;
    }
}

/// Reports produced in `state`
pub fn reports_in(sink: &CollectingSink, state: SystemState) -> Vec<Report> {
    sink.reports()
        .into_iter()
        .filter(|(s, _)| *s == state)
        .map(|(_, r)| r)
        .collect()
}

/// Approximate float comparison for ADC-quantized readings
pub fn assert_close(actual: f32, expected: f32, tolerance: f32) {
    assert!(
        (actual - expected).abs() <= tolerance,
        "expected {} ± {}, got {}",
        expected,
        tolerance,
        actual
    );
}
