//! End-to-end tests of the supervised pipeline on simulated hardware
//!
//! Every test runs on a paused clock with both execution contexts mapped
//! onto the test runtime, so timeouts and watchdog deadlines are exact.

mod common;

use std::time::Duration;

use common::{assert_close, reports_in, rig, start, start_err, test_config, tick, TICK_GAP};
use thermguard_core::{Report, StoreError, SystemState};
use thermguard_runtime::config::Topology;
use thermguard_runtime::sim::MemoryStore;
use thermguard_runtime::{StopOutcome, SupervisorError, TaskError};
use tokio::time;

#[tokio::test(start_paused = true)]
async fn init_settles_into_running() {
    let config = test_config(Topology::Dual);
    let rig = rig(&config, &[21.0, 21.0], MemoryStore::new());

    let started = time::Instant::now();
    let supervisor = start(config, rig.hardware).await;

    assert!(started.elapsed() >= Duration::from_millis(10));
    assert_eq!(supervisor.state(), SystemState::Running);
    assert_eq!(rig.store.inits(), 1);
    assert_eq!(rig.store.erases(), 0);
    assert!(rig.ticker.is_armed());
    // Only the primary stays powered between paired reads
    assert!(rig.probes[0].is_powered());
    assert!(!rig.probes[1].is_powered());

    let report = supervisor.shutdown().await;
    assert!(!report.any_forced());
}

#[tokio::test(start_paused = true)]
async fn incompatible_store_is_erased_and_init_continues() {
    let config = test_config(Topology::Dual);
    let store = MemoryStore::scripted([Err(StoreError::IncompatibleFormat)]);
    let rig = rig(&config, &[21.0, 21.0], store);

    let supervisor = start(config, rig.hardware).await;

    assert_eq!(supervisor.state(), SystemState::Running);
    assert_eq!(rig.store.inits(), 2);
    assert_eq!(rig.store.erases(), 1);
    assert_eq!(rig.restart.count(), 0);
    supervisor.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn store_failing_after_erase_restarts_the_device() {
    let config = test_config(Topology::Dual);
    let store = MemoryStore::scripted([
        Err(StoreError::NoFreePages),
        Err(StoreError::Io("flash timeout")),
    ]);
    let rig = rig(&config, &[21.0, 21.0], store);

    let err = start_err(config, rig.hardware).await;

    assert!(matches!(err, SupervisorError::Store(StoreError::Io("flash timeout"))));
    assert_eq!(rig.store.erases(), 1);
    assert_eq!(rig.restart.count(), 1);
    // Nothing was started
    assert!(!rig.ticker.is_armed());
}

#[tokio::test(start_paused = true)]
async fn invalid_config_is_rejected_before_touching_hardware() {
    let mut config = test_config(Topology::Dual);
    config.watchdog_factor = 1.0;
    let rig = rig(&config, &[21.0, 21.0], MemoryStore::new());

    let err = start_err(config, rig.hardware).await;

    assert!(matches!(err, SupervisorError::Config(_)));
    assert_eq!(rig.store.inits(), 0);
    assert_eq!(rig.restart.count(), 0);
}

#[tokio::test(start_paused = true)]
async fn triple_topology_needs_a_third_sensor() {
    let config = test_config(Topology::TripleAveraging);
    let rig = rig(&config, &[21.0, 21.0], MemoryStore::new());

    let err = start_err(config, rig.hardware).await;
    assert!(matches!(err, SupervisorError::Config(_)));
    assert!(err.to_string().contains("needs 3 sensors, 2 provided"), "{}", err);
    assert_eq!(rig.store.inits(), 0);
    assert!(!rig.probes[0].is_powered());
}

#[tokio::test(start_paused = true)]
async fn dual_topology_ignores_a_spare_sensor() {
    let config = test_config(Topology::Dual);
    let rig = rig(&config, &[21.0, 21.0, 40.0], MemoryStore::new());
    let mut supervisor = start(config, rig.hardware).await;
    supervisor.transition(SystemState::Normal).await.unwrap();

    tick(&rig.ticker, 1).await;
    let reports = reports_in(&rig.sink, SystemState::Normal);
    assert_eq!(reports.len(), 1);
    match reports[0] {
        Report::Point { celsius } => assert_close(celsius, 21.0, 0.2),
        other => panic!("unexpected report {:?}", other),
    }
    assert!(!rig.probes[2].is_powered());
    supervisor.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn monitor_ignores_records_until_a_reporting_state() {
    let config = test_config(Topology::Dual);
    let rig = rig(&config, &[30.0, 30.0], MemoryStore::new());
    let mut supervisor = start(config, rig.hardware).await;

    tick(&rig.ticker, 1).await;
    assert!(rig.sink.reports().is_empty());
    assert_eq!(supervisor.monitor_relay().pending(), 1);

    supervisor.transition(SystemState::Normal).await.unwrap();
    time::sleep(TICK_GAP).await;

    let reports = reports_in(&rig.sink, SystemState::Normal);
    assert_eq!(reports.len(), 1);
    match reports[0] {
        Report::Point { celsius } => assert_close(celsius, 30.0, 0.2),
        other => panic!("unexpected report {:?}", other),
    }
    assert_eq!(supervisor.monitor_relay().in_flight_bytes(), 0);
    supervisor.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn degraded_mode_widens_readings_by_the_checked_deviation() {
    let config = test_config(Topology::Dual);
    let rig = rig(&config, &[20.0, 20.5], MemoryStore::new());
    let mut supervisor = start(config, rig.hardware).await;

    supervisor.transition(SystemState::Normal).await.unwrap();
    tick(&rig.ticker, 2).await;
    supervisor.transition(SystemState::Degraded).await.unwrap();
    tick(&rig.ticker, 3).await;

    // NORMAL reports points and does not remember deviations
    let normal = reports_in(&rig.sink, SystemState::Normal);
    assert!(normal.iter().any(|r| matches!(r, Report::Point { .. })));
    assert!(normal.iter().any(|r| matches!(r, Report::CrossCheck { .. })));

    // Tick 3 is a point widened by nothing, tick 4 is paired, tick 5 uses its deviation
    let degraded = reports_in(&rig.sink, SystemState::Degraded);
    let checked = degraded
        .iter()
        .find_map(|r| match *r {
            Report::CrossCheck { temperature1, temperature2, deviation } => {
                assert_close(temperature1, 20.0, 0.2);
                assert_close(temperature2, 20.5, 0.2);
                Some(deviation)
            }
            _ => None,
        })
        .expect("a cross-check in DEGRADED");
    assert_close(checked, 0.5, 0.3);

    match degraded.first() {
        Some(Report::Band { low, high, deviation }) => {
            assert_eq!(*deviation, 0.0);
            assert_eq!(low, high);
        }
        other => panic!("expected an unwidened band first, got {:?}", other),
    }
    match degraded.last() {
        Some(Report::Band { low, high, deviation }) => {
            assert_eq!(*deviation, checked);
            assert!(low < high);
            let (expected_low, expected_high) = thermguard_core::degraded_band(20.0, checked);
            assert_close(*low, expected_low, 0.5);
            assert_close(*high, expected_high, 0.5);
        }
        other => panic!("expected a widened band last, got {:?}", other),
    }

    supervisor.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn triple_averaging_reports_the_mean() {
    let config = test_config(Topology::TripleAveraging);
    let rig = rig(&config, &[20.0, 22.0, 24.0], MemoryStore::new());
    let mut supervisor = start(config, rig.hardware).await;
    assert_eq!(supervisor.upstream_relay().name(), "voter");
    assert!(rig.probes.iter().all(|p| p.is_powered()));

    supervisor.transition(SystemState::Normal).await.unwrap();
    tick(&rig.ticker, 2).await;

    let reports = reports_in(&rig.sink, SystemState::Normal);
    assert_eq!(reports.len(), 2);
    for report in reports {
        match report {
            Report::Point { celsius } => assert_close(celsius, 22.0, 0.2),
            other => panic!("unexpected report {:?}", other),
        }
    }

    supervisor.shutdown().await;
    assert!(rig.probes.iter().all(|p| !p.is_powered()));
}

#[tokio::test(start_paused = true)]
async fn triple_majority_reports_the_voted_code_as_temperature() {
    let config = test_config(Topology::TripleMajority { mask: 0xFFFF });
    let rig = rig(&config, &[25.0, 25.0, 25.0], MemoryStore::new());
    let mut supervisor = start(config, rig.hardware).await;

    supervisor.transition(SystemState::Normal).await.unwrap();
    tick(&rig.ticker, 1).await;

    match reports_in(&rig.sink, SystemState::Normal).as_slice() {
        [Report::Point { celsius }] => assert_close(*celsius, 25.0, 0.2),
        other => panic!("unexpected reports {:?}", other),
    }
    supervisor.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn illegal_transitions_leave_the_state_alone() {
    let config = test_config(Topology::Dual);
    let rig = rig(&config, &[21.0, 21.0], MemoryStore::new());
    let mut supervisor = start(config, rig.hardware).await;

    let err = supervisor.transition(SystemState::Init).await.unwrap_err();
    assert!(matches!(err, SupervisorError::Transition(_)));
    assert_eq!(supervisor.state(), SystemState::Running);

    assert_eq!(supervisor.transition(SystemState::Degraded).await.unwrap(), SystemState::Running);
    assert_eq!(supervisor.transition(SystemState::Normal).await.unwrap(), SystemState::Degraded);
    supervisor.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn error_stops_producers_and_the_monitor_leaves_by_itself() {
    let config = test_config(Topology::Dual);
    let rig = rig(&config, &[21.0, 21.0], MemoryStore::new());
    let mut supervisor = start(config, rig.hardware).await;
    supervisor.transition(SystemState::Normal).await.unwrap();
    tick(&rig.ticker, 1).await;

    let report = supervisor.enter_error("operator request").await;
    assert_eq!(report.sampler, Some(StopOutcome::Stopped));
    assert_eq!(report.checker, Some(StopOutcome::Stopped));
    assert_eq!(report.monitor, None);
    assert_eq!(supervisor.state(), SystemState::Error);
    assert!(!rig.ticker.is_armed());
    assert!(!rig.probes[0].is_powered());

    // ERROR is terminal
    assert!(supervisor.transition(SystemState::Normal).await.is_err());

    time::sleep(TICK_GAP).await;
    let report = supervisor.shutdown().await;
    assert_eq!(report.sampler, None);
    assert_eq!(report.checker, None);
    assert_eq!(report.monitor, Some(StopOutcome::Stopped));
}

#[tokio::test(start_paused = true)]
async fn stuck_sampler_is_force_terminated() {
    let mut config = test_config(Topology::Dual);
    // Two frames fit; the third send parks the sampler far beyond its stop timeout
    config.relay_capacity_bytes = 32;
    config.send_timeout_ms = 5_000;
    config.sampler_stop_timeout_ms = 50;
    config.checker_period_ticks = 1_000;
    let rig = rig(&config, &[21.0, 21.0], MemoryStore::new());
    let mut supervisor = start(config, rig.hardware).await;

    // RUNNING: the monitor does not drain its relay
    tick(&rig.ticker, 3).await;
    assert_eq!(supervisor.monitor_relay().pending(), 2);

    let started = time::Instant::now();
    let report = supervisor.enter_error("test").await;
    assert!(started.elapsed() < Duration::from_millis(200));
    assert_eq!(report.sampler, Some(StopOutcome::ForceTerminated));
    assert_eq!(report.checker, Some(StopOutcome::Stopped));
    assert!(report.any_forced());

    // The aborted sampler still powers its sensor down
    time::sleep(TICK_GAP).await;
    assert!(!rig.probes[0].is_powered());
    supervisor.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn missed_tick_restarts_and_moves_to_error() {
    let mut config = test_config(Topology::Dual);
    config.sampling_frequency_hz = 10;
    let rig = rig(&config, &[21.0, 21.0], MemoryStore::new());
    let mut supervisor = start(config, rig.hardware).await;

    // No ticks at all
    let (fault, report) = supervisor.supervise().await.expect("a fault");

    let deadline = Duration::from_millis(120);
    assert_eq!(fault.task, "sampler");
    assert_eq!(fault.error, TaskError::WatchdogExpired { deadline });
    assert_eq!(report.sampler, Some(StopOutcome::Failed(TaskError::WatchdogExpired { deadline })));
    assert_eq!(report.checker, Some(StopOutcome::Stopped));
    assert_eq!(supervisor.state(), SystemState::Error);
    assert_eq!(rig.restart.count(), 1);
    assert!(rig.restart.reasons()[0].contains("watchdog"));
    supervisor.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn sensor_fault_moves_to_error_without_restart() {
    let config = test_config(Topology::Dual);
    let rig = rig(&config, &[21.0, 21.0], MemoryStore::new());
    let mut supervisor = start(config, rig.hardware).await;
    supervisor.transition(SystemState::Normal).await.unwrap();

    rig.probes[0].adc.inject_fault("adc stuck");
    assert!(rig.ticker.tick());
    let (fault, _report) = supervisor.supervise().await.expect("a fault");

    assert!(matches!(fault.error, TaskError::Sensor(_)));
    assert_eq!(supervisor.state(), SystemState::Error);
    assert_eq!(rig.restart.count(), 0);
    supervisor.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_every_task() {
    let config = test_config(Topology::TripleMajority { mask: 0x0FFF });
    let rig = rig(&config, &[18.0, 18.0, 18.0], MemoryStore::new());
    let mut supervisor = start(config, rig.hardware).await;
    supervisor.transition(SystemState::Degraded).await.unwrap();
    tick(&rig.ticker, 2).await;

    let report = supervisor.shutdown().await;
    assert_eq!(report.sampler, Some(StopOutcome::Stopped));
    assert_eq!(report.checker, Some(StopOutcome::Stopped));
    assert_eq!(report.monitor, Some(StopOutcome::Stopped));
    assert!(!rig.ticker.is_armed());
    assert!(rig.probes.iter().all(|p| !p.is_powered()));
}
