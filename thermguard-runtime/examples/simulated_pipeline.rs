//! Example: run the dual-sensor pipeline on simulated hardware.
//!
//! Walks the supervisor through every state: INIT and RUNNING, a few
//! seconds of NORMAL, a drifting secondary sensor under DEGRADED, then
//! ERROR and shutdown. Producers and the monitor run on their own threads.
//!
//! ```bash
//! cargo run -p thermguard-runtime --example simulated_pipeline
//! ```

use std::sync::Arc;
use std::time::Duration;

use thermguard_core::SystemState;
use thermguard_runtime::{
    config::{PipelineConfig, Topology},
    context::Executors,
    monitor::LogSink,
    restart::ProcessRestart,
    sim::{sim_thermistor, MemoryStore},
    supervisor::{Hardware, Supervisor},
    ticker::IntervalTicker,
};
use tokio::time;
use tracing_subscriber::filter::LevelFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialise logging; `log` records are bridged into tracing.
    tracing_subscriber::fmt()
        .with_max_level(LevelFilter::INFO)
        .init();

    let config = PipelineConfig {
        sampling_frequency_hz: 4,
        checker_period_ticks: 4,
        settle_delay_ms: 250,
        topology: Topology::Dual,
        ..PipelineConfig::default()
    };
    println!(
        "period {:?}, watchdog {:?}, relays {} bytes\n",
        config.period(),
        config.watchdog_deadline(),
        config.relay_capacity_bytes
    );

    let (primary, primary_probe) = sim_thermistor(config.primary, 21.0);
    let (secondary, secondary_probe) = sim_thermistor(config.secondary, 21.2);
    let hardware = Hardware {
        primary: Box::new(primary),
        secondary: Box::new(secondary),
        tertiary: None,
        ticker: Box::new(IntervalTicker::new()),
        restart: Arc::new(ProcessRestart::default()),
        store: Box::new(MemoryStore::new()),
        sink: Box::new(LogSink),
    };

    let mut supervisor = Supervisor::init(config, hardware, Executors::pinned()?).await?;

    supervisor.transition(SystemState::Normal).await?;
    time::sleep(Duration::from_secs(3)).await;

    // The secondary starts to drift; DEGRADED reports widen accordingly.
    secondary_probe.set_celsius(22.5);
    primary_probe.set_celsius(21.4);
    supervisor.transition(SystemState::Degraded).await?;
    time::sleep(Duration::from_secs(3)).await;

    let previous = supervisor.transition(SystemState::Error).await?;
    println!("\nentered ERROR from {}", previous);

    let checker = supervisor.upstream_relay().stats();
    let monitor = supervisor.monitor_relay().stats();
    println!(
        "checker relay: {} committed, {} dropped; monitor relay: {} committed, {} dropped",
        checker.committed, checker.dropped, monitor.committed, monitor.dropped
    );

    let stop = supervisor.shutdown().await;
    println!("shutdown: {:?}", stop);
    Ok(())
}
