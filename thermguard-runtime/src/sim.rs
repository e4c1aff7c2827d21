//! Simulated hardware
//!
//! Stand-ins for the ADC, the sensor power lines and the persistent store.
//! Every simulated part is a cheap clone over shared state, so a test keeps
//! one clone as a probe while the pipeline owns the other.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use thermguard_core::{
    AdcChannel, DelayMs, PersistentStore, PowerLine, SensorError, SensorResult, StoreError,
    Thermistor, ThermistorConfig,
};

/// Raw code a divider produces at `celsius`
///
/// Inverse of the beta model used by [`ThermistorConfig::code_to_celsius`].
pub fn celsius_to_code(config: &ThermistorConfig, celsius: f32) -> u16 {
    let kelvin = f64::from(celsius) + 273.15;
    let t0 = f64::from(config.nominal_temperature);
    let r_ntc = f64::from(config.nominal_resistance)
        * (f64::from(config.beta_coefficient) * (1.0 / kelvin - 1.0 / t0)).exp();
    let ratio = f64::from(config.series_resistance) / (f64::from(config.series_resistance) + r_ntc);
    let code = (ratio * f64::from(config.full_scale)).round();
    code.clamp(0.0, f64::from(config.full_scale)) as u16
}

#[derive(Debug)]
struct AdcState {
    code: u16,
    fault: Option<&'static str>,
    reads: u64,
}

/// Simulated ADC channel with a settable code
#[derive(Debug, Clone)]
pub struct SimAdc {
    channel: u8,
    state: Arc<Mutex<AdcState>>,
}

impl SimAdc {
    /// Channel that reads `code` until told otherwise
    pub fn new(channel: u8, code: u16) -> Self {
        Self {
            channel,
            state: Arc::new(Mutex::new(AdcState { code, fault: None, reads: 0 })),
        }
    }

    /// Change the code returned by subsequent conversions
    pub fn set_code(&self, code: u16) {
        self.state.lock().code = code;
    }

    /// Make every subsequent conversion fail with `reason`
    pub fn inject_fault(&self, reason: &'static str) {
        self.state.lock().fault = Some(reason);
    }

    /// Conversions performed so far
    pub fn reads(&self) -> u64 {
        self.state.lock().reads
    }
}

impl AdcChannel for SimAdc {
    fn channel(&self) -> u8 {
        self.channel
    }

    fn read_raw(&mut self) -> SensorResult<u16> {
        let mut state = self.state.lock();
        if let Some(reason) = state.fault {
            return Err(SensorError::Conversion { channel: self.channel, reason });
        }
        state.reads += 1;
        Ok(state.code)
    }
}

/// Simulated power control line
#[derive(Debug, Clone)]
pub struct SimPowerLine {
    id: u8,
    powered: Arc<AtomicBool>,
    switches: Arc<AtomicU32>,
}

impl SimPowerLine {
    /// Unpowered line
    pub fn new(id: u8) -> Self {
        Self {
            id,
            powered: Arc::new(AtomicBool::new(false)),
            switches: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Whether the line is driven high
    pub fn is_powered(&self) -> bool {
        self.powered.load(Ordering::Acquire)
    }

    /// Number of times the line was switched on or off
    pub fn switches(&self) -> u32 {
        self.switches.load(Ordering::Acquire)
    }
}

impl PowerLine for SimPowerLine {
    fn id(&self) -> u8 {
        self.id
    }

    fn set_powered(&mut self, on: bool) -> SensorResult<()> {
        self.powered.store(on, Ordering::Release);
        self.switches.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }
}

/// Settle delay that only records how long it was asked to wait
///
/// Simulated parts settle instantly, so nothing sleeps and the producer
/// executor is never blocked.
#[derive(Debug, Clone, Default)]
pub struct SimDelay {
    requested_ms: Arc<AtomicU64>,
}

impl SimDelay {
    /// Total milliseconds requested so far
    pub fn requested_ms(&self) -> u64 {
        self.requested_ms.load(Ordering::Acquire)
    }
}

impl DelayMs for SimDelay {
    fn delay_ms(&mut self, ms: u32) {
        self.requested_ms.fetch_add(u64::from(ms), Ordering::AcqRel);
    }
}

/// Thermistor wired to simulated parts
pub type SimThermistor = Thermistor<SimAdc, SimPowerLine, SimDelay>;

/// Test-side view of a [`SimThermistor`]
#[derive(Debug, Clone)]
pub struct SimProbe {
    config: ThermistorConfig,
    /// ADC the thermistor reads
    pub adc: SimAdc,
    /// Power line of the thermistor
    pub power: SimPowerLine,
    /// Settle delay of the thermistor
    pub delay: SimDelay,
}

impl SimProbe {
    /// Make the simulated divider read `celsius`
    pub fn set_celsius(&self, celsius: f32) {
        self.adc.set_code(celsius_to_code(&self.config, celsius));
    }

    /// Whether the sensor is powered
    pub fn is_powered(&self) -> bool {
        self.power.is_powered()
    }
}

/// Simulated thermistor reading `celsius`, plus a probe to steer it
pub fn sim_thermistor(config: ThermistorConfig, celsius: f32) -> (SimThermistor, SimProbe) {
    let adc = SimAdc::new(config.channel, celsius_to_code(&config, celsius));
    let power = SimPowerLine::new(config.power_control);
    let delay = SimDelay::default();
    let probe = SimProbe { config, adc: adc.clone(), power: power.clone(), delay: delay.clone() };
    (Thermistor::new(config, adc, power, delay), probe)
}

#[derive(Debug, Default)]
struct StoreState {
    init_results: VecDeque<Result<(), StoreError>>,
    inits: u32,
    erases: u32,
}

/// In-memory persistent store with scripted `init` results
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<StoreState>>,
}

impl MemoryStore {
    /// Store whose `init` always succeeds
    pub fn new() -> Self {
        Self::default()
    }

    /// Store whose first `init` calls return `results`, then succeed
    pub fn scripted(results: impl IntoIterator<Item = Result<(), StoreError>>) -> Self {
        let store = Self::default();
        store.state.lock().init_results = results.into_iter().collect();
        store
    }

    /// Calls to `init` so far
    pub fn inits(&self) -> u32 {
        self.state.lock().inits
    }

    /// Calls to `erase` so far
    pub fn erases(&self) -> u32 {
        self.state.lock().erases
    }
}

impl PersistentStore for MemoryStore {
    fn init(&mut self) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        state.inits += 1;
        state.init_results.pop_front().unwrap_or(Ok(()))
    }

    fn erase(&mut self) -> Result<(), StoreError> {
        self.state.lock().erases += 1;
        Ok(())
    }
}
