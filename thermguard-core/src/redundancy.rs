//! Redundancy Strategies for Cross-Validating Sensors
//!
//! ## Overview
//!
//! A redundant sensor is only useful if something compares it with its
//! siblings. The pipeline supports three ways of doing that, all behind
//! [`RedundancyStrategy`] so the runtime drives them with a single worker:
//!
//! | Strategy | Sensors | Input | Output |
//! |----------|---------|-------|--------|
//! | [`DeviationCheck`] | 2 | paired [`SensorSample`] | checked [`SensorSample`] |
//! | [`AveragingVote`] | 3 | [`TripleSample`] | [`AveragedSample`] |
//! | [`BitmaskMajorityVote`] | 3 | [`TripleSample`] | [`VotedSample`] |
//!
//! ## Deviation
//!
//! The absolute difference between two readings of the same quantity. It is a
//! trust signal, not a correction: the monitor uses the latest deviation to
//! widen its reports in degraded mode.
//!
//! ## Bitmask Majority
//!
//! Each raw code is masked, then every bit is decided by majority:
//!
//! ```text
//! result = (m1 & m2) | (m1 & m3) | (m2 & m3)
//!
//! m1 = 1010
//! m2 = 1000
//! m3 = 0010
//!      ----
//!      1010   bit 3: m1,m2 agree; bit 1: m1,m3 agree
//! ```
//!
//! A bit survives iff at least two sensors agree on it, so a single sensor
//! with a stuck or flipped bit is outvoted without discarding the reading.
//! Bits outside the mask are cleared, trading resolution for immunity to
//! noise in the low-order bits.

use crate::record::{AveragedSample, Record, SensorSample, TripleSample, VotedSample};

/// One way of combining redundant readings into a downstream record
pub trait RedundancyStrategy {
    /// Record read from the upstream relay
    type Input: Record;

    /// Record written to the monitor relay
    type Output: Record;

    /// Short name for log lines
    fn name(&self) -> &'static str;

    /// Combine one upstream record
    fn combine(&self, input: &Self::Input) -> Self::Output;
}

/// Absolute deviation between two readings
pub fn deviation(temperature1: f32, temperature2: f32) -> f32 {
    libm::fabsf(temperature1 - temperature2)
}

/// Per-bit majority of three masked codes
pub const fn majority_vote(mask: u16, v1: u16, v2: u16, v3: u16) -> u16 {
    let (m1, m2, m3) = (v1 & mask, v2 & mask, v3 & mask);
    (m1 & m2) | (m1 & m3) | (m2 & m3)
}

/// Arithmetic mean of three readings
pub fn average(values: [f32; 3]) -> f32 {
    (values[0] + values[1] + values[2]) / 3.0
}

/// Dual-sensor deviation check
#[derive(Debug, Clone, Copy, Default)]
pub struct DeviationCheck;

impl RedundancyStrategy for DeviationCheck {
    type Input = SensorSample;
    type Output = SensorSample;

    fn name(&self) -> &'static str {
        "deviation-check"
    }

    fn combine(&self, input: &SensorSample) -> SensorSample {
        let dev = deviation(input.temperature1, input.temperature2);
        SensorSample::checked(input.temperature1, input.temperature2, dev)
    }
}

/// Triple-sensor mean of the converted temperatures
#[derive(Debug, Clone, Copy, Default)]
pub struct AveragingVote;

impl RedundancyStrategy for AveragingVote {
    type Input = TripleSample;
    type Output = AveragedSample;

    fn name(&self) -> &'static str {
        "averaging-vote"
    }

    fn combine(&self, input: &TripleSample) -> AveragedSample {
        AveragedSample(average(input.celsius))
    }
}

/// Triple-sensor per-bit majority of the raw codes
#[derive(Debug, Clone, Copy)]
pub struct BitmaskMajorityVote {
    mask: u16,
}

impl BitmaskMajorityVote {
    /// Vote over the bits selected by `mask`
    pub const fn new(mask: u16) -> Self {
        Self { mask }
    }

    /// Mask applied to every input
    pub const fn mask(&self) -> u16 {
        self.mask
    }
}

impl Default for BitmaskMajorityVote {
    /// Full 12-bit resolution
    fn default() -> Self {
        Self::new(0x0FFF)
    }
}

impl RedundancyStrategy for BitmaskMajorityVote {
    type Input = TripleSample;
    type Output = VotedSample;

    fn name(&self) -> &'static str {
        "bitmask-majority-vote"
    }

    fn combine(&self, input: &TripleSample) -> VotedSample {
        let [v1, v2, v3] = input.raw;
        VotedSample(majority_vote(self.mask, v1, v2, v3))
    }
}
