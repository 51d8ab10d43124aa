//! Deterministic signal generator.
//!
//! Produces unmodulated carriers at fixed RF frequencies. A carrier shows up
//! in a block whenever it lies inside the tuned passband, at its offset from
//! the center frequency, so scanning and squelch behave as they would on air.

use crate::error::Result;
use crate::source::{SampleBlock, SampleSource, TunerState};
use num_complex::Complex32;
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;

/// A continuous-wave carrier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Carrier {
    /// RF frequency in Hz.
    pub frequency: u64,
    /// Linear amplitude, 1.0 is full scale.
    #[serde(default = "default_amplitude")]
    pub amplitude: f32,
}

fn default_amplitude() -> f32 {
    0.5
}

impl Carrier {
    pub fn new(frequency: u64, amplitude: f32) -> Self {
        Self {
            frequency,
            amplitude,
        }
    }
}

pub struct SyntheticSource {
    sample_rate: u32,
    block_size: usize,
    center_freq: u64,
    carriers: Vec<Carrier>,
    /// Running phase per carrier, in radians.
    phases: Vec<f64>,
}

impl SyntheticSource {
    pub fn new(sample_rate: u32, block_size: usize, carriers: Vec<Carrier>) -> Self {
        let phases = vec![0.0; carriers.len()];
        Self {
            sample_rate,
            block_size,
            center_freq: crate::defaults::DEFAULT_FREQUENCY,
            carriers,
            phases,
        }
    }

    pub fn carriers(&self) -> &[Carrier] {
        &self.carriers
    }

    fn offset(&self, carrier: &Carrier) -> Option<f64> {
        let offset = carrier.frequency as f64 - self.center_freq as f64;
        (offset.abs() < self.sample_rate as f64 / 2.0).then_some(offset)
    }
}

impl SampleSource for SyntheticSource {
    fn apply(&mut self, tuner: &TunerState) -> Result<()> {
        self.center_freq = tuner.center_freq;
        self.sample_rate = tuner.sample_rate;
        Ok(())
    }

    fn next_block(&mut self) -> Result<SampleBlock> {
        let mut samples = vec![Complex32::new(0.0, 0.0); self.block_size];
        let rate = self.sample_rate as f64;

        for idx in 0..self.carriers.len() {
            let carrier = &self.carriers[idx];
            let step = match self.offset(carrier) {
                Some(offset) => TAU * offset / rate,
                None => continue,
            };
            let amplitude = carrier.amplitude;
            let mut phase = self.phases[idx];
            for sample in samples.iter_mut() {
                *sample += Complex32::from_polar(amplitude, phase as f32);
                phase = (phase + step) % TAU;
            }
            self.phases[idx] = phase;
        }

        Ok(SampleBlock::new(samples, self.sample_rate, self.center_freq))
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn is_realtime(&self) -> bool {
        false
    }

    fn describe(&self) -> String {
        format!("synthetic ({} carriers)", self.carriers.len())
    }
}
