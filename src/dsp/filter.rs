//! FIR design and decimating filters.

use num_complex::Complex32;
use std::f32::consts::PI;
use std::ops::{AddAssign, Mul};

/// Windowed-sinc low-pass taps with a Blackman window, normalised to unity
/// gain at DC.
pub fn lowpass_taps(cutoff_hz: f32, sample_rate: f32, taps: usize) -> Vec<f32> {
    let taps = taps.max(1);
    let cutoff_norm = (cutoff_hz / sample_rate).clamp(0.0, 0.5);
    let m = (taps - 1) as f32;

    let mut coeffs: Vec<f32> = (0..taps)
        .map(|i| {
            let x = i as f32 - m / 2.0;
            let sinc = if x == 0.0 {
                2.0 * cutoff_norm
            } else {
                (2.0 * PI * cutoff_norm * x).sin() / (PI * x)
            };
            let window = if taps == 1 {
                1.0
            } else {
                let t = i as f32 / m;
                0.42 - 0.5 * (2.0 * PI * t).cos() + 0.08 * (4.0 * PI * t).cos()
            };
            sinc * window
        })
        .collect();

    let sum: f32 = coeffs.iter().sum();
    if sum.abs() > 1e-12 {
        for c in &mut coeffs {
            *c /= sum;
        }
    }
    coeffs
}

/// Blackman window of length `n`.
pub fn blackman(n: usize) -> Vec<f32> {
    if n <= 1 {
        return vec![1.0; n];
    }
    let m = (n - 1) as f32;
    (0..n)
        .map(|i| {
            let t = i as f32 / m;
            0.42 - 0.5 * (2.0 * PI * t).cos() + 0.08 * (4.0 * PI * t).cos()
        })
        .collect()
}

/// Anything a real-valued FIR can be applied to.
pub trait Sample: Copy + Default + Mul<f32, Output = Self> + AddAssign {}

impl Sample for f32 {}
impl Sample for Complex32 {}

/// FIR low-pass fused with a downsampler.
///
/// Only the outputs that survive decimation are computed, which is the
/// polyphase decomposition written as a strided dot product: filtering and
/// rate reduction happen in one pass. State (the last `taps - 1` inputs and
/// the decimation phase) carries across blocks, so block boundaries are
/// seamless. A factor of 1 is a plain FIR filter.
#[derive(Debug, Clone)]
pub struct FirDecimator<T> {
    taps: Vec<f32>,
    factor: usize,
    history: Vec<T>,
    /// Position of the next retained output within the next input block.
    offset: usize,
    scratch: Vec<T>,
}

impl<T: Sample> FirDecimator<T> {
    pub fn new(taps: Vec<f32>, factor: usize) -> Self {
        let taps = if taps.is_empty() { vec![1.0] } else { taps };
        let history = vec![T::default(); taps.len() - 1];
        Self {
            taps,
            factor: factor.max(1),
            history,
            offset: 0,
            scratch: Vec::new(),
        }
    }

    /// Low-pass at `cutoff_hz` and keep every `factor`-th sample.
    pub fn lowpass(cutoff_hz: f32, sample_rate: f32, taps: usize, factor: usize) -> Self {
        Self::new(lowpass_taps(cutoff_hz, sample_rate, taps), factor)
    }

    pub fn factor(&self) -> usize {
        self.factor
    }

    pub fn process(&mut self, input: &[T]) -> Vec<T> {
        let hist = self.history.len();
        let n_taps = self.taps.len();

        self.scratch.clear();
        self.scratch.extend_from_slice(&self.history);
        self.scratch.extend_from_slice(input);

        let mut out = Vec::with_capacity(input.len() / self.factor + 1);
        let mut pos = hist + self.offset;
        while pos < self.scratch.len() {
            let window = &self.scratch[pos + 1 - n_taps..=pos];
            let mut acc = T::default();
            for (x, &h) in window.iter().rev().zip(&self.taps) {
                acc += *x * h;
            }
            out.push(acc);
            pos += self.factor;
        }
        self.offset = pos - self.scratch.len();

        let keep_from = self.scratch.len() - hist;
        self.history.copy_from_slice(&self.scratch[keep_from..]);
        out
    }

    /// Forget all history, as if freshly constructed.
    pub fn reset(&mut self) {
        self.history.fill(T::default());
        self.offset = 0;
    }
}
