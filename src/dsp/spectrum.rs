//! Spectrum analyzer for the visualization stream.

use crate::dsp::filter::blackman;
use num_complex::Complex32;
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;

/// Display range tracking: fast attack, slow release.
const SCALE_ATTACK: f32 = 0.3;
const SCALE_RELEASE: f32 = 0.05;
/// Narrowest display range in dB.
const MIN_SPAN_DB: f32 = 20.0;
/// Headroom added above the top percentile.
const HEADROOM_DB: f32 = 10.0;

/// One normalized visualization frame.
#[derive(Debug, Clone, PartialEq)]
pub struct SpectrumFrame {
    /// Magnitudes in [0, 1], DC in the middle.
    pub bins: Vec<f32>,
    /// Display floor in dBFS.
    pub min_db: f32,
    /// Display ceiling in dBFS.
    pub max_db: f32,
    /// Strongest bin in dBFS.
    pub peak_db: f32,
}

pub struct SpectrumAnalyzer {
    fft: Arc<dyn Fft<f32>>,
    size: usize,
    bins: usize,
    window: Vec<f32>,
    /// dB offset that puts a full-scale tone at 0 dBFS.
    reference_db: f32,
    buffer: Vec<Complex32>,
    scratch: Vec<Complex32>,
    mag_db: Vec<f32>,
    sorted: Vec<f32>,
    scale_min: f32,
    scale_max: f32,
}

impl SpectrumAnalyzer {
    pub fn new(size: usize, bins: usize) -> Self {
        let size = size.max(2);
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(size);
        let scratch_len = fft.get_inplace_scratch_len();
        let window = blackman(size);
        let gain: f32 = window.iter().sum();

        Self {
            fft,
            size,
            bins: bins.max(1),
            window,
            reference_db: 20.0 * gain.max(1e-12).log10(),
            buffer: vec![Complex32::new(0.0, 0.0); size],
            scratch: vec![Complex32::new(0.0, 0.0); scratch_len],
            mag_db: vec![0.0; size],
            sorted: Vec::with_capacity(size),
            scale_min: -100.0,
            scale_max: -20.0,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Transform the most recent `size` samples of a block.
    ///
    /// Short blocks are zero-padded at the end.
    pub fn process(&mut self, samples: &[Complex32]) -> SpectrumFrame {
        let n = self.size;
        let tail = &samples[samples.len().saturating_sub(n)..];

        for (i, slot) in self.buffer.iter_mut().enumerate() {
            let s = tail.get(i).copied().unwrap_or_default();
            *slot = s * self.window[i];
        }
        self.fft
            .process_with_scratch(&mut self.buffer, &mut self.scratch);

        // fftshift: negative frequencies first.
        let half = n / 2;
        for (i, db) in self.mag_db.iter_mut().enumerate() {
            let x = self.buffer[(i + n - half) % n];
            *db = 20.0 * (x.norm() + 1e-12).log10() - self.reference_db;
        }

        self.update_scale();
        let peak_db = self
            .mag_db
            .iter()
            .copied()
            .fold(f32::NEG_INFINITY, f32::max);

        let span = self.scale_max - self.scale_min;
        let bins = (0..self.bins)
            .map(|b| {
                let start = b * n / self.bins;
                let end = ((b + 1) * n / self.bins).max(start + 1).min(n);
                let db = self.mag_db[start..end]
                    .iter()
                    .copied()
                    .fold(f32::NEG_INFINITY, f32::max);
                ((db - self.scale_min) / span).clamp(0.0, 1.0)
            })
            .collect();

        SpectrumFrame {
            bins,
            min_db: self.scale_min,
            max_db: self.scale_max,
            peak_db,
        }
    }

    fn update_scale(&mut self) {
        self.sorted.clear();
        self.sorted.extend_from_slice(&self.mag_db);
        self.sorted.sort_unstable_by(|a, b| a.total_cmp(b));

        let low = percentile(&self.sorted, 2.0);
        let high = percentile(&self.sorted, 99.8) + HEADROOM_DB;

        let rate = if low < self.scale_min {
            SCALE_ATTACK
        } else {
            SCALE_RELEASE
        };
        self.scale_min += rate * (low - self.scale_min);
        let rate = if high > self.scale_max {
            SCALE_ATTACK
        } else {
            SCALE_RELEASE
        };
        self.scale_max += rate * (high - self.scale_max);

        if self.scale_max - self.scale_min < MIN_SPAN_DB {
            let mid = (self.scale_max + self.scale_min) / 2.0;
            self.scale_min = mid - MIN_SPAN_DB / 2.0;
            self.scale_max = mid + MIN_SPAN_DB / 2.0;
        }
    }
}

/// Linear-interpolated percentile of an ascending slice.
fn percentile(sorted: &[f32], pct: f32) -> f32 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = (pct / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f32;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f32)
}
