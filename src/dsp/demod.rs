//! Demodulators operating on channel-filtered baseband IQ.

use crate::dsp::DemodMode;
use num_complex::Complex32;
use std::f32::consts::TAU;

/// Broadcast FM de-emphasis time constant (75 µs, Americas/Korea).
const DEEMPHASIS_TAU: f32 = 75e-6;

/// First-order DC blocking filter.
#[derive(Debug, Clone)]
pub struct DcBlocker {
    r: f32,
    x1: f32,
    y1: f32,
}

impl DcBlocker {
    pub fn new(r: f32) -> Self {
        Self {
            r: r.clamp(0.9, 0.9999),
            x1: 0.0,
            y1: 0.0,
        }
    }

    pub fn process(&mut self, x: f32) -> f32 {
        let y = x - self.x1 + self.r * self.y1;
        self.x1 = x;
        self.y1 = y;
        y
    }

    pub fn reset(&mut self) {
        self.x1 = 0.0;
        self.y1 = 0.0;
    }
}

/// Single-pole low-pass undoing the transmitter's pre-emphasis.
#[derive(Debug, Clone)]
pub struct DeEmphasis {
    alpha: f32,
    y1: f32,
}

impl DeEmphasis {
    pub fn new(sample_rate: f32) -> Self {
        let dt = 1.0 / sample_rate;
        Self {
            alpha: dt / (DEEMPHASIS_TAU + dt),
            y1: 0.0,
        }
    }

    pub fn process(&mut self, x: f32) -> f32 {
        self.y1 += self.alpha * (x - self.y1);
        self.y1
    }
}

/// Quadrature FM discriminator.
///
/// The phase step between consecutive samples is proportional to the
/// instantaneous frequency; scaling by `rate / (2π · deviation)` maps peak
/// deviation to full scale.
#[derive(Debug, Clone)]
pub struct FmDiscriminator {
    prev: Complex32,
    gain: f32,
}

impl FmDiscriminator {
    pub fn new(sample_rate: f32, deviation_hz: f32) -> Self {
        Self {
            prev: Complex32::new(0.0, 0.0),
            gain: sample_rate / (TAU * deviation_hz.max(1.0)),
        }
    }

    pub fn process(&mut self, x: Complex32) -> f32 {
        let d = x * self.prev.conj();
        self.prev = x;
        if d.re == 0.0 && d.im == 0.0 {
            return 0.0;
        }
        d.im.atan2(d.re) * self.gain
    }
}

/// Mode-specific demodulator state.
#[derive(Debug, Clone)]
pub enum Demodulator {
    Fm {
        discriminator: FmDiscriminator,
        deemphasis: Option<DeEmphasis>,
    },
    /// Envelope detector with the carrier removed.
    Am { dc: DcBlocker },
}

impl Demodulator {
    pub fn for_mode(mode: DemodMode, sample_rate: f32) -> Self {
        match mode.deviation_hz() {
            Some(deviation) => Demodulator::Fm {
                discriminator: FmDiscriminator::new(sample_rate, deviation),
                deemphasis: mode
                    .uses_deemphasis()
                    .then(|| DeEmphasis::new(sample_rate)),
            },
            None => Demodulator::Am {
                dc: DcBlocker::new(0.999),
            },
        }
    }

    pub fn demodulate(&mut self, samples: &[Complex32]) -> Vec<f32> {
        match self {
            Demodulator::Fm {
                discriminator,
                deemphasis,
            } => samples
                .iter()
                .map(|&s| {
                    let y = discriminator.process(s);
                    match deemphasis {
                        Some(de) => de.process(y),
                        None => y,
                    }
                })
                .collect(),
            Demodulator::Am { dc } => samples.iter().map(|s| dc.process(s.norm())).collect(),
        }
    }
}
