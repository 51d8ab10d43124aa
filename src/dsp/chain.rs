//! Per-block DSP chain: decimate, channel filter, demodulate, squelch, AGC,
//! resample, plus the spectrum of the raw block.

use crate::defaults::{AUDIO_RATE, INTERMEDIATE_RATE};
use crate::dsp::agc::Agc;
use crate::dsp::demod::Demodulator;
use crate::dsp::filter::FirDecimator;
use crate::dsp::resample::LinearResampler;
use crate::dsp::spectrum::{SpectrumAnalyzer, SpectrumFrame};
use crate::dsp::squelch::{Squelch, power_db};
use crate::dsp::DemodMode;
use crate::source::SampleBlock;
use num_complex::Complex32;

const DECIMATOR_TAPS: usize = 128;
const AUDIO_TAPS: usize = 64;
const AUDIO_CUTOFF_HZ: f32 = 20_000.0;

/// Values read from the engine snapshot once per block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlockParams {
    pub squelch_db: f32,
    pub squelch_hysteresis_db: f32,
    pub agc: bool,
}

impl Default for BlockParams {
    fn default() -> Self {
        Self {
            squelch_db: crate::defaults::SQUELCH_DB,
            squelch_hysteresis_db: crate::defaults::SQUELCH_HYSTERESIS_DB,
            agc: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DspOutput {
    /// Audio at [`AUDIO_RATE`], in [-1, 1]; zeros while squelched.
    pub audio: Vec<f32>,
    /// Channel power in dBFS.
    pub level_db: f32,
    pub signal_present: bool,
    pub spectrum: SpectrumFrame,
}

/// Filter and demodulator state; rebuilt whenever mode or rate changes.
struct Stages {
    decimator: FirDecimator<Complex32>,
    channel: FirDecimator<Complex32>,
    demod: Demodulator,
    audio_decimator: FirDecimator<f32>,
    resampler: Option<LinearResampler>,
    agc: Agc,
}

impl Stages {
    fn new(sample_rate: u32, mode: DemodMode) -> Self {
        let rate = sample_rate.max(1) as f32;
        let factor = (sample_rate / INTERMEDIATE_RATE).max(1) as usize;
        let if_rate = rate / factor as f32;

        let audio_factor = (if_rate / AUDIO_RATE as f32).floor().max(1.0) as usize;
        let post_rate = if_rate / audio_factor as f32;
        let audio_cutoff = AUDIO_CUTOFF_HZ.min(post_rate * 0.45);
        let resampler = ((post_rate - AUDIO_RATE as f32).abs() > 0.5)
            .then(|| LinearResampler::new(post_rate as f64, AUDIO_RATE as f64));

        Self {
            decimator: FirDecimator::lowpass(if_rate / 2.0, rate, DECIMATOR_TAPS, factor),
            channel: FirDecimator::lowpass(
                mode.channel_cutoff_hz().min(if_rate / 2.0),
                if_rate,
                mode.channel_taps(),
                1,
            ),
            demod: Demodulator::for_mode(mode, if_rate),
            audio_decimator: FirDecimator::lowpass(audio_cutoff, if_rate, AUDIO_TAPS, audio_factor),
            resampler,
            agc: Agc::audio(AUDIO_RATE as f32),
        }
    }
}

pub struct DspChain {
    sample_rate: u32,
    /// Center frequency of the last block processed.
    center_freq: Option<u64>,
    mode: DemodMode,
    stages: Stages,
    squelch: Squelch,
    spectrum: SpectrumAnalyzer,
}

impl DspChain {
    pub fn new(sample_rate: u32, mode: DemodMode, fft_size: usize, spectrum_bins: usize) -> Self {
        let params = BlockParams::default();
        Self {
            sample_rate,
            center_freq: None,
            mode,
            stages: Stages::new(sample_rate, mode),
            squelch: Squelch::new(params.squelch_db, params.squelch_hysteresis_db),
            spectrum: SpectrumAnalyzer::new(fft_size, spectrum_bins),
        }
    }

    pub fn mode(&self) -> DemodMode {
        self.mode
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Switch demodulator. Selecting the current mode is a no-op; any other
    /// mode starts from clean filter state.
    pub fn set_mode(&mut self, mode: DemodMode) {
        if mode == self.mode {
            return;
        }
        log::debug!("DSP mode {} -> {}", self.mode, mode);
        self.mode = mode;
        self.reset();
    }

    /// Drop all filter, demodulator, AGC and squelch state.
    pub fn reset(&mut self) {
        self.stages = Stages::new(self.sample_rate, self.mode);
        self.squelch.reset();
    }

    pub fn process(&mut self, block: &SampleBlock, params: &BlockParams) -> DspOutput {
        if block.sample_rate != self.sample_rate && block.sample_rate > 0 {
            log::debug!("DSP rate {} -> {}", self.sample_rate, block.sample_rate);
            self.sample_rate = block.sample_rate;
            self.reset();
        }
        if self.center_freq != Some(block.center_freq) {
            // Filter memory and the squelch verdict belong to the old tuning.
            self.center_freq = Some(block.center_freq);
            self.reset();
        }

        let spectrum = self.spectrum.process(&block.samples);

        let stages = &mut self.stages;
        let baseband = stages.decimator.process(&block.samples);
        let channel = stages.channel.process(&baseband);

        let level_db = power_db(&channel);
        self.squelch
            .set_threshold(params.squelch_db, params.squelch_hysteresis_db);
        let signal_present = self.squelch.update(level_db);

        // Demodulate even when muted so filters are settled when squelch opens.
        let demod = stages.demod.demodulate(&channel);
        let mut audio = stages.audio_decimator.process(&demod);
        if let Some(resampler) = stages.resampler.as_mut() {
            audio = resampler.process(&audio);
        }

        if !signal_present {
            audio.fill(0.0);
        } else if params.agc {
            stages.agc.process(&mut audio);
        } else {
            for x in audio.iter_mut() {
                *x = x.clamp(-1.0, 1.0);
            }
        }

        DspOutput {
            audio,
            level_db,
            signal_present,
            spectrum,
        }
    }
}
