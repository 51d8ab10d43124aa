//! Sample sources: the tuner abstraction feeding the DSP chain.
//!
//! A [`SampleSource`] produces a continuous sequence of [`SampleBlock`]s and
//! owns the hardware side of the [`TunerState`]. Tuning changes are handed to
//! the source once per block by the acquisition loop, so callers never block
//! on the device.

pub mod file;
pub mod rtl_tcp;
pub mod synthetic;

use crate::error::{Result, SdrError};
use num_complex::Complex32;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

pub use file::FileSource;
pub use rtl_tcp::RtlTcpSource;
pub use synthetic::{Carrier, SyntheticSource};

/// A fixed-size run of complex samples, tagged with rate and capture time.
#[derive(Debug, Clone)]
pub struct SampleBlock {
    pub samples: Vec<Complex32>,
    pub sample_rate: u32,
    /// Tuner center frequency the samples were captured at.
    pub center_freq: u64,
    pub timestamp: Instant,
}

impl SampleBlock {
    pub fn new(samples: Vec<Complex32>, sample_rate: u32, center_freq: u64) -> Self {
        Self {
            samples,
            sample_rate,
            center_freq,
            timestamp: Instant::now(),
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Wall time covered by this block at its sample rate.
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate as f64)
    }
}

/// Marker for automatic gain in the wire format (`"AGC"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AutoGain {
    #[serde(rename = "AGC")]
    Agc,
}

/// RF gain: a manual value in dB or the tuner's automatic gain.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TunerGain {
    Manual(f32),
    Auto(AutoGain),
}

impl TunerGain {
    pub const AUTO: TunerGain = TunerGain::Auto(AutoGain::Agc);

    pub fn is_auto(&self) -> bool {
        matches!(self, TunerGain::Auto(_))
    }
}

impl Default for TunerGain {
    fn default() -> Self {
        TunerGain::AUTO
    }
}

/// Tuning parameters owned by the sample source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TunerState {
    /// Center frequency in Hz.
    pub center_freq: u64,
    pub sample_rate: u32,
    pub gain: TunerGain,
    /// Squelch threshold in dBFS.
    pub squelch_db: f32,
}

/// Hardware/network backend selected by `CONNECT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Driver {
    #[default]
    RtlTcp,
    File,
    Synthetic,
}

impl std::fmt::Display for Driver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Driver::RtlTcp => write!(f, "rtl_tcp"),
            Driver::File => write!(f, "file"),
            Driver::Synthetic => write!(f, "synthetic"),
        }
    }
}

/// Everything needed to open a sample source.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceConfig {
    /// Network host, or the IQ file path for [`Driver::File`].
    pub host: String,
    pub port: u16,
    pub driver: Driver,
    pub sample_rate: u32,
    pub block_size: usize,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub file_loop: bool,
    pub carriers: Vec<Carrier>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            host: crate::defaults::RTL_HOST.to_string(),
            port: crate::defaults::RTL_PORT,
            driver: Driver::RtlTcp,
            sample_rate: crate::defaults::SAMPLE_RATE,
            block_size: crate::defaults::BLOCK_SIZE,
            connect_timeout: Duration::from_millis(crate::defaults::CONNECT_TIMEOUT_MS),
            read_timeout: Duration::from_millis(crate::defaults::READ_TIMEOUT_MS),
            file_loop: true,
            carriers: Vec::new(),
        }
    }
}

/// Trait for tuner devices.
///
/// This trait allows swapping implementations (rtl_tcp, file replay, synthetic).
/// `next_block` is only ever called from the acquisition thread.
pub trait SampleSource: Send {
    /// Apply tuning. Takes effect on the next block returned.
    fn apply(&mut self, tuner: &TunerState) -> Result<()>;

    /// Block until the next full block of samples is available.
    ///
    /// # Errors
    /// `SdrError::Connection` when the source is gone for good.
    fn next_block(&mut self) -> Result<SampleBlock>;

    /// Native sample rate of the blocks this source produces.
    fn sample_rate(&self) -> u32;

    /// Whether the source already paces itself at the sample rate.
    fn is_realtime(&self) -> bool {
        true
    }

    /// Short human-readable description for logs and status.
    fn describe(&self) -> String;
}

/// Open a sample source for the given configuration.
///
/// # Errors
/// Returns `SdrError::Connection` on socket, file or driver failure and
/// `SdrError::Configuration` for nonsensical parameters.
pub fn connect(config: &SourceConfig) -> Result<Box<dyn SampleSource>> {
    if config.sample_rate == 0 {
        return Err(SdrError::config("sample_rate must be positive"));
    }
    if config.block_size == 0 {
        return Err(SdrError::config("block_size must be positive"));
    }

    let source: Box<dyn SampleSource> = match config.driver {
        Driver::RtlTcp => Box::new(RtlTcpSource::connect(config)?),
        Driver::File => Box::new(FileSource::open(config)?),
        Driver::Synthetic => Box::new(SyntheticSource::new(
            config.sample_rate,
            config.block_size,
            config.carriers.clone(),
        )),
    };
    log::info!("Sample source ready: {}", source.describe());
    Ok(source)
}
