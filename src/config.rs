use crate::defaults;
use crate::dsp::{BlockParams, DemodMode};
use crate::error::{Result, SdrError};
use crate::source::{Carrier, Driver, SourceConfig, TunerGain};
use crate::streaming::BufferPolicy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub tuner: TunerConfig,
    pub dsp: DspConfig,
    pub stream: StreamConfig,
    pub scanner: ScannerConfig,
    pub recording: RecordingConfig,
    pub server: ServerConfig,
    pub bookmarks: BookmarksConfig,
}

/// Sample source configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TunerConfig {
    /// rtl_tcp host, or the IQ file path for the `file` driver.
    pub host: String,
    pub port: u16,
    pub driver: Driver,
    pub sample_rate: u32,
    pub frequency: u64,
    /// Manual gain in dB; absent means automatic gain.
    pub gain: Option<f32>,
    pub block_size: usize,
    pub connect_timeout_ms: u64,
    pub read_timeout_ms: u64,
    pub file_loop: bool,
    /// Carriers generated by the `synthetic` driver.
    pub carriers: Vec<Carrier>,
}

/// Demodulation and display configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DspConfig {
    pub mode: DemodMode,
    pub squelch_db: f32,
    pub squelch_hysteresis_db: f32,
    pub agc: bool,
    pub fft_size: usize,
    pub spectrum_bins: usize,
    pub level_interval_blocks: u32,
}

/// Audio stream buffering
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StreamConfig {
    pub buffer_secs: u32,
    pub gate_ms: u32,
    pub catch_up_ms: u32,
    pub grace_ms: u32,
    pub chunk_ms: u32,
}

/// Scanner timing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScannerConfig {
    /// Time spent listening on each entry before moving on.
    pub dwell_ms: u64,
    pub resume_delay_ms: u64,
    /// Retune to the pre-scan frequency on `STOP_SCAN`.
    pub restore_on_stop: bool,
}

/// Recording destination
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RecordingConfig {
    pub dir: PathBuf,
    pub queue_depth: usize,
}

/// Control server
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Connect to the configured tuner when the server starts.
    pub autoconnect: bool,
}

/// Bookmark document location
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BookmarksConfig {
    pub path: PathBuf,
}

impl Default for TunerConfig {
    fn default() -> Self {
        Self {
            host: defaults::RTL_HOST.to_string(),
            port: defaults::RTL_PORT,
            driver: Driver::RtlTcp,
            sample_rate: defaults::SAMPLE_RATE,
            frequency: defaults::DEFAULT_FREQUENCY,
            gain: None,
            block_size: defaults::BLOCK_SIZE,
            connect_timeout_ms: defaults::CONNECT_TIMEOUT_MS,
            read_timeout_ms: defaults::READ_TIMEOUT_MS,
            file_loop: true,
            carriers: Vec::new(),
        }
    }
}

impl Default for DspConfig {
    fn default() -> Self {
        Self {
            mode: DemodMode::Wbfm,
            squelch_db: defaults::SQUELCH_DB,
            squelch_hysteresis_db: defaults::SQUELCH_HYSTERESIS_DB,
            agc: false,
            fft_size: defaults::FFT_SIZE,
            spectrum_bins: defaults::SPECTRUM_BINS,
            level_interval_blocks: defaults::LEVEL_INTERVAL_BLOCKS,
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            buffer_secs: defaults::STREAM_BUFFER_SECS,
            gate_ms: defaults::STREAM_GATE_MS,
            catch_up_ms: defaults::STREAM_CATCH_UP_MS,
            grace_ms: defaults::STREAM_GRACE_MS,
            chunk_ms: defaults::STREAM_CHUNK_MS,
        }
    }
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            dwell_ms: defaults::SCAN_DWELL_MS,
            resume_delay_ms: defaults::SCAN_RESUME_DELAY_MS,
            restore_on_stop: false,
        }
    }
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            dir: dirs::audio_dir()
                .map(|d| d.join("evilsdr"))
                .unwrap_or_else(|| PathBuf::from("recordings")),
            queue_depth: defaults::RECORD_QUEUE_DEPTH,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: defaults::LISTEN_HOST.to_string(),
            port: defaults::LISTEN_PORT,
            autoconnect: true,
        }
    }
}

impl Default for BookmarksConfig {
    fn default() -> Self {
        Self {
            path: config_dir().join("bookmarks.json"),
        }
    }
}

fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("evilsdr")
}

impl TunerConfig {
    pub fn tuner_gain(&self) -> TunerGain {
        self.gain.map(TunerGain::Manual).unwrap_or(TunerGain::AUTO)
    }

    pub fn source_config(&self) -> SourceConfig {
        SourceConfig {
            host: self.host.clone(),
            port: self.port,
            driver: self.driver,
            sample_rate: self.sample_rate,
            block_size: self.block_size,
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            read_timeout: Duration::from_millis(self.read_timeout_ms),
            file_loop: self.file_loop,
            carriers: self.carriers.clone(),
        }
    }
}

impl DspConfig {
    pub fn block_params(&self) -> BlockParams {
        BlockParams {
            squelch_db: self.squelch_db,
            squelch_hysteresis_db: self.squelch_hysteresis_db,
            agc: self.agc,
        }
    }
}

impl StreamConfig {
    pub fn buffer_policy(&self) -> BufferPolicy {
        BufferPolicy::from_millis(self.buffer_secs, self.gate_ms, self.catch_up_ms, self.grace_ms)
    }

    /// Samples per pacer tick.
    pub fn chunk_samples(&self) -> usize {
        defaults::audio_samples(self.chunk_ms)
    }

    pub fn chunk_interval(&self) -> Duration {
        Duration::from_millis(self.chunk_ms as u64)
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Missing fields use default values.
    ///
    /// # Errors
    /// `ConfigFileNotFound` if the file is missing, `Config` for invalid TOML.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => SdrError::ConfigFileNotFound {
                path: path.display().to_string(),
            },
            _ => SdrError::Io(e),
        })?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if it doesn't exist
    ///
    /// Only a missing file falls back to defaults; invalid TOML is an error.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Err(SdrError::ConfigFileNotFound { .. }) => Ok(Self::default()),
            other => other,
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - EVILSDR_RTL_HOST → tuner.host
    /// - EVILSDR_RTL_PORT → tuner.port
    /// - EVILSDR_DRIVER → tuner.driver
    /// - EVILSDR_RECORDINGS_DIR → recording.dir
    /// - EVILSDR_LISTEN → server.host, or server.host and server.port as `host:port`
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(host) = env_value("EVILSDR_RTL_HOST") {
            self.tuner.host = host;
        }

        if let Some(port) = env_value("EVILSDR_RTL_PORT") {
            match port.parse() {
                Ok(port) => self.tuner.port = port,
                Err(_) => log::warn!("Ignoring EVILSDR_RTL_PORT={}: not a port", port),
            }
        }

        if let Some(driver) = env_value("EVILSDR_DRIVER") {
            match serde_json::from_value::<Driver>(serde_json::Value::String(driver.clone())) {
                Ok(driver) => self.tuner.driver = driver,
                Err(_) => log::warn!("Ignoring EVILSDR_DRIVER={}: unknown driver", driver),
            }
        }

        if let Some(dir) = env_value("EVILSDR_RECORDINGS_DIR") {
            self.recording.dir = PathBuf::from(dir);
        }

        if let Some(listen) = env_value("EVILSDR_LISTEN") {
            self.set_listen(&listen);
        }

        self
    }

    /// Set the control listen address from `HOST`, `HOST:PORT` or `:PORT`.
    pub fn set_listen(&mut self, listen: &str) {
        match listen.rsplit_once(':').map(|(h, p)| (h, p.parse::<u16>())) {
            Some((host, Ok(port))) => {
                if !host.is_empty() {
                    self.server.host = host.to_string();
                }
                self.server.port = port;
            }
            _ => self.server.host = listen.to_string(),
        }
    }

    /// Check values serde cannot.
    ///
    /// # Errors
    /// `ConfigInvalidValue` naming the first offending key.
    pub fn validate(&self) -> Result<()> {
        fn invalid(key: &str, message: &str) -> Result<()> {
            Err(SdrError::ConfigInvalidValue {
                key: key.to_string(),
                message: message.to_string(),
            })
        }

        if self.tuner.sample_rate == 0 {
            return invalid("tuner.sample_rate", "must be positive");
        }
        if self.tuner.block_size == 0 {
            return invalid("tuner.block_size", "must be positive");
        }
        if !self.dsp.fft_size.is_power_of_two() || self.dsp.fft_size < 64 {
            return invalid("dsp.fft_size", "must be a power of two of at least 64");
        }
        if self.dsp.spectrum_bins == 0 || self.dsp.spectrum_bins > self.dsp.fft_size {
            return invalid("dsp.spectrum_bins", "must be between 1 and dsp.fft_size");
        }
        if self.dsp.level_interval_blocks == 0 {
            return invalid("dsp.level_interval_blocks", "must be positive");
        }
        if self.stream.gate_ms == 0 {
            return invalid("stream.gate_ms", "must be positive");
        }
        if self.stream.catch_up_ms <= self.stream.gate_ms {
            return invalid("stream.catch_up_ms", "must exceed stream.gate_ms");
        }
        if self.stream.buffer_secs * 1000 < self.stream.catch_up_ms {
            return invalid("stream.buffer_secs", "must hold at least stream.catch_up_ms");
        }
        if self.stream.chunk_ms == 0 {
            return invalid("stream.chunk_ms", "must be positive");
        }
        if self.recording.queue_depth == 0 {
            return invalid("recording.queue_depth", "must be positive");
        }
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| SdrError::ConfigParse {
            message: e.to_string(),
        })
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/evilsdr/config.toml on Linux
    pub fn default_path() -> PathBuf {
        config_dir().join("config.toml")
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}
