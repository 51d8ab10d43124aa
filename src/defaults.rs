//! Default configuration constants for evilsdr.
//!
//! Shared by the configuration types, the DSP chain and the buffering layer so
//! that every component agrees on rates and durations.

/// Fixed audio output rate in Hz.
///
/// Every demodulated stream is resampled to this rate before it reaches the
/// stream buffer, the transport, or the audio recorder.
pub const AUDIO_RATE: u32 = 48_000;

/// Default tuner sample rate in Hz (2.4 MS/s, the usual RTL-SDR rate).
pub const SAMPLE_RATE: u32 = 2_400_000;

/// Intermediate rate targeted by the first decimation stage.
///
/// Wide enough for a 200 kHz broadcast FM channel.
pub const INTERMEDIATE_RATE: u32 = 240_000;

/// Default center frequency in Hz.
pub const DEFAULT_FREQUENCY: u64 = 88_700_000;

/// Default rtl_tcp endpoint.
pub const RTL_HOST: &str = "127.0.0.1";
pub const RTL_PORT: u16 = 1234;

/// Complex samples per block (65536 samples = 131072 bytes from rtl_tcp, ~27ms at 2.4 MS/s).
pub const BLOCK_SIZE: usize = 65_536;

/// Timeout for the initial tuner connection.
pub const CONNECT_TIMEOUT_MS: u64 = 5_000;

/// Timeout for a single blocking sample read.
pub const READ_TIMEOUT_MS: u64 = 2_000;

/// Default squelch threshold in dBFS.
pub const SQUELCH_DB: f32 = -60.0;

/// Default squelch hysteresis in dB (close threshold = open threshold - hysteresis).
pub const SQUELCH_HYSTERESIS_DB: f32 = 2.0;

/// Level reported when the channel carries no measurable power.
pub const NOISE_FLOOR_DB: f32 = -120.0;

/// FFT length for the spectrum analyzer.
pub const FFT_SIZE: usize = 2048;

/// Number of bins in a published spectrum frame.
pub const SPECTRUM_BINS: usize = 1024;

/// Publish a `SIGNAL_LEVEL` event every this many blocks.
pub const LEVEL_INTERVAL_BLOCKS: u32 = 10;

/// Capacity of the audio stream buffer in seconds.
pub const STREAM_BUFFER_SECS: u32 = 5;

/// Audio that must be buffered before draining starts (200ms = 9600 samples).
pub const STREAM_GATE_MS: u32 = 200;

/// Buffered audio above which the read cursor skips ahead.
pub const STREAM_CATCH_UP_MS: u32 = 500;

/// Time the buffer may stay empty before the gate closes again.
pub const STREAM_GRACE_MS: u32 = 50;

/// Audio chunk published by the pacer per tick.
pub const STREAM_CHUNK_MS: u32 = 20;

/// Scanner dwell window (the scan-speed parameter) and its bounds.
pub const SCAN_DWELL_MS: u64 = 100;
pub const SCAN_DWELL_MIN_MS: u64 = 50;
pub const SCAN_DWELL_MAX_MS: u64 = 500;

/// Time a found signal may be absent before the scanner resumes.
pub const SCAN_RESUME_DELAY_MS: u64 = 2_000;
pub const SCAN_RESUME_DELAY_MAX_MS: u64 = 10_000;

/// Units (blocks or audio chunks) a recording queue holds before dropping the oldest.
pub const RECORD_QUEUE_DEPTH: usize = 64;

/// Control server listen address.
pub const LISTEN_HOST: &str = "0.0.0.0";
pub const LISTEN_PORT: u16 = 8765;

/// Messages buffered between the engine and the control server.
pub const EVENT_QUEUE_DEPTH: usize = 512;

/// Convert a duration in milliseconds to a sample count at [`AUDIO_RATE`].
pub const fn audio_samples(ms: u32) -> usize {
    (AUDIO_RATE as usize / 1000) * ms as usize
}
