//! Jitter buffer between the DSP thread and the audio transport.
//!
//! Writes never block and never fail: on overflow the oldest samples are
//! discarded. Reads follow a gated catch-up policy:
//!
//! - nothing is drained until `gate` samples are buffered;
//! - once open, reads return whatever is available, even a partial chunk;
//! - the gate only closes again after the buffer has been empty for `grace`;
//! - if more than `catch_up` samples are buffered, the read cursor jumps
//!   forward so exactly `gate` samples remain.

use crate::defaults::{
    STREAM_BUFFER_SECS, STREAM_CATCH_UP_MS, STREAM_GATE_MS, STREAM_GRACE_MS, audio_samples,
};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Buffer sizing, in samples at the audio rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferPolicy {
    pub capacity: usize,
    pub gate: usize,
    pub catch_up: usize,
    pub grace: Duration,
}

impl BufferPolicy {
    /// Policy from millisecond durations at [`crate::defaults::AUDIO_RATE`].
    pub fn from_millis(buffer_secs: u32, gate_ms: u32, catch_up_ms: u32, grace_ms: u32) -> Self {
        let gate = audio_samples(gate_ms);
        let catch_up = audio_samples(catch_up_ms).max(gate);
        Self {
            capacity: audio_samples(buffer_secs * 1000).max(catch_up),
            gate,
            catch_up,
            grace: Duration::from_millis(grace_ms as u64),
        }
    }
}

impl Default for BufferPolicy {
    fn default() -> Self {
        Self::from_millis(
            STREAM_BUFFER_SECS,
            STREAM_GATE_MS,
            STREAM_CATCH_UP_MS,
            STREAM_GRACE_MS,
        )
    }
}

/// Counters exposed for status and logging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferStats {
    pub buffered: usize,
    pub gate_open: bool,
    /// Samples discarded because the buffer was full.
    pub overrun_samples: u64,
    /// Samples skipped by catch-up.
    pub skipped_samples: u64,
    pub catch_ups: u64,
    /// Times the gate closed after running dry.
    pub regates: u64,
}

#[derive(Debug)]
pub struct AudioStreamBuffer {
    policy: BufferPolicy,
    samples: VecDeque<f32>,
    gate_open: bool,
    empty_since: Option<Instant>,
    stats: BufferStats,
}

impl AudioStreamBuffer {
    pub fn new(policy: BufferPolicy) -> Self {
        Self {
            samples: VecDeque::with_capacity(policy.capacity),
            policy,
            gate_open: false,
            empty_since: None,
            stats: BufferStats::default(),
        }
    }

    pub fn policy(&self) -> &BufferPolicy {
        &self.policy
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn is_gate_open(&self) -> bool {
        self.gate_open
    }

    /// Append audio, discarding the oldest samples if it would overflow.
    pub fn write(&mut self, audio: &[f32]) {
        let cap = self.policy.capacity;
        let incoming = if audio.len() > cap {
            let dropped = audio.len() - cap;
            self.stats.overrun_samples += dropped as u64;
            &audio[dropped..]
        } else {
            audio
        };

        let excess = (self.samples.len() + incoming.len()).saturating_sub(cap);
        if excess > 0 {
            self.samples.drain(..excess);
            self.stats.overrun_samples += excess as u64;
            log::debug!("Audio stream buffer overrun, dropped {} samples", excess);
        }
        self.samples.extend(incoming.iter().copied());
    }

    /// Drain up to `max` samples according to the gate and catch-up rules.
    ///
    /// An empty result means the consumer should send nothing this tick.
    pub fn read(&mut self, max: usize, now: Instant) -> Vec<f32> {
        if !self.gate_open {
            if self.samples.len() < self.policy.gate {
                return Vec::new();
            }
            self.gate_open = true;
            self.empty_since = None;
        }

        if self.samples.len() > self.policy.catch_up {
            let skip = self.samples.len() - self.policy.gate;
            self.samples.drain(..skip);
            self.stats.skipped_samples += skip as u64;
            self.stats.catch_ups += 1;
            log::debug!("Audio stream catch-up, skipped {} samples", skip);
        }

        if self.samples.is_empty() {
            let since = *self.empty_since.get_or_insert(now);
            if now.saturating_duration_since(since) >= self.policy.grace {
                self.gate_open = false;
                self.empty_since = None;
                self.stats.regates += 1;
            }
            return Vec::new();
        }

        self.empty_since = None;
        let n = max.min(self.samples.len());
        self.samples.drain(..n).collect()
    }

    /// Drop buffered audio and re-arm the gate.
    pub fn clear(&mut self) {
        self.samples.clear();
        self.gate_open = false;
        self.empty_since = None;
    }

    pub fn stats(&self) -> BufferStats {
        BufferStats {
            buffered: self.samples.len(),
            gate_open: self.gate_open,
            ..self.stats
        }
    }
}

impl Default for AudioStreamBuffer {
    fn default() -> Self {
        Self::new(BufferPolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHUNK: usize = 960;
    const TICK: Duration = Duration::from_millis(20);

    fn ramp(n: usize) -> Vec<f32> {
        (0..n).map(|i| i as f32).collect()
    }

    #[test]
    fn default_policy_matches_stream_constants() {
        let policy = BufferPolicy::default();
        assert_eq!(policy.capacity, 240_000);
        assert_eq!(policy.gate, 9_600);
        assert_eq!(policy.catch_up, 24_000);
        assert_eq!(policy.grace, Duration::from_millis(50));
    }

    #[test]
    fn gate_holds_until_200ms_buffered() {
        let mut buf = AudioStreamBuffer::default();
        let now = Instant::now();
        buf.write(&vec![0.1; 9_599]);
        assert!(buf.read(CHUNK, now).is_empty());
        assert!(!buf.is_gate_open());

        buf.write(&[0.1]);
        assert_eq!(buf.read(CHUNK, now).len(), CHUNK);
        assert!(buf.is_gate_open());
    }

    #[test]
    fn open_gate_drains_partial_chunks() {
        let mut buf = AudioStreamBuffer::default();
        let now = Instant::now();
        buf.write(&vec![0.0; 9_600]);
        for _ in 0..10 {
            assert_eq!(buf.read(CHUNK, now).len(), CHUNK);
        }
        buf.write(&[0.5; 100]);
        assert_eq!(buf.read(CHUNK, now), vec![0.5; 100]);
    }

    #[test]
    fn gate_closes_after_grace_of_emptiness() {
        let mut buf = AudioStreamBuffer::default();
        let start = Instant::now();
        buf.write(&vec![0.0; 9_600]);
        buf.read(9_600, start);

        assert!(buf.read(CHUNK, start).is_empty());
        assert!(buf.read(CHUNK, start + Duration::from_millis(40)).is_empty());
        assert!(buf.is_gate_open());

        assert!(buf.read(CHUNK, start + Duration::from_millis(50)).is_empty());
        assert!(!buf.is_gate_open());
        assert_eq!(buf.stats().regates, 1);

        // Re-armed: a small write is not enough any more.
        buf.write(&[0.0; 100]);
        assert!(buf.read(CHUNK, start + Duration::from_millis(60)).is_empty());
    }

    #[test]
    fn data_arriving_within_grace_keeps_gate_open() {
        let mut buf = AudioStreamBuffer::default();
        let start = Instant::now();
        buf.write(&vec![0.0; 9_600]);
        buf.read(9_600, start);
        assert!(buf.read(CHUNK, start + Duration::from_millis(10)).is_empty());

        buf.write(&[1.0; 10]);
        assert_eq!(buf.read(CHUNK, start + Duration::from_millis(45)).len(), 10);
        assert!(buf.read(CHUNK, start + Duration::from_millis(80)).is_empty());
        assert!(buf.is_gate_open());
    }

    #[test]
    fn catch_up_leaves_exactly_the_gate() {
        let mut buf = AudioStreamBuffer::default();
        buf.write(&ramp(30_000));
        let out = buf.read(CHUNK, Instant::now());
        // The oldest 20_400 were skipped; reading resumes at the newest 9_600.
        assert_eq!(out[0], 20_400.0);
        assert_eq!(buf.len(), 9_600 - CHUNK);
        assert_eq!(buf.stats().catch_ups, 1);
        assert_eq!(buf.stats().skipped_samples, 20_400);
    }

    #[test]
    fn overflow_drops_oldest_without_blocking() {
        let policy = BufferPolicy {
            capacity: 100,
            gate: 10,
            catch_up: 50,
            grace: Duration::from_millis(50),
        };
        let mut buf = AudioStreamBuffer::new(policy);
        buf.write(&ramp(80));
        buf.write(&ramp(80));
        assert_eq!(buf.len(), 100);
        assert_eq!(buf.stats().overrun_samples, 60);

        buf.write(&ramp(250));
        assert_eq!(buf.len(), 100);
        assert_eq!(buf.stats().overrun_samples, 60 + 150 + 100);
    }

    #[test]
    fn clear_rearms_gate() {
        let mut buf = AudioStreamBuffer::default();
        buf.write(&vec![0.0; 10_000]);
        buf.read(CHUNK, Instant::now());
        buf.clear();
        assert!(buf.is_empty());
        assert!(!buf.is_gate_open());
    }

    /// Simulate a producer at `ratio` times the consumption rate and return
    /// (longest silent stretch after first audio, max buffered after a read
    /// once steady state is reached).
    fn simulate(ratio: f64) -> (Duration, usize) {
        let mut buf = AudioStreamBuffer::default();
        let start = Instant::now();
        let mut produced = 0.0f64;
        let mut written = 0usize;
        let mut started = false;
        let mut silent_since: Option<Instant> = None;
        let mut longest_silence = Duration::ZERO;
        let mut max_buffered = 0;

        for tick in 0..3_000u32 {
            let now = start + TICK * tick;
            produced += CHUNK as f64 * ratio;
            let due = produced as usize - written;
            buf.write(&vec![0.25; due]);
            written += due;

            let out = buf.read(CHUNK, now);
            if out.is_empty() {
                if started {
                    let since = *silent_since.get_or_insert(now);
                    longest_silence = longest_silence.max(now - since);
                }
            } else {
                started = true;
                silent_since = None;
            }
            if tick > 500 {
                max_buffered = max_buffered.max(buf.len());
            }
        }
        (longest_silence, max_buffered)
    }

    #[test]
    fn production_rate_band_never_stalls_or_grows_unbounded() {
        let grace = BufferPolicy::default().grace;
        let bound = BufferPolicy::default().catch_up;
        for ratio in [0.5, 0.8, 1.0, 1.25, 2.0] {
            let (silence, buffered) = simulate(ratio);
            assert!(silence <= grace, "ratio {ratio}: silent for {silence:?}");
            assert!(buffered <= bound, "ratio {ratio}: {buffered} buffered");
        }
    }
}
