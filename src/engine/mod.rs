//! Engine lifecycle: one acquisition thread plus the audio pacer, sharing a
//! tuning snapshot, the recorder and the event bus with the control side.
//!
//! An engine lives from `CONNECT` until `DISCONNECT` or a fatal source
//! failure. Reconnecting builds a fresh engine over the same context.

pub mod acquisition;
pub mod events;
pub mod state;

pub use acquisition::{AcquisitionLoop, BlockOutcome, ScanCommand};
pub use events::{EventBus, Outbound};
pub use state::{EngineSnapshot, SharedSnapshot};

use crate::config::Config;
use crate::control::frame::Frame;
use crate::control::protocol::Event;
use crate::defaults;
use crate::error::{Result, SdrError};
use crate::recording::Recorder;
use crate::source::SampleSource;
use crate::streaming::{AudioPacer, AudioStreamBuffer, PacerHandle, SharedAudioBuffer};
use crossbeam_channel::{Sender, TrySendError, bounded};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Scan requests queued between two blocks.
const SCAN_COMMAND_DEPTH: usize = 16;

/// A non-realtime source more than this far behind wall time resynchronises.
const MAX_PACING_LAG: Duration = Duration::from_secs(1);

/// State that outlives any single engine.
#[derive(Clone)]
pub struct EngineContext {
    pub shared: Arc<SharedSnapshot>,
    pub bus: EventBus,
    pub recorder: Arc<Recorder>,
    pub audio: SharedAudioBuffer,
}

impl EngineContext {
    pub fn new(snapshot: EngineSnapshot, config: &Config) -> Self {
        Self {
            shared: Arc::new(SharedSnapshot::new(snapshot)),
            bus: EventBus::default(),
            recorder: Arc::new(Recorder::new(
                config.recording.dir.clone(),
                config.recording.queue_depth,
            )),
            audio: Arc::new(Mutex::new(AudioStreamBuffer::new(
                config.stream.buffer_policy(),
            ))),
        }
    }

    /// Initial snapshot from configuration.
    pub fn initial_snapshot(config: &Config) -> EngineSnapshot {
        EngineSnapshot {
            tuner: crate::source::TunerState {
                center_freq: config.tuner.frequency,
                sample_rate: config.tuner.sample_rate,
                gain: config.tuner.tuner_gain(),
                squelch_db: config.dsp.squelch_db,
            },
            mode: config.dsp.mode,
            squelch_hysteresis_db: config.dsp.squelch_hysteresis_db,
            agc: config.dsp.agc,
            streaming: false,
            scan_dwell_ms: config.scanner.dwell_ms,
            scan_resume_delay_ms: config.scanner.resume_delay_ms,
            generation: 0,
        }
    }

    #[cfg(test)]
    pub(crate) fn for_tests(freq: u64, sample_rate: u32) -> Self {
        let dir = std::env::temp_dir().join("evilsdr-test-recordings");
        let mut config = Config::default();
        config.tuner.frequency = freq;
        config.tuner.sample_rate = sample_rate;
        config.recording.dir = dir;
        Self::new(Self::initial_snapshot(&config), &config)
    }
}

/// Per-engine processing settings.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub fft_size: usize,
    pub spectrum_bins: usize,
    pub level_interval_blocks: u32,
    pub chunk_samples: usize,
    pub chunk_interval: Duration,
    /// Reported in `CONNECTION_CHANGED` when the source dies.
    pub host: String,
    pub port: u16,
}

impl EngineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            fft_size: config.dsp.fft_size,
            spectrum_bins: config.dsp.spectrum_bins,
            level_interval_blocks: config.dsp.level_interval_blocks,
            chunk_samples: config.stream.chunk_samples(),
            chunk_interval: config.stream.chunk_interval(),
            host: config.tuner.host.clone(),
            port: config.tuner.port,
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            fft_size: defaults::FFT_SIZE,
            spectrum_bins: defaults::SPECTRUM_BINS,
            level_interval_blocks: defaults::LEVEL_INTERVAL_BLOCKS,
            chunk_samples: defaults::audio_samples(defaults::STREAM_CHUNK_MS),
            chunk_interval: Duration::from_millis(defaults::STREAM_CHUNK_MS as u64),
            host: defaults::RTL_HOST.to_string(),
            port: defaults::RTL_PORT,
        }
    }
}

/// Sleeps so a file or synthetic source plays at its sample rate.
struct BlockPacer {
    next: Option<Instant>,
}

impl BlockPacer {
    fn wait(&mut self, block: Duration) {
        let now = Instant::now();
        let due = self.next.unwrap_or(now) + block;
        if due > now {
            thread::sleep(due - now);
            self.next = Some(due);
        } else if now - due > MAX_PACING_LAG {
            self.next = Some(now);
        } else {
            self.next = Some(due);
        }
    }
}

/// A running engine.
pub struct Engine {
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
    pacer: PacerHandle,
    commands: Sender<ScanCommand>,
    description: String,
}

impl Engine {
    /// Spawn the acquisition thread and the audio pacer over an open source.
    pub fn start(
        source: Box<dyn SampleSource>,
        settings: EngineSettings,
        ctx: EngineContext,
    ) -> Result<Self> {
        let description = source.describe();
        let realtime = source.is_realtime();
        let (commands, rx) = bounded(SCAN_COMMAND_DEPTH);
        let running = Arc::new(AtomicBool::new(true));

        ctx.audio
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        let bus = ctx.bus.clone();
        let pacer = AudioPacer::spawn(
            ctx.audio.clone(),
            settings.chunk_samples,
            settings.chunk_interval,
            move |audio| bus.publish_frame(Frame::Audio(Arc::from(audio))),
        )?;

        let flag = running.clone();
        let thread = thread::Builder::new()
            .name("acquisition".to_string())
            .spawn(move || run(source, settings, ctx, rx, flag, realtime))
            .map_err(|e| SdrError::Other(format!("failed to spawn acquisition thread: {e}")))?;

        log::info!("Engine started: {}", description);
        Ok(Self {
            running,
            thread: Some(thread),
            pacer,
            commands,
            description,
        })
    }

    /// Queue a scanner request for the next block boundary.
    pub fn send_scan(&self, command: ScanCommand) -> Result<()> {
        self.commands.try_send(command).map_err(|e| match e {
            TrySendError::Full(_) => SdrError::Other("scanner is busy, try again".to_string()),
            TrySendError::Disconnected(_) => SdrError::connection("engine is not running"),
        })
    }

    /// False once stopped or after the sample source failed.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
            && self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    pub fn describe(&self) -> &str {
        &self.description
    }

    /// Stop after the current block and wait for both threads.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            log::error!("Acquisition thread panicked");
        }
        self.pacer.stop();
        log::info!("Engine stopped: {}", self.description);
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.stop();
        }
    }
}

fn run(
    source: Box<dyn SampleSource>,
    settings: EngineSettings,
    ctx: EngineContext,
    commands: crossbeam_channel::Receiver<ScanCommand>,
    running: Arc<AtomicBool>,
    realtime: bool,
) {
    let mut acquisition = AcquisitionLoop::new(source, &settings, ctx.clone(), commands);
    let mut pacing = BlockPacer { next: None };
    let mut failure = None;

    while running.load(Ordering::SeqCst) {
        match acquisition.run_once() {
            Ok(outcome) => {
                if !realtime {
                    pacing.wait(outcome.duration);
                }
            }
            Err(e) => {
                failure = Some(e);
                break;
            }
        }
    }

    acquisition.finish();
    drop(acquisition);
    running.store(false, Ordering::SeqCst);

    if let Some(error) = failure {
        log::error!("Sample source lost: {}", error);
        ctx.audio
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        ctx.recorder.stop_all();
        ctx.bus.publish(Event::from(&error));
        ctx.bus.publish(Event::RecordStatus(ctx.recorder.status()));
        ctx.bus.publish(Event::ConnectionChanged {
            connected: false,
            host: settings.host,
            port: settings.port,
        });
    }
}
