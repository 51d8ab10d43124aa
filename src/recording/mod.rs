//! Audio and IQ recording.
//!
//! Each session owns a writer thread fed through a [`DropOldestQueue`]. The
//! acquisition loop only pushes into the queue and polls for dead writers
//! without waiting, so a slow disk costs dropped samples, never a stalled
//! sample path. Audio and IQ sessions have independent lifecycles.

pub mod queue;
pub mod writer;

pub use queue::{DropOldestQueue, QueueUnit};
pub use writer::{IqWriterStation, WavWriterStation};

use crate::defaults::{AUDIO_RATE, RECORD_QUEUE_DEPTH};
use crate::error::{Result, SdrError};
use crate::pipeline::{ErrorReporter, LogReporter, Station, StationError, StationRunner};
use num_complex::Complex32;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Audio,
    Iq,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Audio => "audio",
            RecordKind::Iq => "iq",
        }
    }
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body of the `RECORD_STATUS` event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordStatus {
    pub audio: bool,
    pub iq: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iq_file: Option<String>,
    #[serde(default)]
    pub dropped_audio: u64,
    #[serde(default)]
    pub dropped_iq: u64,
}

/// Remembers the first fatal error of a writer for [`Recorder::reap`].
#[derive(Default)]
struct FailureSlot {
    error: Mutex<Option<String>>,
}

impl FailureSlot {
    fn take(&self) -> Option<String> {
        self.error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

impl ErrorReporter for FailureSlot {
    fn report(&self, station: &str, error: &StationError) {
        LogReporter.report(station, error);
        if error.is_fatal() {
            let mut slot = self.error.lock().unwrap_or_else(PoisonError::into_inner);
            slot.get_or_insert_with(|| error.message().to_string());
        }
    }
}

struct Session<S: Station> {
    runner: StationRunner<S>,
    path: PathBuf,
    failure: Arc<FailureSlot>,
}

impl<S: Station> Session<S> {
    fn finish(self, kind: RecordKind) -> Result<PathBuf> {
        if let Err(msg) = self.runner.join() {
            return Err(SdrError::RecordingIo {
                kind: kind.to_string(),
                message: msg,
            });
        }
        if let Some(message) = self.failure.take() {
            return Err(SdrError::RecordingIo {
                kind: kind.to_string(),
                message,
            });
        }
        log::info!("Recording stopped: {}", self.path.display());
        Ok(self.path)
    }
}

/// Producer end of a session.
struct Tap<T> {
    queue: DropOldestQueue<T>,
    path: PathBuf,
}

/// Producer ends, touched by the acquisition thread once per block.
#[derive(Default)]
struct Taps {
    audio: Option<Tap<Vec<f32>>>,
    iq: Option<Tap<Vec<Complex32>>>,
}

#[derive(Default)]
struct Sessions {
    audio: Option<Session<WavWriterStation>>,
    iq: Option<Session<IqWriterStation>>,
}

/// Both recording sessions.
///
/// `taps` is the only lock the sample path waits on, and only for a
/// non-blocking push. Files are opened and writer threads joined under
/// `sessions`, never under `taps`. [`Recorder::reap`] only tries `sessions`.
/// Lock order is `sessions` then `taps`.
pub struct Recorder {
    dir: PathBuf,
    depth: usize,
    taps: Mutex<Taps>,
    sessions: Mutex<Sessions>,
    dropped_audio: Arc<AtomicU64>,
    dropped_iq: Arc<AtomicU64>,
}

impl Recorder {
    pub fn new(dir: impl Into<PathBuf>, depth: usize) -> Self {
        Self {
            dir: dir.into(),
            depth: depth.max(1),
            taps: Mutex::new(Taps::default()),
            sessions: Mutex::new(Sessions::default()),
            dropped_audio: Arc::new(AtomicU64::new(0)),
            dropped_iq: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn taps(&self) -> MutexGuard<'_, Taps> {
        self.taps.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn sessions(&self) -> MutexGuard<'_, Sessions> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start recording demodulated audio. Already recording is not an error.
    ///
    /// # Errors
    /// `SdrError::RecordingIo` when the directory or file cannot be created.
    pub fn start_audio(&self) -> Result<PathBuf> {
        let mut sessions = self.sessions();
        if let Some(session) = &sessions.audio {
            return Ok(session.path.clone());
        }
        let path = self.next_path(RecordKind::Audio, &format!("audio_{}", unix_secs()), "wav")?;
        let station = WavWriterStation::create(&path, AUDIO_RATE)?;

        self.dropped_audio.store(0, Ordering::Relaxed);
        let (queue, rx) = DropOldestQueue::new(self.depth, self.dropped_audio.clone());
        let failure = Arc::new(FailureSlot::default());
        let runner = StationRunner::spawn(station, rx, None, failure.clone())?;

        sessions.audio = Some(Session {
            runner,
            path: path.clone(),
            failure,
        });
        self.taps().audio = Some(Tap {
            queue,
            path: path.clone(),
        });
        log::info!("Audio recording started: {}", path.display());
        Ok(path)
    }

    /// Start recording raw IQ at the tuner's rate.
    ///
    /// # Errors
    /// `SdrError::RecordingIo` when the directory or file cannot be created.
    pub fn start_iq(&self, center_freq: u64, sample_rate: u32) -> Result<PathBuf> {
        if let Some(session) = &self.sessions().iq {
            return Ok(session.path.clone());
        }
        let stem = format!("iq_{}_{}Hz_{}sps", unix_secs(), center_freq, sample_rate);
        let path = self.next_path(RecordKind::Iq, &stem, "raw")?;
        let station = IqWriterStation::create(&path)?;
        self.install_iq(station, path)
    }

    fn install_iq(&self, station: IqWriterStation, path: PathBuf) -> Result<PathBuf> {
        let mut sessions = self.sessions();
        self.dropped_iq.store(0, Ordering::Relaxed);
        let (queue, rx) = DropOldestQueue::new(self.depth, self.dropped_iq.clone());
        let failure = Arc::new(FailureSlot::default());
        let runner = StationRunner::spawn(station, rx, None, failure.clone())?;

        sessions.iq = Some(Session {
            runner,
            path: path.clone(),
            failure,
        });
        self.taps().iq = Some(Tap {
            queue,
            path: path.clone(),
        });
        log::info!("IQ recording started: {}", path.display());
        Ok(path)
    }

    /// Stop a session, flushing and closing its file.
    ///
    /// Returns the closed file, or `None` if that kind was not recording.
    ///
    /// # Errors
    /// `SdrError::RecordingIo` if the writer failed while recording or closing.
    pub fn stop(&self, kind: RecordKind) -> Result<Option<PathBuf>> {
        // Disconnect the producer first so the writer drains and exits.
        match kind {
            RecordKind::Audio => drop(self.taps().audio.take()),
            RecordKind::Iq => drop(self.taps().iq.take()),
        }
        let mut sessions = self.sessions();
        match kind {
            RecordKind::Audio => sessions.audio.take().map(|s| s.finish(kind)).transpose(),
            RecordKind::Iq => sessions.iq.take().map(|s| s.finish(kind)).transpose(),
        }
    }

    /// Stop both sessions, logging failures.
    pub fn stop_all(&self) {
        for kind in [RecordKind::Audio, RecordKind::Iq] {
            if let Err(e) = self.stop(kind) {
                log::error!("{}", e);
            }
        }
    }

    pub fn is_recording(&self, kind: RecordKind) -> bool {
        let taps = self.taps();
        match kind {
            RecordKind::Audio => taps.audio.is_some(),
            RecordKind::Iq => taps.iq.is_some(),
        }
    }

    /// Queue demodulated audio if an audio session is active. Never blocks.
    pub fn push_audio(&self, audio: &[f32]) {
        if audio.is_empty() {
            return;
        }
        if let Some(tap) = &self.taps().audio {
            tap.queue.push(audio.to_vec());
        }
    }

    /// Queue raw samples if an IQ session is active. Never blocks.
    pub fn push_iq(&self, samples: &[Complex32]) {
        if samples.is_empty() {
            return;
        }
        if let Some(tap) = &self.taps().iq {
            tap.queue.push(samples.to_vec());
        }
    }

    /// Close sessions whose writer died, returning why.
    ///
    /// Called once per block by the acquisition loop. Never waits: while a
    /// session is being opened or closed the check moves to a later block.
    pub fn reap(&self) -> Vec<(RecordKind, SdrError)> {
        let mut sessions = match self.sessions.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => return Vec::new(),
        };

        let mut reaped = Vec::new();
        if sessions.audio.as_ref().is_some_and(|s| s.runner.is_finished()) {
            self.taps().audio = None;
            if let Some(session) = sessions.audio.take() {
                reaped.push(died(RecordKind::Audio, session.finish(RecordKind::Audio)));
            }
        }
        if sessions.iq.as_ref().is_some_and(|s| s.runner.is_finished()) {
            self.taps().iq = None;
            if let Some(session) = sessions.iq.take() {
                reaped.push(died(RecordKind::Iq, session.finish(RecordKind::Iq)));
            }
        }
        reaped
    }

    /// Current sessions, as the producer side sees them.
    pub fn status(&self) -> RecordStatus {
        let taps = self.taps();
        let file_name = |path: &Path| {
            path.file_name()
                .map(|n| n.to_string_lossy().into_owned())
        };
        RecordStatus {
            audio: taps.audio.is_some(),
            iq: taps.iq.is_some(),
            audio_file: taps.audio.as_ref().and_then(|t| file_name(&t.path)),
            iq_file: taps.iq.as_ref().and_then(|t| file_name(&t.path)),
            dropped_audio: self.dropped_audio.load(Ordering::Relaxed),
            dropped_iq: self.dropped_iq.load(Ordering::Relaxed),
        }
    }

    /// A file name under the recording directory that does not exist yet.
    fn next_path(&self, kind: RecordKind, stem: &str, ext: &str) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir).map_err(|e| SdrError::RecordingIo {
            kind: kind.to_string(),
            message: format!("cannot create {}: {}", self.dir.display(), e),
        })?;
        let mut path = self.dir.join(format!("{stem}.{ext}"));
        let mut n = 1;
        while path.exists() {
            path = self.dir.join(format!("{stem}_{n}.{ext}"));
            n += 1;
        }
        Ok(path)
    }
}

impl Default for Recorder {
    fn default() -> Self {
        Self::new(PathBuf::from("recordings"), RECORD_QUEUE_DEPTH)
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        self.stop_all();
    }
}

/// The error for a writer that exited on its own.
fn died(kind: RecordKind, finished: Result<PathBuf>) -> (RecordKind, SdrError) {
    let error = finished.err().unwrap_or_else(|| SdrError::RecordingIo {
        kind: kind.to_string(),
        message: "writer exited unexpectedly".to_string(),
    });
    (kind, error)
}

fn unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_for_write(path: &Path) -> std::fs::File {
        std::fs::OpenOptions::new().write(true).open(path).unwrap()
    }

    #[test]
    fn audio_session_writes_named_wav() {
        let dir = TempDir::new().unwrap();
        let recorder = Recorder::new(dir.path(), 8);
        let path = recorder.start_audio().unwrap();
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("audio_") && name.ends_with(".wav"));
        assert!(recorder.is_recording(RecordKind::Audio));
        assert_eq!(recorder.status().audio_file.as_deref(), Some(name.as_str()));

        recorder.push_audio(&[0.25; 480]);
        assert_eq!(recorder.stop(RecordKind::Audio).unwrap(), Some(path.clone()));
        assert!(!recorder.is_recording(RecordKind::Audio));

        let reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.duration(), 480);
    }

    #[test]
    fn iq_name_carries_frequency_and_rate() {
        let dir = TempDir::new().unwrap();
        let recorder = Recorder::new(dir.path(), 8);
        let path = recorder.start_iq(98_500_000, 2_400_000).unwrap();
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("iq_"));
        assert!(name.ends_with("_98500000Hz_2400000sps.raw"));
        recorder.stop(RecordKind::Iq).unwrap();
    }

    #[test]
    fn sessions_are_independent() {
        let dir = TempDir::new().unwrap();
        let recorder = Recorder::new(dir.path(), 8);
        recorder.start_audio().unwrap();
        recorder.start_iq(100_000_000, 1_024_000).unwrap();
        let status = recorder.status();
        assert!(status.audio && status.iq);

        recorder.stop(RecordKind::Audio).unwrap();
        let status = recorder.status();
        assert!(!status.audio && status.iq);
        recorder.push_iq(&[Complex32::new(0.0, 1.0); 16]);
        recorder.stop(RecordKind::Iq).unwrap();
    }

    #[test]
    fn starting_twice_keeps_the_same_file() {
        let dir = TempDir::new().unwrap();
        let recorder = Recorder::new(dir.path(), 8);
        let first = recorder.start_audio().unwrap();
        let second = recorder.start_audio().unwrap();
        assert_eq!(first, second);
        recorder.stop_all();
    }

    #[test]
    fn name_collisions_get_a_suffix() {
        let dir = TempDir::new().unwrap();
        let recorder = Recorder::new(dir.path(), 8);
        let a = recorder.next_path(RecordKind::Audio, "audio_1", "wav").unwrap();
        std::fs::write(&a, b"").unwrap();
        let b = recorder.next_path(RecordKind::Audio, "audio_1", "wav").unwrap();
        assert_eq!(b.file_name().unwrap(), "audio_1_1.wav");
    }

    #[test]
    fn stop_without_session_is_a_no_op() {
        let recorder = Recorder::new(TempDir::new().unwrap().path(), 8);
        assert_eq!(recorder.stop(RecordKind::Iq).unwrap(), None);
        recorder.push_audio(&[1.0; 10]);
        assert_eq!(recorder.status(), RecordStatus::default());
    }

    #[test]
    fn unwritable_directory_is_recording_error() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();
        let recorder = Recorder::new(blocker.join("sub"), 8);
        let err = recorder.start_audio().unwrap_err();
        assert_eq!(err.kind(), "recording_io");
        assert!(!recorder.is_recording(RecordKind::Audio));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn reap_does_not_wait_for_a_stop_that_is_still_flushing() {
        use std::io::Read;
        use std::time::{Duration, Instant};

        let dir = TempDir::new().unwrap();
        let fifo = dir.path().join("slow.raw");
        let made = std::process::Command::new("mkfifo").arg(&fifo).status().unwrap();
        assert!(made.success());

        let recorder = Recorder::new(dir.path(), 8);
        let (release, released) = crossbeam_channel::bounded::<()>(1);

        std::thread::scope(|scope| {
            let reader_path = fifo.clone();
            let disk = scope.spawn(move || {
                let mut reader = std::fs::File::open(&reader_path).unwrap();
                released.recv().unwrap();
                let mut written = Vec::new();
                reader.read_to_end(&mut written).unwrap();
                written.len()
            });

            let station = IqWriterStation::from_file(open_for_write(&fifo), &fifo);
            recorder.install_iq(station, fifo.clone()).unwrap();
            for _ in 0..8 {
                recorder.push_iq(&vec![Complex32::new(0.25, -0.25); 16_384]);
            }

            let stopping = scope.spawn(|| recorder.stop(RecordKind::Iq));
            let deadline = Instant::now() + Duration::from_secs(5);
            while recorder.sessions.try_lock().is_ok() {
                assert!(Instant::now() < deadline, "stop never took the session");
                std::thread::yield_now();
            }

            let started = Instant::now();
            assert!(recorder.reap().is_empty());
            assert!(started.elapsed() < Duration::from_millis(100));
            assert!(!recorder.status().iq);
            assert!(!stopping.is_finished());

            release.send(()).unwrap();
            assert_eq!(stopping.join().unwrap().unwrap(), Some(fifo.clone()));
            assert_eq!(disk.join().unwrap(), 8 * 16_384 * 8);
        });
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn failed_writer_is_reaped_and_reported() {
        let recorder = Recorder::new(TempDir::new().unwrap().path(), 8);
        let dev = Path::new("/dev/full");
        let station = IqWriterStation::from_file(open_for_write(dev), dev);
        recorder.install_iq(station, dev.to_path_buf()).unwrap();

        recorder.push_iq(&vec![Complex32::new(0.5, 0.5); 65_536]);
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        let mut reaped = Vec::new();
        while reaped.is_empty() && std::time::Instant::now() < deadline {
            std::thread::sleep(std::time::Duration::from_millis(5));
            reaped = recorder.reap();
        }

        assert_eq!(reaped.len(), 1);
        assert_eq!(reaped[0].0, RecordKind::Iq);
        assert_eq!(reaped[0].1.kind(), "recording_io");
        assert!(!recorder.is_recording(RecordKind::Iq));
    }
}
