//! Fixed-cadence drain of the audio stream buffer.

use crate::error::{Result, SdrError};
use crate::streaming::AudioStreamBuffer;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

pub type SharedAudioBuffer = Arc<Mutex<AudioStreamBuffer>>;

/// Reads one chunk per interval from the shared buffer and hands it to a sink.
///
/// Ticks are scheduled against absolute deadlines so the cadence does not
/// drift with processing time. If the thread falls more than one interval
/// behind, it resynchronises instead of bursting.
pub struct AudioPacer;

impl AudioPacer {
    pub fn spawn<F>(
        buffer: SharedAudioBuffer,
        chunk: usize,
        interval: Duration,
        mut sink: F,
    ) -> Result<PacerHandle>
    where
        F: FnMut(Vec<f32>) + Send + 'static,
    {
        let running = Arc::new(AtomicBool::new(true));
        let flag = running.clone();

        let thread = thread::Builder::new()
            .name("audio-pacer".to_string())
            .spawn(move || {
                let mut next = Instant::now() + interval;
                while flag.load(Ordering::SeqCst) {
                    let now = Instant::now();
                    let audio = buffer
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .read(chunk, now);
                    if !audio.is_empty() {
                        sink(audio);
                    }

                    let now = Instant::now();
                    if next > now {
                        thread::sleep(next - now);
                        next += interval;
                    } else {
                        next = now + interval;
                    }
                }
            })
            .map_err(|e| SdrError::Other(format!("failed to spawn audio pacer: {e}")))?;

        Ok(PacerHandle {
            running,
            thread: Some(thread),
        })
    }
}

pub struct PacerHandle {
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl PacerHandle {
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stop ticking and wait for the current tick to finish.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            log::error!("audio pacer thread panicked");
        }
    }
}

impl Drop for PacerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
