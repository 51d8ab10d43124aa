//! Tuning snapshot shared between the control side and the acquisition loop.
//!
//! Writers replace the whole snapshot; the acquisition loop reads it once per
//! block. No field is ever locked on its own.

use crate::dsp::{BlockParams, DemodMode};
use crate::scanner::{clamp_dwell_ms, clamp_resume_delay_ms};
use crate::source::TunerState;
use std::sync::{Arc, PoisonError, RwLock};

#[derive(Debug, Clone, PartialEq)]
pub struct EngineSnapshot {
    pub tuner: TunerState,
    pub mode: DemodMode,
    pub squelch_hysteresis_db: f32,
    /// Audio AGC after demodulation.
    pub agc: bool,
    pub streaming: bool,
    pub scan_dwell_ms: u64,
    pub scan_resume_delay_ms: u64,
    /// Bumped on every replacement.
    pub generation: u64,
}

impl EngineSnapshot {
    pub fn block_params(&self) -> BlockParams {
        BlockParams {
            squelch_db: self.tuner.squelch_db,
            squelch_hysteresis_db: self.squelch_hysteresis_db,
            agc: self.agc,
        }
    }
}

/// Single-writer, many-reader holder of the current [`EngineSnapshot`].
#[derive(Debug)]
pub struct SharedSnapshot {
    current: RwLock<Arc<EngineSnapshot>>,
}

impl SharedSnapshot {
    pub fn new(snapshot: EngineSnapshot) -> Self {
        Self {
            current: RwLock::new(Arc::new(snapshot)),
        }
    }

    /// The snapshot in force right now.
    pub fn load(&self) -> Arc<EngineSnapshot> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Copy, modify and swap in a new snapshot; returns what was stored.
    ///
    /// Scanner timings are clamped here so readers only ever see values the
    /// scanner accepts.
    pub fn update<F>(&self, change: F) -> Arc<EngineSnapshot>
    where
        F: FnOnce(&mut EngineSnapshot),
    {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = EngineSnapshot::clone(&guard);
        change(&mut next);
        next.scan_dwell_ms = clamp_dwell_ms(next.scan_dwell_ms);
        next.scan_resume_delay_ms = clamp_resume_delay_ms(next.scan_resume_delay_ms);
        next.generation = guard.generation.wrapping_add(1);
        let next = Arc::new(next);
        *guard = next.clone();
        next
    }
}
