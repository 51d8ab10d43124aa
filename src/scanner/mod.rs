//! Scanner state machine.
//!
//! The engine is driven synchronously: the acquisition loop calls
//! [`ScannerEngine::observe`] once per processed block with the squelch
//! verdict for that block, and applies the returned [`ScanAction`]s to the
//! shared tuning snapshot. Nothing here sleeps or touches the tuner directly.
//!
//! ```text
//! IDLE --start--> SCANNING --signal--> MONITORING --drop--> HOLD
//!                   ^  |                    ^                 |
//!                   |  +--dwell expired--+  +----signal-------+
//!                   +------------------- resume delay --------+
//! ```

pub mod plan;

pub use plan::{RangePlan, ScanEntry, ScanList, range_label};

use crate::clock::{Clock, SystemClock};
use crate::defaults::{
    SCAN_DWELL_MAX_MS, SCAN_DWELL_MIN_MS, SCAN_DWELL_MS, SCAN_RESUME_DELAY_MAX_MS,
    SCAN_RESUME_DELAY_MS,
};
use crate::dsp::DemodMode;
use crate::error::{Result, SdrError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::{Duration, Instant};

/// Dwell per entry accepted by the scanner.
pub fn clamp_dwell_ms(ms: u64) -> u64 {
    ms.clamp(SCAN_DWELL_MIN_MS, SCAN_DWELL_MAX_MS)
}

/// Resume delay accepted by the scanner.
pub fn clamp_resume_delay_ms(ms: u64) -> u64 {
    ms.min(SCAN_RESUME_DELAY_MAX_MS)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScanState {
    #[default]
    Idle,
    /// Stepping through the list, dwelling on each entry.
    Scanning,
    /// Paused on an active entry.
    Monitoring,
    /// Signal dropped; waiting out the resume delay.
    Hold,
}

impl ScanState {
    pub fn is_active(&self) -> bool {
        !matches!(self, ScanState::Idle)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScanMode {
    Range,
    #[default]
    #[serde(alias = "BOOKMARK")]
    Memory,
}

/// Status published on every transition and retune.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanStatus {
    pub state: ScanState,
    pub scan_mode: ScanMode,
    pub label: String,
    pub index: usize,
    pub total: usize,
    /// Entries passed over for lack of signal.
    pub skipped: u64,
    pub freq: u64,
    /// Entries locked out by the operator this session.
    pub locked_out: usize,
    pub dwell_ms: u64,
    pub resume_delay_ms: u64,
}

/// Side effects for the caller to apply.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanAction {
    /// Retune the tuner (and demodulator) to this entry.
    Tune(ScanEntry),
    Status(ScanStatus),
}

/// Tuning to return to when a scan is stopped with restore.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScanOrigin {
    pub frequency: u64,
    pub mode: DemodMode,
}

struct Session {
    list: ScanList,
    index: usize,
    skipped: u64,
    locked: HashSet<u64>,
    origin: Option<ScanOrigin>,
    /// When the current state (or the current entry) was entered.
    since: Instant,
}

pub struct ScannerEngine<C: Clock = SystemClock> {
    clock: C,
    state: ScanState,
    mode: ScanMode,
    session: Option<Session>,
    dwell: Duration,
    resume_delay: Duration,
}

impl ScannerEngine<SystemClock> {
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl Default for ScannerEngine<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> ScannerEngine<C> {
    pub fn with_clock(clock: C) -> Self {
        Self {
            clock,
            state: ScanState::Idle,
            mode: ScanMode::default(),
            session: None,
            dwell: Duration::from_millis(SCAN_DWELL_MS),
            resume_delay: Duration::from_millis(SCAN_RESUME_DELAY_MS),
        }
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    pub fn dwell(&self) -> Duration {
        self.dwell
    }

    pub fn resume_delay(&self) -> Duration {
        self.resume_delay
    }

    /// Set the scan-speed (dwell per entry), clamped to 50..=500 ms.
    pub fn set_dwell_ms(&mut self, ms: u64) -> Duration {
        self.dwell = Duration::from_millis(clamp_dwell_ms(ms));
        log::info!("Scanner dwell time: {}ms", self.dwell.as_millis());
        self.dwell
    }

    /// Set how long a lost signal is held before resuming, clamped to 0..=10 s.
    pub fn set_resume_delay_ms(&mut self, ms: u64) -> Duration {
        self.resume_delay = Duration::from_millis(clamp_resume_delay_ms(ms));
        log::info!(
            "Scanner resume delay: {:.1}s",
            self.resume_delay.as_secs_f32()
        );
        self.resume_delay
    }

    /// Begin a range scan. Replaces any active scan.
    pub fn start_range(
        &mut self,
        plan: RangePlan,
        mode: DemodMode,
        origin: Option<ScanOrigin>,
    ) -> Vec<ScanAction> {
        log::info!(
            "Scanner started (range: {} - {}, step {:.1} kHz, mode {})",
            range_label(plan.start()),
            range_label(plan.end()),
            plan.step() as f64 / 1e3,
            mode
        );
        self.begin(ScanMode::Range, ScanList::Range { plan, mode }, origin)
    }

    /// Begin a memory scan over bookmark entries. Replaces any active scan.
    ///
    /// # Errors
    /// `SdrError::Configuration` when there is nothing to scan.
    pub fn start_memory(
        &mut self,
        entries: Vec<ScanEntry>,
        origin: Option<ScanOrigin>,
    ) -> Result<Vec<ScanAction>> {
        let entries: Vec<ScanEntry> = entries.into_iter().filter(|e| e.frequency > 0).collect();
        if entries.is_empty() {
            return Err(SdrError::config("no bookmarks to scan"));
        }
        log::info!("Scanner started (memory: {} entries)", entries.len());
        Ok(self.begin(ScanMode::Memory, ScanList::Memory(entries), origin))
    }

    fn begin(
        &mut self,
        mode: ScanMode,
        list: ScanList,
        origin: Option<ScanOrigin>,
    ) -> Vec<ScanAction> {
        // A restart keeps the very first origin so restore goes back to
        // where the operator was before any scanning.
        let origin = self
            .session
            .take()
            .and_then(|s| s.origin)
            .or(origin);
        self.mode = mode;
        self.state = ScanState::Scanning;
        self.session = Some(Session {
            list,
            index: 0,
            skipped: 0,
            locked: HashSet::new(),
            origin,
            since: self.clock.now(),
        });
        self.tune_current()
    }

    /// Stop scanning. With `restore`, retune to the pre-scan tuning.
    pub fn stop(&mut self, restore: bool) -> Vec<ScanAction> {
        let Some(session) = self.session.take() else {
            return Vec::new();
        };
        self.state = ScanState::Idle;
        log::info!("Scanner stopped");

        let mut actions = Vec::new();
        if restore && let Some(origin) = session.origin {
            actions.push(ScanAction::Tune(ScanEntry::new(
                origin.frequency,
                origin.mode,
                "",
            )));
        }
        actions.push(ScanAction::Status(self.status()));
        actions
    }

    /// Lock the current entry out for this session and move on.
    pub fn skip(&mut self) -> Vec<ScanAction> {
        let Some(session) = self.session.as_mut() else {
            return Vec::new();
        };
        if let Some(entry) = session.list.entry(session.index) {
            log::info!("Scanner skipping {}", range_label(entry.frequency));
            session.locked.insert(entry.frequency);
        }
        self.advance()
    }

    /// Feed the squelch verdict for one block tuned to the current entry.
    pub fn observe(&mut self, signal_present: bool) -> Vec<ScanAction> {
        let now = self.clock.now();
        let Some(session) = self.session.as_mut() else {
            return Vec::new();
        };
        let elapsed = now.saturating_duration_since(session.since);

        match self.state {
            ScanState::Idle => Vec::new(),
            ScanState::Scanning if signal_present => {
                if let Some(entry) = session.list.entry(session.index) {
                    log::info!("Scanner monitoring {} ({} Hz)", entry.label, entry.frequency);
                }
                self.transition(ScanState::Monitoring, now)
            }
            ScanState::Scanning if elapsed >= self.dwell => {
                session.skipped += 1;
                self.advance()
            }
            ScanState::Scanning => Vec::new(),
            ScanState::Monitoring if !signal_present => {
                log::info!(
                    "Scanner hold ({:.1}s)",
                    self.resume_delay.as_secs_f32()
                );
                self.transition(ScanState::Hold, now)
            }
            ScanState::Monitoring => Vec::new(),
            ScanState::Hold if signal_present => self.transition(ScanState::Monitoring, now),
            ScanState::Hold if elapsed >= self.resume_delay => self.advance(),
            ScanState::Hold => Vec::new(),
        }
    }

    fn transition(&mut self, state: ScanState, now: Instant) -> Vec<ScanAction> {
        self.state = state;
        if let Some(session) = self.session.as_mut() {
            session.since = now;
        }
        vec![ScanAction::Status(self.status())]
    }

    /// Move to the next entry that is not locked out, wrapping at the end.
    fn advance(&mut self) -> Vec<ScanAction> {
        let Some(session) = self.session.as_mut() else {
            return Vec::new();
        };
        let total = session.list.len();
        let next = (1..=total)
            .map(|step| (session.index + step) % total)
            .find(|&i| {
                session
                    .list
                    .entry(i)
                    .is_some_and(|e| !session.locked.contains(&e.frequency))
            });

        match next {
            Some(index) => {
                session.index = index;
                self.state = ScanState::Scanning;
                self.tune_current()
            }
            None => {
                log::warn!("Scanner: every entry is locked out");
                self.stop(false)
            }
        }
    }

    fn tune_current(&mut self) -> Vec<ScanAction> {
        let now = self.clock.now();
        let Some(session) = self.session.as_mut() else {
            return Vec::new();
        };
        session.since = now;
        let mut actions = Vec::with_capacity(2);
        if let Some(entry) = session.list.entry(session.index) {
            actions.push(ScanAction::Tune(entry));
        }
        actions.push(ScanAction::Status(self.status()));
        actions
    }

    pub fn status(&self) -> ScanStatus {
        let base = ScanStatus {
            state: self.state,
            scan_mode: self.mode,
            label: String::new(),
            index: 0,
            total: 0,
            skipped: 0,
            freq: 0,
            locked_out: 0,
            dwell_ms: self.dwell.as_millis() as u64,
            resume_delay_ms: self.resume_delay.as_millis() as u64,
        };
        let Some(session) = &self.session else {
            return base;
        };
        let entry = session.list.entry(session.index);
        ScanStatus {
            label: entry.as_ref().map(|e| e.label.clone()).unwrap_or_default(),
            freq: entry.as_ref().map(|e| e.frequency).unwrap_or(0),
            index: session.index,
            total: session.list.len(),
            skipped: session.skipped,
            locked_out: session.locked.len(),
            ..base
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn scanner() -> (ScannerEngine<ManualClock>, ManualClock) {
        let clock = ManualClock::new();
        (ScannerEngine::with_clock(clock.clone()), clock)
    }

    fn tunes(actions: &[ScanAction]) -> Vec<u64> {
        actions
            .iter()
            .filter_map(|a| match a {
                ScanAction::Tune(e) => Some(e.frequency),
                ScanAction::Status(_) => None,
            })
            .collect()
    }

    fn last_status(actions: &[ScanAction]) -> ScanStatus {
        actions
            .iter()
            .rev()
            .find_map(|a| match a {
                ScanAction::Status(s) => Some(s.clone()),
                ScanAction::Tune(_) => None,
            })
            .expect("status")
    }

    fn memory() -> Vec<ScanEntry> {
        vec![
            ScanEntry::new(145_500_000, DemodMode::Nbfm, "calling"),
            ScanEntry::new(0, DemodMode::Nbfm, "broken"),
            ScanEntry::new(118_100_000, DemodMode::Am, "tower"),
            ScanEntry::new(98_500_000, DemodMode::Wbfm, "local fm"),
        ]
    }

    #[test]
    fn range_start_tunes_first_entry() {
        let (mut s, _) = scanner();
        let plan = RangePlan::new(88_000_000, 108_000_000, 200_000).unwrap();
        let actions = s.start_range(plan, DemodMode::Wbfm, None);
        assert_eq!(tunes(&actions), vec![88_000_000]);
        let status = last_status(&actions);
        assert_eq!(status.state, ScanState::Scanning);
        assert_eq!(status.scan_mode, ScanMode::Range);
        assert_eq!(status.total, 100);
        assert_eq!(status.label, "88.000 MHz");
    }

    #[test]
    fn quiet_entries_advance_after_dwell_and_count_skips() {
        let (mut s, clock) = scanner();
        s.set_dwell_ms(100);
        s.start_range(RangePlan::new(1_000, 4_000, 1_000).unwrap(), DemodMode::Am, None);

        clock.advance(Duration::from_millis(60));
        assert!(s.observe(false).is_empty());

        clock.advance(Duration::from_millis(40));
        let actions = s.observe(false);
        assert_eq!(tunes(&actions), vec![2_000]);
        assert_eq!(last_status(&actions).skipped, 1);

        clock.advance(Duration::from_millis(100));
        s.observe(false);
        clock.advance(Duration::from_millis(100));
        let actions = s.observe(false);
        // wrapped back to the start
        assert_eq!(tunes(&actions), vec![1_000]);
        assert_eq!(last_status(&actions).index, 0);
    }

    #[test]
    fn signal_pauses_then_holds_then_resumes() {
        let (mut s, clock) = scanner();
        s.set_resume_delay_ms(2_000);
        s.start_range(RangePlan::new(1_000, 4_000, 1_000).unwrap(), DemodMode::Am, None);

        let found = s.observe(true);
        assert_eq!(last_status(&found).state, ScanState::Monitoring);
        assert!(tunes(&found).is_empty());

        clock.advance(Duration::from_secs(30));
        assert!(s.observe(true).is_empty());

        let hold = s.observe(false);
        assert_eq!(last_status(&hold).state, ScanState::Hold);

        clock.advance(Duration::from_millis(1_000));
        let back = s.observe(true);
        assert_eq!(last_status(&back).state, ScanState::Monitoring);

        s.observe(false);
        clock.advance(Duration::from_millis(2_000));
        let resumed = s.observe(false);
        assert_eq!(tunes(&resumed), vec![2_000]);
        assert_eq!(last_status(&resumed).state, ScanState::Scanning);
        // leaving after a hit is not a skip
        assert_eq!(last_status(&resumed).skipped, 0);
    }

    #[test]
    fn skip_locks_out_and_advances() {
        let (mut s, clock) = scanner();
        s.start_range(RangePlan::new(1_000, 4_000, 1_000).unwrap(), DemodMode::Am, None);
        s.observe(true);

        let actions = s.skip();
        assert_eq!(tunes(&actions), vec![2_000]);
        let status = last_status(&actions);
        assert_eq!(status.state, ScanState::Scanning);
        assert_eq!(status.locked_out, 1);

        // 1_000 is never revisited
        for _ in 0..4 {
            clock.advance(Duration::from_millis(500));
            let actions = s.observe(false);
            assert!(!tunes(&actions).contains(&1_000));
        }
    }

    #[test]
    fn locking_out_everything_stops() {
        let (mut s, _) = scanner();
        s.start_range(RangePlan::new(1_000, 3_000, 1_000).unwrap(), DemodMode::Am, None);
        s.skip();
        let actions = s.skip();
        assert_eq!(last_status(&actions).state, ScanState::Idle);
        assert_eq!(s.state(), ScanState::Idle);
    }

    #[test]
    fn memory_scan_drops_zero_frequencies_and_keeps_modes() {
        let (mut s, clock) = scanner();
        let actions = s.start_memory(memory(), None).unwrap();
        let status = last_status(&actions);
        assert_eq!(status.total, 3);
        assert_eq!(status.label, "calling");

        clock.advance(Duration::from_millis(SCAN_DWELL_MS));
        let actions = s.observe(false);
        match &actions[0] {
            ScanAction::Tune(entry) => {
                assert_eq!(entry.label, "tower");
                assert_eq!(entry.mode, DemodMode::Am);
            }
            other => panic!("expected tune, got {other:?}"),
        }
    }

    #[test]
    fn empty_memory_scan_is_rejected() {
        let (mut s, _) = scanner();
        let err = s
            .start_memory(vec![ScanEntry::new(0, DemodMode::Am, "x")], None)
            .unwrap_err();
        assert_eq!(err.kind(), "configuration");
        assert_eq!(s.state(), ScanState::Idle);
    }

    #[test]
    fn stop_restores_only_when_asked() {
        let origin = ScanOrigin {
            frequency: 100_100_000,
            mode: DemodMode::Wbfm,
        };
        let (mut s, _) = scanner();
        s.start_memory(memory(), Some(origin)).unwrap();
        let actions = s.stop(false);
        assert!(tunes(&actions).is_empty());
        assert_eq!(last_status(&actions).state, ScanState::Idle);

        s.start_memory(memory(), Some(origin)).unwrap();
        let actions = s.stop(true);
        assert_eq!(tunes(&actions), vec![100_100_000]);

        assert!(s.stop(true).is_empty());
    }

    #[test]
    fn restart_keeps_original_origin() {
        let (mut s, _) = scanner();
        let first = ScanOrigin {
            frequency: 100_100_000,
            mode: DemodMode::Wbfm,
        };
        let second = ScanOrigin {
            frequency: 145_500_000,
            mode: DemodMode::Nbfm,
        };
        s.start_memory(memory(), Some(first)).unwrap();
        s.start_memory(memory(), Some(second)).unwrap();
        assert_eq!(tunes(&s.stop(true)), vec![100_100_000]);
    }

    #[test]
    fn dwell_and_resume_delay_are_clamped() {
        let (mut s, _) = scanner();
        assert_eq!(s.set_dwell_ms(1), Duration::from_millis(50));
        assert_eq!(s.set_dwell_ms(10_000), Duration::from_millis(500));
        assert_eq!(s.set_resume_delay_ms(60_000), Duration::from_secs(10));
        assert_eq!(s.status().dwell_ms, 500);
    }

    #[test]
    fn idle_observe_is_inert() {
        let (mut s, _) = scanner();
        assert!(s.observe(true).is_empty());
        assert!(s.skip().is_empty());
        assert_eq!(s.status().state, ScanState::Idle);
    }

    #[test]
    fn status_serializes_with_wire_names() {
        let (mut s, _) = scanner();
        s.start_range(RangePlan::new(1_000, 4_000, 1_000).unwrap(), DemodMode::Am, None);
        let json = serde_json::to_value(s.status()).unwrap();
        assert_eq!(json["state"], "SCANNING");
        assert_eq!(json["scan_mode"], "RANGE");
        assert_eq!(json["total"], 3);
    }
}
