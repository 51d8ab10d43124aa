//! Scan lists: lazily generated frequency ranges and bookmark lists.

use crate::dsp::DemodMode;
use crate::error::{Result, SdrError};
use serde::{Deserialize, Serialize};

/// One stop of a scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanEntry {
    pub frequency: u64,
    pub mode: DemodMode,
    pub label: String,
}

impl ScanEntry {
    pub fn new(frequency: u64, mode: DemodMode, label: impl Into<String>) -> Self {
        Self {
            frequency,
            mode,
            label: label.into(),
        }
    }
}

/// Display label for a range-scan frequency.
pub fn range_label(frequency: u64) -> String {
    format!("{:.3} MHz", frequency as f64 / 1e6)
}

/// Frequencies `start, start + step, ...` strictly below `end`.
///
/// Entries are computed on demand; the plan never holds the list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangePlan {
    start: u64,
    end: u64,
    step: u64,
}

impl RangePlan {
    /// # Errors
    /// `SdrError::Configuration` unless `end > start` and `step > 0`.
    pub fn new(start: u64, end: u64, step: u64) -> Result<Self> {
        if step == 0 {
            return Err(SdrError::config("scan step must be positive"));
        }
        if end <= start {
            return Err(SdrError::config(format!(
                "scan end ({end} Hz) must be above start ({start} Hz)"
            )));
        }
        Ok(Self { start, end, step })
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn end(&self) -> u64 {
        self.end
    }

    pub fn step(&self) -> u64 {
        self.step
    }

    /// Number of frequencies in one sweep.
    pub fn len(&self) -> usize {
        (self.end - self.start).div_ceil(self.step) as usize
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Frequency at `index`, wrapping past the end of the sweep.
    pub fn frequency(&self, index: usize) -> u64 {
        self.start + (index % self.len()) as u64 * self.step
    }

    /// Index of `frequency` if it lies on the grid.
    pub fn index_of(&self, frequency: u64) -> Option<usize> {
        if frequency < self.start || frequency >= self.end {
            return None;
        }
        let offset = frequency - self.start;
        (offset % self.step == 0).then_some((offset / self.step) as usize)
    }

    /// An endless, wrapping iterator over the sweep.
    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        (0..).map(move |i| self.frequency(i))
    }
}

/// The active scan list.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanList {
    Range { plan: RangePlan, mode: DemodMode },
    Memory(Vec<ScanEntry>),
}

impl ScanList {
    pub fn len(&self) -> usize {
        match self {
            ScanList::Range { plan, .. } => plan.len(),
            ScanList::Memory(entries) => entries.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn entry(&self, index: usize) -> Option<ScanEntry> {
        match self {
            ScanList::Range { plan, mode } => {
                let frequency = plan.frequency(index);
                Some(ScanEntry::new(frequency, *mode, range_label(frequency)))
            }
            ScanList::Memory(entries) => entries.get(index % entries.len().max(1)).cloned(),
        }
    }
}
