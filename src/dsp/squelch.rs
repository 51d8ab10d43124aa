//! Signal level measurement and squelch.

use crate::defaults::NOISE_FLOOR_DB;
use num_complex::Complex32;

/// Mean power of a block in dBFS, floored at the noise floor.
pub fn power_db(samples: &[Complex32]) -> f32 {
    if samples.is_empty() {
        return NOISE_FLOOR_DB;
    }
    let power = samples.iter().map(|s| s.norm_sqr()).sum::<f32>() / samples.len() as f32;
    if power <= 0.0 {
        return NOISE_FLOOR_DB;
    }
    (10.0 * power.log10()).max(NOISE_FLOOR_DB)
}

/// S-meter label for a dBFS level.
pub fn s_units(db: f32) -> &'static str {
    const TABLE: [(f32, &str); 12] = [
        (-10.0, "S9+60"),
        (-16.0, "S9+40"),
        (-22.0, "S9+20"),
        (-28.0, "S9"),
        (-34.0, "S8"),
        (-40.0, "S7"),
        (-46.0, "S6"),
        (-52.0, "S5"),
        (-58.0, "S4"),
        (-64.0, "S3"),
        (-70.0, "S2"),
        (-76.0, "S1"),
    ];
    TABLE
        .iter()
        .find(|(threshold, _)| db > *threshold)
        .map(|(_, label)| *label)
        .unwrap_or("S0")
}

/// Threshold gate with hysteresis.
///
/// Opens when the level reaches the threshold (`>=`), closes only when it
/// falls below `threshold - hysteresis`. A constant level never toggles it.
#[derive(Debug, Clone)]
pub struct Squelch {
    threshold_db: f32,
    hysteresis_db: f32,
    open: bool,
}

impl Squelch {
    pub fn new(threshold_db: f32, hysteresis_db: f32) -> Self {
        Self {
            threshold_db,
            hysteresis_db: hysteresis_db.max(0.0),
            open: false,
        }
    }

    pub fn set_threshold(&mut self, threshold_db: f32, hysteresis_db: f32) {
        self.threshold_db = threshold_db;
        self.hysteresis_db = hysteresis_db.max(0.0);
    }

    /// Feed one level measurement and return whether a signal is present.
    pub fn update(&mut self, level_db: f32) -> bool {
        self.open = if self.open {
            level_db >= self.threshold_db - self.hysteresis_db
        } else {
            level_db >= self.threshold_db
        };
        self.open
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn reset(&mut self) {
        self.open = false;
    }
}
