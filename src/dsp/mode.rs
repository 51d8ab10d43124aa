//! Demodulation modes and their channel parameters.

use crate::error::{Result, SdrError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DemodMode {
    /// Broadcast FM, 200 kHz channel.
    #[default]
    #[serde(rename = "WBFM", alias = "FM", alias = "wbfm")]
    Wbfm,
    /// Narrowband FM, 12.5 kHz channel.
    #[serde(rename = "NBFM", alias = "NFM", alias = "nbfm")]
    Nbfm,
    #[serde(rename = "AM", alias = "am")]
    Am,
}

impl DemodMode {
    pub const ALL: [DemodMode; 3] = [DemodMode::Wbfm, DemodMode::Nbfm, DemodMode::Am];

    pub fn as_str(&self) -> &'static str {
        match self {
            DemodMode::Wbfm => "WBFM",
            DemodMode::Nbfm => "NBFM",
            DemodMode::Am => "AM",
        }
    }

    /// Channel filter cutoff (one-sided) in Hz.
    pub fn channel_cutoff_hz(&self) -> f32 {
        match self {
            DemodMode::Wbfm => 100_000.0,
            DemodMode::Nbfm => 6_250.0,
            DemodMode::Am => 5_000.0,
        }
    }

    /// Channel filter length. Narrow channels need steeper skirts.
    pub fn channel_taps(&self) -> usize {
        match self {
            DemodMode::Wbfm => 65,
            DemodMode::Nbfm | DemodMode::Am => 129,
        }
    }

    /// Peak frequency deviation mapped to full-scale audio (FM modes only).
    pub fn deviation_hz(&self) -> Option<f32> {
        match self {
            DemodMode::Wbfm => Some(75_000.0),
            DemodMode::Nbfm => Some(5_000.0),
            DemodMode::Am => None,
        }
    }

    pub fn uses_deemphasis(&self) -> bool {
        matches!(self, DemodMode::Wbfm)
    }
}

impl fmt::Display for DemodMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DemodMode {
    type Err = SdrError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "WBFM" | "FM" => Ok(DemodMode::Wbfm),
            "NBFM" | "NFM" => Ok(DemodMode::Nbfm),
            "AM" => Ok(DemodMode::Am),
            other => Err(SdrError::config(format!(
                "unknown mode '{other}', expected WBFM, NBFM or AM"
            ))),
        }
    }
}
