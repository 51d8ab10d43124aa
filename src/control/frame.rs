//! Binary streaming frames: one type byte, then little-endian `f32`s.

use crate::error::{Result, SdrError};
use std::sync::Arc;

pub const SPECTRUM_FRAME: u8 = 0x01;
pub const AUDIO_FRAME: u8 = 0x02;

#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Normalized magnitudes in [0, 1], one per spectrum bin.
    Spectrum(Arc<[f32]>),
    /// 48 kHz mono PCM in [-1, 1].
    Audio(Arc<[f32]>),
}

impl Frame {
    pub fn type_byte(&self) -> u8 {
        match self {
            Frame::Spectrum(_) => SPECTRUM_FRAME,
            Frame::Audio(_) => AUDIO_FRAME,
        }
    }

    pub fn values(&self) -> &[f32] {
        match self {
            Frame::Spectrum(v) | Frame::Audio(v) => v,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let values = self.values();
        let mut out = Vec::with_capacity(1 + values.len() * 4);
        out.push(self.type_byte());
        for v in values {
            out.extend_from_slice(&v.to_le_bytes());
        }
        out
    }

    /// # Errors
    /// `SdrError::Protocol` for an unknown type byte or a ragged payload.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let Some((&kind, payload)) = bytes.split_first() else {
            return Err(SdrError::Protocol {
                message: "empty frame".to_string(),
            });
        };
        if payload.len() % 4 != 0 {
            return Err(SdrError::Protocol {
                message: format!("frame payload of {} bytes is not whole floats", payload.len()),
            });
        }
        let values: Arc<[f32]> = payload
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        match kind {
            SPECTRUM_FRAME => Ok(Frame::Spectrum(values)),
            AUDIO_FRAME => Ok(Frame::Audio(values)),
            other => Err(SdrError::Protocol {
                message: format!("unknown frame type 0x{other:02x}"),
            }),
        }
    }
}
