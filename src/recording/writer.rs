//! Writer stations: one per recording session, each on its own thread.

use crate::error::{Result, SdrError};
use crate::pipeline::{Station, StationError};
use num_complex::Complex32;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Writes 48 kHz mono 16-bit PCM WAV.
pub struct WavWriterStation {
    writer: Option<hound::WavWriter<BufWriter<File>>>,
    path: PathBuf,
    written: u64,
}

impl WavWriterStation {
    pub fn create(path: &Path, sample_rate: u32) -> Result<Self> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let writer = hound::WavWriter::create(path, spec).map_err(|e| SdrError::RecordingIo {
            kind: "audio".to_string(),
            message: format!("failed to create {}: {}", path.display(), e),
        })?;
        Ok(Self {
            writer: Some(writer),
            path: path.to_path_buf(),
            written: 0,
        })
    }
}

impl Station for WavWriterStation {
    type Input = Vec<f32>;
    type Output = ();

    fn process(&mut self, audio: Vec<f32>) -> std::result::Result<Option<()>, StationError> {
        let Some(writer) = self.writer.as_mut() else {
            return Ok(None);
        };
        for sample in audio {
            let pcm = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
            writer
                .write_sample(pcm)
                .map_err(|e| StationError::Fatal(format!("{}: {}", self.path.display(), e)))?;
        }
        self.written += 1;
        Ok(None)
    }

    fn name(&self) -> &'static str {
        "wav-writer"
    }

    fn shutdown(&mut self) -> std::result::Result<(), StationError> {
        let Some(writer) = self.writer.take() else {
            return Ok(());
        };
        writer
            .finalize()
            .map_err(|e| StationError::Fatal(format!("{}: {}", self.path.display(), e)))?;
        log::debug!(
            "Closed {} after {} audio chunks",
            self.path.display(),
            self.written
        );
        Ok(())
    }
}

/// Writes raw interleaved little-endian `f32` I/Q pairs, no header.
pub struct IqWriterStation {
    out: Option<BufWriter<File>>,
    path: PathBuf,
    bytes: Vec<u8>,
}

impl IqWriterStation {
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path).map_err(|e| SdrError::RecordingIo {
            kind: "iq".to_string(),
            message: format!("failed to create {}: {}", path.display(), e),
        })?;
        Ok(Self::from_file(file, path))
    }

    pub fn from_file(file: File, path: &Path) -> Self {
        Self {
            out: Some(BufWriter::new(file)),
            path: path.to_path_buf(),
            bytes: Vec::new(),
        }
    }
}

impl Station for IqWriterStation {
    type Input = Vec<Complex32>;
    type Output = ();

    fn process(&mut self, samples: Vec<Complex32>) -> std::result::Result<Option<()>, StationError> {
        let Some(out) = self.out.as_mut() else {
            return Ok(None);
        };
        self.bytes.clear();
        self.bytes.reserve(samples.len() * 8);
        for s in &samples {
            self.bytes.extend_from_slice(&s.re.to_le_bytes());
            self.bytes.extend_from_slice(&s.im.to_le_bytes());
        }
        out.write_all(&self.bytes)
            .map_err(|e| StationError::Fatal(format!("{}: {}", self.path.display(), e)))?;
        Ok(None)
    }

    fn name(&self) -> &'static str {
        "iq-writer"
    }

    fn shutdown(&mut self) -> std::result::Result<(), StationError> {
        let Some(mut out) = self.out.take() else {
            return Ok(());
        };
        out.flush()
            .map_err(|e| StationError::Fatal(format!("{}: {}", self.path.display(), e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn wav_writer_clamps_and_finalizes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.wav");
        let mut station = WavWriterStation::create(&path, 48_000).unwrap();
        station.process(vec![0.0, 0.5, 2.0, -2.0]).unwrap();
        station.shutdown().unwrap();

        let mut reader = hound::WavReader::open(&path).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, 48_000);
        assert_eq!(spec.bits_per_sample, 16);
        let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![0, 16_383, i16::MAX, -i16::MAX]);
    }

    #[test]
    fn iq_writer_emits_interleaved_le_floats() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.raw");
        let mut station = IqWriterStation::create(&path).unwrap();
        station
            .process(vec![Complex32::new(1.0, -0.5), Complex32::new(0.25, 0.0)])
            .unwrap();
        station.shutdown().unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(bytes.len(), 16);
        let floats: Vec<f32> = bytes
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        assert_eq!(floats, vec![1.0, -0.5, 0.25, 0.0]);
    }

    #[test]
    fn create_in_missing_dir_is_recording_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing").join("a.raw");
        let err = IqWriterStation::create(&path).err().unwrap();
        assert_eq!(err.kind(), "recording_io");
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn full_disk_is_fatal() {
        let file = std::fs::OpenOptions::new()
            .write(true)
            .open("/dev/full")
            .unwrap();
        let mut station = IqWriterStation::from_file(file, Path::new("/dev/full"));
        let block = vec![Complex32::new(0.1, 0.1); 65_536];
        let err = station.process(block).unwrap_err();
        assert!(err.is_fatal());
    }
}
