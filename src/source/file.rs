//! IQ file replay.
//!
//! Reads interleaved I/Q as little-endian f32 pairs, the same layout the IQ
//! recorder writes, so a capture can be fed straight back into the engine.

use crate::error::{Result, SdrError};
use crate::source::{SampleBlock, SampleSource, SourceConfig, TunerState};
use num_complex::Complex32;
use std::fs::File;
use std::io::{BufReader, ErrorKind, Read, Seek, SeekFrom};
use std::path::PathBuf;

const BYTES_PER_SAMPLE: usize = 2 * std::mem::size_of::<f32>();

pub struct FileSource {
    reader: BufReader<File>,
    path: PathBuf,
    loop_on_eof: bool,
    block_size: usize,
    sample_rate: u32,
    center_freq: u64,
    bytes: Vec<u8>,
}

impl FileSource {
    /// Open the file named by `config.host`.
    pub fn open(config: &SourceConfig) -> Result<Self> {
        let path = PathBuf::from(&config.host);
        let file = File::open(&path).map_err(|e| {
            SdrError::connection(format!("cannot open IQ file {}: {}", path.display(), e))
        })?;
        let len = file.metadata().map(|m| m.len()).unwrap_or(0);
        if len < BYTES_PER_SAMPLE as u64 {
            return Err(SdrError::connection(format!(
                "IQ file {} holds no samples",
                path.display()
            )));
        }

        Ok(Self {
            reader: BufReader::new(file),
            path,
            loop_on_eof: config.file_loop,
            block_size: config.block_size,
            sample_rate: config.sample_rate,
            center_freq: crate::defaults::DEFAULT_FREQUENCY,
            bytes: vec![0u8; config.block_size * BYTES_PER_SAMPLE],
        })
    }

    /// Read up to one block of bytes, rewinding at EOF when looping.
    fn read_bytes(&mut self) -> Result<usize> {
        let mut total = 0;
        while total < self.bytes.len() {
            match self.reader.read(&mut self.bytes[total..]) {
                Ok(0) => {
                    if !self.loop_on_eof {
                        break;
                    }
                    self.reader.seek(SeekFrom::Start(0)).map_err(|e| {
                        SdrError::connection(format!("rewind {} failed: {}", self.path.display(), e))
                    })?;
                }
                Ok(n) => total += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    return Err(SdrError::connection(format!(
                        "read {} failed: {}",
                        self.path.display(),
                        e
                    )));
                }
            }
        }
        Ok(total)
    }
}

impl SampleSource for FileSource {
    fn apply(&mut self, tuner: &TunerState) -> Result<()> {
        // A recording cannot be retuned; the values only tag the blocks.
        self.center_freq = tuner.center_freq;
        self.sample_rate = tuner.sample_rate;
        Ok(())
    }

    fn next_block(&mut self) -> Result<SampleBlock> {
        let read = self.read_bytes()?;
        let count = read / BYTES_PER_SAMPLE;
        if count == 0 {
            return Err(SdrError::connection(format!(
                "IQ file {} is exhausted",
                self.path.display()
            )));
        }

        let samples = self.bytes[..count * BYTES_PER_SAMPLE]
            .chunks_exact(BYTES_PER_SAMPLE)
            .map(|c| {
                Complex32::new(
                    f32::from_le_bytes([c[0], c[1], c[2], c[3]]),
                    f32::from_le_bytes([c[4], c[5], c[6], c[7]]),
                )
            })
            .collect();
        Ok(SampleBlock::new(samples, self.sample_rate, self.center_freq))
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn is_realtime(&self) -> bool {
        false
    }

    fn describe(&self) -> String {
        format!(
            "file {} ({} samples/block{})",
            self.path.display(),
            self.block_size,
            if self.loop_on_eof { ", looping" } else { "" }
        )
    }
}
