//! rtl_tcp network client.
//!
//! Protocol: the server greets with 12 bytes (`RTL0`, tuner type and gain
//! count as big-endian u32), then streams unsigned 8-bit interleaved I/Q.
//! Commands are 5 bytes: a command id followed by a big-endian u32.

use crate::error::{Result, SdrError};
use crate::source::{SampleBlock, SampleSource, SourceConfig, TunerGain, TunerState};
use num_complex::Complex32;
use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

const MAGIC: &[u8; 4] = b"RTL0";

const CMD_SET_FREQ: u8 = 0x01;
const CMD_SET_SAMPLE_RATE: u8 = 0x02;
const CMD_SET_GAIN_MODE: u8 = 0x03;
const CMD_SET_GAIN: u8 = 0x04;
const CMD_SET_AGC: u8 = 0x08;

/// Consecutive read timeouts tolerated before the connection is declared lost.
const MAX_READ_TIMEOUTS: u32 = 3;

/// Tuner chip reported in the rtl_tcp greeting.
pub fn tuner_name(tuner_type: u32) -> String {
    match tuner_type {
        1 => "E4000".to_string(),
        2 => "FC0012".to_string(),
        3 => "FC0013".to_string(),
        4 => "FC2580".to_string(),
        5 => "R820T".to_string(),
        6 => "R828D".to_string(),
        other => format!("unknown({other})"),
    }
}

/// Parsed 12-byte rtl_tcp greeting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Greeting {
    pub tuner_type: u32,
    pub gain_count: u32,
}

impl Greeting {
    pub fn parse(bytes: &[u8; 12]) -> Result<Self> {
        if &bytes[..4] != MAGIC {
            return Err(SdrError::connection(format!(
                "invalid rtl_tcp magic: {:?}",
                &bytes[..4]
            )));
        }
        let tuner_type = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        let gain_count = u32::from_be_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
        Ok(Self {
            tuner_type,
            gain_count,
        })
    }
}

/// Encode a 5-byte rtl_tcp command.
pub fn encode_command(id: u8, param: u32) -> [u8; 5] {
    let p = param.to_be_bytes();
    [id, p[0], p[1], p[2], p[3]]
}

/// Convert unsigned 8-bit I/Q pairs into complex samples in [-1, 1].
pub fn convert_u8(bytes: &[u8], out: &mut Vec<Complex32>) {
    out.extend(bytes.chunks_exact(2).map(|pair| {
        Complex32::new(
            (pair[0] as f32 - 127.5) / 127.5,
            (pair[1] as f32 - 127.5) / 127.5,
        )
    }));
}

/// Sample source backed by an rtl_tcp server.
pub struct RtlTcpSource {
    stream: TcpStream,
    addr: SocketAddr,
    greeting: Greeting,
    block_size: usize,
    sample_rate: u32,
    applied: Option<TunerState>,
    /// Raw read buffer; an odd trailing byte stays here for the next read.
    pending: Vec<u8>,
    scratch: Vec<u8>,
}

impl RtlTcpSource {
    /// Connect, validate the greeting and configure the sample rate.
    pub fn connect(config: &SourceConfig) -> Result<Self> {
        let addr = (config.host.as_str(), config.port)
            .to_socket_addrs()
            .map_err(|e| {
                SdrError::connection(format!(
                    "cannot resolve {}:{}: {}",
                    config.host, config.port, e
                ))
            })?
            .next()
            .ok_or_else(|| {
                SdrError::connection(format!("no address for {}:{}", config.host, config.port))
            })?;

        let mut stream = TcpStream::connect_timeout(&addr, config.connect_timeout)
            .map_err(|e| SdrError::connection(format!("connect to {addr} failed: {e}")))?;
        stream
            .set_read_timeout(Some(config.connect_timeout))
            .map_err(|e| SdrError::connection(e.to_string()))?;
        stream.set_nodelay(true).ok();

        let mut header = [0u8; 12];
        stream
            .read_exact(&mut header)
            .map_err(|e| SdrError::connection(format!("no rtl_tcp greeting from {addr}: {e}")))?;
        let greeting = Greeting::parse(&header)?;

        stream
            .set_read_timeout(Some(config.read_timeout))
            .map_err(|e| SdrError::connection(e.to_string()))?;

        log::info!(
            "Connected to rtl_tcp at {}: tuner={}, gains={}",
            addr,
            tuner_name(greeting.tuner_type),
            greeting.gain_count
        );

        let mut source = Self {
            stream,
            addr,
            greeting,
            block_size: config.block_size,
            sample_rate: config.sample_rate,
            applied: None,
            pending: Vec::with_capacity(config.block_size * 4),
            scratch: vec![0u8; config.block_size * 2],
        };
        source.send(CMD_SET_SAMPLE_RATE, config.sample_rate)?;
        Ok(source)
    }

    pub fn greeting(&self) -> &Greeting {
        &self.greeting
    }

    fn send(&mut self, id: u8, param: u32) -> Result<()> {
        self.stream
            .write_all(&encode_command(id, param))
            .map_err(|e| SdrError::connection(format!("command 0x{id:02x} failed: {e}")))
    }

    /// Fill `pending` until it holds a whole block of I/Q byte pairs.
    ///
    /// Reads take whatever the socket has, so `pending` may end up holding
    /// more than one block, split anywhere, including between I and Q.
    fn fill_block(&mut self) -> Result<()> {
        let wanted = self.block_size * 2;
        let mut timeouts = 0;
        while self.pending.len() < wanted {
            match self.stream.read(&mut self.scratch) {
                Ok(0) => {
                    return Err(SdrError::connection(format!(
                        "rtl_tcp at {} closed the stream",
                        self.addr
                    )));
                }
                Ok(n) => {
                    timeouts = 0;
                    self.pending.extend_from_slice(&self.scratch[..n]);
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    timeouts += 1;
                    log::warn!("rtl_tcp read timeout ({}/{})", timeouts, MAX_READ_TIMEOUTS);
                    if timeouts >= MAX_READ_TIMEOUTS {
                        return Err(SdrError::connection(format!(
                            "rtl_tcp at {} stopped sending samples",
                            self.addr
                        )));
                    }
                }
                Err(e) => {
                    return Err(SdrError::connection(format!("rtl_tcp read failed: {e}")));
                }
            }
        }
        Ok(())
    }
}

impl SampleSource for RtlTcpSource {
    fn apply(&mut self, tuner: &TunerState) -> Result<()> {
        let previous = self.applied;

        if tuner.sample_rate != self.sample_rate {
            self.send(CMD_SET_SAMPLE_RATE, tuner.sample_rate)?;
            self.sample_rate = tuner.sample_rate;
        }
        if previous.map(|p| p.center_freq) != Some(tuner.center_freq) {
            let freq = u32::try_from(tuner.center_freq).map_err(|_| {
                SdrError::config(format!("{} Hz is out of rtl_tcp range", tuner.center_freq))
            })?;
            self.send(CMD_SET_FREQ, freq)?;
        }
        if previous.map(|p| p.gain) != Some(tuner.gain) {
            match tuner.gain {
                TunerGain::Auto(_) => {
                    self.send(CMD_SET_GAIN_MODE, 0)?;
                    self.send(CMD_SET_AGC, 1)?;
                }
                TunerGain::Manual(db) => {
                    self.send(CMD_SET_AGC, 0)?;
                    self.send(CMD_SET_GAIN_MODE, 1)?;
                    let tenths = (db * 10.0).round().max(0.0) as u32;
                    self.send(CMD_SET_GAIN, tenths)?;
                }
            }
        }

        self.applied = Some(*tuner);
        Ok(())
    }

    fn next_block(&mut self) -> Result<SampleBlock> {
        self.fill_block()?;

        let wanted = self.block_size * 2;
        let mut samples = Vec::with_capacity(self.block_size);
        convert_u8(&self.pending[..wanted], &mut samples);
        // Surplus bytes, a lone odd one included, start the next block.
        self.pending.drain(..wanted);

        let center = self.applied.map(|t| t.center_freq).unwrap_or(0);
        let rate = self.sample_rate();
        Ok(SampleBlock::new(samples, rate, center))
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn describe(&self) -> String {
        format!(
            "rtl_tcp {} ({})",
            self.addr,
            tuner_name(self.greeting.tuner_type)
        )
    }
}
