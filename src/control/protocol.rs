//! JSON control protocol: commands in, events out.

use crate::bookmarks::BookmarkDocument;
use crate::dsp::DemodMode;
use crate::error::{Result, SdrError};
use crate::recording::RecordStatus;
use crate::scanner::ScanStatus;
use crate::source::{Driver, TunerGain};
use serde::{Deserialize, Serialize};

/// Commands accepted from control clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Command {
    /// Open the tuner; absent fields fall back to the configured values.
    Connect {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        host: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        port: Option<u16>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        driver: Option<Driver>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sample_rate: Option<u32>,
    },
    Disconnect,
    SetFreq {
        value: u64,
    },
    SetMode {
        mode: DemodMode,
    },
    /// Tuner RF gain: a number in dB or `"AGC"`.
    SetGain {
        value: TunerGain,
    },
    SetSquelch {
        value: f32,
    },
    /// Audio AGC after demodulation.
    SetAgc {
        value: bool,
    },
    StartStream,
    StopStream,
    /// Memory scan over bookmarks, optionally one category.
    StartScan {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        category: Option<String>,
    },
    StartRangeScan {
        start: u64,
        end: u64,
        step: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mode: Option<DemodMode>,
    },
    StopScan {
        /// Retune to the pre-scan frequency; the configured policy when absent.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        restore: Option<bool>,
    },
    SkipScan,
    /// Dwell per entry in milliseconds.
    SetScanSpeed {
        #[serde(alias = "ms")]
        value: u64,
    },
    /// Resume delay after a signal drops, in seconds.
    SetScanDelay {
        value: f64,
    },
    StartAudioRecord,
    StopAudioRecord,
    StartIqRecord,
    StopIqRecord,
    GetScanCategories,
    GetState,
    GetBookmarks,
    SaveBookmarks {
        document: BookmarkDocument,
    },
}

impl Command {
    /// Serialize command to JSON string.
    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse one command line.
    ///
    /// # Errors
    /// `SdrError::Configuration` for an unknown tag or a malformed payload.
    pub fn parse(line: &str) -> Result<Self> {
        serde_json::from_str(line.trim())
            .map_err(|e| SdrError::config(format!("unknown or malformed command: {e}")))
    }

    /// Wire tag, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Connect { .. } => "CONNECT",
            Command::Disconnect => "DISCONNECT",
            Command::SetFreq { .. } => "SET_FREQ",
            Command::SetMode { .. } => "SET_MODE",
            Command::SetGain { .. } => "SET_GAIN",
            Command::SetSquelch { .. } => "SET_SQUELCH",
            Command::SetAgc { .. } => "SET_AGC",
            Command::StartStream => "START_STREAM",
            Command::StopStream => "STOP_STREAM",
            Command::StartScan { .. } => "START_SCAN",
            Command::StartRangeScan { .. } => "START_RANGE_SCAN",
            Command::StopScan { .. } => "STOP_SCAN",
            Command::SkipScan => "SKIP_SCAN",
            Command::SetScanSpeed { .. } => "SET_SCAN_SPEED",
            Command::SetScanDelay { .. } => "SET_SCAN_DELAY",
            Command::StartAudioRecord => "START_AUDIO_RECORD",
            Command::StopAudioRecord => "STOP_AUDIO_RECORD",
            Command::StartIqRecord => "START_IQ_RECORD",
            Command::StopIqRecord => "STOP_IQ_RECORD",
            Command::GetScanCategories => "GET_SCAN_CATEGORIES",
            Command::GetState => "GET_STATE",
            Command::GetBookmarks => "GET_BOOKMARKS",
            Command::SaveBookmarks { .. } => "SAVE_BOOKMARKS",
        }
    }
}

/// Full engine snapshot sent on connect and on `GET_STATE`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateInfo {
    pub freq: u64,
    pub mode: DemodMode,
    pub sample_rate: u32,
    pub streaming: bool,
    pub audio_recording: bool,
    pub iq_recording: bool,
    pub squelch: f32,
    pub gain: TunerGain,
    pub agc: bool,
    pub connected: bool,
    pub spectrum_bins: usize,
    pub audio_rate: u32,
}

/// Events pushed to control clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Event {
    State(StateInfo),
    FreqChanged {
        value: u64,
    },
    ModeChanged {
        mode: DemodMode,
    },
    SquelchChanged {
        value: f32,
    },
    SignalLevel {
        db: f32,
        s_units: String,
        min_db: f32,
        max_db: f32,
    },
    StreamState {
        streaming: bool,
    },
    ScanStatus(ScanStatus),
    ScanCategories {
        categories: Vec<String>,
    },
    RecordStatus(RecordStatus),
    ConnectionChanged {
        connected: bool,
        host: String,
        port: u16,
    },
    Bookmarks {
        document: BookmarkDocument,
    },
    Error {
        kind: String,
        message: String,
    },
}

impl Event {
    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(s: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl From<&SdrError> for Event {
    fn from(error: &SdrError) -> Self {
        Event::Error {
            kind: error.kind().to_string(),
            message: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_scan_command_parses() {
        let cmd = Command::parse(
            r#"{"type":"START_RANGE_SCAN","start":88000000,"end":108000000,"step":200000,"mode":"WBFM"}"#,
        )
        .unwrap();
        assert_eq!(
            cmd,
            Command::StartRangeScan {
                start: 88_000_000,
                end: 108_000_000,
                step: 200_000,
                mode: Some(DemodMode::Wbfm),
            }
        );
        assert_eq!(cmd.name(), "START_RANGE_SCAN");
    }

    #[test]
    fn test_unit_commands_parse() {
        assert_eq!(Command::parse(r#"{"type":"SKIP_SCAN"}"#).unwrap(), Command::SkipScan);
        assert_eq!(
            Command::parse(r#"{"type":"STOP_SCAN"}"#).unwrap(),
            Command::StopScan { restore: None }
        );
        assert_eq!(
            Command::parse(r#"{"type":"START_SCAN"}"#).unwrap(),
            Command::StartScan { category: None }
        );
    }

    #[test]
    fn test_gain_accepts_number_or_agc() {
        assert_eq!(
            Command::parse(r#"{"type":"SET_GAIN","value":"AGC"}"#).unwrap(),
            Command::SetGain {
                value: TunerGain::AUTO
            }
        );
        assert_eq!(
            Command::parse(r#"{"type":"SET_GAIN","value":19.7}"#).unwrap(),
            Command::SetGain {
                value: TunerGain::Manual(19.7)
            }
        );
    }

    #[test]
    fn test_scan_speed_accepts_ms_alias() {
        assert_eq!(
            Command::parse(r#"{"type":"SET_SCAN_SPEED","ms":250}"#).unwrap(),
            Command::SetScanSpeed { value: 250 }
        );
    }

    #[test]
    fn test_unknown_tag_is_configuration_error() {
        let err = Command::parse(r#"{"type":"TOGGLE_POCSAG","value":true}"#).unwrap_err();
        assert_eq!(err.kind(), "configuration");
        let err = Command::parse(r#"{"type":"SET_FREQ","value":"fast"}"#).unwrap_err();
        assert_eq!(err.kind(), "configuration");
        assert!(Command::parse("not json").is_err());
    }

    #[test]
    fn test_command_roundtrip() {
        let commands = vec![
            Command::Connect {
                host: Some("10.0.0.2".to_string()),
                port: Some(1234),
                driver: Some(Driver::RtlTcp),
                sample_rate: None,
            },
            Command::SetMode {
                mode: DemodMode::Am,
            },
            Command::SetScanDelay { value: 1.5 },
            Command::SaveBookmarks {
                document: BookmarkDocument::default(),
            },
        ];
        for cmd in commands {
            let json = cmd.to_json().unwrap();
            assert_eq!(Command::parse(&json).unwrap(), cmd, "{json}");
        }
    }

    #[test]
    fn test_event_tags_are_screaming_snake_case() {
        let json = Event::FreqChanged { value: 98_500_000 }.to_json().unwrap();
        assert_eq!(json, r#"{"type":"FREQ_CHANGED","value":98500000}"#);

        let json = Event::RecordStatus(RecordStatus {
            audio: true,
            ..Default::default()
        })
        .to_json()
        .unwrap();
        assert!(json.starts_with(r#"{"type":"RECORD_STATUS","audio":true,"iq":false"#));
    }

    #[test]
    fn test_scan_status_event_is_flat() {
        let status = ScanStatus {
            state: crate::scanner::ScanState::Monitoring,
            scan_mode: crate::scanner::ScanMode::Range,
            label: "98.400 MHz".to_string(),
            index: 52,
            total: 100,
            skipped: 52,
            freq: 98_400_000,
            locked_out: 0,
            dwell_ms: 100,
            resume_delay_ms: 2000,
        };
        let json = Event::ScanStatus(status.clone()).to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["type"], "SCAN_STATUS");
        assert_eq!(value["state"], "MONITORING");
        assert_eq!(value["scan_mode"], "RANGE");
        assert_eq!(value["label"], "98.400 MHz");
        assert_eq!(Event::from_json(&json).unwrap(), Event::ScanStatus(status));
    }

    #[test]
    fn test_error_event_from_sdr_error() {
        let event = Event::from(&SdrError::config("step must be positive"));
        assert_eq!(
            event,
            Event::Error {
                kind: "configuration".to_string(),
                message: "Invalid request: step must be positive".to_string(),
            }
        );
    }
}
