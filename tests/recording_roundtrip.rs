//! Recordings written through the recorder read back with the expected size.

use evilsdr::defaults::AUDIO_RATE;
use evilsdr::recording::{RecordKind, Recorder};
use num_complex::Complex32;
use tempfile::TempDir;

#[test]
fn audio_frames_decode_to_the_same_sample_count() {
    let dir = TempDir::new().unwrap();
    let recorder = Recorder::new(dir.path(), 64);
    let path = recorder.start_audio().unwrap();

    let frames = 32;
    let frame_len = 960;
    for i in 0..frames {
        let frame: Vec<f32> = (0..frame_len)
            .map(|n| ((i * frame_len + n) as f32 * 0.01).sin() * 0.5)
            .collect();
        recorder.push_audio(&frame);
    }
    let closed = recorder.stop(RecordKind::Audio).unwrap();
    assert_eq!(closed.as_deref(), Some(path.as_path()));

    let reader = hound::WavReader::open(&path).unwrap();
    let spec = reader.spec();
    assert_eq!(spec.sample_rate, AUDIO_RATE);
    assert_eq!(spec.channels, 1);
    assert_eq!(spec.bits_per_sample, 16);
    assert_eq!(reader.len() as usize, frames * frame_len);
    assert_eq!(recorder.status().dropped_audio, 0);
}

#[test]
fn iq_blocks_are_eight_bytes_per_sample_without_header() {
    let dir = TempDir::new().unwrap();
    let recorder = Recorder::new(dir.path(), 64);
    let path = recorder.start_iq(98_500_000, 2_400_000).unwrap();
    let name = path.file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("iq_"));
    assert!(name.ends_with("_98500000Hz_2400000sps.raw"));

    let blocks = 16;
    let block_size = 4_096;
    let block: Vec<Complex32> = (0..block_size)
        .map(|n| Complex32::new(n as f32, -(n as f32)))
        .collect();
    for _ in 0..blocks {
        recorder.push_iq(&block);
    }
    recorder.stop(RecordKind::Iq).unwrap();

    let bytes = std::fs::read(&path).unwrap();
    assert_eq!(bytes.len(), blocks * block_size * 8);
    let i1 = f32::from_le_bytes(bytes[8..12].try_into().unwrap());
    let q1 = f32::from_le_bytes(bytes[12..16].try_into().unwrap());
    assert_eq!((i1, q1), (1.0, -1.0));
}

#[test]
fn audio_and_iq_sessions_run_independently() {
    let dir = TempDir::new().unwrap();
    let recorder = Recorder::new(dir.path(), 8);
    recorder.start_audio().unwrap();
    recorder.start_iq(100_000_000, 1_024_000).unwrap();
    assert!(recorder.is_recording(RecordKind::Audio));
    assert!(recorder.is_recording(RecordKind::Iq));

    recorder.stop(RecordKind::Audio).unwrap();
    let status = recorder.status();
    assert!(!status.audio);
    assert!(status.iq);
    assert!(status.iq_file.is_some());

    recorder.stop_all();
    assert!(!recorder.is_recording(RecordKind::Iq));
    assert_eq!(recorder.stop(RecordKind::Iq).unwrap(), None);
}
