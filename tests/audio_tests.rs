// Audio frames, WAV answer files and the capture pipeline

use anyhow::Result;
use speaking_exam::audio::{
    AudioFile, AudioFrame, CaptureConfig, FileMicrophone, MediaCaptureController,
    RecordingBuilder,
};
use speaking_exam::config::AudioConfig;
use speaking_exam::ExamError;
use std::path::Path;
use std::time::Duration;

fn write_wav(path: &Path, samples: &[i16], sample_rate: u32, channels: u16) -> Result<()> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    for &s in samples {
        writer.write_sample(s)?;
    }
    writer.finalize()?;
    Ok(())
}

#[test]
fn test_audio_frame_duration() {
    let frame = AudioFrame {
        samples: vec![0i16; 1600],
        sample_rate: 16000,
        channels: 1,
        timestamp_ms: 0,
    };
    assert_eq!(frame.duration_ms(), 100);

    let stereo = AudioFrame {
        samples: vec![100, 200, 150, 250, 175, 275],
        sample_rate: 1000,
        channels: 2,
        timestamp_ms: 500,
    };
    assert_eq!(stereo.duration_ms(), 3);
}

#[test]
fn test_capture_config_follows_audio_settings() {
    let config = CaptureConfig::default();
    assert_eq!(config.sample_rate, 16000, "Default should be 16kHz for speech scoring");
    assert_eq!(config.channels, 1, "Default should be mono");
    assert_eq!(config.samples_per_frame(), 1600);

    let audio = AudioConfig {
        sample_rate: 48000,
        channels: 2,
        frame_ms: 50,
        ..AudioConfig::default()
    };
    let config = CaptureConfig::from(&audio);
    assert_eq!(config.sample_rate, 48000);
    assert_eq!(config.samples_per_frame(), 4800);
}

#[test]
fn test_answer_file_metadata() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("answer.wav");
    write_wav(&path, &vec![250i16; 44100], 22050, 2)?;

    let audio = AudioFile::open(&path)?;
    assert_eq!(audio.sample_rate, 22050);
    assert_eq!(audio.channels, 2);
    assert!((audio.duration_seconds - 1.0).abs() < 1e-9);
    assert!(audio.path.ends_with("answer.wav"));
    assert_eq!(audio.samples.len() % audio.channels as usize, 0);
    Ok(())
}

#[test]
fn test_unreadable_answer_file() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("not-audio.wav");
    std::fs::write(&path, b"plain text")?;

    assert!(matches!(AudioFile::open(&path), Err(ExamError::Io(_))));
    Ok(())
}

#[tokio::test]
async fn test_answer_file_captured_into_recording() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let source = dir.path().join("answer.wav");
    let samples: Vec<i16> = (0..8000).map(|i| (i % 512) as i16 - 256).collect();
    write_wav(&source, &samples, 16000, 1)?;

    let microphone = FileMicrophone::open_path(&source, CaptureConfig::default(), false)?;
    let mut capture = MediaCaptureController::new(Box::new(microphone), CaptureConfig::default());

    capture.acquire().await?;
    capture.start_capture()?;
    let err = capture.start_capture().unwrap_err();
    assert!(matches!(err, ExamError::InvalidState(_)), "double start must fail");

    tokio::time::sleep(Duration::from_millis(50)).await;
    let recording = capture.stop_capture().await?;
    assert!(!capture.is_acquired());

    assert_eq!(recording.sample_count(), 8000);
    assert!((recording.duration_secs() - 0.5).abs() < 1e-9);
    assert_eq!(recording.mime_type(), "audio/wav");

    let saved = recording.save_to(dir.path().join("review"))?;
    let replay = AudioFile::open(&saved)?;
    assert_eq!(replay.samples, samples);
    Ok(())
}

#[test]
fn test_empty_recording_is_still_playable() -> Result<()> {
    let recording = RecordingBuilder::new(16000, 1).finalize()?;
    assert!(recording.is_empty());
    assert_eq!(recording.duration_secs(), 0.0);
    assert!(recording.bytes().starts_with(b"RIFF"));
    Ok(())
}
