use crate::error::{ExamError, Result};
use chrono::{DateTime, Utc};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use super::backend::AudioFrame;

/// Append-only buffer of captured frames
///
/// Frames keep arrival order. `finalize` consumes the builder, so a capture
/// can only be turned into a `Recording` once.
#[derive(Debug)]
pub struct RecordingBuilder {
    frames: Vec<AudioFrame>,
    sample_rate: u32,
    channels: u16,
    format_locked: bool,
}

impl RecordingBuilder {
    /// `sample_rate`/`channels` are used when no frame arrives; otherwise the
    /// first frame's format wins.
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            frames: Vec::new(),
            sample_rate,
            channels,
            format_locked: false,
        }
    }

    pub fn push(&mut self, frame: AudioFrame) {
        if frame.sample_rate == 0 || frame.channels == 0 {
            warn!(
                "Dropping frame with unusable format: {}Hz/{}ch",
                frame.sample_rate, frame.channels
            );
            return;
        }
        if !self.format_locked {
            self.sample_rate = frame.sample_rate;
            self.channels = frame.channels;
            self.format_locked = true;
        } else if frame.sample_rate != self.sample_rate || frame.channels != self.channels {
            warn!(
                "Dropping frame with mismatched format: {}Hz/{}ch (recording is {}Hz/{}ch)",
                frame.sample_rate, frame.channels, self.sample_rate, self.channels
            );
            return;
        }
        self.frames.push(frame);
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn sample_count(&self) -> usize {
        self.frames.iter().map(|f| f.samples.len()).sum()
    }

    /// Encode the buffered frames as one 16-bit PCM WAV object.
    pub fn finalize(self) -> Result<Recording> {
        if self.sample_rate == 0 || self.channels == 0 {
            return Err(ExamError::RecordingUnavailable(format!(
                "cannot encode {}Hz/{}ch audio",
                self.sample_rate, self.channels
            )));
        }

        let spec = hound::WavSpec {
            channels: self.channels,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let sample_count = self.sample_count();
        let mut cursor = Cursor::new(Vec::with_capacity(44 + sample_count * 2));
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
            for frame in &self.frames {
                for &sample in &frame.samples {
                    writer.write_sample(sample)?;
                }
            }
            writer.finalize()?;
        }

        let recording = Recording {
            id: Uuid::new_v4(),
            captured_at: Utc::now(),
            data: Arc::from(cursor.into_inner()),
            sample_rate: self.sample_rate,
            channels: self.channels,
            sample_count,
        };

        info!(
            "Recording {} finalized: {:.1}s, {} frames, {} bytes",
            recording.id,
            recording.duration_secs(),
            self.frames.len(),
            recording.data.len()
        );

        Ok(recording)
    }
}

/// A finalized, immutable WAV recording of one response
///
/// Cloning shares the encoded bytes.
#[derive(Debug, Clone)]
pub struct Recording {
    id: Uuid,
    captured_at: DateTime<Utc>,
    data: Arc<[u8]>,
    sample_rate: u32,
    channels: u16,
    sample_count: usize,
}

impl Recording {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    /// Encoded WAV bytes
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn sample_count(&self) -> usize {
        self.sample_count
    }

    /// True when no audio was captured
    pub fn is_empty(&self) -> bool {
        self.sample_count == 0
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 || self.channels == 0 {
            return 0.0;
        }
        self.sample_count as f64 / (self.sample_rate as f64 * self.channels as f64)
    }

    pub fn mime_type(&self) -> &'static str {
        "audio/wav"
    }

    /// Write the recording to `dir` so it can be replayed before submitting.
    pub fn save_to(&self, dir: impl AsRef<Path>) -> Result<PathBuf> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!("response-{}.wav", self.id));
        std::fs::write(&path, &self.data)?;
        info!("Recording saved to {}", path.display());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(value: i16, len: usize, timestamp_ms: u64) -> AudioFrame {
        AudioFrame {
            samples: vec![value; len],
            sample_rate: 16000,
            channels: 1,
            timestamp_ms,
        }
    }

    #[test]
    fn test_finalize_preserves_order_and_format() {
        let mut builder = RecordingBuilder::new(44100, 2);
        builder.push(frame(1, 3, 0));
        builder.push(frame(2, 2, 100));

        let recording = builder.finalize().unwrap();
        assert_eq!(recording.sample_rate(), 16000);
        assert_eq!(recording.channels(), 1);
        assert_eq!(recording.sample_count(), 5);

        let reader = hound::WavReader::new(Cursor::new(recording.bytes().to_vec())).unwrap();
        let samples: Vec<i16> = reader.into_samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![1, 1, 1, 2, 2]);
    }

    #[test]
    fn test_mismatched_frames_are_dropped() {
        let mut builder = RecordingBuilder::new(16000, 1);
        builder.push(frame(1, 4, 0));
        builder.push(AudioFrame {
            samples: vec![9; 8],
            sample_rate: 48000,
            channels: 2,
            timestamp_ms: 100,
        });
        assert_eq!(builder.frame_count(), 1);
        assert_eq!(builder.sample_count(), 4);
    }

    #[test]
    fn test_frames_without_channels_never_lock_the_format() {
        let mut builder = RecordingBuilder::new(16000, 1);
        builder.push(AudioFrame {
            samples: vec![7; 4],
            sample_rate: 16000,
            channels: 0,
            timestamp_ms: 0,
        });
        builder.push(frame(3, 4, 100));
        assert_eq!(builder.frame_count(), 1);

        let recording = builder.finalize().unwrap();
        assert_eq!(recording.channels(), 1);
        assert_eq!(recording.sample_count(), 4);
    }

    #[test]
    fn test_zero_channel_format_fails_instead_of_encoding() {
        let builder = RecordingBuilder::new(16000, 0);
        let err = builder.finalize().unwrap_err();
        assert!(matches!(err, ExamError::RecordingUnavailable(_)));
    }

    #[test]
    fn test_empty_recording_is_valid_wav() {
        let recording = RecordingBuilder::new(16000, 1).finalize().unwrap();
        assert!(recording.is_empty());
        assert_eq!(recording.duration_secs(), 0.0);
        assert!(hound::WavReader::new(Cursor::new(recording.bytes().to_vec())).is_ok());
    }

    #[test]
    fn test_duration_and_save() {
        let mut builder = RecordingBuilder::new(16000, 1);
        for i in 0..15 {
            builder.push(frame(0, 1600, i * 100));
        }
        let recording = builder.finalize().unwrap();
        assert!((recording.duration_secs() - 1.5).abs() < 1e-9);

        let dir = tempfile::tempdir().unwrap();
        let path = recording.save_to(dir.path()).unwrap();
        assert!(path.exists());
        assert_eq!(std::fs::read(&path).unwrap(), recording.bytes());
    }
}
