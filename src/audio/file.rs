use crate::error::{ExamError, Result};
use hound::WavReader;
use std::path::Path;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::backend::{AudioFrame, CaptureConfig, MicrophoneBackend};

pub struct AudioFile {
    pub path: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<i16>,
}

impl AudioFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening audio file: {}", path.display());

        let reader = WavReader::open(path).map_err(|e| {
            ExamError::Io(format!("Failed to open WAV file {}: {}", path.display(), e))
        })?;

        let spec = reader.spec();
        let samples: Vec<i16> = reader
            .into_samples::<i16>()
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| ExamError::Io(format!("Failed to read audio samples: {}", e)))?;

        let duration_seconds =
            samples.len() as f64 / (spec.sample_rate as f64 * spec.channels as f64);

        info!(
            "Audio file loaded: {:.1}s, {}Hz, {} channels, {} samples",
            duration_seconds,
            spec.sample_rate,
            spec.channels,
            samples.len()
        );

        Ok(Self {
            path: path.display().to_string(),
            duration_seconds,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            samples,
        })
    }

    /// Split into capture-sized frames, timestamped from zero.
    pub fn frames(&self, frame_ms: u64) -> Vec<AudioFrame> {
        let per_frame = ((self.sample_rate as u64 * frame_ms / 1000) as usize).max(1)
            * self.channels.max(1) as usize;

        self.samples
            .chunks(per_frame)
            .enumerate()
            .map(|(i, chunk)| AudioFrame {
                samples: chunk.to_vec(),
                sample_rate: self.sample_rate,
                channels: self.channels,
                timestamp_ms: i as u64 * frame_ms,
            })
            .collect()
    }
}

/// Microphone stand-in that plays back a WAV file as captured audio
///
/// With `paced` set, frames are delivered at real-time speed; otherwise the whole
/// file is queued as soon as the device is opened.
pub struct FileMicrophone {
    file: AudioFile,
    config: CaptureConfig,
    paced: bool,
    task: Option<JoinHandle<()>>,
}

impl FileMicrophone {
    pub fn open_path(path: impl AsRef<Path>, config: CaptureConfig, paced: bool) -> Result<Self> {
        Ok(Self::new(AudioFile::open(path)?, config, paced))
    }

    pub fn new(file: AudioFile, config: CaptureConfig, paced: bool) -> Self {
        Self {
            file,
            config,
            paced,
            task: None,
        }
    }
}

#[async_trait::async_trait]
impl MicrophoneBackend for FileMicrophone {
    async fn open(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        if self.is_open() {
            return Err(ExamError::InvalidState(format!(
                "{} is already open",
                self.file.path
            )));
        }

        let frames = self.file.frames(self.config.frame_ms);
        let frame_interval = Duration::from_millis(self.config.frame_ms);
        let paced = self.paced;
        let (tx, rx) = mpsc::channel(frames.len().max(1));

        debug!("Streaming {} frames from {}", frames.len(), self.file.path);

        self.task = Some(tokio::spawn(async move {
            for frame in frames {
                if tx.send(frame).await.is_err() {
                    return;
                }
                if paced {
                    tokio::time::sleep(frame_interval).await;
                }
            }
            // Hold the channel open like a live device until closed
            tx.closed().await;
        }));

        Ok(rx)
    }

    fn close(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    fn is_open(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    fn name(&self) -> &str {
        &self.file.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_wav(path: &Path, samples: &[i16], sample_rate: u32) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for &s in samples {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_open_and_frame_split() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("answer.wav");
        write_wav(&path, &vec![7i16; 4000], 16000);

        let audio = AudioFile::open(&path).unwrap();
        assert_eq!(audio.sample_rate, 16000);
        assert!((audio.duration_seconds - 0.25).abs() < 1e-9);

        let frames = audio.frames(100);
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].samples.len(), 1600);
        assert_eq!(frames[2].samples.len(), 800);
        assert_eq!(frames[2].timestamp_ms, 200);
    }

    #[test]
    fn test_open_nonexistent_file() {
        let result = AudioFile::open("/nonexistent/path/to/answer.wav");
        assert!(matches!(result, Err(ExamError::Io(_))));
    }

    #[tokio::test]
    async fn test_file_microphone_delivers_all_frames() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("answer.wav");
        write_wav(&path, &vec![1i16; 3200], 16000);

        let mut mic = FileMicrophone::open_path(&path, CaptureConfig::default(), false).unwrap();
        let mut rx = mic.open().await.unwrap();
        assert!(mic.is_open());

        let mut total = 0;
        for _ in 0..2 {
            total += rx.recv().await.unwrap().samples.len();
        }
        assert_eq!(total, 3200);

        mic.close();
        assert!(rx.recv().await.is_none());
    }
}
