use crate::config::AudioConfig;
use crate::error::Result;
use tokio::sync::mpsc;

/// Audio sample data (16-bit PCM, interleaved)
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Raw audio samples (i16 PCM, interleaved)
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
}

impl AudioFrame {
    /// Duration covered by this frame in milliseconds
    pub fn duration_ms(&self) -> u64 {
        let per_second = self.sample_rate as u64 * self.channels.max(1) as u64;
        if per_second == 0 {
            return 0;
        }
        self.samples.len() as u64 * 1000 / per_second
    }
}

/// Format requested from a microphone backend
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Sample rate to record at (backends may deliver their native rate instead)
    pub sample_rate: u32,
    /// Channel count (1 = mono)
    pub channels: u16,
    /// Frame length in milliseconds (affects latency)
    pub frame_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            channels: 1,
            frame_ms: 100,
        }
    }
}

impl From<&AudioConfig> for CaptureConfig {
    fn from(audio: &AudioConfig) -> Self {
        Self {
            sample_rate: audio.sample_rate,
            channels: audio.channels,
            frame_ms: audio.frame_ms,
        }
    }
}

impl CaptureConfig {
    /// Interleaved samples in one frame
    pub fn samples_per_frame(&self) -> usize {
        (self.sample_rate as u64 * self.frame_ms / 1000) as usize * self.channels.max(1) as usize
    }
}

/// Microphone access
///
/// Implementations:
/// - `FileMicrophone`: streams a WAV file (answering from a pre-recorded response)
/// - `CpalMicrophone`: default system input device (feature `cpal`)
///
/// Opening the backend is the point where the platform may ask the user for permission;
/// the hardware access indicator stays on until `close()`.
#[async_trait::async_trait]
pub trait MicrophoneBackend: Send {
    /// Acquire the device and begin delivering frames
    ///
    /// Fails with `PermissionDenied` if access is refused or no input device exists,
    /// `DeviceUnavailable` on driver/hardware failure.
    async fn open(&mut self) -> Result<mpsc::Receiver<AudioFrame>>;

    /// Release the device. Idempotent; the frame channel closes once the backend lets go.
    fn close(&mut self);

    /// Whether the device is currently held
    fn is_open(&self) -> bool;

    /// Backend name for logging
    fn name(&self) -> &str;
}
