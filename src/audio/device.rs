// System audio devices via cpal (feature `cpal`)
//
// cpal streams are not Send, so each stream lives on its own thread and is
// dropped there when the owner signals a stop.

use crate::error::{ExamError, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info, warn};

use super::backend::{AudioFrame, CaptureConfig, MicrophoneBackend};
use super::decode::DecodedAudio;
use super::playback::AudioOutput;

const DEVICE_INIT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default system input device
pub struct CpalMicrophone {
    config: CaptureConfig,
    stop_tx: Option<std::sync::mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl CpalMicrophone {
    pub fn new(config: CaptureConfig) -> Self {
        Self {
            config,
            stop_tx: None,
            thread: None,
        }
    }
}

#[allow(deprecated)] // cpal 0.17 deprecates name() but description() is not yet stable
fn build_input_stream(
    frame_tx: mpsc::Sender<AudioFrame>,
    frame_ms: u64,
) -> Result<cpal::Stream> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| ExamError::PermissionDenied("No microphone available".to_string()))?;

    let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());

    let supported = device.default_input_config().map_err(|e| {
        ExamError::DeviceUnavailable(format!("Cannot query {}: {}", device_name, e))
    })?;
    let sample_rate = supported.sample_rate();
    let channels = supported.channels() as usize;

    info!(
        "Opening input device '{}' ({}Hz, {} channels)",
        device_name, sample_rate, channels
    );

    let frame_len = ((sample_rate as u64 * frame_ms / 1000) as usize).max(1);
    let mut pending: Vec<i16> = Vec::with_capacity(frame_len);
    let mut emitted_ms: u64 = 0;

    device
        .build_input_stream(
            &supported.into(),
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                // Mix to mono
                for frame in data.chunks(channels.max(1)) {
                    let mono = frame.iter().sum::<f32>() / frame.len() as f32;
                    pending.push((mono.clamp(-1.0, 1.0) * i16::MAX as f32) as i16);
                }

                while pending.len() >= frame_len {
                    let samples: Vec<i16> = pending.drain(..frame_len).collect();
                    let frame = AudioFrame {
                        samples,
                        sample_rate,
                        channels: 1,
                        timestamp_ms: emitted_ms,
                    };
                    emitted_ms += frame_ms;
                    if frame_tx.try_send(frame).is_err() {
                        warn!("Capture buffer full, dropping frame");
                    }
                }
            },
            |err| {
                error!("Audio input stream error: {}", err);
            },
            None,
        )
        .map_err(|e| ExamError::DeviceUnavailable(format!("Failed to open {}: {}", device_name, e)))
}

#[async_trait::async_trait]
impl MicrophoneBackend for CpalMicrophone {
    async fn open(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        if self.is_open() {
            return Err(ExamError::InvalidState("microphone already open".to_string()));
        }

        let (frame_tx, frame_rx) = mpsc::channel(256);
        let (init_tx, init_rx) = std::sync::mpsc::channel::<Result<()>>();
        let (stop_tx, stop_rx) = std::sync::mpsc::channel::<()>();
        let frame_ms = self.config.frame_ms;

        let thread = std::thread::spawn(move || {
            let stream = match build_input_stream(frame_tx, frame_ms) {
                Ok(stream) => stream,
                Err(e) => {
                    let _ = init_tx.send(Err(e));
                    return;
                }
            };
            if let Err(e) = stream.play() {
                let _ = init_tx.send(Err(ExamError::DeviceUnavailable(format!(
                    "Failed to start input stream: {}",
                    e
                ))));
                return;
            }
            let _ = init_tx.send(Ok(()));

            // Returns on close() or when the owner is dropped
            let _ = stop_rx.recv();
            drop(stream);
            info!("Input stream closed");
        });

        let init = tokio::task::spawn_blocking(move || init_rx.recv_timeout(DEVICE_INIT_TIMEOUT))
            .await
            .map_err(|e| ExamError::DeviceUnavailable(format!("Device init task failed: {}", e)))?;

        match init {
            Ok(Ok(())) => {
                self.stop_tx = Some(stop_tx);
                self.thread = Some(thread);
                Ok(frame_rx)
            }
            Ok(Err(e)) => Err(e),
            Err(_) => {
                let _ = stop_tx.send(());
                Err(ExamError::DeviceUnavailable(
                    "Input device did not start in time".to_string(),
                ))
            }
        }
    }

    fn close(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        // The stream thread exits on its own; no need to block on it here
        self.thread = None;
    }

    fn is_open(&self) -> bool {
        self.stop_tx.is_some()
    }

    fn name(&self) -> &str {
        "cpal default input"
    }
}

impl Drop for CpalMicrophone {
    fn drop(&mut self) {
        self.close();
    }
}

/// Default system output device
#[derive(Debug, Clone, Default)]
pub struct CpalSpeaker;

struct StopOnDrop(Arc<AtomicBool>);

impl Drop for StopOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

fn play_blocking(audio: DecodedAudio, stop: Arc<AtomicBool>) -> Result<()> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| ExamError::PlaybackError("No output device available".to_string()))?;
    let supported = device
        .default_output_config()
        .map_err(|e| ExamError::PlaybackError(format!("Cannot query output device: {}", e)))?;

    let out_rate = supported.sample_rate() as u64;
    let out_channels = supported.channels() as usize;
    let in_rate = audio.sample_rate.max(1) as u64;
    let in_channels = audio.channels.max(1) as usize;
    let total_frames = audio.frames();

    let position = Arc::new(AtomicUsize::new(0));
    let finished = Arc::new(AtomicBool::new(false));
    let callback_position = Arc::clone(&position);
    let callback_finished = Arc::clone(&finished);

    let stream = device
        .build_output_stream(
            &supported.into(),
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                for out_frame in data.chunks_mut(out_channels.max(1)) {
                    let n = callback_position.fetch_add(1, Ordering::Relaxed) as u64;
                    // Nearest-neighbour rate conversion
                    let src = (n * in_rate / out_rate.max(1)) as usize;
                    if src >= total_frames {
                        out_frame.iter_mut().for_each(|s| *s = 0.0);
                        callback_finished.store(true, Ordering::SeqCst);
                        continue;
                    }
                    for (c, sample) in out_frame.iter_mut().enumerate() {
                        let channel = c.min(in_channels - 1);
                        *sample = audio.samples[src * in_channels + channel];
                    }
                }
            },
            |err| {
                error!("Audio output stream error: {}", err);
            },
            None,
        )
        .map_err(|e| ExamError::PlaybackError(format!("Failed to open output: {}", e)))?;

    stream
        .play()
        .map_err(|e| ExamError::PlaybackError(format!("Failed to start output: {}", e)))?;

    while !finished.load(Ordering::SeqCst) && !stop.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(20));
    }
    drop(stream);
    Ok(())
}

#[async_trait::async_trait]
impl AudioOutput for CpalSpeaker {
    async fn render(&self, audio: DecodedAudio) -> Result<()> {
        let stop = Arc::new(AtomicBool::new(false));
        let _guard = StopOnDrop(Arc::clone(&stop));
        let (done_tx, done_rx) = oneshot::channel();

        std::thread::spawn(move || {
            let _ = done_tx.send(play_blocking(audio, stop));
        });

        done_rx
            .await
            .map_err(|_| ExamError::PlaybackError("Output thread exited".to_string()))?
    }

    fn name(&self) -> &str {
        "cpal default output"
    }
}
