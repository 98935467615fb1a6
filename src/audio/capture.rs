use crate::error::{ExamError, Result};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::backend::{AudioFrame, CaptureConfig, MicrophoneBackend};
use super::recording::{Recording, RecordingBuilder};

enum CaptureState {
    Idle,
    Acquired {
        frames: mpsc::Receiver<AudioFrame>,
    },
    Capturing {
        stop_tx: oneshot::Sender<()>,
        task: JoinHandle<RecordingBuilder>,
    },
}

/// Owns the microphone between `acquire()` and `stop_capture()`/`release()`
///
/// The backend's frame stream is buffered by a task into a `RecordingBuilder`;
/// stopping finalizes it into a `Recording` and releases the device.
pub struct MediaCaptureController {
    backend: Box<dyn MicrophoneBackend>,
    config: CaptureConfig,
    state: CaptureState,
}

impl MediaCaptureController {
    pub fn new(backend: Box<dyn MicrophoneBackend>, config: CaptureConfig) -> Self {
        Self {
            backend,
            config,
            state: CaptureState::Idle,
        }
    }

    /// Request microphone access. A no-op if already acquired.
    pub async fn acquire(&mut self) -> Result<()> {
        match self.state {
            CaptureState::Idle => {}
            CaptureState::Acquired { .. } => return Ok(()),
            CaptureState::Capturing { .. } => {
                return Err(ExamError::InvalidState(
                    "cannot acquire while capture is running".to_string(),
                ))
            }
        }

        info!("Acquiring microphone: {}", self.backend.name());
        match self.backend.open().await {
            Ok(frames) => {
                self.state = CaptureState::Acquired { frames };
                info!("Microphone acquired");
                Ok(())
            }
            Err(e) => {
                warn!("Microphone acquisition failed: {}", e);
                // Never hold a half-open device after a failed acquire
                self.backend.close();
                Err(e)
            }
        }
    }

    /// Begin buffering frames in arrival order.
    pub fn start_capture(&mut self) -> Result<()> {
        let mut frames = match std::mem::replace(&mut self.state, CaptureState::Idle) {
            CaptureState::Acquired { frames } => frames,
            CaptureState::Idle => {
                return Err(ExamError::InvalidState(
                    "microphone has not been acquired".to_string(),
                ))
            }
            running @ CaptureState::Capturing { .. } => {
                self.state = running;
                return Err(ExamError::InvalidState(
                    "capture is already running".to_string(),
                ));
            }
        };

        let (stop_tx, mut stop_rx) = oneshot::channel();
        let mut builder = RecordingBuilder::new(self.config.sample_rate, self.config.channels);

        let task = tokio::spawn(async move {
            debug!("Capture task started");
            loop {
                tokio::select! {
                    frame = frames.recv() => match frame {
                        Some(frame) => builder.push(frame),
                        None => break,
                    },
                    _ = &mut stop_rx => break,
                }
            }
            // Keep whatever the device delivered before it was stopped
            while let Ok(frame) = frames.try_recv() {
                builder.push(frame);
            }
            debug!("Capture task stopped ({} frames)", builder.frame_count());
            builder
        });

        self.state = CaptureState::Capturing { stop_tx, task };
        info!("Capture started");
        Ok(())
    }

    /// Finalize the buffered frames into a `Recording` and release the microphone.
    pub async fn stop_capture(&mut self) -> Result<Recording> {
        let (stop_tx, task) = match std::mem::replace(&mut self.state, CaptureState::Idle) {
            CaptureState::Capturing { stop_tx, task } => (stop_tx, task),
            other => {
                self.state = other;
                return Err(ExamError::InvalidState(
                    "no capture is running".to_string(),
                ));
            }
        };

        self.backend.close();
        let _ = stop_tx.send(());

        let builder = task
            .await
            .map_err(|e| ExamError::RecordingUnavailable(format!("capture task failed: {}", e)))?;

        info!("Capture stopped, microphone released");
        builder.finalize()
    }

    /// Drop any capture in progress and release the device. Idempotent.
    pub fn release(&mut self) {
        match std::mem::replace(&mut self.state, CaptureState::Idle) {
            CaptureState::Idle => {}
            CaptureState::Acquired { .. } => info!("Releasing acquired microphone"),
            CaptureState::Capturing { task, .. } => {
                warn!("Discarding capture in progress");
                task.abort();
            }
        }
        self.backend.close();
    }

    pub fn is_acquired(&self) -> bool {
        !matches!(self.state, CaptureState::Idle)
    }

    pub fn is_capturing(&self) -> bool {
        matches!(self.state, CaptureState::Capturing { .. })
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }
}

impl Drop for MediaCaptureController {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    struct StubMicrophone {
        frames: usize,
        fail_with: Option<ExamError>,
        open: Arc<AtomicBool>,
        tx: Option<mpsc::Sender<AudioFrame>>,
    }

    impl StubMicrophone {
        fn new(frames: usize) -> (Self, Arc<AtomicBool>) {
            let open = Arc::new(AtomicBool::new(false));
            (
                Self {
                    frames,
                    fail_with: None,
                    open: Arc::clone(&open),
                    tx: None,
                },
                open,
            )
        }
    }

    #[async_trait::async_trait]
    impl MicrophoneBackend for StubMicrophone {
        async fn open(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
            if let Some(e) = self.fail_with.clone() {
                return Err(e);
            }
            let (tx, rx) = mpsc::channel(self.frames.max(1));
            for i in 0..self.frames {
                tx.try_send(AudioFrame {
                    samples: vec![i as i16; 160],
                    sample_rate: 16000,
                    channels: 1,
                    timestamp_ms: i as u64 * 10,
                })
                .unwrap();
            }
            self.tx = Some(tx);
            self.open.store(true, Ordering::SeqCst);
            Ok(rx)
        }

        fn close(&mut self) {
            self.tx = None;
            self.open.store(false, Ordering::SeqCst);
        }

        fn is_open(&self) -> bool {
            self.open.load(Ordering::SeqCst)
        }

        fn name(&self) -> &str {
            "stub"
        }
    }

    #[tokio::test]
    async fn test_capture_lifecycle_releases_device() {
        let (mic, open) = StubMicrophone::new(5);
        let mut controller = MediaCaptureController::new(Box::new(mic), CaptureConfig::default());

        controller.acquire().await.unwrap();
        assert!(open.load(Ordering::SeqCst));
        controller.start_capture().unwrap();
        assert!(controller.is_capturing());

        let recording = controller.stop_capture().await.unwrap();
        assert_eq!(recording.sample_count(), 5 * 160);
        assert!(!open.load(Ordering::SeqCst));
        assert!(!controller.is_acquired());
    }

    #[tokio::test]
    async fn test_start_before_acquire_is_invalid() {
        let (mic, _) = StubMicrophone::new(0);
        let mut controller = MediaCaptureController::new(Box::new(mic), CaptureConfig::default());
        assert!(matches!(
            controller.start_capture(),
            Err(ExamError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn test_double_start_is_invalid_and_keeps_capture() {
        let (mic, _) = StubMicrophone::new(1);
        let mut controller = MediaCaptureController::new(Box::new(mic), CaptureConfig::default());
        controller.acquire().await.unwrap();
        controller.start_capture().unwrap();

        assert!(matches!(
            controller.start_capture(),
            Err(ExamError::InvalidState(_))
        ));
        assert!(controller.is_capturing());
        assert!(controller.stop_capture().await.is_ok());
    }

    #[tokio::test]
    async fn test_stop_without_capture_is_invalid() {
        let (mic, _) = StubMicrophone::new(0);
        let mut controller = MediaCaptureController::new(Box::new(mic), CaptureConfig::default());
        assert!(matches!(
            controller.stop_capture().await,
            Err(ExamError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn test_failed_acquire_leaves_controller_idle() {
        let (mut mic, open) = StubMicrophone::new(0);
        mic.fail_with = Some(ExamError::PermissionDenied("declined".to_string()));
        let mut controller = MediaCaptureController::new(Box::new(mic), CaptureConfig::default());

        let err = controller.acquire().await.unwrap_err();
        assert_eq!(err, ExamError::PermissionDenied("declined".to_string()));
        assert!(!controller.is_acquired());
        assert!(!open.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_drop_releases_device() {
        let (mic, open) = StubMicrophone::new(2);
        {
            let mut controller =
                MediaCaptureController::new(Box::new(mic), CaptureConfig::default());
            controller.acquire().await.unwrap();
            controller.start_capture().unwrap();
        }
        assert!(!open.load(Ordering::SeqCst));
    }
}
