use crate::config::ServiceConfig;
use crate::error::{ExamError, Result};
use futures::stream::StreamExt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::decode::{decode_bytes, DecodedAudio};

/// Called once with `Ok(())` when playback ends naturally, or `Err(PlaybackError)`
pub type FinishedFn = Box<dyn FnOnce(Result<()>) + Send>;

/// A listening asset to play
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackRequest {
    /// Asset reference as given by the question (absolute URL or catalog-relative path)
    pub asset: String,
    /// Wait before starting
    pub delay: Duration,
}

/// Playback of remote listening assets
///
/// `on_finished` fires at most once per `play`; `stop()` or a subsequent `play`
/// suppresses it for the previous request.
pub trait AudioPlayback: Send {
    fn play(&mut self, request: PlaybackRequest, on_finished: FinishedFn);

    /// Stop the current asset. Idempotent.
    fn stop(&mut self);

    fn is_playing(&self) -> bool;
}

/// Where decoded audio ends up
#[async_trait::async_trait]
pub trait AudioOutput: Send + Sync {
    /// Render decoded audio, returning once it has been fully played
    async fn render(&self, audio: DecodedAudio) -> Result<()>;

    fn name(&self) -> &str;
}

/// Output for hosts without a speaker: holds for the asset's real duration
#[derive(Debug, Clone, Default)]
pub struct PacedOutput;

#[async_trait::async_trait]
impl AudioOutput for PacedOutput {
    async fn render(&self, audio: DecodedAudio) -> Result<()> {
        tokio::time::sleep(audio.duration()).await;
        Ok(())
    }

    fn name(&self) -> &str {
        "paced"
    }
}

/// Streams an asset over HTTP, decodes it and renders it to an `AudioOutput`
pub struct HttpAudioPlayer {
    client: reqwest::Client,
    service: ServiceConfig,
    output: Arc<dyn AudioOutput>,
    generation: Arc<AtomicU64>,
    task: Option<JoinHandle<()>>,
}

impl HttpAudioPlayer {
    pub fn new(service: &ServiceConfig, output: Arc<dyn AudioOutput>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(service.request_timeout())
            .build()
            .map_err(|e| ExamError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            service: service.clone(),
            output,
            generation: Arc::new(AtomicU64::new(0)),
            task: None,
        })
    }

    async fn fetch(client: &reqwest::Client, url: &str) -> Result<Vec<u8>> {
        let response = client
            .get(url)
            .send()
            .await
            .map_err(|e| ExamError::PlaybackError(format!("Failed to load {}: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(ExamError::PlaybackError(format!(
                "Failed to load {}: HTTP {}",
                url,
                response.status()
            )));
        }

        let mut body = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk
                .map_err(|e| ExamError::PlaybackError(format!("Stream of {} broke: {}", url, e)))?;
            body.extend_from_slice(&chunk);
        }

        debug!("Fetched {} bytes from {}", body.len(), url);
        Ok(body)
    }
}

/// Format hint from the last path segment ("lecture.mp3?v=2" -> "mp3")
fn extension_of(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let segment = path.rsplit('/').next()?;
    let (_, ext) = segment.rsplit_once('.')?;
    if ext.is_empty() {
        None
    } else {
        Some(ext.to_ascii_lowercase())
    }
}

impl AudioPlayback for HttpAudioPlayer {
    fn play(&mut self, request: PlaybackRequest, on_finished: FinishedFn) {
        self.stop();

        let current = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let generation = Arc::clone(&self.generation);
        let client = self.client.clone();
        let output = Arc::clone(&self.output);
        let url = self.service.resolve(&request.asset);

        info!(
            "Playback of {} scheduled in {}ms via {}",
            url,
            request.delay.as_millis(),
            output.name()
        );

        self.task = Some(tokio::spawn(async move {
            if !request.delay.is_zero() {
                tokio::time::sleep(request.delay).await;
            }

            let result = async {
                let bytes = Self::fetch(&client, &url).await?;
                let ext = extension_of(&url);
                let decoded = tokio::task::spawn_blocking(move || decode_bytes(bytes, ext.as_deref()))
                    .await
                    .map_err(|e| ExamError::PlaybackError(format!("Decoder task failed: {}", e)))??;

                info!(
                    "Playing {} ({:.1}s, {}Hz, {}ch)",
                    url,
                    decoded.duration().as_secs_f64(),
                    decoded.sample_rate,
                    decoded.channels
                );
                output.render(decoded).await
            }
            .await;

            if generation.load(Ordering::SeqCst) != current {
                return;
            }
            match &result {
                Ok(()) => info!("Playback ended: {}", url),
                Err(e) => warn!("Playback failed: {}", e),
            }
            on_finished(result);
        }));
    }

    fn stop(&mut self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(task) = self.task.take() {
            task.abort();
            debug!("Playback stopped");
        }
    }

    fn is_playing(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Drop for HttpAudioPlayer {
    fn drop(&mut self) {
        self.stop();
    }
}
