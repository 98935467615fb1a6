use crate::error::Result;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub audio: AudioConfig,
    pub exam: ExamConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Base URL of the question catalog and evaluation service
    pub api_base_url: String,
    /// Timeout for catalog requests and audio asset downloads
    pub request_timeout_secs: u64,
    /// Timeout for the evaluation upload (the service runs STT and scoring)
    pub submit_timeout_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8000".to_string(),
            request_timeout_secs: 30,
            submit_timeout_secs: 120,
        }
    }
}

impl ServiceConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn submit_timeout(&self) -> Duration {
        Duration::from_secs(self.submit_timeout_secs)
    }

    /// Resolve a catalog-relative reference (e.g. `/static/audio/q7.mp3`) against the base URL.
    pub fn resolve(&self, reference: &str) -> String {
        if reference.starts_with("http://") || reference.starts_with("https://") {
            return reference.to_string();
        }
        let base = self.api_base_url.trim_end_matches('/');
        if reference.starts_with('/') {
            format!("{}{}", base, reference)
        } else {
            format!("{}/{}", base, reference)
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub channels: u16,
    /// Capture frame length in milliseconds
    pub frame_ms: u64,
    /// File name reported for the uploaded response
    pub upload_file_name: String,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            channels: 1,
            frame_ms: 100,
            upload_file_name: "response.wav".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExamConfig {
    /// Reading time used when a question has a passage but no explicit reading time
    pub default_reading_secs: u32,
    /// Delay between entering Listening and starting the asset
    pub playback_delay_ms: u64,
}

impl Default for ExamConfig {
    fn default() -> Self {
        Self {
            default_reading_secs: 45,
            playback_delay_ms: 500,
        }
    }
}

impl ExamConfig {
    pub fn playback_delay(&self) -> Duration {
        Duration::from_millis(self.playback_delay_ms)
    }
}

impl Config {
    /// Load from a config file (any format the `config` crate detects by extension),
    /// with `SPEAKING_EXAM__SECTION__KEY` environment overrides.
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("SPEAKING_EXAM").separator("__"))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}
