use crate::audio::Recording;
use crate::config::Config;
use crate::error::{ExamError, Result};
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use std::time::Duration;
use tracing::{info, warn};

use super::evaluation::EvaluationResult;
use super::messages::{ErrorPayload, EvaluationPayload};

/// Posts finalized recordings to the evaluation service
///
/// Every `submit` is an independent request; the same recording may be sent again
/// after a failure.
pub struct SubmissionGateway {
    client: reqwest::Client,
    endpoint: String,
    file_name: String,
    timeout: Duration,
}

impl SubmissionGateway {
    pub fn new(config: &Config) -> Result<Self> {
        let timeout = config.service.submit_timeout();
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ExamError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: config.service.resolve("/speech/evaluate"),
            file_name: config.audio.upload_file_name.clone(),
            timeout,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub async fn submit(&self, recording: &Recording, question_id: &str) -> Result<EvaluationResult> {
        if recording.is_empty() {
            warn!("Submitting an empty recording for {}", question_id);
        }

        let part = Part::bytes(recording.bytes().to_vec())
            .file_name(self.file_name.clone())
            .mime_str(recording.mime_type())
            .map_err(|e| ExamError::InvalidState(format!("Bad upload mime type: {}", e)))?;
        let form = Form::new()
            .part("file", part)
            .text("question_id", question_id.to_string());

        info!(
            "Submitting recording {} ({:.1}s) for question {} to {}",
            recording.id(),
            recording.duration_secs(),
            question_id,
            self.endpoint
        );

        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        let body = response.bytes().await.map_err(|e| self.transport_error(e))?;

        if !status.is_success() {
            let err = classify_failure(status, &body);
            warn!("Evaluation failed: {}", err);
            return Err(err);
        }

        let payload: EvaluationPayload =
            serde_json::from_slice(&body).map_err(|e| ExamError::EvaluationRejected {
                status: status.as_u16(),
                detail: format!("Malformed evaluation response: {}", e),
            })?;
        let result = EvaluationResult::from_payload(status.as_u16(), payload)?;

        info!(
            "Evaluation of {} complete: overall {:.1}/4.0",
            question_id, result.scores.overall
        );
        Ok(result)
    }

    fn transport_error(&self, e: reqwest::Error) -> ExamError {
        if e.is_timeout() {
            ExamError::NetworkError(format!(
                "Evaluation timed out after {}s",
                self.timeout.as_secs()
            ))
        } else {
            ExamError::NetworkError(format!("Failed to reach evaluation service: {}", e))
        }
    }
}

/// A structured `detail` is surfaced verbatim; bare gateway errors are transient.
fn classify_failure(status: StatusCode, body: &[u8]) -> ExamError {
    let detail = serde_json::from_slice::<ErrorPayload>(body)
        .ok()
        .map(|p| p.message());

    match detail {
        Some(detail) => ExamError::EvaluationRejected {
            status: status.as_u16(),
            detail,
        },
        None if status.is_server_error() => {
            ExamError::NetworkError(format!("Evaluation service unavailable: HTTP {}", status))
        }
        None => ExamError::EvaluationRejected {
            status: status.as_u16(),
            detail: status
                .canonical_reason()
                .unwrap_or("Request rejected")
                .to_string(),
        },
    }
}
