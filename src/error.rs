//! Error types for the exam core.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExamError {
    // Microphone errors
    #[error("Microphone permission denied: {0}")]
    PermissionDenied(String),

    #[error("Audio device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("Recording unavailable: {0}")]
    RecordingUnavailable(String),

    // Orchestration misuse
    #[error("Invalid state: {0}")]
    InvalidState(String),

    // Listening asset
    #[error("Playback failed: {0}")]
    PlaybackError(String),

    // Collaborators
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Evaluation rejected ({status}): {detail}")]
    EvaluationRejected { status: u16, detail: String },

    #[error("Failed to load question: {0}")]
    QuestionLoadError(String),

    // Ambient
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl ExamError {
    /// Whether the user can retry the failed step without restarting the session.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ExamError::NetworkError(_)
                | ExamError::PermissionDenied(_)
                | ExamError::DeviceUnavailable(_)
                | ExamError::RecordingUnavailable(_)
        )
    }

    /// Whether the error ends the current flow and sends the user back to question selection.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExamError::EvaluationRejected { .. } | ExamError::QuestionLoadError(_)
        )
    }

    /// Failures that come from the microphone rather than from orchestration.
    pub fn is_capture_failure(&self) -> bool {
        matches!(
            self,
            ExamError::PermissionDenied(_) | ExamError::DeviceUnavailable(_)
        )
    }
}

impl From<std::io::Error> for ExamError {
    fn from(err: std::io::Error) -> Self {
        ExamError::Io(err.to_string())
    }
}

impl From<hound::Error> for ExamError {
    fn from(err: hound::Error) -> Self {
        ExamError::Io(format!("WAV encoding failed: {}", err))
    }
}

impl From<config::ConfigError> for ExamError {
    fn from(err: config::ConfigError) -> Self {
        ExamError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ExamError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evaluation_rejected_display_is_verbatim() {
        let error = ExamError::EvaluationRejected {
            status: 400,
            detail: "File type .txt not allowed".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Evaluation rejected (400): File type .txt not allowed"
        );
    }

    #[test]
    fn test_retryable_classification() {
        assert!(ExamError::NetworkError("reset".into()).is_retryable());
        assert!(ExamError::PermissionDenied("declined".into()).is_retryable());
        assert!(ExamError::DeviceUnavailable("driver".into()).is_retryable());
        assert!(!ExamError::InvalidState("double start".into()).is_retryable());
        assert!(!ExamError::EvaluationRejected {
            status: 422,
            detail: "bad".into()
        }
        .is_retryable());
    }

    #[test]
    fn test_terminal_classification() {
        assert!(ExamError::QuestionLoadError("404".into()).is_terminal());
        assert!(ExamError::EvaluationRejected {
            status: 500,
            detail: "boom".into()
        }
        .is_terminal());
        assert!(!ExamError::NetworkError("timeout".into()).is_terminal());
        assert!(!ExamError::PlaybackError("decode".into()).is_terminal());
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let error: ExamError = io.into();
        assert_eq!(error, ExamError::Io("missing".to_string()));
    }

    #[test]
    fn test_capture_failure_classification() {
        assert!(ExamError::PermissionDenied("no".into()).is_capture_failure());
        assert!(!ExamError::PlaybackError("no".into()).is_capture_failure());
    }
}
