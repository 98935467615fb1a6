use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::phase::Phase;
use super::question::Question;
use crate::audio::Recording;

/// Mutable state of one exam attempt, owned by the machine
#[derive(Debug)]
pub struct ExamSession {
    pub(crate) question: Option<Question>,
    pub(crate) phase: Phase,
    pub(crate) recording: Option<Recording>,
    pub(crate) started_at: DateTime<Utc>,
}

impl ExamSession {
    pub(crate) fn new() -> Self {
        Self {
            question: None,
            phase: Phase::Loading,
            recording: None,
            started_at: Utc::now(),
        }
    }

    pub fn question(&self) -> Option<&Question> {
        self.question.as_ref()
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    /// Seconds left in the current timed phase, never negative
    pub fn time_remaining(&self) -> u32 {
        self.phase.remaining()
    }

    pub fn recording(&self) -> Option<&Recording> {
        self.recording.as_ref()
    }
}

/// Point-in-time view of a session for the presentation layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// Current phase name (e.g. "preparation")
    pub phase: String,

    /// Seconds left in the current timed phase
    pub time_remaining: u32,

    /// Question being answered, once loaded
    pub question_id: Option<String>,

    /// Whether the response has been captured
    pub has_recording: bool,

    /// Length of the captured response in seconds
    pub recording_secs: Option<f64>,

    /// When the session was created
    pub started_at: DateTime<Utc>,

    /// Non-fatal messages to show the user
    pub notices: Vec<String>,
}

impl SessionSnapshot {
    pub(crate) fn capture(session: &ExamSession, notices: &[String]) -> Self {
        Self {
            phase: session.phase.name().to_string(),
            time_remaining: session.time_remaining(),
            question_id: session.question.as_ref().map(|q| q.id.clone()),
            has_recording: session.recording.is_some(),
            recording_secs: session.recording.as_ref().map(|r| r.duration_secs()),
            started_at: session.started_at,
            notices: notices.to_vec(),
        }
    }
}
