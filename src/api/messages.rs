//! Wire formats of the question catalog and evaluation service

use crate::exam::Question;
use serde::{Deserialize, Serialize};

/// Body of `GET /questions/`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionList {
    pub total: usize,
    pub questions: Vec<Question>,
}

/// Structured error body returned by both collaborators
///
/// `detail` is usually a string but validation failures carry a list of objects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub detail: serde_json::Value,
}

impl ErrorPayload {
    pub fn message(&self) -> String {
        match &self.detail {
            serde_json::Value::String(text) => text.clone(),
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecognitionPayload {
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

/// One scored dimension. Pronunciation and fluency report a raw 0-100 `score`
/// next to `score_4point`; the others report on the 4-point scale directly.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScorePayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score_4point: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
}

/// Body of a successful `POST /speech/evaluate`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvaluationPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speech_recognition: Option<RecognitionPayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pronunciation: Option<ScorePayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fluency: Option<ScorePayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<ScorePayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grammar: Option<ScorePayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overall: Option<ScorePayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpt_evaluation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tips: Option<Vec<String>>,
}
