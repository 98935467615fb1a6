use crate::error::{ExamError, Result};
use serde::{Deserialize, Serialize};

use super::messages::{EvaluationPayload, ScorePayload};

/// Top of the scoring scale
pub const MAX_SCORE: f64 = 4.0;

/// Raw 0-100 scores convert to the 4-point scale by this divisor
const RAW_SCALE_DIVISOR: f64 = 25.0;

/// Per-dimension scores, each in `[0.0, 4.0]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Scores {
    pub pronunciation: f64,
    pub fluency: f64,
    pub content: f64,
    pub grammar: f64,
    pub overall: f64,
}

/// Colour band of a score on the results screen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreBand {
    Strong,
    Fair,
    Weak,
}

/// Outcome of one evaluation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub scores: Scores,
    pub transcript: String,
    pub feedback: String,
    pub tips: Vec<String>,
}

fn clamp_score(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, MAX_SCORE)
    } else {
        0.0
    }
}

/// 4-point value of a dimension, falling back to the raw 0-100 score
fn four_point(section: Option<&ScorePayload>) -> Option<f64> {
    let section = section?;
    section
        .score_4point
        .or_else(|| section.score.map(|raw| raw / RAW_SCALE_DIVISOR))
}

impl EvaluationResult {
    pub fn score_band(score: f64) -> ScoreBand {
        if score >= 3.5 {
            ScoreBand::Strong
        } else if score >= 2.5 {
            ScoreBand::Fair
        } else {
            ScoreBand::Weak
        }
    }

    pub fn overall_band(&self) -> ScoreBand {
        Self::score_band(self.scores.overall)
    }

    /// Build the typed result from a successful response body.
    ///
    /// Pronunciation and fluency are mandatory. Missing content or grammar
    /// scores count as 0.0; a missing overall score is the mean of the other four.
    pub fn from_payload(status: u16, payload: EvaluationPayload) -> Result<Self> {
        let malformed = |what: &str| ExamError::EvaluationRejected {
            status,
            detail: format!("Evaluation response is missing {}", what),
        };

        let pronunciation = clamp_score(
            four_point(payload.pronunciation.as_ref()).ok_or_else(|| malformed("pronunciation"))?,
        );
        let fluency =
            clamp_score(four_point(payload.fluency.as_ref()).ok_or_else(|| malformed("fluency"))?);
        let content = clamp_score(payload.content.as_ref().and_then(|s| s.score).unwrap_or(0.0));
        let grammar = clamp_score(payload.grammar.as_ref().and_then(|s| s.score).unwrap_or(0.0));
        let overall = clamp_score(
            payload
                .overall
                .as_ref()
                .and_then(|s| s.score)
                .unwrap_or((pronunciation + fluency + content + grammar) / 4.0),
        );

        let transcript = payload
            .speech_recognition
            .map(|r| r.text)
            .unwrap_or_default();
        let feedback = payload
            .gpt_evaluation
            .filter(|text| !text.trim().is_empty())
            .or_else(|| payload.overall.and_then(|s| s.feedback))
            .unwrap_or_default();

        Ok(Self {
            scores: Scores {
                pronunciation,
                fluency,
                content,
                grammar,
                overall,
            },
            transcript,
            feedback,
            tips: payload.tips.unwrap_or_default(),
        })
    }

    /// Every score lies on the 4-point scale
    pub fn is_well_formed(&self) -> bool {
        let s = &self.scores;
        [s.pronunciation, s.fluency, s.content, s.grammar, s.overall]
            .iter()
            .all(|v| (0.0..=MAX_SCORE).contains(v))
    }
}
