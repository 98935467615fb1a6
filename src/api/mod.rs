//! Clients for the question catalog and the evaluation service

pub mod catalog;
pub mod evaluation;
pub mod gateway;
pub mod messages;

pub use catalog::{HttpQuestionCatalog, QuestionCatalog};
pub use evaluation::{EvaluationResult, ScoreBand, Scores, MAX_SCORE};
pub use gateway::SubmissionGateway;
pub use messages::{ErrorPayload, EvaluationPayload, QuestionList, RecognitionPayload, ScorePayload};
