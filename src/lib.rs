pub mod api;
pub mod audio;
pub mod clock;
pub mod config;
pub mod error;
pub mod exam;

pub use api::{
    EvaluationResult, HttpQuestionCatalog, QuestionCatalog, ScoreBand, Scores, SubmissionGateway,
};
pub use audio::{
    AudioFile, AudioFrame, AudioPlayback, CaptureConfig, FileMicrophone, HttpAudioPlayer,
    MediaCaptureController, MicrophoneBackend, PlaybackRequest, Recording, RecordingBuilder,
};
pub use clock::{Clock, ManualClock, TokioClock};
pub use config::Config;
pub use error::{ExamError, Result};
pub use exam::{
    ExamSessionMachine, Phase, Question, SessionEvent, SessionEvents, SessionNotice,
    SessionSnapshot, UserEvent,
};
