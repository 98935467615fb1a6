//! Phase state and the pure transition function
//!
//! `transition(phase, question, settings, event)` returns the next phase and the
//! effects the machine must run. It never touches a clock, microphone or speaker,
//! so the whole exam flow can be checked without hardware or wall-clock time.

use crate::config::ExamConfig;
use crate::error::{ExamError, Result};
use std::fmt;
use std::time::Duration;

use super::question::Question;

#[derive(Debug, Clone, PartialEq)]
pub enum Phase {
    Loading,
    Instructions,
    Reading { remaining: u32 },
    /// `playing` is false until the asset has been started
    Listening { playing: bool },
    Preparation { remaining: u32 },
    /// Waiting for the platform to grant the microphone
    AcquiringMicrophone,
    /// Microphone could not be acquired; the user may retry
    RecordingUnavailable { cause: ExamError },
    Recording { remaining: u32 },
    Completed,
}

impl Phase {
    pub fn name(&self) -> &'static str {
        match self {
            Phase::Loading => "loading",
            Phase::Instructions => "instructions",
            Phase::Reading { .. } => "reading",
            Phase::Listening { .. } => "listening",
            Phase::Preparation { .. } => "preparation",
            Phase::AcquiringMicrophone => "acquiring-microphone",
            Phase::RecordingUnavailable { .. } => "recording-unavailable",
            Phase::Recording { .. } => "recording",
            Phase::Completed => "completed",
        }
    }

    /// Seconds left on the phase countdown (0 for untimed phases)
    pub fn remaining(&self) -> u32 {
        match self {
            Phase::Reading { remaining }
            | Phase::Preparation { remaining }
            | Phase::Recording { remaining } => *remaining,
            _ => 0,
        }
    }

    pub fn is_timed(&self) -> bool {
        matches!(
            self,
            Phase::Reading { .. } | Phase::Preparation { .. } | Phase::Recording { .. }
        )
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    QuestionLoaded(Question),
    QuestionLoadFailed(ExamError),
    /// User leaves the instructions screen
    ConfirmStart,
    Tick { remaining: u32 },
    ClockExpired,
    /// User starts (or restarts) the listening asset
    PlayAudio,
    PlaybackEnded,
    PlaybackFailed(ExamError),
    /// User moves on without waiting for the asset to end
    SkipListening,
    MicrophoneReady,
    MicrophoneFailed(ExamError),
    RetryRecording,
    StopEarly,
}

impl SessionEvent {
    pub fn name(&self) -> &'static str {
        match self {
            SessionEvent::QuestionLoaded(_) => "question-loaded",
            SessionEvent::QuestionLoadFailed(_) => "question-load-failed",
            SessionEvent::ConfirmStart => "confirm-start",
            SessionEvent::Tick { .. } => "tick",
            SessionEvent::ClockExpired => "clock-expired",
            SessionEvent::PlayAudio => "play-audio",
            SessionEvent::PlaybackEnded => "playback-ended",
            SessionEvent::PlaybackFailed(_) => "playback-failed",
            SessionEvent::SkipListening => "skip-listening",
            SessionEvent::MicrophoneReady => "microphone-ready",
            SessionEvent::MicrophoneFailed(_) => "microphone-failed",
            SessionEvent::RetryRecording => "retry-recording",
            SessionEvent::StopEarly => "stop-early",
        }
    }
}

/// The events a user can raise. Clock, playback and microphone events only ever
/// come from the machine's own callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserEvent {
    ConfirmStart,
    PlayAudio,
    SkipListening,
    RetryRecording,
    StopEarly,
}

impl From<UserEvent> for SessionEvent {
    fn from(event: UserEvent) -> Self {
        match event {
            UserEvent::ConfirmStart => SessionEvent::ConfirmStart,
            UserEvent::PlayAudio => SessionEvent::PlayAudio,
            UserEvent::SkipListening => SessionEvent::SkipListening,
            UserEvent::RetryRecording => SessionEvent::RetryRecording,
            UserEvent::StopEarly => SessionEvent::StopEarly,
        }
    }
}

/// Non-fatal conditions surfaced to the user
#[derive(Debug, Clone, PartialEq)]
pub enum SessionNotice {
    /// The listening asset could not be played; the exam moved on to preparation
    PlaybackFailed(ExamError),
    /// The microphone could not be acquired; retry or leave the exam
    RecordingUnavailable(ExamError),
}

impl fmt::Display for SessionNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionNotice::PlaybackFailed(e) => write!(f, "Audio could not be played: {}", e),
            SessionNotice::RecordingUnavailable(e) => write!(f, "Recording unavailable: {}", e),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    AdoptQuestion(Question),
    StartClock(u32),
    CancelClock,
    StartPlayback { delay: Duration },
    StopPlayback,
    AcquireMicrophone,
    StartCapture,
    FinishCapture,
    ReleaseMicrophone,
    Notify(SessionNotice),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub next: Phase,
    pub effects: Vec<Effect>,
}

impl Transition {
    fn to(next: Phase) -> Self {
        Self {
            next,
            effects: Vec::new(),
        }
    }

    fn with(next: Phase, effects: Vec<Effect>) -> Self {
        Self { next, effects }
    }
}

fn enter_preparation(question: &Question, mut effects: Vec<Effect>) -> Transition {
    effects.push(Effect::StartClock(question.preparation_time));
    Transition::with(
        Phase::Preparation {
            remaining: question.preparation_time,
        },
        effects,
    )
}

fn invalid(phase: &Phase, event: &SessionEvent) -> ExamError {
    ExamError::InvalidState(format!("{} cannot handle {}", phase, event.name()))
}

pub fn transition(
    phase: &Phase,
    question: Option<&Question>,
    settings: &ExamConfig,
    event: SessionEvent,
) -> Result<Transition> {
    if let Phase::Loading = phase {
        return match event {
            SessionEvent::QuestionLoaded(question) => {
                question.validate()?;
                Ok(Transition::with(
                    Phase::Instructions,
                    vec![Effect::AdoptQuestion(question)],
                ))
            }
            SessionEvent::QuestionLoadFailed(e) => Err(e),
            other => Err(invalid(phase, &other)),
        };
    }

    let Some(question) = question else {
        return Err(ExamError::InvalidState(format!(
            "{} reached without a question",
            phase
        )));
    };

    match (phase, event) {
        (Phase::Instructions, SessionEvent::ConfirmStart) => {
            if question.reading_passage().is_some() {
                let secs = question.reading_secs(settings.default_reading_secs);
                Ok(Transition::with(
                    Phase::Reading { remaining: secs },
                    vec![Effect::StartClock(secs)],
                ))
            } else if question.audio_asset().is_some() {
                Ok(Transition::to(Phase::Listening { playing: false }))
            } else {
                Ok(enter_preparation(question, Vec::new()))
            }
        }

        (Phase::Reading { .. }, SessionEvent::Tick { remaining }) => {
            Ok(Transition::to(Phase::Reading { remaining }))
        }
        (Phase::Reading { .. }, SessionEvent::ClockExpired) => {
            if question.audio_asset().is_some() {
                Ok(Transition::with(
                    Phase::Listening { playing: true },
                    vec![Effect::StartPlayback {
                        delay: settings.playback_delay(),
                    }],
                ))
            } else {
                Ok(enter_preparation(question, Vec::new()))
            }
        }

        (Phase::Listening { playing }, SessionEvent::PlayAudio) => {
            let mut effects = Vec::new();
            if *playing {
                effects.push(Effect::StopPlayback);
            }
            effects.push(Effect::StartPlayback {
                delay: Duration::ZERO,
            });
            Ok(Transition::with(Phase::Listening { playing: true }, effects))
        }
        (Phase::Listening { .. }, SessionEvent::PlaybackEnded) => {
            Ok(enter_preparation(question, Vec::new()))
        }
        (Phase::Listening { .. }, SessionEvent::PlaybackFailed(e)) => Ok(enter_preparation(
            question,
            vec![Effect::Notify(SessionNotice::PlaybackFailed(e))],
        )),
        (Phase::Listening { .. }, SessionEvent::SkipListening) => {
            Ok(enter_preparation(question, vec![Effect::StopPlayback]))
        }

        (Phase::Preparation { .. }, SessionEvent::Tick { remaining }) => {
            Ok(Transition::to(Phase::Preparation { remaining }))
        }
        (Phase::Preparation { .. }, SessionEvent::ClockExpired) => Ok(Transition::with(
            Phase::AcquiringMicrophone,
            vec![Effect::AcquireMicrophone],
        )),

        (Phase::AcquiringMicrophone, SessionEvent::MicrophoneReady) => Ok(Transition::with(
            Phase::Recording {
                remaining: question.response_time,
            },
            vec![
                Effect::StartCapture,
                Effect::StartClock(question.response_time),
            ],
        )),
        (Phase::AcquiringMicrophone, SessionEvent::MicrophoneFailed(cause)) => {
            Ok(Transition::with(
                Phase::RecordingUnavailable {
                    cause: cause.clone(),
                },
                vec![
                    Effect::ReleaseMicrophone,
                    Effect::Notify(SessionNotice::RecordingUnavailable(cause)),
                ],
            ))
        }
        (Phase::RecordingUnavailable { .. }, SessionEvent::RetryRecording) => Ok(
            Transition::with(Phase::AcquiringMicrophone, vec![Effect::AcquireMicrophone]),
        ),

        (Phase::Recording { .. }, SessionEvent::Tick { remaining }) => {
            Ok(Transition::to(Phase::Recording { remaining }))
        }
        (Phase::Recording { .. }, SessionEvent::ClockExpired) => Ok(Transition::with(
            Phase::Completed,
            vec![Effect::CancelClock, Effect::FinishCapture],
        )),
        (Phase::Recording { .. }, SessionEvent::StopEarly) => Ok(Transition::with(
            Phase::Completed,
            vec![Effect::CancelClock, Effect::FinishCapture],
        )),

        (phase, event) => Err(invalid(phase, &event)),
    }
}
