use std::collections::VecDeque;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use super::phase::{transition, Effect, Phase, SessionEvent, SessionNotice, UserEvent};
use super::question::Question;
use super::session::{ExamSession, SessionSnapshot};
use crate::api::{EvaluationResult, QuestionCatalog, SubmissionGateway};
use crate::audio::{AudioPlayback, MediaCaptureController, PlaybackRequest, Recording};
use crate::clock::Clock;
use crate::config::ExamConfig;
use crate::error::{ExamError, Result};

/// Where a queued event came from. Clock and playback events carry the run they
/// belong to so that callbacks of a cancelled run are discarded.
#[derive(Debug, Clone, Copy)]
enum EventSource {
    Countdown(u64),
    Playback(u64),
    User,
}

#[derive(Debug)]
struct Queued {
    source: EventSource,
    event: SessionEvent,
}

/// Why an event did not go through
#[derive(Debug)]
enum StepError {
    /// The current phase does not take the event; nothing changed
    Rejected(ExamError),
    /// An effect failed part way through the step
    Failed(ExamError),
}

impl From<StepError> for ExamError {
    fn from(err: StepError) -> Self {
        match err {
            StepError::Rejected(e) | StepError::Failed(e) => e,
        }
    }
}

/// Handle for posting user events into a running session from another task
#[derive(Clone)]
pub struct SessionEvents {
    tx: mpsc::UnboundedSender<Queued>,
}

impl SessionEvents {
    pub fn send(&self, event: UserEvent) -> Result<()> {
        self.tx
            .send(Queued {
                source: EventSource::User,
                event: event.into(),
            })
            .map_err(|_| ExamError::InvalidState("session has ended".to_string()))
    }
}

/// Drives one exam attempt through its phases
///
/// All transitions run one at a time on the caller's task: either directly via
/// `dispatch`, or from the internal queue that clock and playback callbacks post
/// into (`pump` drains it, `next_event` waits for one event).
pub struct ExamSessionMachine {
    settings: ExamConfig,
    session: ExamSession,
    clock: Box<dyn Clock>,
    capture: MediaCaptureController,
    playback: Box<dyn AudioPlayback>,
    events_tx: mpsc::UnboundedSender<Queued>,
    events_rx: mpsc::UnboundedReceiver<Queued>,
    countdown: u64,
    playback_run: u64,
    notices: Vec<SessionNotice>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
    torn_down: bool,
}

impl ExamSessionMachine {
    pub fn new(
        settings: ExamConfig,
        clock: Box<dyn Clock>,
        capture: MediaCaptureController,
        playback: Box<dyn AudioPlayback>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let session = ExamSession::new();
        let (snapshot_tx, _) = watch::channel(SessionSnapshot::capture(&session, &[]));

        Self {
            settings,
            session,
            clock,
            capture,
            playback,
            events_tx,
            events_rx,
            countdown: 0,
            playback_run: 0,
            notices: Vec::new(),
            snapshot_tx,
            torn_down: false,
        }
    }

    pub fn session(&self) -> &ExamSession {
        &self.session
    }

    pub fn phase(&self) -> &Phase {
        &self.session.phase
    }

    pub fn time_remaining(&self) -> u32 {
        self.session.time_remaining()
    }

    pub fn question(&self) -> Option<&Question> {
        self.session.question.as_ref()
    }

    pub fn recording(&self) -> Option<&Recording> {
        self.session.recording.as_ref()
    }

    pub fn notices(&self) -> &[SessionNotice] {
        &self.notices
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let notices: Vec<String> = self.notices.iter().map(|n| n.to_string()).collect();
        SessionSnapshot::capture(&self.session, &notices)
    }

    /// Observe snapshots published after every processed event
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot_tx.subscribe()
    }

    /// Handle for posting user events from another task
    pub fn events(&self) -> SessionEvents {
        SessionEvents {
            tx: self.events_tx.clone(),
        }
    }

    /// Fetch the question and leave `Loading`.
    pub async fn load(&mut self, catalog: &dyn QuestionCatalog, question_id: &str) -> Result<()> {
        info!("Loading question {}", question_id);
        let event = match catalog.fetch(question_id).await {
            Ok(question) => SessionEvent::QuestionLoaded(question),
            Err(e) => SessionEvent::QuestionLoadFailed(e),
        };
        self.ensure_live()?;
        Ok(self.process(event).await?)
    }

    /// Process one user event right away. Events the current phase does not
    /// accept fail with `InvalidState` and leave the session unchanged.
    pub async fn dispatch(&mut self, event: UserEvent) -> Result<()> {
        self.ensure_live()?;
        Ok(self.process(event.into()).await?)
    }

    /// Process every queued clock, playback and user event. Returns how many
    /// changed the session.
    pub async fn pump(&mut self) -> Result<usize> {
        let mut handled = 0;
        while let Ok(queued) = self.events_rx.try_recv() {
            if self.handle_queued(queued).await? {
                handled += 1;
            }
        }
        Ok(handled)
    }

    /// Wait for the next queued event and process it.
    pub async fn next_event(&mut self) -> Result<bool> {
        self.ensure_live()?;
        // The machine holds a sender itself, so the queue never closes
        let queued = self
            .events_rx
            .recv()
            .await
            .ok_or_else(|| ExamError::InvalidState("event queue closed".to_string()))?;
        self.handle_queued(queued).await
    }

    /// Send the captured response for evaluation. Only valid once `Completed`;
    /// the recording stays in the session whatever the outcome.
    pub async fn submit(&self, gateway: &SubmissionGateway) -> Result<EvaluationResult> {
        if self.session.phase != Phase::Completed {
            return Err(ExamError::InvalidState(format!(
                "cannot submit during {}",
                self.session.phase
            )));
        }
        let recording = self
            .session
            .recording
            .as_ref()
            .ok_or_else(|| ExamError::InvalidState("no recording captured".to_string()))?;
        let question = self
            .session
            .question
            .as_ref()
            .ok_or_else(|| ExamError::InvalidState("no question loaded".to_string()))?;

        gateway.submit(recording, &question.id).await
    }

    /// Leave the exam: cancel the clock, stop playback, release the microphone.
    /// Idempotent; also runs on drop.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        info!("Tearing down session in {}", self.session.phase);

        self.clock.cancel();
        self.countdown += 1;
        self.playback.stop();
        self.playback_run += 1;
        self.capture.release();
        self.torn_down = true;

        while self.events_rx.try_recv().is_ok() {}
        self.publish();
    }

    fn ensure_live(&self) -> Result<()> {
        if self.torn_down {
            return Err(ExamError::InvalidState("session has been torn down".to_string()));
        }
        Ok(())
    }

    async fn handle_queued(&mut self, queued: Queued) -> Result<bool> {
        if self.torn_down {
            return Ok(false);
        }

        match queued.source {
            EventSource::Countdown(run) if run != self.countdown => {
                debug!("Dropping {} from stale countdown {}", queued.event.name(), run);
                return Ok(false);
            }
            EventSource::Playback(run) if run != self.playback_run => {
                debug!("Dropping {} from stale playback {}", queued.event.name(), run);
                return Ok(false);
            }
            _ => {}
        }

        match self.process(queued.event).await {
            Ok(()) => Ok(true),
            Err(StepError::Rejected(e)) => {
                warn!("Ignoring queued event: {}", e);
                Ok(false)
            }
            Err(StepError::Failed(e)) => Err(e),
        }
    }

    /// Run an event and its follow-ups. Each step's phase is committed only
    /// once all of its effects went through.
    async fn process(&mut self, event: SessionEvent) -> std::result::Result<(), StepError> {
        let mut pending = VecDeque::from([event]);

        while let Some(event) = pending.pop_front() {
            let event_name = event.name();
            let step = transition(
                &self.session.phase,
                self.session.question.as_ref(),
                &self.settings,
                event,
            )
            .map_err(StepError::Rejected)?;

            for effect in step.effects {
                let touches_capture = matches!(effect, Effect::StartCapture | Effect::FinishCapture);
                match self.apply(effect).await {
                    Ok(Some(follow_up)) => pending.push_back(follow_up),
                    Ok(None) => {}
                    Err(e) if touches_capture => {
                        return Err(StepError::Failed(self.capture_failed(e)));
                    }
                    Err(e) => {
                        self.publish();
                        return Err(StepError::Failed(e));
                    }
                }
            }

            if std::mem::discriminant(&step.next) != std::mem::discriminant(&self.session.phase) {
                info!("Phase {} -> {} ({})", self.session.phase, step.next, event_name);
            } else {
                debug!("{} in {} ({}s left)", event_name, step.next, step.next.remaining());
            }
            self.session.phase = step.next;
        }

        self.publish();
        Ok(())
    }

    /// Capture could not start or its audio could not be kept. Stop the
    /// countdown, release the device and wait for a retry.
    fn capture_failed(&mut self, e: ExamError) -> ExamError {
        error!("Capture failed in {}: {}", self.session.phase, e);
        self.clock.cancel();
        self.countdown += 1;
        self.capture.release();

        let cause = match e {
            e @ ExamError::RecordingUnavailable(_) => e,
            e if e.is_capture_failure() => e,
            e => ExamError::RecordingUnavailable(e.to_string()),
        };
        let notice = SessionNotice::RecordingUnavailable(cause.clone());
        warn!("{}", notice);
        self.notices.push(notice);

        info!("Phase {} -> recording-unavailable", self.session.phase);
        self.session.phase = Phase::RecordingUnavailable {
            cause: cause.clone(),
        };
        self.publish();
        cause
    }

    async fn apply(&mut self, effect: Effect) -> Result<Option<SessionEvent>> {
        match effect {
            Effect::AdoptQuestion(question) => {
                info!("Question {} loaded: {}", question.id, question.title);
                self.session.question = Some(question);
            }

            Effect::StartClock(seconds) => {
                self.countdown += 1;
                let run = self.countdown;
                let tick_tx = self.events_tx.clone();
                let expire_tx = self.events_tx.clone();
                self.clock.start(
                    seconds,
                    Box::new(move |remaining| {
                        let _ = tick_tx.send(Queued {
                            source: EventSource::Countdown(run),
                            event: SessionEvent::Tick { remaining },
                        });
                    }),
                    Box::new(move || {
                        let _ = expire_tx.send(Queued {
                            source: EventSource::Countdown(run),
                            event: SessionEvent::ClockExpired,
                        });
                    }),
                );
            }

            Effect::CancelClock => {
                self.clock.cancel();
                self.countdown += 1;
            }

            Effect::StartPlayback { delay } => {
                let asset = self
                    .session
                    .question
                    .as_ref()
                    .and_then(|q| q.audio_asset())
                    .map(str::to_string)
                    .ok_or_else(|| {
                        ExamError::InvalidState("question has no audio asset".to_string())
                    })?;

                self.playback_run += 1;
                let run = self.playback_run;
                let tx = self.events_tx.clone();
                self.playback.play(
                    PlaybackRequest { asset, delay },
                    Box::new(move |result| {
                        let event = match result {
                            Ok(()) => SessionEvent::PlaybackEnded,
                            Err(e) => SessionEvent::PlaybackFailed(e),
                        };
                        let _ = tx.send(Queued {
                            source: EventSource::Playback(run),
                            event,
                        });
                    }),
                );
            }

            Effect::StopPlayback => {
                self.playback.stop();
                self.playback_run += 1;
            }

            Effect::AcquireMicrophone => {
                return match self.capture.acquire().await {
                    Ok(()) => Ok(Some(SessionEvent::MicrophoneReady)),
                    Err(e @ ExamError::InvalidState(_)) => Err(e),
                    Err(e) if e.is_capture_failure() => {
                        Ok(Some(SessionEvent::MicrophoneFailed(e)))
                    }
                    Err(e) => Ok(Some(SessionEvent::MicrophoneFailed(
                        ExamError::RecordingUnavailable(e.to_string()),
                    ))),
                };
            }

            Effect::StartCapture => {
                self.capture.start_capture()?;
            }

            Effect::FinishCapture => {
                let recording = self.capture.stop_capture().await?;
                if recording.is_empty() {
                    warn!("Captured response contains no audio");
                }
                self.session.recording = Some(recording);
            }

            Effect::ReleaseMicrophone => {
                self.capture.release();
            }

            Effect::Notify(notice) => {
                warn!("{}", notice);
                self.notices.push(notice);
            }
        }

        Ok(None)
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(self.snapshot());
    }
}

impl Drop for ExamSessionMachine {
    fn drop(&mut self) {
        self.teardown();
    }
}
