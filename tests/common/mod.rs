// Shared fakes for driving the exam machine without hardware or a network

#![allow(dead_code)]

use async_trait::async_trait;
use speaking_exam::api::QuestionCatalog;
use speaking_exam::audio::{
    AudioFrame, AudioPlayback, CaptureConfig, FinishedFn, MediaCaptureController,
    MicrophoneBackend, PlaybackRequest,
};
use speaking_exam::clock::ManualClock;
use speaking_exam::config::ExamConfig;
use speaking_exam::exam::{ExamSessionMachine, Question};
use speaking_exam::{ExamError, Result};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

pub fn question(id: &str, reading: bool, audio: bool) -> Question {
    Question {
        id: id.to_string(),
        part: if reading || audio { 3 } else { 2 },
        question_number: 1,
        kind: "Independent Speaking".to_string(),
        title: "Study habits".to_string(),
        prompt: "Do you prefer studying alone or in a group?".to_string(),
        preparation_time: 30,
        response_time: 60,
        reading: reading.then(|| "The university will close the library on weekends.".to_string()),
        reading_time: None,
        audio_file: audio.then(|| "/static/audio/conversation.mp3".to_string()),
        conversation: audio.then(|| "W: Did you see the notice?".to_string()),
        lecture: None,
        tips: Some(vec!["State your opinion first".to_string()]),
        sample_response: None,
    }
}

pub fn frames(count: usize) -> Vec<AudioFrame> {
    (0..count)
        .map(|i| AudioFrame {
            samples: vec![(i as i16 + 1) * 100; 1600],
            sample_rate: 16000,
            channels: 1,
            timestamp_ms: i as u64 * 100,
        })
        .collect()
}

/// Observes and steers a `FakeMicrophone` owned by the machine
#[derive(Clone, Default)]
pub struct MicProbe {
    open: Arc<AtomicBool>,
    opens: Arc<AtomicUsize>,
    deny: Arc<Mutex<Option<ExamError>>>,
}

impl MicProbe {
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn deny_with(&self, error: Option<ExamError>) {
        *self.deny.lock().unwrap() = error;
    }
}

/// Microphone that delivers a fixed set of frames as soon as it is opened
pub struct FakeMicrophone {
    frames: Vec<AudioFrame>,
    probe: MicProbe,
    tx: Option<mpsc::Sender<AudioFrame>>,
}

impl FakeMicrophone {
    pub fn new(frames: Vec<AudioFrame>) -> (Self, MicProbe) {
        let probe = MicProbe::default();
        (
            Self {
                frames,
                probe: probe.clone(),
                tx: None,
            },
            probe,
        )
    }
}

#[async_trait]
impl MicrophoneBackend for FakeMicrophone {
    async fn open(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        if let Some(error) = self.probe.deny.lock().unwrap().clone() {
            return Err(error);
        }

        let (tx, rx) = mpsc::channel(self.frames.len() + 8);
        for frame in &self.frames {
            tx.try_send(frame.clone()).unwrap();
        }
        self.tx = Some(tx);
        self.probe.open.store(true, Ordering::SeqCst);
        self.probe.opens.fetch_add(1, Ordering::SeqCst);
        Ok(rx)
    }

    fn close(&mut self) {
        self.tx = None;
        self.probe.open.store(false, Ordering::SeqCst);
    }

    fn is_open(&self) -> bool {
        self.tx.is_some()
    }

    fn name(&self) -> &str {
        "fake microphone"
    }
}

/// Observes and completes playbacks started on a `FakePlayer`
///
/// Callbacks are kept even after `stop()` so tests can deliver late completions.
#[derive(Clone, Default)]
pub struct PlayerProbe {
    requests: Arc<Mutex<Vec<PlaybackRequest>>>,
    callbacks: Arc<Mutex<Vec<Option<FinishedFn>>>>,
    stops: Arc<AtomicUsize>,
    playing: Arc<AtomicBool>,
}

impl PlayerProbe {
    pub fn requests(&self) -> Vec<PlaybackRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    /// Complete the `index`-th playback. Returns false if it already completed.
    pub fn finish(&self, index: usize, result: Result<()>) -> bool {
        let callback = self
            .callbacks
            .lock()
            .unwrap()
            .get_mut(index)
            .and_then(|slot| slot.take());
        match callback {
            Some(on_finished) => {
                on_finished(result);
                true
            }
            None => false,
        }
    }

    pub fn finish_latest(&self, result: Result<()>) -> bool {
        let count = self.callbacks.lock().unwrap().len();
        count > 0 && self.finish(count - 1, result)
    }
}

pub struct FakePlayer {
    probe: PlayerProbe,
}

impl FakePlayer {
    pub fn new() -> (Self, PlayerProbe) {
        let probe = PlayerProbe::default();
        (
            Self {
                probe: probe.clone(),
            },
            probe,
        )
    }
}

impl AudioPlayback for FakePlayer {
    fn play(&mut self, request: PlaybackRequest, on_finished: FinishedFn) {
        self.probe.requests.lock().unwrap().push(request);
        self.probe.callbacks.lock().unwrap().push(Some(on_finished));
        self.probe.playing.store(true, Ordering::SeqCst);
    }

    fn stop(&mut self) {
        self.probe.stops.fetch_add(1, Ordering::SeqCst);
        self.probe.playing.store(false, Ordering::SeqCst);
    }

    fn is_playing(&self) -> bool {
        self.probe.playing.load(Ordering::SeqCst)
    }
}

/// Catalog backed by a fixed list
pub struct StaticCatalog {
    questions: Vec<Question>,
}

impl StaticCatalog {
    pub fn new(questions: Vec<Question>) -> Self {
        Self { questions }
    }
}

#[async_trait]
impl QuestionCatalog for StaticCatalog {
    async fn fetch(&self, question_id: &str) -> Result<Question> {
        self.questions
            .iter()
            .find(|q| q.id == question_id)
            .cloned()
            .ok_or_else(|| ExamError::QuestionLoadError("Question not found".to_string()))
    }

    async fn list(&self) -> Result<Vec<Question>> {
        Ok(self.questions.clone())
    }
}

pub struct Harness {
    pub machine: ExamSessionMachine,
    pub clock: ManualClock,
    pub mic: MicProbe,
    pub player: PlayerProbe,
}

/// Machine on a manual clock, still in `Loading`
pub fn fresh() -> Harness {
    fresh_with(frames(10), CaptureConfig::default())
}

/// Like `fresh`, with the microphone delivering `mic_frames` under `capture`
pub fn fresh_with(mic_frames: Vec<AudioFrame>, capture: CaptureConfig) -> Harness {
    let clock = ManualClock::new();
    let (microphone, mic) = FakeMicrophone::new(mic_frames);
    let (player_impl, player) = FakePlayer::new();

    let machine = ExamSessionMachine::new(
        ExamConfig::default(),
        Box::new(clock.clone()),
        MediaCaptureController::new(Box::new(microphone), capture),
        Box::new(player_impl),
    );

    Harness {
        machine,
        clock,
        mic,
        player,
    }
}

/// Machine on a manual clock with `question` already loaded
pub async fn loaded(question: Question) -> Harness {
    load_into(fresh(), question).await
}

pub async fn load_into(mut h: Harness, question: Question) -> Harness {
    let catalog = StaticCatalog::new(vec![question.clone()]);
    h.machine.load(&catalog, &question.id).await.unwrap();
    h
}
