// Run one speaking question from the terminal
//
// Usage: speaking-exam --question q7 [--answer-file response.wav] [--save-dir out/]
//        speaking-exam list
//
// Enter confirms the instructions, skips the listening audio, stops the recording
// early, or retries the microphone. "p" + Enter (re)plays the listening audio.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use speaking_exam::api::{EvaluationResult, HttpQuestionCatalog, QuestionCatalog, SubmissionGateway};
use speaking_exam::audio::{
    AudioOutput, CaptureConfig, FileMicrophone, HttpAudioPlayer, MediaCaptureController,
    MicrophoneBackend,
};
use speaking_exam::clock::TokioClock;
use speaking_exam::config::Config;
use speaking_exam::exam::{ExamSessionMachine, Question, SessionEvents, SessionSnapshot, UserEvent};
use speaking_exam::ExamError;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncBufReadExt;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "speaking-exam")]
#[command(about = "Timed speaking exam practice")]
struct Args {
    /// Config file (toml/yaml/json, extension optional)
    #[arg(short, long)]
    config: Option<String>,

    /// Question to answer
    #[arg(short, long)]
    question: Option<String>,

    /// Answer from a WAV file instead of the microphone
    #[arg(short, long)]
    answer_file: Option<PathBuf>,

    /// Keep the recorded response in this directory
    #[arg(short, long)]
    save_dir: Option<PathBuf>,

    /// Stop after recording without submitting for evaluation
    #[arg(long)]
    no_submit: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// List the questions in the catalog
    List,
}

#[cfg(feature = "cpal")]
fn microphone(config: CaptureConfig) -> Result<Box<dyn MicrophoneBackend>> {
    Ok(Box::new(speaking_exam::audio::CpalMicrophone::new(config)))
}

#[cfg(not(feature = "cpal"))]
fn microphone(_config: CaptureConfig) -> Result<Box<dyn MicrophoneBackend>> {
    bail!("Built without microphone support: pass --answer-file or rebuild with --features cpal")
}

#[cfg(feature = "cpal")]
fn speaker() -> Arc<dyn AudioOutput> {
    Arc::new(speaking_exam::audio::CpalSpeaker)
}

#[cfg(not(feature = "cpal"))]
fn speaker() -> Arc<dyn AudioOutput> {
    Arc::new(speaking_exam::audio::PacedOutput)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let cfg = match &args.config {
        Some(path) => Config::load(path).with_context(|| format!("Failed to load config {}", path))?,
        None => Config::default(),
    };
    info!("Evaluation service: {}", cfg.service.api_base_url);

    let catalog = HttpQuestionCatalog::new(&cfg.service)?;

    if let Some(Command::List) = args.command {
        return list_questions(&catalog).await;
    }

    let Some(question_id) = args.question.clone() else {
        bail!("--question is required (run `speaking-exam list` to see the catalog)");
    };

    run_exam(&cfg, &args, &catalog, &question_id).await
}

async fn list_questions(catalog: &dyn QuestionCatalog) -> Result<()> {
    let questions = catalog.list().await.context("Failed to list questions")?;
    for q in &questions {
        println!(
            "{:<8} part {}  #{:<3} {:<24} {}",
            q.id, q.part, q.question_number, q.kind, q.title
        );
    }
    println!("{} questions", questions.len());
    Ok(())
}

async fn run_exam(
    cfg: &Config,
    args: &Args,
    catalog: &dyn QuestionCatalog,
    question_id: &str,
) -> Result<()> {
    let capture_config = CaptureConfig::from(&cfg.audio);
    let backend: Box<dyn MicrophoneBackend> = match &args.answer_file {
        Some(path) => Box::new(FileMicrophone::open_path(path, capture_config.clone(), true)?),
        None => microphone(capture_config.clone())?,
    };
    let player = HttpAudioPlayer::new(&cfg.service, speaker())?;

    let mut machine = ExamSessionMachine::new(
        cfg.exam.clone(),
        Box::new(TokioClock::new()),
        MediaCaptureController::new(backend, capture_config),
        Box::new(player),
    );

    if let Err(e) = machine.load(catalog, question_id).await {
        error!("{}", e);
        bail!("Could not load question {}: {}", question_id, e);
    }
    if let Some(question) = machine.question() {
        print_question(question);
    }

    let (line_tx, mut line_rx) = mpsc::unbounded_channel();
    tokio::spawn(forward_input(machine.subscribe(), machine.events(), line_tx));

    let mut snapshots = machine.subscribe();
    let mut last_phase = String::new();
    loop {
        let interrupted = tokio::select! {
            result = machine.next_event() => {
                result?;
                false
            }
            _ = tokio::signal::ctrl_c() => true,
        };
        if interrupted {
            warn!("Interrupted, leaving the exam");
            machine.teardown();
            return Ok(());
        }

        let snapshot = snapshots.borrow_and_update().clone();
        render(&snapshot, machine.question(), &mut last_phase);
        if snapshot.phase == "completed" {
            break;
        }
    }

    let Some(recording) = machine.recording().cloned() else {
        bail!("Exam completed without a recording");
    };
    println!(
        "Response captured: {:.1}s of audio",
        recording.duration_secs()
    );

    if let Some(dir) = &args.save_dir {
        let path = recording.save_to(dir)?;
        println!("Saved to {}", path.display());
    }

    if args.no_submit {
        return Ok(());
    }

    let gateway = SubmissionGateway::new(cfg)?;
    loop {
        println!("Submitting for evaluation...");
        match machine.submit(&gateway).await {
            Ok(result) => {
                print_result(&result);
                return Ok(());
            }
            Err(e @ ExamError::NetworkError(_)) => {
                println!("{}. Press Enter to retry.", e);
                if line_rx.recv().await.is_none() {
                    return Err(e.into());
                }
            }
            Err(e) => {
                println!("{}", e);
                return Err(e.into());
            }
        }
    }
}

/// Translate terminal input into session events for the phase on screen. Lines
/// that mean nothing in the current phase go back to the caller.
async fn forward_input(
    snapshots: watch::Receiver<SessionSnapshot>,
    events: SessionEvents,
    lines: mpsc::UnboundedSender<String>,
) {
    let mut reader = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = reader.next_line().await {
        let phase = snapshots.borrow().phase.clone();
        let event = match (phase.as_str(), line.trim()) {
            ("instructions", _) => Some(UserEvent::ConfirmStart),
            ("listening", "p") => Some(UserEvent::PlayAudio),
            ("listening", _) => Some(UserEvent::SkipListening),
            ("recording", _) => Some(UserEvent::StopEarly),
            ("recording-unavailable", _) => Some(UserEvent::RetryRecording),
            _ => None,
        };

        let sent = match event {
            Some(event) => events.send(event).is_ok(),
            None => lines.send(line).is_ok(),
        };
        if !sent {
            break;
        }
    }
}

fn print_question(q: &Question) {
    println!();
    println!("Part {} Question {}: {}", q.part, q.question_number, q.title);
    if q.reading_passage().is_some() {
        println!("The reading passage is shown once you begin.");
    }
    println!();
    println!("{}", q.prompt);
    println!();
    println!(
        "Preparation {}s, response {}s. Press Enter to begin.",
        q.preparation_time, q.response_time
    );
}

fn render(snapshot: &SessionSnapshot, question: Option<&Question>, last_phase: &mut String) {
    if snapshot.phase != *last_phase {
        *last_phase = snapshot.phase.clone();
        match snapshot.phase.as_str() {
            "reading" => {
                if let Some(passage) = question.and_then(|q| q.reading_passage()) {
                    println!();
                    println!("{}", passage);
                    println!();
                }
                println!("Reading: {}s", snapshot.time_remaining);
            }
            "listening" => println!("Listening. Enter skips, \"p\" + Enter replays."),
            "preparation" => println!("Prepare your answer: {}s", snapshot.time_remaining),
            "acquiring-microphone" => println!("Opening microphone..."),
            "recording-unavailable" => {
                if let Some(notice) = snapshot.notices.last() {
                    println!("{}", notice);
                }
                println!("Press Enter to retry, Ctrl+C to leave.");
            }
            "recording" => println!(
                "Recording: {}s. Press Enter to stop early.",
                snapshot.time_remaining
            ),
            "completed" => println!("Recording finished."),
            _ => {}
        }
        return;
    }

    if snapshot.time_remaining > 0 && snapshot.time_remaining % 10 == 0 {
        println!("  {}s left", snapshot.time_remaining);
    }
}

fn print_result(result: &EvaluationResult) {
    let s = &result.scores;
    println!();
    println!(
        "Overall        {:.1} / 4.0 ({:?})",
        s.overall,
        result.overall_band()
    );
    println!("Pronunciation  {:.1}", s.pronunciation);
    println!("Fluency        {:.1}", s.fluency);
    println!("Content        {:.1}", s.content);
    println!("Grammar        {:.1}", s.grammar);
    if !result.transcript.is_empty() {
        println!();
        println!("Transcript: {}", result.transcript);
    }
    if !result.feedback.is_empty() {
        println!();
        println!("{}", result.feedback);
    }
    for tip in &result.tips {
        println!("  - {}", tip);
    }
}
