//! taskvox console
//!
//! Runs one voice flow in the terminal: `taskvox-console create` to post a task,
//! `taskvox-console accept` to find and accept one. Without the `device`
//! feature every typed line is a final transcript and prompts are printed only.

#[cfg(not(feature = "device"))]
mod stdin;

use std::process::ExitCode;
use std::sync::Arc;
use taskvox_core::{EngineConfig, SledTaskStore, UserId};
use taskvox_voice::{
    AcceptTaskFlow, AudioPlaybackCoordinator, AudioSink, CaptureConfig, CommandBus,
    CreateTaskFlow, FlowContext, FlowEvent, FlowExit, FlowLogic, FlowMachine, Speaker,
    SpeechCaptureSession, SpeechRecognizer, SpeechSynthesisGateway,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Clone, Copy)]
enum Mode {
    Create,
    Accept,
}

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("[taskvox] .env not loaded: {} (using system environment)", e);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mode = match std::env::args().nth(1).as_deref() {
        Some("create") | None => Mode::Create,
        Some("accept") => Mode::Accept,
        Some(other) => {
            eprintln!("usage: taskvox-console [create|accept] (got {other:?})");
            return ExitCode::from(2);
        }
    };

    match run(mode).await {
        Ok(FlowExit::Completed { task_id }) => {
            info!(%task_id, "flow completed");
            ExitCode::SUCCESS
        }
        Ok(FlowExit::Cancelled) => ExitCode::SUCCESS,
        Ok(exit) => {
            error!(?exit, "flow ended without a result");
            ExitCode::FAILURE
        }
        Err(e) => {
            error!(error = %e, "taskvox console failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(mode: Mode) -> Result<FlowExit, BoxError> {
    let config = EngineConfig::load()?;
    let store = Arc::new(SledTaskStore::open(&config.storage_path)?);
    info!(storage_path = %config.storage_path, ?mode, "taskvox console started");

    let playback = Arc::new(AudioPlaybackCoordinator::new(output_sink()));
    let gateway = Arc::new(SpeechSynthesisGateway::from_config(&config.speech, playback));
    let speaker = Speaker::new(gateway, config.speech.network_retries);

    let user_id = UserId::new(std::env::var("TASKVOX_USER_ID").unwrap_or_else(|_| "local-user".into()));
    let bus = CommandBus::default();
    let ctx = FlowContext::from_config(user_id, store.clone(), &config).with_bus(bus.clone());

    let mut signals = bus.subscribe();
    tokio::spawn(async move {
        while let Ok(signal) = signals.recv().await {
            println!("[signal] {signal:?}");
        }
    });

    let (mut capture, mut capture_events) =
        SpeechCaptureSession::new(recognizer(&config)?, CaptureConfig::from(&config.speech));

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("CTRL-C received; stopping flow");
            on_ctrl_c.cancel();
        }
    });

    let exit = match mode {
        Mode::Create => {
            let machine = FlowMachine::new(CreateTaskFlow, ctx, speaker);
            drive(machine, &mut capture, &mut capture_events, cancel).await
        }
        Mode::Accept => {
            let machine = FlowMachine::new(AcceptTaskFlow, ctx, speaker);
            drive(machine, &mut capture, &mut capture_events, cancel).await
        }
    };
    store.flush()?;
    Ok(exit)
}

async fn drive<L: FlowLogic>(
    machine: FlowMachine<L>,
    capture: &mut SpeechCaptureSession,
    capture_events: &mut mpsc::UnboundedReceiver<taskvox_voice::CaptureEvent>,
    cancel: CancellationToken,
) -> FlowExit {
    let (events_tx, mut events) = mpsc::unbounded_channel();
    let mut machine = machine.with_observer(events_tx);
    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            print_event(&event);
        }
    });

    let exit = machine.run(capture, capture_events, cancel).await;
    drop(machine);
    let _ = printer.await;
    exit
}

fn print_event(event: &FlowEvent) {
    match event {
        FlowEvent::Prompted { text, .. } => println!("taskvox> {text}"),
        FlowEvent::StateChanged { from, to } => println!("  [{from} -> {to}]"),
        FlowEvent::TranscriptUpdated { text, is_final: false } => println!("  ... {text}"),
        FlowEvent::TranscriptUpdated { .. } => {}
        FlowEvent::AudioDisabled { reason } => println!("  (audio off: {reason})"),
        FlowEvent::CaptureIssue(e) => println!("  (capture: {e})"),
    }
}

#[cfg(not(feature = "device"))]
fn output_sink() -> Arc<dyn AudioSink> {
    Arc::new(taskvox_voice::NullSink)
}

#[cfg(feature = "device")]
fn output_sink() -> Arc<dyn AudioSink> {
    match taskvox_voice::device::RodioSink::open() {
        Ok(sink) => Arc::new(sink),
        Err(e) => {
            tracing::warn!(error = %e, "no audio output; prompts will be text only");
            Arc::new(taskvox_voice::NullSink)
        }
    }
}

#[cfg(not(feature = "device"))]
fn recognizer(_config: &EngineConfig) -> Result<Arc<dyn SpeechRecognizer>, BoxError> {
    Ok(Arc::new(stdin::StdinRecognizer::default()))
}

#[cfg(feature = "device")]
fn recognizer(config: &EngineConfig) -> Result<Arc<dyn SpeechRecognizer>, BoxError> {
    use taskvox_voice::device::{MicrophoneConfig, MicrophoneRecognizer};
    use taskvox_voice::OpenAiTranscriber;

    let transcriber = Arc::new(OpenAiTranscriber::from_config(&config.speech)?);
    Ok(Arc::new(MicrophoneRecognizer::new(MicrophoneConfig::default(), transcriber)))
}
