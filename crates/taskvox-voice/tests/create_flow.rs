//! Integration test: the create-task voice flow against a sled store.
//!
//! ## Scenarios
//! 1. The coffee transcript becomes a posted task after "yes".
//! 2. "yes" commits exactly once; a repeated sequence number is ignored.
//! 3. A failing repository passes through Failed and settles in Listening with the draft kept.
//! 4. A rate-limited TTS provider never changes state and silences the rest of the session.
//! 5. Network synthesis errors are retried once, then the prompt goes text-only.
//! 6. `run` drives the flow from a scripted recognizer, across a recognizer restart.
//! 7. `run` reports an unsupported recognizer without prompting.
//! 8. Cancelling `run` stops capture.
//! 9. Runs that end in silence keep the flow listening until speech arrives.
//! 10. Speech captured while a commit is in flight is discarded, not acted on.

mod common;

use common::{drain, speaker, transitions, CountingRepository, RecordingTts};
use std::sync::Arc;
use std::time::Duration;
use taskvox_core::{
    Category, Coordinate, NewTask, RepositoryResult, TaskId, TaskRepository, TaskStatus,
    TaskSummary, UserId,
};
use taskvox_voice::{
    CaptureConfig, CommandBus, CreateState, CreateTaskFlow, FlowContext, FlowEvent, FlowExit,
    FlowMachine, FlowSignal, Handled, PromptId, ScriptStep, ScriptedRecognizer,
    CaptureError, SpeechCaptureSession, SynthesisError, Transcript, UnsupportedRecognizer,
};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

const COFFEE: &str = "I need someone to pick up coffee from Starbucks at Marston Library. \
                      My budget is $10 and it should take about 15 minutes.";

fn alice() -> UserId {
    UserId::new("alice")
}

fn fast_capture() -> CaptureConfig {
    CaptureConfig {
        restart_delay: Duration::from_millis(5),
        max_restart_failures: 3,
    }
}

#[tokio::test]
async fn coffee_transcript_posts_task() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let repo = Arc::new(CountingRepository::new());
    let bus = CommandBus::default();
    let mut signals = bus.subscribe();
    let (events_tx, mut events) = mpsc::unbounded_channel();
    let ctx = FlowContext::new(alice(), repo.clone())
        .with_location(Coordinate::new(29.6516, -82.3248))
        .with_bus(bus);
    let mut machine = FlowMachine::new(CreateTaskFlow, ctx, speaker(Arc::new(RecordingTts::default()), 1))
        .with_observer(events_tx);

    machine.begin().await;
    assert_eq!(machine.handle(Transcript::new(COFFEE, true, 1)).await, Handled::Processed);
    assert_eq!(machine.state(), CreateState::Confirming);
    assert_eq!(machine.handle(Transcript::new("yes", true, 2)).await, Handled::Committed);
    assert_eq!(machine.state(), CreateState::Success);

    let task_id = machine.completed_task().cloned().expect("task id");
    let task = repo.get_task(&task_id).await.unwrap();
    assert_eq!(task.price, 10.0);
    assert_eq!(task.estimated_time, "15 minutes");
    assert_eq!(task.category, Category::CoffeeRun);
    assert!(task.location.contains("Marston Library"));
    assert_eq!(task.creator_id, alice());
    assert_eq!(task.status, TaskStatus::Open);
    assert_eq!(task.location_coords, Some(Coordinate::new(29.6516, -82.3248)));

    assert_eq!(
        signals.recv().await.unwrap(),
        FlowSignal::OpenCreatedTask { task_id }
    );
    let seen = drain(&mut events);
    assert_eq!(
        transitions(&seen),
        vec![
            ("listening", "confirming"),
            ("confirming", "committing"),
            ("committing", "success"),
        ]
    );
    assert!(seen.iter().any(|e| matches!(
        e,
        FlowEvent::Prompted { id: PromptId::Created, .. }
    )));
}

#[tokio::test]
async fn yes_commits_exactly_once() {
    let repo = Arc::new(CountingRepository::new());
    let ctx = FlowContext::new(alice(), repo.clone());
    let mut machine = FlowMachine::new(CreateTaskFlow, ctx, speaker(Arc::new(RecordingTts::default()), 1));

    machine.handle(Transcript::new(COFFEE, true, 1)).await;
    let yes = Transcript::new("yes", true, 2);
    assert_eq!(machine.handle(yes.clone()).await, Handled::Committed);
    assert_eq!(machine.handle(yes).await, Handled::Ignored);
    assert_eq!(machine.handle(Transcript::new("yes", true, 3)).await, Handled::Ignored);

    assert_eq!(repo.creates(), 1);
    assert_eq!(repo.inner.len(), 1);
}

#[tokio::test]
async fn failed_commit_settles_in_listening() {
    let repo = Arc::new(CountingRepository::failing_creates());
    let (events_tx, mut events) = mpsc::unbounded_channel();
    let ctx = FlowContext::new(alice(), repo.clone());
    let mut machine = FlowMachine::new(CreateTaskFlow, ctx, speaker(Arc::new(RecordingTts::default()), 1))
        .with_observer(events_tx);

    machine.handle(Transcript::new(COFFEE, true, 1)).await;
    assert_eq!(machine.handle(Transcript::new("yes", true, 2)).await, Handled::Committed);
    assert_eq!(machine.state(), CreateState::Listening);
    assert!(machine.completed_task().is_none());
    assert_eq!(machine.session().payload.price, 10.0);
    assert!(machine.session().payload.has_title());

    let seen = drain(&mut events);
    let moves = transitions(&seen);
    assert!(moves.contains(&("committing", "failed")));
    assert_eq!(moves.last(), Some(&("failed", "listening")));
    assert!(seen.iter().any(|e| matches!(
        e,
        FlowEvent::Prompted { id: PromptId::CreateFailed, .. }
    )));

    // A fresh description and confirmation tries again.
    machine.handle(Transcript::new(COFFEE, true, 3)).await;
    machine.handle(Transcript::new("yes", true, 4)).await;
    assert_eq!(repo.creates(), 2);
}

#[tokio::test]
async fn rate_limited_tts_goes_silent_without_changing_state() {
    let tts = Arc::new(RecordingTts::failing([SynthesisError::RateLimited]));
    let (events_tx, mut events) = mpsc::unbounded_channel();
    let ctx = FlowContext::new(alice(), Arc::new(CountingRepository::new()));
    let mut machine = FlowMachine::new(CreateTaskFlow, ctx, speaker(tts.clone(), 1))
        .with_observer(events_tx);

    machine.begin().await;
    assert_eq!(machine.state(), CreateState::Listening);
    assert!(!machine.audio_enabled());
    let seen = drain(&mut events);
    assert!(seen.iter().any(|e| matches!(e, FlowEvent::AudioDisabled { .. })));
    assert!(transitions(&seen).is_empty());

    machine.handle(Transcript::new(COFFEE, true, 1)).await;
    assert_eq!(machine.state(), CreateState::Confirming);
    assert_eq!(tts.calls(), 1);
    assert_eq!(
        machine.session().last_prompt.as_ref().map(|p| p.id),
        Some(PromptId::ConfirmDraft)
    );
}

#[tokio::test]
async fn network_errors_retry_once_then_continue() {
    let tts = Arc::new(RecordingTts::failing([
        SynthesisError::Network("reset".into()),
        SynthesisError::Network("reset".into()),
    ]));
    let ctx = FlowContext::new(alice(), Arc::new(CountingRepository::new()));
    let mut machine = FlowMachine::new(CreateTaskFlow, ctx, speaker(tts.clone(), 1));

    machine.begin().await;
    assert_eq!(tts.calls(), 2);
    assert!(machine.audio_enabled());

    machine.handle(Transcript::new(COFFEE, true, 1)).await;
    assert_eq!(tts.calls(), 3);
    assert_eq!(machine.state(), CreateState::Confirming);
}

#[tokio::test]
async fn run_completes_from_scripted_speech() {
    let recognizer = Arc::new(ScriptedRecognizer::new());
    recognizer.feed(ScriptStep::Interim("I need someone".into()));
    recognizer.say(COFFEE);
    recognizer.feed(ScriptStep::End);
    recognizer.say("yes");
    let (mut capture, mut capture_events) = SpeechCaptureSession::new(recognizer.clone(), fast_capture());

    let repo = Arc::new(CountingRepository::new());
    let ctx = FlowContext::new(alice(), repo.clone());
    let mut machine = FlowMachine::new(CreateTaskFlow, ctx, speaker(Arc::new(RecordingTts::default()), 1));

    let exit = timeout(
        Duration::from_secs(5),
        machine.run(&mut capture, &mut capture_events, CancellationToken::new()),
    )
    .await
    .expect("flow finished in time");

    let task_id = match exit {
        FlowExit::Completed { task_id } => task_id,
        other => panic!("unexpected exit {other:?}"),
    };
    assert!(repo.get_task(&task_id).await.is_ok());
    assert_eq!(repo.creates(), 1);
    assert!(recognizer.start_count() >= 2);
    assert!(!capture.is_listening());
}

#[tokio::test]
async fn run_without_recognizer_is_unavailable() {
    let (mut capture, mut capture_events) =
        SpeechCaptureSession::new(Arc::new(UnsupportedRecognizer), fast_capture());
    let tts = Arc::new(RecordingTts::default());
    let ctx = FlowContext::new(alice(), Arc::new(CountingRepository::new()));
    let mut machine = FlowMachine::new(CreateTaskFlow, ctx, speaker(tts.clone(), 1));

    let exit = machine
        .run(&mut capture, &mut capture_events, CancellationToken::new())
        .await;
    assert_eq!(exit, FlowExit::CaptureUnavailable);
    assert_eq!(tts.calls(), 0);
}

#[tokio::test]
async fn cancel_stops_capture() {
    let recognizer = Arc::new(ScriptedRecognizer::new());
    let (mut capture, mut capture_events) = SpeechCaptureSession::new(recognizer, fast_capture());
    let ctx = FlowContext::new(alice(), Arc::new(CountingRepository::new()));
    let mut machine = FlowMachine::new(CreateTaskFlow, ctx, speaker(Arc::new(RecordingTts::default()), 1));

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let exit = timeout(
        Duration::from_secs(5),
        machine.run(&mut capture, &mut capture_events, cancel),
    )
    .await
    .expect("cancelled in time");
    assert_eq!(exit, FlowExit::Cancelled);
    assert!(!capture.is_listening());
    assert_eq!(machine.state(), CreateState::Listening);
}

#[tokio::test]
async fn silent_runs_do_not_end_the_flow() {
    let recognizer = Arc::new(ScriptedRecognizer::new());
    for _ in 0..5 {
        recognizer.feed(ScriptStep::Error(CaptureError::NoSpeech));
        recognizer.feed(ScriptStep::End);
    }
    recognizer.say(COFFEE);
    recognizer.say("yes");
    let (mut capture, mut capture_events) = SpeechCaptureSession::new(recognizer.clone(), fast_capture());

    let repo = Arc::new(CountingRepository::new());
    let ctx = FlowContext::new(alice(), repo.clone());
    let mut machine = FlowMachine::new(CreateTaskFlow, ctx, speaker(Arc::new(RecordingTts::default()), 1));

    let exit = timeout(
        Duration::from_secs(5),
        machine.run(&mut capture, &mut capture_events, CancellationToken::new()),
    )
    .await
    .expect("flow finished in time");

    assert!(matches!(exit, FlowExit::Completed { .. }), "unexpected exit {exit:?}");
    assert_eq!(repo.creates(), 1);
    assert!(recognizer.start_count() >= 6);
}

/// Repository whose `create_task` fails, and while it runs the user keeps talking.
struct TalkOverCommit {
    inner: CountingRepository,
    recognizer: Arc<ScriptedRecognizer>,
    committed: tokio::sync::Notify,
}

#[async_trait::async_trait]
impl TaskRepository for TalkOverCommit {
    async fn list_open_tasks(&self, exclude_owner: &UserId) -> RepositoryResult<Vec<TaskSummary>> {
        self.inner.list_open_tasks(exclude_owner).await
    }

    async fn get_task(&self, id: &TaskId) -> RepositoryResult<TaskSummary> {
        self.inner.get_task(id).await
    }

    async fn create_task(&self, task: NewTask, owner: &UserId) -> RepositoryResult<TaskId> {
        self.recognizer.say("Walk my dog for $15.");
        tokio::time::sleep(Duration::from_millis(50)).await;
        let result = self.inner.create_task(task, owner).await;
        self.committed.notify_one();
        result
    }

    async fn accept_task(&self, id: &TaskId, user: &UserId) -> RepositoryResult<()> {
        self.inner.accept_task(id, user).await
    }
}

#[tokio::test]
async fn speech_during_commit_is_discarded() {
    let recognizer = Arc::new(ScriptedRecognizer::new());
    recognizer.say(COFFEE);
    recognizer.say("yes");
    let (mut capture, mut capture_events) = SpeechCaptureSession::new(recognizer.clone(), fast_capture());

    let repo = Arc::new(TalkOverCommit {
        inner: CountingRepository::failing_creates(),
        recognizer: recognizer.clone(),
        committed: tokio::sync::Notify::new(),
    });
    let (events_tx, mut events) = mpsc::unbounded_channel();
    let ctx = FlowContext::new(alice(), repo.clone());
    let mut machine = FlowMachine::new(CreateTaskFlow, ctx, speaker(Arc::new(RecordingTts::default()), 1))
        .with_observer(events_tx);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    let watcher = repo.clone();
    tokio::spawn(async move {
        watcher.committed.notified().await;
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.cancel();
    });

    let exit = timeout(
        Duration::from_secs(5),
        machine.run(&mut capture, &mut capture_events, cancel),
    )
    .await
    .expect("flow finished in time");
    assert_eq!(exit, FlowExit::Cancelled);

    // The failed commit settled back in Listening and the dog utterance never reached the draft.
    assert_eq!(machine.state(), CreateState::Listening);
    assert_eq!(repo.inner.creates(), 1);
    let draft = &machine.session().payload;
    assert!(draft.title.contains("coffee"));
    assert_eq!(draft.price, 10.0);
    assert_eq!(machine.session().last_seq, Some(3));

    let seen = drain(&mut events);
    assert!(!seen.iter().any(|e| matches!(
        e,
        FlowEvent::TranscriptUpdated { text, .. } if text.contains("dog")
    )));
    assert_eq!(transitions(&seen).last(), Some(&("failed", "listening")));
}
