//! Fakes shared by the flow integration tests.

#![allow(dead_code)]

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use taskvox_core::{
    NewTask, RepositoryError, RepositoryResult, SledTaskStore, TaskId, TaskRepository, TaskSummary,
    UserId,
};
use taskvox_voice::{
    AudioPlaybackCoordinator, FlowEvent, SpeechSynthesisGateway, Speaker, SynthesisError,
    TtsProvider,
};
use tokio::sync::mpsc;

/// TTS provider that records every request and replays scripted failures.
#[derive(Default)]
pub struct RecordingTts {
    pub requests: Mutex<Vec<String>>,
    pub script: Mutex<VecDeque<Result<Vec<u8>, SynthesisError>>>,
}

impl RecordingTts {
    pub fn failing(errors: impl IntoIterator<Item = SynthesisError>) -> Self {
        let tts = Self::default();
        tts.script.lock().extend(errors.into_iter().map(Err));
        tts
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait::async_trait]
impl TtsProvider for RecordingTts {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, SynthesisError> {
        self.requests.lock().push(text.to_string());
        self.script.lock().pop_front().unwrap_or_else(|| Ok(Vec::new()))
    }
}

/// How [`CountingRepository::accept_task`] should misbehave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForcedAccept {
    SelfAccept,
    Backend,
}

/// Sled store wrapper counting writes, with optional injected failures.
pub struct CountingRepository {
    pub inner: SledTaskStore,
    pub creates: AtomicUsize,
    pub accepts: AtomicUsize,
    pub fail_create: bool,
    pub forced_accept: Mutex<Option<ForcedAccept>>,
}

impl CountingRepository {
    pub fn new() -> Self {
        Self {
            inner: SledTaskStore::temporary().expect("temporary store"),
            creates: AtomicUsize::new(0),
            accepts: AtomicUsize::new(0),
            fail_create: false,
            forced_accept: Mutex::new(None),
        }
    }

    pub fn failing_creates() -> Self {
        Self {
            fail_create: true,
            ..Self::new()
        }
    }

    pub fn creates(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn accepts(&self) -> usize {
        self.accepts.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl TaskRepository for CountingRepository {
    async fn list_open_tasks(&self, exclude_owner: &UserId) -> RepositoryResult<Vec<TaskSummary>> {
        self.inner.list_open_tasks(exclude_owner).await
    }

    async fn get_task(&self, id: &TaskId) -> RepositoryResult<TaskSummary> {
        self.inner.get_task(id).await
    }

    async fn create_task(&self, task: NewTask, owner: &UserId) -> RepositoryResult<TaskId> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        if self.fail_create {
            return Err(RepositoryError::Backend("database offline".into()));
        }
        self.inner.create_task(task, owner).await
    }

    async fn accept_task(&self, id: &TaskId, user: &UserId) -> RepositoryResult<()> {
        self.accepts.fetch_add(1, Ordering::SeqCst);
        match *self.forced_accept.lock() {
            Some(ForcedAccept::SelfAccept) => {
                return Err(RepositoryError::SelfAccept {
                    task: id.clone(),
                    user: user.clone(),
                })
            }
            Some(ForcedAccept::Backend) => {
                return Err(RepositoryError::Backend("timeout".into()));
            }
            None => {}
        }
        self.inner.accept_task(id, user).await
    }
}

/// Speaker over `tts` with a silent coordinator.
pub fn speaker(tts: Arc<dyn TtsProvider>, network_retries: u32) -> Speaker {
    let gateway = SpeechSynthesisGateway::new(tts, Arc::new(AudioPlaybackCoordinator::silent()));
    Speaker::new(Arc::new(gateway), network_retries)
}

/// Everything the observer saw so far.
pub fn drain(rx: &mut mpsc::UnboundedReceiver<FlowEvent>) -> Vec<FlowEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// `(from, to)` pairs of every state change in `events`.
pub fn transitions(events: &[FlowEvent]) -> Vec<(&'static str, &'static str)> {
    events
        .iter()
        .filter_map(|e| match e {
            FlowEvent::StateChanged { from, to } => Some((*from, *to)),
            _ => None,
        })
        .collect()
}
