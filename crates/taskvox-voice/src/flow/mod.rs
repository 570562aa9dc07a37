//! **VoiceInteractionStateMachine**: one generic machine, two flows.
//!
//! [`FlowMachine`] owns the session and does the bookkeeping every flow needs
//! (sequence dedup, interim buffering, prompting, commit gating, audio policy).
//! A [`FlowLogic`] supplies only the per-state decisions:
//!
//! - [`CreateTaskFlow`]: `Listening → Confirming → Committing → Success | Failed`
//! - [`AcceptTaskFlow`]: `Searching → Browsing → Confirming → Committing → Success | Failed`
//!
//! `Committing` is only entered from a confirmation state on an affirmative
//! reply, and the commit runs exactly once per entry.

mod accept;
mod create;
mod machine;
mod prompts;
mod speaker;

pub use accept::{AcceptState, AcceptTaskFlow, Browse};
pub use create::{CreateState, CreateTaskFlow};
pub use machine::{FlowExit, FlowMachine, Handled};
pub use speaker::{SpeakOutcome, Speaker};

use crate::bus::{CommandBus, FlowSignal};
use crate::error::CaptureError;
use std::fmt;
use std::sync::Arc;
use taskvox_core::{Coordinate, EngineConfig, TaskId, TaskRepository, UserId, DEFAULT_DRAFT_PRICE};
use uuid::Uuid;

/// Machine over the create flow.
pub type CreateTaskMachine = FlowMachine<CreateTaskFlow>;
/// Machine over the accept flow.
pub type AcceptTaskMachine = FlowMachine<AcceptTaskFlow>;

/// States of a flow.
pub trait FlowState: Copy + Eq + fmt::Debug + Send + Sync + 'static {
    fn initial() -> Self;
    fn committing() -> Self;
    fn success() -> Self;
    fn failed() -> Self;
    /// Short lowercase name for logs and observer events.
    fn name(&self) -> &'static str;

    fn is_terminal(&self) -> bool {
        *self == Self::success()
    }
}

/// Identifies a spoken prompt so it can be repeated or asserted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptId {
    DescribeTask,
    NeedTitle,
    ConfirmDraft,
    DraftKept,
    Created,
    CreateFailed,
    AskQuery,
    NoMatches,
    SearchFailed,
    Candidate,
    LastCandidate,
    ConfirmAccept,
    Accepted,
    SelfAccept,
    AlreadyTaken,
    AcceptFailed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub id: PromptId,
    pub text: String,
}

/// What the logic decided after a final transcript.
#[derive(Debug, Clone)]
pub struct Step<S> {
    pub next: S,
    pub prompt: Option<Prompt>,
    pub signal: Option<FlowSignal>,
}

impl<S> Step<S> {
    pub fn to(next: S) -> Self {
        Self {
            next,
            prompt: None,
            signal: None,
        }
    }

    pub fn say(next: S, prompt: Prompt) -> Self {
        Self {
            next,
            prompt: Some(prompt),
            signal: None,
        }
    }
}

/// Outcome of a commit attempt.
#[derive(Debug, Clone)]
pub enum Commit<S> {
    Done {
        task_id: TaskId,
        prompt: Prompt,
        signal: FlowSignal,
    },
    /// The machine passes through `failed()`, speaks, then settles in `settle`.
    Failed { prompt: Prompt, settle: S },
}

/// Runtime state of one active flow.
#[derive(Debug)]
pub struct VoiceSession<S, P> {
    pub session_id: Uuid,
    pub state: S,
    /// Latest interim text of the utterance in progress.
    pub transcript_buffer: String,
    pub payload: P,
    pub last_prompt: Option<Prompt>,
    /// Highest transcript sequence number processed.
    pub last_seq: Option<u64>,
}

impl<S: FlowState, P> VoiceSession<S, P> {
    pub fn new(payload: P) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            state: S::initial(),
            transcript_buffer: String::new(),
            payload,
            last_prompt: None,
            last_seq: None,
        }
    }
}

/// Everything a flow needs from its surroundings.
#[derive(Clone)]
pub struct FlowContext {
    pub user_id: UserId,
    pub user_location: Option<Coordinate>,
    pub repository: Arc<dyn TaskRepository>,
    pub bus: CommandBus,
    pub default_price: f64,
    pub max_search_distance_km: Option<f64>,
}

impl FlowContext {
    pub fn new(user_id: UserId, repository: Arc<dyn TaskRepository>) -> Self {
        Self {
            user_id,
            user_location: None,
            repository,
            bus: CommandBus::default(),
            default_price: DEFAULT_DRAFT_PRICE,
            max_search_distance_km: None,
        }
    }

    /// Context with location, price and radius taken from config.
    pub fn from_config(
        user_id: UserId,
        repository: Arc<dyn TaskRepository>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            user_location: config.user_location,
            default_price: config.default_price,
            max_search_distance_km: config.max_search_distance_km,
            ..Self::new(user_id, repository)
        }
    }

    pub fn with_location(mut self, location: Coordinate) -> Self {
        self.user_location = Some(location);
        self
    }

    pub fn with_bus(mut self, bus: CommandBus) -> Self {
        self.bus = bus;
        self
    }
}

/// Per-state decisions of one flow.
#[async_trait::async_trait]
pub trait FlowLogic: Send + Sync {
    type State: FlowState;
    type Payload: fmt::Debug + Send + Sync + 'static;

    fn new_payload(&self, ctx: &FlowContext) -> Self::Payload;

    fn opening_prompt(&self) -> Prompt;

    /// React to a final transcript in any interactive state.
    async fn on_final(
        &self,
        session: &mut VoiceSession<Self::State, Self::Payload>,
        text: &str,
        ctx: &FlowContext,
    ) -> Step<Self::State>;

    /// Perform the confirmed action. Called once per entry into `committing()`.
    async fn commit(
        &self,
        session: &mut VoiceSession<Self::State, Self::Payload>,
        ctx: &FlowContext,
    ) -> Commit<Self::State>;
}

/// What the surrounding UI can display.
#[derive(Debug, Clone, PartialEq)]
pub enum FlowEvent {
    StateChanged {
        from: &'static str,
        to: &'static str,
    },
    Prompted {
        id: PromptId,
        text: String,
    },
    TranscriptUpdated {
        text: String,
        is_final: bool,
    },
    AudioDisabled {
        reason: String,
    },
    CaptureIssue(CaptureError),
}
