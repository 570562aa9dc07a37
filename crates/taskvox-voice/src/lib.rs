//! # taskvox voice engine
//!
//! Turns spoken utterances into task actions and speaks the answers back.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        FlowMachine<L>                             │
//! │  ┌──────────────────┐  ┌──────────────┐  ┌────────────────────┐   │
//! │  │ SpeechCapture    │→ │  extract     │→ │ CreateTaskFlow /   │   │
//! │  │ Session (restart)│  │ (rule-based) │  │ AcceptTaskFlow     │   │
//! │  └──────────────────┘  └──────────────┘  └────────────────────┘   │
//! │                                                │        │         │
//! │  ┌──────────────────┐  ┌──────────────┐        │        ↓         │
//! │  │ AudioPlayback    │← │ Speech       │←───────┘  TaskRepository  │
//! │  │ Coordinator (1)  │  │ Synthesis    │           (sled, atomic   │
//! │  └──────────────────┘  └──────────────┘            accept)       │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Build one [`AudioPlaybackCoordinator`] per process and share it; every
//! [`SpeechSynthesisGateway`] plays through it.

pub mod bus;
pub mod capture;
pub mod error;
pub mod extract;
pub mod flow;
pub mod playback;
pub mod stt;
pub mod synthesis;
pub mod turn;

#[cfg(feature = "device")]
pub mod device;

pub use bus::{CommandBus, FlowSignal};
pub use capture::{
    CaptureConfig, CaptureEvent, RecognizerEvent, ScriptStep, ScriptedRecognizer,
    SpeechCaptureSession, SpeechRecognizer, Transcript, UnsupportedRecognizer,
};
pub use error::{CaptureError, SynthesisError, VoiceError, VoiceResult};
pub use extract::{
    apply_correction, classify_intent, extract_draft, search_keywords, task_matches, Intent,
};
pub use flow::{
    AcceptState, AcceptTaskFlow, AcceptTaskMachine, Browse, Commit, CreateState, CreateTaskFlow,
    CreateTaskMachine, FlowContext, FlowEvent, FlowExit, FlowLogic, FlowMachine, FlowState,
    Handled, Prompt, PromptId, SpeakOutcome, Speaker, Step, VoiceSession,
};
pub use playback::{AudioPlaybackCoordinator, AudioSink, NullSink};
pub use stt::{OpenAiTranscriber, PlaceholderTranscriber, Transcriber, Utterance};
pub use synthesis::{DisabledTts, OpenAiTts, PlaceholderTts, SpeechSynthesisGateway, TtsProvider};
pub use turn::{TurnConfig, TurnDetector};
