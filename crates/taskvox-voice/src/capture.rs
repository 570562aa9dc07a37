//! **SpeechCaptureSession**: continuous listening on top of a platform recognizer.
//!
//! Platform engines stop on their own after a stretch of silence. While the
//! session wants to listen, a supervisor task restarts the recognizer every time
//! it ends, so callers see one uninterrupted stream of [`CaptureEvent`]s.
//!
//! ```text
//!  recognizer run ──Result──▶ Transcript{seq, is_final} ──▶ caller
//!        │        ──Error───▶ CaptureEvent::Error (session keeps going)
//!        └──End──▶ desired? ──yes──▶ restart after restart_delay
//!                            └─no───▶ supervisor exits
//! ```

use crate::error::CaptureError;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use taskvox_core::SpeechConfig;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// One recognizer result for one utterance.
#[derive(Debug, Clone, PartialEq)]
pub struct Transcript {
    pub text: String,
    /// Interim results are overwritten by later ones; a final result is acted on.
    pub is_final: bool,
    /// Monotonically increasing within a capture session.
    pub seq: u64,
    pub captured_at: DateTime<Utc>,
}

impl Transcript {
    pub fn new(text: impl Into<String>, is_final: bool, seq: u64) -> Self {
        Self {
            text: text.into(),
            is_final,
            seq,
            captured_at: Utc::now(),
        }
    }

    /// Recognized words in order.
    pub fn words(&self) -> impl Iterator<Item = &str> {
        self.text.split_whitespace()
    }
}

/// Raw events from one recognizer run.
#[derive(Debug, Clone, PartialEq)]
pub enum RecognizerEvent {
    Result { text: String, is_final: bool },
    Error(CaptureError),
    /// The engine stopped on its own (or was stopped).
    End,
}

/// Platform speech-to-text engine boundary.
#[async_trait::async_trait]
pub trait SpeechRecognizer: Send + Sync {
    /// Whether this platform can recognize speech at all. Must not fail.
    fn is_supported(&self) -> bool {
        true
    }

    /// Begin one recognition run, pushing events into `events` until the run
    /// ends. Dropping the sender counts as [`RecognizerEvent::End`].
    async fn start(&self, events: mpsc::UnboundedSender<RecognizerEvent>) -> Result<(), CaptureError>;

    /// End the current run, if any.
    fn stop(&self);
}

/// What a capture session reports to its owner.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureEvent {
    Transcript(Transcript),
    Error(CaptureError),
    /// The supervisor gave up (unsupported engine or too many refused starts).
    Ended,
}

/// Restart policy.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Pause before restarting an ended recognizer.
    pub restart_delay: Duration,
    /// Consecutive refused starts before giving up.
    pub max_restart_failures: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            restart_delay: Duration::from_millis(250),
            max_restart_failures: 5,
        }
    }
}

impl From<&SpeechConfig> for CaptureConfig {
    fn from(config: &SpeechConfig) -> Self {
        Self {
            restart_delay: Duration::from_millis(config.restart_delay_ms),
            max_restart_failures: config.max_restart_failures.max(1),
        }
    }
}

/// Continuous capture over a [`SpeechRecognizer`].
pub struct SpeechCaptureSession {
    recognizer: Arc<dyn SpeechRecognizer>,
    config: CaptureConfig,
    desired: Arc<AtomicBool>,
    seq: Arc<AtomicU64>,
    events_tx: mpsc::UnboundedSender<CaptureEvent>,
    supervisor: Option<JoinHandle<()>>,
}

impl SpeechCaptureSession {
    /// Create a session and the receiver its events arrive on.
    pub fn new(
        recognizer: Arc<dyn SpeechRecognizer>,
        config: CaptureConfig,
    ) -> (Self, mpsc::UnboundedReceiver<CaptureEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let session = Self {
            recognizer,
            config,
            desired: Arc::new(AtomicBool::new(false)),
            seq: Arc::new(AtomicU64::new(0)),
            events_tx,
            supervisor: None,
        };
        (session, events_rx)
    }

    /// Whether the platform has a recognizer.
    pub fn is_supported(&self) -> bool {
        self.recognizer.is_supported()
    }

    /// Start listening. Fails only with [`CaptureError::Unsupported`]; callers
    /// should then show a disabled listening control.
    pub fn start(&mut self) -> Result<(), CaptureError> {
        if !self.recognizer.is_supported() {
            warn!("speech capture unsupported on this platform");
            return Err(CaptureError::Unsupported);
        }
        if self.supervisor.as_ref().is_some_and(|h| !h.is_finished()) {
            self.desired.store(true, Ordering::SeqCst);
            return Ok(());
        }

        self.desired.store(true, Ordering::SeqCst);
        let supervisor = Supervisor {
            recognizer: Arc::clone(&self.recognizer),
            config: self.config.clone(),
            desired: Arc::clone(&self.desired),
            seq: Arc::clone(&self.seq),
            out: self.events_tx.clone(),
        };
        self.supervisor = Some(tokio::spawn(supervisor.run()));
        info!("speech capture started");
        Ok(())
    }

    /// Stop listening. Idempotent.
    pub fn stop(&mut self) {
        let was_listening = self.desired.swap(false, Ordering::SeqCst);
        self.recognizer.stop();
        if let Some(handle) = self.supervisor.take() {
            handle.abort();
        }
        if was_listening {
            info!("speech capture stopped");
        }
    }

    /// Whether listening is currently desired.
    pub fn is_listening(&self) -> bool {
        self.desired.load(Ordering::SeqCst)
    }
}

impl Drop for SpeechCaptureSession {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Supervisor {
    recognizer: Arc<dyn SpeechRecognizer>,
    config: CaptureConfig,
    desired: Arc<AtomicBool>,
    seq: Arc<AtomicU64>,
    out: mpsc::UnboundedSender<CaptureEvent>,
}

impl Supervisor {
    async fn run(self) {
        let mut failed_refusals: u32 = 0;

        while self.desired.load(Ordering::SeqCst) {
            let (tx, mut rx) = mpsc::unbounded_channel();
            if let Err(e) = self.recognizer.start(tx).await {
                warn!(error = %e, "recognizer failed to start");
                failed_refusals += 1;
                let fatal = e == CaptureError::Unsupported;
                let _ = self.out.send(CaptureEvent::Error(e));
                if fatal || failed_refusals >= self.config.max_restart_failures {
                    warn!(failed_refusals, "recognizer keeps refusing to start; giving up");
                    break;
                }
                tokio::time::sleep(self.config.restart_delay).await;
                continue;
            }

            failed_refusals = 0;

            while let Some(event) = rx.recv().await {
                match event {
                    RecognizerEvent::Result { text, is_final } => {
                        let seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
                        debug!(seq, is_final, "transcript");
                        if self
                            .out
                            .send(CaptureEvent::Transcript(Transcript::new(text, is_final, seq)))
                            .is_err()
                        {
                            return;
                        }
                    }
                    // Silence timeouts and engine hiccups never count against the session.
                    RecognizerEvent::Error(e) => {
                        debug!(error = %e, "recognition error");
                        let _ = self.out.send(CaptureEvent::Error(e));
                    }
                    RecognizerEvent::End => break,
                }
            }

            if !self.desired.load(Ordering::SeqCst) {
                return;
            }
            debug!("recognizer ended; restarting");
            tokio::time::sleep(self.config.restart_delay).await;
        }

        if self.desired.swap(false, Ordering::SeqCst) {
            let _ = self.out.send(CaptureEvent::Ended);
        }
    }
}

/// Recognizer for platforms without speech recognition.
#[derive(Debug, Default)]
pub struct UnsupportedRecognizer;

#[async_trait::async_trait]
impl SpeechRecognizer for UnsupportedRecognizer {
    fn is_supported(&self) -> bool {
        false
    }

    async fn start(&self, _events: mpsc::UnboundedSender<RecognizerEvent>) -> Result<(), CaptureError> {
        Err(CaptureError::Unsupported)
    }

    fn stop(&self) {}
}

/// One step of a [`ScriptedRecognizer`] script.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptStep {
    Interim(String),
    Final(String),
    Error(CaptureError),
    /// Simulates the engine timing out on its own.
    End,
}

/// Recognizer driven by prepared or fed-in utterances (tests, demos, text hosts).
///
/// Steps fed while a run is active go straight to it; otherwise they queue
/// for the next run. An `End` step finishes the current run.
#[derive(Default)]
pub struct ScriptedRecognizer {
    queue: Mutex<VecDeque<ScriptStep>>,
    sink: Mutex<Option<mpsc::UnboundedSender<RecognizerEvent>>>,
    starts: AtomicUsize,
}

impl ScriptedRecognizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recognizer preloaded with final utterances.
    pub fn with_utterances<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let recognizer = Self::new();
        for line in lines {
            recognizer.feed(ScriptStep::Final(line.into()));
        }
        recognizer
    }

    /// Feed a final utterance.
    pub fn say(&self, text: impl Into<String>) {
        self.feed(ScriptStep::Final(text.into()));
    }

    /// Feed any step.
    pub fn feed(&self, step: ScriptStep) {
        let mut sink = self.sink.lock();
        match sink.as_ref() {
            Some(tx) => {
                if !Self::deliver(tx, step) {
                    *sink = None;
                }
            }
            None => self.queue.lock().push_back(step),
        }
    }

    /// How many runs have been started (restarts included).
    pub fn start_count(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    /// Returns false when the run is over (End delivered or receiver gone).
    fn deliver(tx: &mpsc::UnboundedSender<RecognizerEvent>, step: ScriptStep) -> bool {
        let event = match step {
            ScriptStep::Interim(text) => RecognizerEvent::Result { text, is_final: false },
            ScriptStep::Final(text) => RecognizerEvent::Result { text, is_final: true },
            ScriptStep::Error(e) => RecognizerEvent::Error(e),
            ScriptStep::End => {
                let _ = tx.send(RecognizerEvent::End);
                return false;
            }
        };
        tx.send(event).is_ok()
    }
}

#[async_trait::async_trait]
impl SpeechRecognizer for ScriptedRecognizer {
    async fn start(&self, events: mpsc::UnboundedSender<RecognizerEvent>) -> Result<(), CaptureError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        let mut sink = self.sink.lock();
        let mut queue = self.queue.lock();
        while let Some(step) = queue.pop_front() {
            if !Self::deliver(&events, step) {
                *sink = None;
                return Ok(());
            }
        }
        *sink = Some(events);
        Ok(())
    }

    fn stop(&self) {
        if let Some(tx) = self.sink.lock().take() {
            let _ = tx.send(RecognizerEvent::End);
        }
    }
}
