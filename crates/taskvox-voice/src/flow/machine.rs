use super::{
    Commit, FlowContext, FlowEvent, FlowLogic, FlowState, Prompt, SpeakOutcome, Speaker, Step,
    VoiceSession,
};
use crate::capture::{CaptureEvent, SpeechCaptureSession, Transcript};
use taskvox_core::TaskId;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// What [`FlowMachine::handle`] did with a transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handled {
    /// Stale or duplicate sequence number, terminal flow, or commit in flight.
    Ignored,
    /// Interim text stored in the buffer.
    Buffered,
    /// Final text acted on.
    Processed,
    /// Final text confirmed an action and the commit ran.
    Committed,
}

/// Why [`FlowMachine::run`] returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowExit {
    Completed { task_id: TaskId },
    Cancelled,
    /// The platform cannot recognize speech.
    CaptureUnavailable,
    /// Capture gave up or its channel closed.
    CaptureClosed,
}

/// Drives one [`FlowLogic`] over one [`VoiceSession`].
pub struct FlowMachine<L: FlowLogic> {
    logic: L,
    session: VoiceSession<L::State, L::Payload>,
    ctx: FlowContext,
    speaker: Speaker,
    observer: Option<mpsc::UnboundedSender<FlowEvent>>,
    completed: Option<TaskId>,
}

impl<L: FlowLogic> FlowMachine<L> {
    pub fn new(logic: L, ctx: FlowContext, speaker: Speaker) -> Self {
        let session: VoiceSession<L::State, L::Payload> = VoiceSession::new(logic.new_payload(&ctx));
        info!(session_id = %session.session_id, state = session.state.name(), "voice flow created");
        Self {
            logic,
            session,
            ctx,
            speaker,
            observer: None,
            completed: None,
        }
    }

    /// Send [`FlowEvent`]s to `observer`.
    pub fn with_observer(mut self, observer: mpsc::UnboundedSender<FlowEvent>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn state(&self) -> L::State {
        self.session.state
    }

    pub fn session(&self) -> &VoiceSession<L::State, L::Payload> {
        &self.session
    }

    pub fn context(&self) -> &FlowContext {
        &self.ctx
    }

    pub fn audio_enabled(&self) -> bool {
        self.speaker.audio_enabled()
    }

    /// Task id of a successful commit.
    pub fn completed_task(&self) -> Option<&TaskId> {
        self.completed.as_ref()
    }

    /// Speak the opening prompt.
    pub async fn begin(&mut self) {
        let prompt = self.logic.opening_prompt();
        self.say(prompt).await;
    }

    /// Re-speak the last prompt, e.g. when the user asks to hear it again.
    pub async fn repeat_prompt(&mut self) {
        if let Some(prompt) = self.session.last_prompt.clone() {
            self.say(prompt).await;
        }
    }

    /// Feed one transcript through the machine.
    pub async fn handle(&mut self, transcript: Transcript) -> Handled {
        let session_id = self.session.session_id;
        if let Some(last) = self.session.last_seq {
            if transcript.seq <= last {
                debug!(%session_id, seq = transcript.seq, last, "stale transcript ignored");
                return Handled::Ignored;
            }
        }
        self.session.last_seq = Some(transcript.seq);

        let state = self.session.state;
        if state.is_terminal() || state == L::State::committing() {
            debug!(%session_id, seq = transcript.seq, state = state.name(), "transcript discarded");
            return Handled::Ignored;
        }

        let Transcript { text, is_final, seq, .. } = transcript;
        self.session.transcript_buffer = text.clone();
        self.notify(FlowEvent::TranscriptUpdated {
            text: text.clone(),
            is_final,
        });
        if !is_final {
            return Handled::Buffered;
        }
        let text = text.trim();
        if text.is_empty() {
            return Handled::Ignored;
        }

        debug!(%session_id, seq, state = state.name(), "final transcript");
        let step = self.logic.on_final(&mut self.session, text, &self.ctx).await;
        self.session.transcript_buffer.clear();
        self.apply(step).await;

        if self.session.state == L::State::committing() {
            self.commit().await;
            return Handled::Committed;
        }
        Handled::Processed
    }

    /// Run against a capture session until the flow succeeds, `cancel` fires,
    /// or capture is lost. Capture and playback are stopped on every exit.
    pub async fn run(
        &mut self,
        capture: &mut SpeechCaptureSession,
        events: &mut mpsc::UnboundedReceiver<CaptureEvent>,
        cancel: CancellationToken,
    ) -> FlowExit {
        if let Err(e) = capture.start() {
            warn!(error = %e, "voice flow cannot listen");
            self.notify(FlowEvent::CaptureIssue(e));
            self.close(Some(capture));
            return FlowExit::CaptureUnavailable;
        }

        let exit = 'flow: {
            if self.session.last_prompt.is_none() {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break 'flow FlowExit::Cancelled,
                    _ = self.begin() => {}
                }
            }

            loop {
                let event = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break 'flow FlowExit::Cancelled,
                    event = events.recv() => event,
                };
                match event {
                    None | Some(CaptureEvent::Ended) => break 'flow FlowExit::CaptureClosed,
                    Some(CaptureEvent::Error(e)) => self.notify(FlowEvent::CaptureIssue(e)),
                    Some(CaptureEvent::Transcript(transcript)) => {
                        let handled = tokio::select! {
                            biased;
                            _ = cancel.cancelled() => break 'flow FlowExit::Cancelled,
                            handled = self.handle(transcript) => handled,
                        };
                        if handled == Handled::Committed && self.drain(events) {
                            break 'flow FlowExit::CaptureClosed;
                        }
                    }
                }
                if let Some(task_id) = self.completed.clone() {
                    break 'flow FlowExit::Completed { task_id };
                }
            }
        };

        self.close(Some(capture));
        info!(session_id = %self.session.session_id, ?exit, "voice flow finished");
        exit
    }

    /// Stop playback and, when given, capture.
    pub fn close(&mut self, capture: Option<&mut SpeechCaptureSession>) {
        if let Some(capture) = capture {
            capture.stop();
        }
        self.speaker.stop();
    }

    /// Discard whatever was captured while the commit ran. True if capture ended.
    fn drain(&mut self, events: &mut mpsc::UnboundedReceiver<CaptureEvent>) -> bool {
        while let Ok(event) = events.try_recv() {
            match event {
                CaptureEvent::Transcript(t) => {
                    debug!(seq = t.seq, "transcript captured during commit discarded");
                    let last = self.session.last_seq.unwrap_or(0);
                    self.session.last_seq = Some(last.max(t.seq));
                }
                CaptureEvent::Error(e) => self.notify(FlowEvent::CaptureIssue(e)),
                CaptureEvent::Ended => return true,
            }
        }
        false
    }

    async fn apply(&mut self, step: Step<L::State>) {
        self.transition(step.next);
        if let Some(signal) = step.signal {
            self.ctx.bus.publish(signal);
        }
        if let Some(prompt) = step.prompt {
            self.say(prompt).await;
        }
    }

    async fn commit(&mut self) {
        let session_id = self.session.session_id;
        info!(%session_id, "committing");
        match self.logic.commit(&mut self.session, &self.ctx).await {
            Commit::Done {
                task_id,
                prompt,
                signal,
            } => {
                info!(%session_id, %task_id, "commit succeeded");
                self.transition(L::State::success());
                self.completed = Some(task_id);
                self.ctx.bus.publish(signal);
                self.say(prompt).await;
            }
            Commit::Failed { prompt, settle } => {
                warn!(%session_id, prompt = ?prompt.id, "commit failed");
                self.transition(L::State::failed());
                self.say(prompt).await;
                self.transition(settle);
            }
        }
    }

    fn transition(&mut self, next: L::State) {
        let from = self.session.state;
        if from == next {
            return;
        }
        self.session.state = next;
        info!(session_id = %self.session.session_id, from = from.name(), to = next.name(), "state changed");
        self.notify(FlowEvent::StateChanged {
            from: from.name(),
            to: next.name(),
        });
    }

    async fn say(&mut self, prompt: Prompt) {
        self.notify(FlowEvent::Prompted {
            id: prompt.id,
            text: prompt.text.clone(),
        });
        let outcome = self.speaker.say(&prompt.text).await;
        self.session.last_prompt = Some(prompt);
        if let SpeakOutcome::AudioDisabled(e) = outcome {
            self.notify(FlowEvent::AudioDisabled {
                reason: e.to_string(),
            });
        }
    }

    fn notify(&self, event: FlowEvent) {
        if let Some(observer) = &self.observer {
            let _ = observer.send(event);
        }
    }
}

impl<L: FlowLogic> Drop for FlowMachine<L> {
    fn drop(&mut self) {
        self.speaker.stop();
    }
}
