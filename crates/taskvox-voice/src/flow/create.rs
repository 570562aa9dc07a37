use super::{prompts, Commit, FlowContext, FlowLogic, FlowState, Prompt, Step, VoiceSession};
use crate::bus::FlowSignal;
use crate::extract::{apply_correction, classify_intent, extract_draft, Intent};
use taskvox_core::TaskDraft;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateState {
    Listening,
    Confirming,
    Committing,
    Success,
    Failed,
}

impl FlowState for CreateState {
    fn initial() -> Self {
        Self::Listening
    }
    fn committing() -> Self {
        Self::Committing
    }
    fn success() -> Self {
        Self::Success
    }
    fn failed() -> Self {
        Self::Failed
    }
    fn name(&self) -> &'static str {
        match self {
            Self::Listening => "listening",
            Self::Confirming => "confirming",
            Self::Committing => "committing",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

/// Describe a task by voice, confirm it, post it.
#[derive(Debug, Default)]
pub struct CreateTaskFlow;

#[async_trait::async_trait]
impl FlowLogic for CreateTaskFlow {
    type State = CreateState;
    type Payload = TaskDraft;

    fn new_payload(&self, ctx: &FlowContext) -> TaskDraft {
        TaskDraft::with_price(ctx.default_price)
    }

    fn opening_prompt(&self) -> Prompt {
        prompts::describe_task()
    }

    async fn on_final(
        &self,
        session: &mut VoiceSession<CreateState, TaskDraft>,
        text: &str,
        ctx: &FlowContext,
    ) -> Step<CreateState> {
        let draft = &mut session.payload;
        match session.state {
            CreateState::Listening => {
                extract_draft(text, draft);
                if draft.location_coords.is_none() {
                    draft.location_coords = ctx.user_location;
                }
                if !draft.has_title() {
                    return Step::say(CreateState::Listening, prompts::need_title());
                }
                debug!(title = %draft.title, price = draft.price, category = %draft.category, "draft updated");
                Step::say(CreateState::Confirming, prompts::confirm_draft(draft))
            }
            CreateState::Confirming => match classify_intent(text) {
                Intent::Affirmative => Step::to(CreateState::Committing),
                Intent::Negative => Step::say(CreateState::Listening, prompts::draft_kept()),
                _ => {
                    apply_correction(text, draft);
                    Step::say(CreateState::Confirming, prompts::confirm_draft(draft))
                }
            },
            state => Step::to(state),
        }
    }

    async fn commit(
        &self,
        session: &mut VoiceSession<CreateState, TaskDraft>,
        ctx: &FlowContext,
    ) -> Commit<CreateState> {
        let task = match session.payload.finalize() {
            Ok(task) => task,
            Err(e) => {
                debug!(error = %e, "draft not ready");
                return Commit::Failed {
                    prompt: prompts::need_title(),
                    settle: CreateState::Listening,
                };
            }
        };
        match ctx.repository.create_task(task, &ctx.user_id).await {
            Ok(task_id) => Commit::Done {
                prompt: prompts::created(&session.payload),
                signal: FlowSignal::OpenCreatedTask {
                    task_id: task_id.clone(),
                },
                task_id,
            },
            Err(e) => {
                warn!(error = %e, user = %ctx.user_id, "create_task failed");
                Commit::Failed {
                    prompt: prompts::create_failed(),
                    settle: CreateState::Listening,
                }
            }
        }
    }
}
