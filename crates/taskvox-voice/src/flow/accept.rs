use super::{prompts, Commit, FlowContext, FlowLogic, FlowState, Prompt, PromptId, Step, VoiceSession};
use crate::bus::FlowSignal;
use crate::extract::{classify_intent, search_keywords, task_matches, Intent};
use taskvox_core::{rank_by_distance, within_radius, RepositoryError, RepositoryResult, TaskSummary};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptState {
    Searching,
    Browsing,
    Confirming,
    Committing,
    Success,
    Failed,
}

impl FlowState for AcceptState {
    fn initial() -> Self {
        Self::Searching
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
            Self::Searching => "searching",
            Self::Browsing => "browsing",
            Self::Confirming => "confirming",
            Self::Committing => "committing",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

/// Search results being browsed, and the candidate picked for acceptance.
#[derive(Debug, Clone, Default)]
pub struct Browse {
    pub keywords: Vec<String>,
    pub candidates: Vec<TaskSummary>,
    pub cursor: usize,
    pub selected: Option<TaskSummary>,
}

impl Browse {
    pub fn current(&self) -> Option<&TaskSummary> {
        self.candidates.get(self.cursor)
    }

    fn describe_current(&self) -> Option<Prompt> {
        self.current()
            .map(|task| prompts::candidate(task, self.cursor, self.candidates.len()))
    }

    fn reset(&mut self, candidates: Vec<TaskSummary>) {
        self.candidates = candidates;
        self.cursor = 0;
        self.selected = None;
    }
}

/// Search open tasks by voice, pick one, accept it.
#[derive(Debug, Default)]
pub struct AcceptTaskFlow;

impl AcceptTaskFlow {
    /// Open tasks not owned by the user that match `keywords`, nearest first.
    async fn fetch_candidates(
        keywords: &[String],
        ctx: &FlowContext,
    ) -> RepositoryResult<Vec<TaskSummary>> {
        let open = ctx.repository.list_open_tasks(&ctx.user_id).await?;
        let mut matches: Vec<TaskSummary> = open
            .into_iter()
            .filter(|t| t.status.is_open() && t.creator_id != ctx.user_id)
            .filter(|t| task_matches(t, keywords))
            .collect();
        if let Some(max_km) = ctx.max_search_distance_km {
            matches = within_radius(matches, ctx.user_location, max_km);
        }
        rank_by_distance(&mut matches, ctx.user_location);
        Ok(matches)
    }

    async fn search(&self, browse: &mut Browse, query: &str, ctx: &FlowContext) -> Step<AcceptState> {
        let keywords = search_keywords(query);
        if keywords.is_empty() {
            browse.reset(Vec::new());
            return Step::say(AcceptState::Searching, prompts::ask_query());
        }

        match Self::fetch_candidates(&keywords, ctx).await {
            Ok(candidates) => {
                info!(keywords = ?keywords, matches = candidates.len(), "task search");
                browse.keywords = keywords;
                browse.reset(candidates);
                match browse.describe_current() {
                    Some(prompt) => Step::say(AcceptState::Browsing, prompt),
                    None => Step::say(AcceptState::Searching, prompts::no_matches()),
                }
            }
            Err(e) => {
                warn!(error = %e, "task search failed");
                browse.reset(Vec::new());
                Step::say(AcceptState::Searching, prompts::search_failed())
            }
        }
    }

    fn advance(browse: &mut Browse) -> Step<AcceptState> {
        if browse.cursor + 1 < browse.candidates.len() {
            browse.cursor += 1;
            if let Some(prompt) = browse.describe_current() {
                return Step::say(AcceptState::Browsing, prompt);
            }
        }
        Step::say(AcceptState::Browsing, prompts::last_candidate())
    }

    /// After SelfAccept / AlreadyTaken: re-fetch with the same keywords and drop the failed task.
    async fn after_conflict(
        browse: &mut Browse,
        failed: &TaskSummary,
        id: PromptId,
        ctx: &FlowContext,
    ) -> Commit<AcceptState> {
        let refreshed = match Self::fetch_candidates(&browse.keywords, ctx).await {
            Ok(list) => list,
            Err(e) => {
                warn!(error = %e, "candidate refresh failed; pruning locally");
                std::mem::take(&mut browse.candidates)
            }
        };
        let remaining: Vec<TaskSummary> = refreshed
            .into_iter()
            .filter(|t| t.id != failed.id)
            .collect();
        browse.reset(remaining);

        let total = browse.candidates.len();
        let next = browse.current().map(|task| (task, 0, total));
        let settle = if next.is_some() {
            AcceptState::Browsing
        } else {
            AcceptState::Searching
        };
        Commit::Failed {
            prompt: prompts::conflict(id, next),
            settle,
        }
    }
}

#[async_trait::async_trait]
impl FlowLogic for AcceptTaskFlow {
    type State = AcceptState;
    type Payload = Browse;

    fn new_payload(&self, _ctx: &FlowContext) -> Browse {
        Browse::default()
    }

    fn opening_prompt(&self) -> Prompt {
        prompts::ask_query()
    }

    async fn on_final(
        &self,
        session: &mut VoiceSession<AcceptState, Browse>,
        text: &str,
        ctx: &FlowContext,
    ) -> Step<AcceptState> {
        let browse = &mut session.payload;
        match session.state {
            AcceptState::Searching => self.search(browse, text, ctx).await,
            AcceptState::Browsing => match classify_intent(text) {
                Intent::Affirmative => match browse.current().cloned() {
                    Some(task) => {
                        let prompt = prompts::confirm_accept(&task);
                        browse.selected = Some(task);
                        Step::say(AcceptState::Confirming, prompt)
                    }
                    None => Step::say(AcceptState::Searching, prompts::ask_query()),
                },
                Intent::Advance | Intent::Negative => Self::advance(browse),
                Intent::Restart => {
                    browse.reset(Vec::new());
                    Step::say(AcceptState::Searching, prompts::ask_query())
                }
                Intent::Unrecognized => {
                    debug!("browsing input treated as a new search");
                    self.search(browse, text, ctx).await
                }
            },
            AcceptState::Confirming => match classify_intent(text) {
                Intent::Affirmative if browse.selected.is_some() => Step::to(AcceptState::Committing),
                Intent::Negative => {
                    browse.selected = None;
                    match browse.describe_current() {
                        Some(prompt) => Step::say(AcceptState::Browsing, prompt),
                        None => Step::say(AcceptState::Searching, prompts::ask_query()),
                    }
                }
                _ => match browse.selected.as_ref() {
                    Some(task) => Step::say(AcceptState::Confirming, prompts::confirm_accept(task)),
                    None => Step::say(AcceptState::Searching, prompts::ask_query()),
                },
            },
            state => Step::to(state),
        }
    }

    async fn commit(
        &self,
        session: &mut VoiceSession<AcceptState, Browse>,
        ctx: &FlowContext,
    ) -> Commit<AcceptState> {
        let browse = &mut session.payload;
        let Some(task) = browse.selected.take() else {
            return Commit::Failed {
                prompt: prompts::ask_query(),
                settle: AcceptState::Searching,
            };
        };

        match ctx.repository.accept_task(&task.id, &ctx.user_id).await {
            Ok(()) => Commit::Done {
                task_id: task.id.clone(),
                prompt: prompts::accepted(&task),
                signal: FlowSignal::TaskAccepted {
                    task_id: task.id.clone(),
                },
            },
            Err(RepositoryError::SelfAccept { .. }) => {
                info!(task_id = %task.id, "own task cannot be accepted");
                Self::after_conflict(browse, &task, PromptId::SelfAccept, ctx).await
            }
            Err(RepositoryError::AlreadyTaken(_)) => {
                info!(task_id = %task.id, "task already taken");
                Self::after_conflict(browse, &task, PromptId::AlreadyTaken, ctx).await
            }
            Err(e) => {
                warn!(error = %e, task_id = %task.id, "accept_task failed");
                let total = browse.candidates.len().max(1);
                let position = browse.cursor.min(total - 1);
                Commit::Failed {
                    prompt: prompts::accept_failed(&task, position, total),
                    settle: AcceptState::Browsing,
                }
            }
        }
    }
}
