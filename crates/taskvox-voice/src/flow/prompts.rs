//! Spoken prompt text for both flows.

use super::{Prompt, PromptId};
use taskvox_core::{TaskDraft, TaskSummary};

fn prompt(id: PromptId, text: impl Into<String>) -> Prompt {
    Prompt {
        id,
        text: text.into(),
    }
}

pub(crate) fn money(amount: f64) -> String {
    if amount.fract() == 0.0 {
        format!("${amount:.0}")
    } else {
        format!("${amount:.2}")
    }
}

// ---- create ----------------------------------------------------------------

pub(crate) fn describe_task() -> Prompt {
    prompt(
        PromptId::DescribeTask,
        "What do you need done? Tell me the task, where it is, how long it takes and what you'll pay.",
    )
}

pub(crate) fn need_title() -> Prompt {
    prompt(
        PromptId::NeedTitle,
        "Sorry, I didn't catch what the task is. Please describe it again.",
    )
}

pub(crate) fn confirm_draft(draft: &TaskDraft) -> Prompt {
    let mut text = format!("Here's your task: {}.", draft.title.trim());
    text.push_str(&format!(" Category: {}.", draft.category.spoken()));
    text.push_str(&format!(" Price: {}.", money(draft.price)));
    if !draft.estimated_time.is_empty() {
        text.push_str(&format!(" Time: {}.", draft.estimated_time));
    }
    if !draft.location.is_empty() {
        text.push_str(&format!(" Location: {}.", draft.location));
    }
    text.push_str(" Should I post it?");
    prompt(PromptId::ConfirmDraft, text)
}

pub(crate) fn draft_kept() -> Prompt {
    prompt(
        PromptId::DraftKept,
        "Okay, I kept what you said. Describe the task again when you're ready.",
    )
}

pub(crate) fn created(draft: &TaskDraft) -> Prompt {
    prompt(
        PromptId::Created,
        format!("Done. Your task \"{}\" is posted.", draft.title.trim()),
    )
}

pub(crate) fn create_failed() -> Prompt {
    prompt(
        PromptId::CreateFailed,
        "Sorry, I couldn't post your task right now. Say it again to retry.",
    )
}

// ---- accept ----------------------------------------------------------------

pub(crate) fn ask_query() -> Prompt {
    prompt(
        PromptId::AskQuery,
        "What kind of task are you looking for? For example coffee, printing or dog walking.",
    )
}

pub(crate) fn no_matches() -> Prompt {
    prompt(
        PromptId::NoMatches,
        "I couldn't find any open tasks matching that. Try different words.",
    )
}

pub(crate) fn search_failed() -> Prompt {
    prompt(
        PromptId::SearchFailed,
        "Sorry, I couldn't load tasks right now. Please try your search again.",
    )
}

fn candidate_text(task: &TaskSummary, position: usize, total: usize) -> String {
    let mut text = format!(
        "Match {} of {}: {}, for {}",
        position + 1,
        total,
        task.title,
        money(task.price)
    );
    if !task.location.is_empty() {
        text.push_str(&format!(", at {}", task.location));
    }
    if let Some(km) = task.distance_from_user {
        text.push_str(&format!(", {km:.1} kilometres away"));
    }
    text.push_str(". Say yes to take it, next for another, or search for something else.");
    text
}

pub(crate) fn candidate(task: &TaskSummary, position: usize, total: usize) -> Prompt {
    prompt(PromptId::Candidate, candidate_text(task, position, total))
}

pub(crate) fn last_candidate() -> Prompt {
    prompt(
        PromptId::LastCandidate,
        "That was the last match. Say yes to take it, or search for something else.",
    )
}

pub(crate) fn confirm_accept(task: &TaskSummary) -> Prompt {
    prompt(
        PromptId::ConfirmAccept,
        format!(
            "Accept \"{}\" for {}? Say yes to confirm or no to keep browsing.",
            task.title,
            money(task.price)
        ),
    )
}

pub(crate) fn accepted(task: &TaskSummary) -> Prompt {
    prompt(
        PromptId::Accepted,
        format!("Done. \"{}\" is yours.", task.title),
    )
}

/// Conflict lead-in followed by what happens next.
pub(crate) fn conflict(id: PromptId, next: Option<(&TaskSummary, usize, usize)>) -> Prompt {
    let lead = match id {
        PromptId::SelfAccept => "That's your own task, so you can't accept it.",
        _ => "Sorry, someone else just took that task.",
    };
    let tail = match next {
        Some((task, position, total)) => candidate_text(task, position, total),
        None => "There are no other matches. What else are you looking for?".to_string(),
    };
    prompt(id, format!("{lead} {tail}"))
}

pub(crate) fn accept_failed(current: &TaskSummary, position: usize, total: usize) -> Prompt {
    prompt(
        PromptId::AcceptFailed,
        format!(
            "Sorry, I couldn't accept that task right now. {}",
            candidate_text(current, position, total)
        ),
    )
}
