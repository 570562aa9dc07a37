//! Error types for the task store and draft validation

use crate::task::{TaskId, UserId};
use thiserror::Error;

/// Result type alias for repository operations
pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Errors surfaced by a [`crate::TaskRepository`].
///
/// `SelfAccept` and `AlreadyTaken` are user-facing outcomes of the accept
/// transaction, not backend faults; callers give them distinct messages.
#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("user {user} created task {task} and cannot accept it")]
    SelfAccept { task: TaskId, user: UserId },

    #[error("task {0} is no longer open")]
    AlreadyTaken(TaskId),

    #[error("task {0} not found")]
    NotFound(TaskId),

    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("repository backend error: {0}")]
    Backend(String),
}

impl RepositoryError {
    /// True for the two outcomes after which the failing task must not be offered again.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::SelfAccept { .. } | Self::AlreadyTaken(_))
    }
}

/// A draft that cannot be turned into a task yet.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DraftError {
    #[error("the task has no title yet")]
    MissingTitle,
}
