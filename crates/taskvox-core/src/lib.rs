//! taskvox-core: shared task types, distance ranking, and the task store.
//!
//! The voice engine in `taskvox-voice` consumes everything here through the
//! [`TaskRepository`] trait; [`SledTaskStore`] is the bundled implementation, with
//! a single multi-tree transaction guarding task acceptance.

mod config;
mod error;
pub mod geo;
mod store;
mod task;

pub use config::{EngineConfig, SpeechConfig};
pub use error::{DraftError, RepositoryError, RepositoryResult};
pub use geo::{distance_km, rank_by_distance, within_radius, Coordinate, Located, EARTH_RADIUS_KM};
pub use store::{SledTaskStore, TaskRepository, PROGRESS_TREE, TASKS_TREE};
pub use task::{
    Category, NewTask, ProgressEvent, ProgressRecord, TaskDraft, TaskId, TaskStatus, TaskSummary,
    UserId, DEFAULT_DRAFT_PRICE,
};
