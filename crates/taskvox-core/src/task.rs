//! Task domain types: drafts built from speech, persisted summaries, and audit records.

use crate::error::DraftError;
use crate::geo::{Coordinate, Located};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Price a fresh draft starts with when the user never names one.
pub const DEFAULT_DRAFT_PRICE: f64 = 10.0;

/// Server-assigned task identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Fresh random id (UUID v4).
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Authenticated user identifier, as handed to the engine by the host.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Task category. Serialized snake_case; the same string feeds keyword search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    CoffeeRun,
    Delivery,
    AcademicHelp,
    PetCare,
    Transportation,
    #[default]
    Other,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CoffeeRun => "coffee_run",
            Self::Delivery => "delivery",
            Self::AcademicHelp => "academic_help",
            Self::PetCare => "pet_care",
            Self::Transportation => "transportation",
            Self::Other => "other",
        }
    }

    /// Words used when the category is read aloud.
    pub fn spoken(&self) -> &'static str {
        match self {
            Self::CoffeeRun => "coffee run",
            Self::Delivery => "delivery",
            Self::AcademicHelp => "academic help",
            Self::PetCare => "pet care",
            Self::Transportation => "transportation",
            Self::Other => "general task",
        }
    }

    pub fn all() -> [Self; 6] {
        [
            Self::CoffeeRun,
            Self::Delivery,
            Self::AcademicHelp,
            Self::PetCare,
            Self::Transportation,
            Self::Other,
        ]
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a persisted task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Open,
    Accepted,
    Completed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }
}

/// In-progress task description assembled from one or more utterances.
///
/// Fields are only overwritten when the extractor finds something; anything
/// left untouched keeps its default (notably `price`, see [`DEFAULT_DRAFT_PRICE`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDraft {
    pub title: String,
    pub description: String,
    pub category: Category,
    pub estimated_time: String,
    pub price: f64,
    pub location: String,
    pub location_coords: Option<Coordinate>,
}

impl Default for TaskDraft {
    fn default() -> Self {
        Self::with_price(DEFAULT_DRAFT_PRICE)
    }
}

impl TaskDraft {
    /// Empty draft starting at the given price (negative values clamp to zero).
    pub fn with_price(price: f64) -> Self {
        Self {
            title: String::new(),
            description: String::new(),
            category: Category::Other,
            estimated_time: String::new(),
            price: price.max(0.0),
            location: String::new(),
            location_coords: None,
        }
    }

    /// True once a title has been captured.
    pub fn has_title(&self) -> bool {
        !self.title.trim().is_empty()
    }

    /// Validate and freeze the draft for `create_task`.
    pub fn finalize(&self) -> Result<NewTask, DraftError> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err(DraftError::MissingTitle);
        }
        let description = match self.description.trim() {
            "" => title.to_string(),
            d => d.to_string(),
        };
        Ok(NewTask {
            title: title.to_string(),
            description,
            category: self.category,
            estimated_time: self.estimated_time.trim().to_string(),
            price: self.price.max(0.0),
            location: self.location.trim().to_string(),
            location_coords: self.location_coords,
        })
    }
}

/// A confirmed draft ready for insertion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTask {
    pub title: String,
    pub description: String,
    pub category: Category,
    pub estimated_time: String,
    pub price: f64,
    pub location: String,
    pub location_coords: Option<Coordinate>,
}

/// Read-only projection of a persisted task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSummary {
    pub id: TaskId,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub category: Category,
    pub price: f64,
    #[serde(default)]
    pub estimated_time: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub location_coords: Option<Coordinate>,
    pub creator_id: UserId,
    pub status: TaskStatus,
    #[serde(default)]
    pub accepted_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    /// Kilometres from the searching user; filled in by the ranker, never stored.
    #[serde(skip)]
    pub distance_from_user: Option<f64>,
}

impl TaskSummary {
    /// Build the stored form of a newly created task.
    pub fn from_new(id: TaskId, task: NewTask, creator_id: UserId) -> Self {
        Self {
            id,
            title: task.title,
            description: task.description,
            category: task.category,
            price: task.price,
            estimated_time: task.estimated_time,
            location: task.location,
            location_coords: task.location_coords,
            creator_id,
            status: TaskStatus::Open,
            accepted_by: None,
            created_at: Utc::now(),
            distance_from_user: None,
        }
    }

    /// Lowercased title + description + category + location, used by keyword search.
    pub fn searchable_text(&self) -> String {
        format!(
            "{} {} {} {}",
            self.title, self.description, self.category, self.location
        )
        .to_lowercase()
    }
}

impl Located for TaskSummary {
    fn coords(&self) -> Option<Coordinate> {
        self.location_coords
    }

    fn set_distance(&mut self, km: Option<f64>) {
        self.distance_from_user = km;
    }

    fn distance(&self) -> Option<f64> {
        self.distance_from_user
    }
}

/// What happened to a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressEvent {
    Created,
    Accepted,
}

/// Audit entry appended by the store alongside every state change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub task_id: TaskId,
    pub actor_id: UserId,
    pub event: ProgressEvent,
    pub at: DateTime<Utc>,
}

impl ProgressRecord {
    pub fn now(task_id: TaskId, actor_id: UserId, event: ProgressEvent) -> Self {
        Self {
            task_id,
            actor_id,
            event,
            at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_draft_keeps_lenient_price() {
        let draft = TaskDraft::default();
        assert_eq!(draft.price, DEFAULT_DRAFT_PRICE);
        assert_eq!(draft.category, Category::Other);
        assert!(!draft.has_title());
    }

    #[test]
    fn finalize_requires_title() {
        let draft = TaskDraft::default();
        assert_eq!(draft.finalize(), Err(DraftError::MissingTitle));
    }

    #[test]
    fn finalize_falls_back_to_title_for_description() {
        let draft = TaskDraft {
            title: "  Walk my dog ".to_string(),
            ..TaskDraft::default()
        };
        let task = draft.finalize().unwrap();
        assert_eq!(task.title, "Walk my dog");
        assert_eq!(task.description, "Walk my dog");
    }

    #[test]
    fn category_serializes_snake_case() {
        let json = serde_json::to_string(&Category::CoffeeRun).unwrap();
        assert_eq!(json, "\"coffee_run\"");
        let back: Category = serde_json::from_str("\"pet_care\"").unwrap();
        assert_eq!(back, Category::PetCare);
    }

    #[test]
    fn searchable_text_includes_category_and_location() {
        let draft = TaskDraft {
            title: "Grab a latte".to_string(),
            location: "Marston Library".to_string(),
            category: Category::CoffeeRun,
            ..TaskDraft::default()
        };
        let summary = TaskSummary::from_new(
            TaskId::from("t1"),
            draft.finalize().unwrap(),
            UserId::from("u1"),
        );
        let text = summary.searchable_text();
        assert!(text.contains("coffee_run"));
        assert!(text.contains("marston library"));
        assert!(text.contains("grab a latte"));
    }

    #[test]
    fn distance_is_not_persisted() {
        let mut summary = TaskSummary::from_new(
            TaskId::from("t1"),
            TaskDraft {
                title: "x".into(),
                ..TaskDraft::default()
            }
            .finalize()
            .unwrap(),
            UserId::from("u1"),
        );
        summary.distance_from_user = Some(3.2);
        let json = serde_json::to_string(&summary).unwrap();
        let back: TaskSummary = serde_json::from_str(&json).unwrap();
        assert_eq!(back.distance_from_user, None);
    }
}
