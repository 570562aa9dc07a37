//! Task repository contract and the sled-backed store.
//!
//! Two trees: `tasks` (task id -> JSON [`TaskSummary`]) and `task_progress`
//! (`{task_id}/{nanos}-{uuid}` -> JSON [`ProgressRecord`]). Acceptance runs as a
//! single transaction over both trees, so concurrent acceptors of one task cannot
//! both succeed.

use crate::error::{RepositoryError, RepositoryResult};
use crate::task::{NewTask, ProgressEvent, ProgressRecord, TaskId, TaskSummary, UserId};
use sled::transaction::{ConflictableTransactionError, TransactionError, TransactionalTree};
use sled::{Db, Transactional, Tree};
use std::path::Path;
use tracing::{debug, info};
use uuid::Uuid;

/// Tree holding task records.
pub const TASKS_TREE: &str = "tasks";

/// Tree holding the append-only progress log.
pub const PROGRESS_TREE: &str = "task_progress";

/// Backend contract consumed by the voice flows.
#[async_trait::async_trait]
pub trait TaskRepository: Send + Sync {
    /// Open tasks, excluding those created by `exclude_owner`.
    async fn list_open_tasks(&self, exclude_owner: &UserId) -> RepositoryResult<Vec<TaskSummary>>;

    /// Fetch one task by id.
    async fn get_task(&self, id: &TaskId) -> RepositoryResult<TaskSummary>;

    /// Insert a confirmed draft; the store assigns the id and sets status `open`.
    async fn create_task(&self, task: NewTask, owner: &UserId) -> RepositoryResult<TaskId>;

    /// Atomically accept an open task on behalf of `user`.
    async fn accept_task(&self, id: &TaskId, user: &UserId) -> RepositoryResult<()>;
}

/// Sled-backed [`TaskRepository`].
#[derive(Clone)]
pub struct SledTaskStore {
    db: Db,
    tasks: Tree,
    progress: Tree,
}

impl SledTaskStore {
    /// Open (or create) the store at `path`.
    pub fn open(path: impl AsRef<Path>) -> RepositoryResult<Self> {
        let db = sled::open(path.as_ref())?;
        info!(path = %path.as_ref().display(), "task store opened");
        Self::from_db(db)
    }

    /// In-memory store that disappears on drop.
    pub fn temporary() -> RepositoryResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> RepositoryResult<Self> {
        let tasks = db.open_tree(TASKS_TREE)?;
        let progress = db.open_tree(PROGRESS_TREE)?;
        Ok(Self { db, tasks, progress })
    }

    /// Flush pending writes to disk.
    pub fn flush(&self) -> RepositoryResult<()> {
        self.db.flush()?;
        Ok(())
    }

    /// Progress records for one task, oldest first.
    pub fn progress(&self, id: &TaskId) -> RepositoryResult<Vec<ProgressRecord>> {
        let prefix = format!("{}/", id);
        let mut records = Vec::new();
        for entry in self.progress.scan_prefix(prefix.as_bytes()) {
            let (_, value) = entry?;
            records.push(serde_json::from_slice::<ProgressRecord>(&value)?);
        }
        records.sort_by_key(|r| r.at);
        Ok(records)
    }

    /// Number of stored tasks, any status.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    fn progress_key(record: &ProgressRecord) -> String {
        format!(
            "{}/{:020}-{}",
            record.task_id,
            record.at.timestamp_nanos_opt().unwrap_or_default(),
            Uuid::new_v4()
        )
    }

    fn accept_in_tx(
        tasks: &TransactionalTree,
        progress: &TransactionalTree,
        id: &TaskId,
        user: &UserId,
    ) -> Result<(), ConflictableTransactionError<RepositoryError>> {
        let raw = tasks
            .get(id.as_str().as_bytes())?
            .ok_or_else(|| ConflictableTransactionError::Abort(RepositoryError::NotFound(id.clone())))?;
        let mut task: TaskSummary = serde_json::from_slice(&raw)
            .map_err(|e| ConflictableTransactionError::Abort(RepositoryError::Codec(e)))?;

        if &task.creator_id == user {
            return Err(ConflictableTransactionError::Abort(RepositoryError::SelfAccept {
                task: id.clone(),
                user: user.clone(),
            }));
        }
        if !task.status.is_open() {
            return Err(ConflictableTransactionError::Abort(RepositoryError::AlreadyTaken(
                id.clone(),
            )));
        }

        task.status = crate::task::TaskStatus::Accepted;
        task.accepted_by = Some(user.clone());
        let bytes = serde_json::to_vec(&task)
            .map_err(|e| ConflictableTransactionError::Abort(RepositoryError::Codec(e)))?;
        tasks.insert(id.as_str().as_bytes(), bytes)?;

        let record = ProgressRecord::now(id.clone(), user.clone(), ProgressEvent::Accepted);
        let record_bytes = serde_json::to_vec(&record)
            .map_err(|e| ConflictableTransactionError::Abort(RepositoryError::Codec(e)))?;
        progress.insert(Self::progress_key(&record).as_bytes(), record_bytes)?;
        Ok(())
    }
}

impl SledTaskStore {
    /// Run a sled operation on the blocking pool against a clone of this store.
    async fn blocking<T, F>(&self, op: F) -> RepositoryResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&SledTaskStore) -> RepositoryResult<T> + Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || op(&store))
            .await
            .map_err(|e| RepositoryError::Backend(format!("store worker failed: {e}")))?
    }

    fn list_open_sync(&self, exclude_owner: &UserId) -> RepositoryResult<Vec<TaskSummary>> {
        let mut open = Vec::new();
        for entry in self.tasks.iter() {
            let (_, value) = entry?;
            let task: TaskSummary = serde_json::from_slice(&value)?;
            if task.status.is_open() && &task.creator_id != exclude_owner {
                open.push(task);
            }
        }
        open.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(open)
    }

    fn get_sync(&self, id: &TaskId) -> RepositoryResult<TaskSummary> {
        let raw = self
            .tasks
            .get(id.as_str().as_bytes())?
            .ok_or_else(|| RepositoryError::NotFound(id.clone()))?;
        Ok(serde_json::from_slice(&raw)?)
    }

    fn create_sync(&self, task: NewTask, owner: &UserId) -> RepositoryResult<TaskSummary> {
        let id = TaskId::generate();
        let summary = TaskSummary::from_new(id.clone(), task, owner.clone());
        self.tasks
            .insert(id.as_str().as_bytes(), serde_json::to_vec(&summary)?)?;

        let record = ProgressRecord::now(id, owner.clone(), ProgressEvent::Created);
        self.progress
            .insert(Self::progress_key(&record).as_bytes(), serde_json::to_vec(&record)?)?;
        Ok(summary)
    }

    fn accept_sync(&self, id: &TaskId, user: &UserId) -> RepositoryResult<()> {
        (&self.tasks, &self.progress)
            .transaction(|(tasks, progress)| Self::accept_in_tx(tasks, progress, id, user))
            .map_err(|e| match e {
                TransactionError::Abort(e) => e,
                TransactionError::Storage(e) => RepositoryError::Storage(e),
            })
    }
}

#[async_trait::async_trait]
impl TaskRepository for SledTaskStore {
    async fn list_open_tasks(&self, exclude_owner: &UserId) -> RepositoryResult<Vec<TaskSummary>> {
        let exclude = exclude_owner.clone();
        let open = self.blocking(move |store| store.list_open_sync(&exclude)).await?;
        debug!(count = open.len(), exclude = %exclude_owner, "listed open tasks");
        Ok(open)
    }

    async fn get_task(&self, id: &TaskId) -> RepositoryResult<TaskSummary> {
        let id = id.clone();
        self.blocking(move |store| store.get_sync(&id)).await
    }

    async fn create_task(&self, task: NewTask, owner: &UserId) -> RepositoryResult<TaskId> {
        let creator = owner.clone();
        let summary = self.blocking(move |store| store.create_sync(task, &creator)).await?;
        info!(task_id = %summary.id, owner = %owner, title = %summary.title, "task created");
        Ok(summary.id)
    }

    async fn accept_task(&self, id: &TaskId, user: &UserId) -> RepositoryResult<()> {
        let (task_id, acceptor) = (id.clone(), user.clone());
        match self.blocking(move |store| store.accept_sync(&task_id, &acceptor)).await {
            Ok(()) => {
                info!(task_id = %id, user = %user, "task accepted");
                Ok(())
            }
            Err(e) => {
                debug!(task_id = %id, user = %user, error = %e, "accept rejected");
                Err(e)
            }
        }
    }
}
