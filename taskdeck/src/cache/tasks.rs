//! The caller's own tasks and the tasks shared with them.

use std::sync::Arc;

use taskdeck_proto::error::FieldError;
use taskdeck_proto::ids::TaskId;
use taskdeck_proto::task::{NewTask, SharedTask, Task, TaskStatus, TaskUpdate};

use super::{Applied, ResourceCache, Synced, require_token, settle};
use crate::api::{ApiClient, ApiError};
use crate::config::UpdateMethod;
use crate::session::SessionStore;

/// Counts of the caller's tasks by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskStats {
    /// Tasks not started.
    pub pending: usize,
    /// Tasks in progress.
    pub in_progress: usize,
    /// Tasks done.
    pub completed: usize,
}

impl TaskStats {
    /// Tallies `tasks`.
    #[must_use]
    pub fn from_tasks(tasks: &[Task]) -> Self {
        tasks.iter().fold(Self::default(), |mut stats, task| {
            match task.status {
                TaskStatus::Pending => stats.pending += 1,
                TaskStatus::InProgress => stats.in_progress += 1,
                TaskStatus::Completed => stats.completed += 1,
            }
            stats
        })
    }

    /// All tasks.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.pending + self.in_progress + self.completed
    }
}

/// Mirror of `GET /tasks/user`, with the task mutations.
pub struct TaskCache {
    api: Arc<ApiClient>,
    session: Arc<SessionStore>,
    tasks: ResourceCache<Task>,
}

impl TaskCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new(api: Arc<ApiClient>, session: Arc<SessionStore>) -> Self {
        Self {
            api,
            session,
            tasks: ResourceCache::new(),
        }
    }

    /// Current tasks.
    #[must_use]
    pub fn tasks(&self) -> Vec<Task> {
        self.tasks.items()
    }

    /// One task by id, if cached.
    #[must_use]
    pub fn get(&self, id: &TaskId) -> Option<Task> {
        self.tasks
            .with_items(|tasks| tasks.iter().find(|t| &t.id == id).cloned())
    }

    /// Status counts over the cached tasks.
    #[must_use]
    pub fn stats(&self) -> TaskStats {
        self.tasks.with_items(TaskStats::from_tasks)
    }

    /// Whether a refresh, create, update or delete is in flight.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.tasks.is_loading()
    }

    /// Drops every cached task.
    pub fn clear(&self) {
        self.tasks.clear();
    }

    /// Refetches the caller's tasks.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::NotAuthenticated`] without a session, or the
    /// fetch error. The cached tasks are unchanged on error.
    pub async fn refresh(&self) -> Result<(), ApiError> {
        let token = require_token(&self.session)?;
        let applied = self
            .tasks
            .refresh_with(self.api.list_own_tasks(&token))
            .await?;
        if applied == Applied::Replaced {
            tracing::debug!(count = self.tasks.with_items(<[Task]>::len), "tasks refreshed");
        }
        Ok(())
    }

    /// Creates a task, then refetches.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Validation`] before any request when a field is
    /// out of range, or the error of the create request.
    pub async fn create(&self, task: &NewTask) -> Result<Synced, ApiError> {
        task.validate()?;
        let token = require_token(&self.session)?;
        {
            let _busy = self.tasks.begin_mutation();
            self.api.create_task(&token, task).await?;
        }
        tracing::info!(title_chars = task.title.chars().count(), "task created");
        Ok(settle(self.refresh()).await)
    }

    /// Applies a partial update, then refetches.
    ///
    /// Unless updates are pinned to `PATCH`, the whole task is also
    /// prepared for a `PUT`, from the cache or a refresh when the task is
    /// not cached yet.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Validation`] before the update request when the
    /// update is empty, a field is out of range, or a `PUT` is needed for a
    /// task the server did not list; otherwise the error of the update
    /// request.
    pub async fn update(&self, id: &TaskId, update: &TaskUpdate) -> Result<Synced, ApiError> {
        update.validate()?;
        let token = require_token(&self.session)?;
        {
            let _busy = self.tasks.begin_mutation();
            let replacement = if self.api.update_method() == UpdateMethod::Patch {
                None
            } else {
                Some(update.applied_to(&self.current(id).await?))
            };
            self.api
                .update_task(&token, id, update, replacement.as_ref())
                .await?;
        }
        tracing::info!(task = %id, "task updated");
        Ok(settle(self.refresh()).await)
    }

    /// Changes only the status of a task, then refetches.
    ///
    /// # Errors
    ///
    /// As [`TaskCache::update`].
    pub async fn set_status(&self, id: &TaskId, status: TaskStatus) -> Result<Synced, ApiError> {
        self.update(id, &TaskUpdate::status(status)).await
    }

    /// Deletes a task, then refetches. The task stays visible until the
    /// server confirms the delete.
    ///
    /// # Errors
    ///
    /// Returns the error of the delete request.
    pub async fn delete(&self, id: &TaskId) -> Result<Synced, ApiError> {
        let token = require_token(&self.session)?;
        {
            let _busy = self.tasks.begin_mutation();
            self.api.delete_task(&token, id).await?;
        }
        tracing::info!(task = %id, "task deleted");
        Ok(settle(self.refresh()).await)
    }

    /// The cached task, refreshing once if it is not cached.
    async fn current(&self, id: &TaskId) -> Result<Task, ApiError> {
        if let Some(task) = self.get(id) {
            return Ok(task);
        }
        self.refresh().await?;
        self.get(id).ok_or_else(|| ApiError::Validation {
            status: None,
            fields: vec![FieldError::new("task", format!("Task {id} not found"))],
        })
    }
}

/// Read-only mirror of `GET /tasks/collaborative`.
pub struct SharedTaskCache {
    api: Arc<ApiClient>,
    session: Arc<SessionStore>,
    tasks: ResourceCache<SharedTask>,
}

impl SharedTaskCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new(api: Arc<ApiClient>, session: Arc<SessionStore>) -> Self {
        Self {
            api,
            session,
            tasks: ResourceCache::new(),
        }
    }

    /// Tasks shared with the caller.
    #[must_use]
    pub fn tasks(&self) -> Vec<SharedTask> {
        self.tasks.items()
    }

    /// Whether a refresh is in flight.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.tasks.is_loading()
    }

    /// Drops every cached task.
    pub fn clear(&self) {
        self.tasks.clear();
    }

    /// Refetches the shared tasks.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::NotAuthenticated`] without a session, or the
    /// fetch error.
    pub async fn refresh(&self) -> Result<(), ApiError> {
        let token = require_token(&self.session)?;
        self.tasks
            .refresh_with(self.api.list_shared_tasks(&token))
            .await
            .map(drop)
    }
}
