//! Collaborators, one independent list per task.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use taskdeck_proto::collaborator::{AddCollaborator, Collaborator};
use taskdeck_proto::ids::{TaskId, UserId};

use super::{ResourceCache, Synced, require_token, settle};
use crate::api::{ApiClient, ApiError};
use crate::session::SessionStore;

/// Result of sharing one task with several emails.
#[derive(Debug, Default)]
pub struct ShareReport {
    /// Emails added successfully.
    pub added: Vec<String>,
    /// Emails that could not be added.
    pub failed: Vec<ShareFailure>,
    /// State of the collaborator list after the follow-up refresh; `None`
    /// when nothing was added and no refresh was made.
    pub synced: Option<Synced>,
}

impl ShareReport {
    /// Whether every email was added.
    #[must_use]
    pub fn all_added(&self) -> bool {
        self.failed.is_empty()
    }
}

/// One email that could not be added.
#[derive(Debug)]
pub struct ShareFailure {
    /// The email.
    pub email: String,
    /// Why it failed.
    pub error: ApiError,
}

/// Per-task mirrors of `GET /tasks/{id}/collaborators`.
///
/// A deployment without the listing route (404, 405, 501) reads as "no
/// collaborators yet" rather than an error.
pub struct CollaboratorCache {
    api: Arc<ApiClient>,
    session: Arc<SessionStore>,
    by_task: Mutex<HashMap<TaskId, Arc<ResourceCache<Collaborator>>>>,
}

impl CollaboratorCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new(api: Arc<ApiClient>, session: Arc<SessionStore>) -> Self {
        Self {
            api,
            session,
            by_task: Mutex::new(HashMap::new()),
        }
    }

    fn entry(&self, task: &TaskId) -> Arc<ResourceCache<Collaborator>> {
        Arc::clone(self.by_task.lock().entry(task.clone()).or_default())
    }

    /// Cached collaborators of `task`; empty if never loaded.
    #[must_use]
    pub fn collaborators(&self, task: &TaskId) -> Vec<Collaborator> {
        self.by_task
            .lock()
            .get(task)
            .map(|cache| cache.items())
            .unwrap_or_default()
    }

    /// Whether a refresh, add or removal for `task` is in flight.
    #[must_use]
    pub fn is_loading(&self, task: &TaskId) -> bool {
        self.by_task
            .lock()
            .get(task)
            .is_some_and(|cache| cache.is_loading())
    }

    /// Drops every cached list.
    pub fn clear(&self) {
        let caches: Vec<_> = self.by_task.lock().drain().map(|(_, c)| c).collect();
        for cache in caches {
            cache.clear();
        }
    }

    /// Refetches the collaborators of `task`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::NotAuthenticated`] without a session, or the
    /// fetch error for failures other than a missing route.
    pub async fn refresh(&self, task: &TaskId) -> Result<(), ApiError> {
        let token = require_token(&self.session)?;
        let cache = self.entry(task);
        let api = Arc::clone(&self.api);
        let task_id = task.clone();
        cache
            .refresh_with(async move {
                match api.list_collaborators(&token, &task_id).await {
                    Err(e) if e.is_absent_route() => {
                        tracing::debug!(
                            task = %task_id,
                            status = e.status(),
                            "collaborator listing unavailable, treating as empty"
                        );
                        Ok(Vec::new())
                    }
                    other => other,
                }
            })
            .await
            .map(drop)
    }

    /// Adds one collaborator by email, then refetches that task's list.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Validation`] for a malformed email before any
    /// request, or the error of the add request.
    pub async fn add(
        &self,
        task: &TaskId,
        collaborator: &AddCollaborator,
    ) -> Result<Synced, ApiError> {
        self.add_one(task, collaborator).await?;
        Ok(settle(self.refresh(task)).await)
    }

    async fn add_one(
        &self,
        task: &TaskId,
        collaborator: &AddCollaborator,
    ) -> Result<(), ApiError> {
        collaborator.validate()?;
        let token = require_token(&self.session)?;
        let cache = self.entry(task);
        let _busy = cache.begin_mutation();
        self.api.add_collaborator(&token, task, collaborator).await?;
        tracing::info!(task = %task, role = %collaborator.role, "collaborator added");
        Ok(())
    }

    /// Adds each email in turn with `role`, collecting failures, then
    /// refetches once if anything was added.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::NotAuthenticated`] without a session; per-email
    /// failures are reported in the [`ShareReport`].
    pub async fn share_many<I, S>(
        &self,
        task: &TaskId,
        emails: I,
        role: &str,
    ) -> Result<ShareReport, ApiError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        require_token(&self.session)?;
        let mut report = ShareReport::default();
        for email in emails {
            let email = email.into();
            let request = AddCollaborator {
                email: email.trim().to_string(),
                role: role.to_string(),
            };
            match self.add_one(task, &request).await {
                Ok(()) => report.added.push(email),
                Err(error) => report.failed.push(ShareFailure { email, error }),
            }
        }
        if !report.added.is_empty() {
            report.synced = Some(settle(self.refresh(task)).await);
        }
        Ok(report)
    }

    /// Removes a collaborator, then refetches that task's list.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Unsupported`] when the deployment does not
    /// implement removal, otherwise the error of the request. The cached
    /// list is unchanged on error.
    pub async fn remove(&self, task: &TaskId, user: &UserId) -> Result<Synced, ApiError> {
        let token = require_token(&self.session)?;
        {
            let cache = self.entry(task);
            let _busy = cache.begin_mutation();
            self.api.remove_collaborator(&token, task, user).await?;
        }
        tracing::info!(task = %task, user = %user, "collaborator removed");
        Ok(settle(self.refresh(task)).await)
    }
}
