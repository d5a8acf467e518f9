//! In-memory users, sessions, tasks, tags and collaborators.
//!
//! All state sits behind one [`RwLock`]; every operation takes the lock
//! once, so each call is atomic with respect to the others.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use taskdeck_proto::task::TaskStatus;
use tokio::sync::RwLock;

/// Tags every fresh store starts with.
pub const SEED_TAGS: [&str; 3] = ["Work", "Personal", "Urgent"];

/// Store-level failures, mapped to HTTP statuses by the server.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The email is already registered.
    #[error("Email already registered")]
    EmailTaken,
    /// No task with that id.
    #[error("Task not found")]
    TaskNotFound,
    /// The task belongs to someone else.
    #[error("You do not own this task")]
    NotOwner,
    /// No tag with that id.
    #[error("Tag not found")]
    TagNotFound,
    /// No user with that email.
    #[error("No user with that email")]
    UnknownUser,
    /// The user already collaborates on the task, or owns it.
    #[error("User already has access to this task")]
    AlreadyShared,
    /// The user is not a collaborator on the task.
    #[error("Collaborator not found")]
    NotCollaborator,
}

/// A registered account.
#[derive(Debug, Clone)]
pub struct User {
    /// Account id.
    pub id: i64,
    /// Username.
    pub username: String,
    /// Email, unique.
    pub email: String,
    password: String,
}

/// A tag row.
#[derive(Debug, Clone)]
pub struct TagRow {
    /// Tag id.
    pub id: i64,
    /// Tag name.
    pub name: String,
}

/// A stored task.
#[derive(Debug, Clone)]
pub struct TaskRow {
    /// Task id.
    pub id: i64,
    /// Title.
    pub title: String,
    /// Content.
    pub content: String,
    /// Attached tag.
    pub tag_id: i64,
    /// Status.
    pub status: TaskStatus,
    /// Owning user.
    pub owner: i64,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// Fields of a task update; `None` leaves the field alone.
#[derive(Debug, Clone, Default)]
pub struct TaskChanges {
    /// New title.
    pub title: Option<String>,
    /// New content.
    pub content: Option<String>,
    /// New tag.
    pub tag_id: Option<i64>,
    /// New status.
    pub status: Option<TaskStatus>,
}

/// A user's access to someone else's task.
#[derive(Debug, Clone)]
pub struct Grant {
    /// Collaborating user.
    pub user: User,
    /// Their role.
    pub role: String,
}

#[derive(Debug, Default)]
struct Inner {
    users: Vec<User>,
    tokens: HashMap<String, i64>,
    tags: Vec<TagRow>,
    tasks: BTreeMap<i64, TaskRow>,
    /// Task id -> (user id, role).
    grants: HashMap<i64, Vec<(i64, String)>>,
    next_user: i64,
    next_task: i64,
    next_token: u64,
}

impl Inner {
    fn user(&self, id: i64) -> Option<&User> {
        self.users.iter().find(|u| u.id == id)
    }

    fn owned_task_mut(&mut self, owner: i64, id: i64) -> Result<&mut TaskRow, StoreError> {
        let task = self.tasks.get_mut(&id).ok_or(StoreError::TaskNotFound)?;
        if task.owner == owner {
            Ok(task)
        } else {
            Err(StoreError::NotOwner)
        }
    }
}

/// The stub backend's data.
pub struct StubStore {
    inner: RwLock<Inner>,
}

impl Default for StubStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StubStore {
    /// A store with the seed tags and nothing else.
    #[must_use]
    pub fn new() -> Self {
        let tags = SEED_TAGS
            .iter()
            .zip(1..)
            .map(|(name, id)| TagRow {
                id,
                name: (*name).to_string(),
            })
            .collect();
        Self {
            inner: RwLock::new(Inner {
                tags,
                next_user: 1,
                next_task: 1,
                next_token: 1,
                ..Inner::default()
            }),
        }
    }

    /// Registers an account and returns its id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::EmailTaken`] for a duplicate email
    /// (compared case-insensitively).
    pub async fn create_user(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<User, StoreError> {
        let mut inner = self.inner.write().await;
        if inner
            .users
            .iter()
            .any(|u| u.email.eq_ignore_ascii_case(email))
        {
            return Err(StoreError::EmailTaken);
        }
        let user = User {
            id: inner.next_user,
            username: username.to_string(),
            email: email.to_string(),
            password: password.to_string(),
        };
        inner.next_user += 1;
        inner.users.push(user.clone());
        Ok(user)
    }

    /// Checks credentials and issues a new token.
    pub async fn sign_in(&self, email: &str, password: &str) -> Option<(String, User)> {
        let mut inner = self.inner.write().await;
        let user = inner
            .users
            .iter()
            .find(|u| u.email.eq_ignore_ascii_case(email) && u.password == password)?
            .clone();
        let token = format!("stub-{}-{}", user.id, inner.next_token);
        inner.next_token += 1;
        inner.tokens.insert(token.clone(), user.id);
        Some((token, user))
    }

    /// The user a token belongs to.
    pub async fn user_for_token(&self, token: &str) -> Option<User> {
        let inner = self.inner.read().await;
        let id = *inner.tokens.get(token)?;
        inner.user(id).cloned()
    }

    /// All tags.
    pub async fn tags(&self) -> Vec<TagRow> {
        self.inner.read().await.tags.clone()
    }

    /// Tasks owned by `owner`, oldest first.
    pub async fn tasks_of(&self, owner: i64) -> Vec<TaskRow> {
        self.inner
            .read()
            .await
            .tasks
            .values()
            .filter(|t| t.owner == owner)
            .cloned()
            .collect()
    }

    /// Creates a task for `owner`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::TagNotFound`] for an unknown tag.
    pub async fn create_task(
        &self,
        owner: i64,
        title: &str,
        content: &str,
        tag_id: i64,
        status: TaskStatus,
    ) -> Result<TaskRow, StoreError> {
        let mut inner = self.inner.write().await;
        if !inner.tags.iter().any(|t| t.id == tag_id) {
            return Err(StoreError::TagNotFound);
        }
        let task = TaskRow {
            id: inner.next_task,
            title: title.to_string(),
            content: content.to_string(),
            tag_id,
            status,
            owner,
            created_at: Utc::now(),
        };
        inner.next_task += 1;
        inner.tasks.insert(task.id, task.clone());
        Ok(task)
    }

    /// Applies `changes` to a task `owner` owns.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::TaskNotFound`], [`StoreError::NotOwner`] or
    /// [`StoreError::TagNotFound`].
    pub async fn update_task(
        &self,
        owner: i64,
        id: i64,
        changes: TaskChanges,
    ) -> Result<TaskRow, StoreError> {
        let mut inner = self.inner.write().await;
        if changes
            .tag_id
            .is_some_and(|tag| !inner.tags.iter().any(|t| t.id == tag))
        {
            return Err(StoreError::TagNotFound);
        }
        let task = inner.owned_task_mut(owner, id)?;
        if let Some(title) = changes.title {
            task.title = title;
        }
        if let Some(content) = changes.content {
            task.content = content;
        }
        if let Some(tag) = changes.tag_id {
            task.tag_id = tag;
        }
        if let Some(status) = changes.status {
            task.status = status;
        }
        Ok(task.clone())
    }

    /// Deletes a task `owner` owns, with its grants.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::TaskNotFound`] or [`StoreError::NotOwner`].
    pub async fn delete_task(&self, owner: i64, id: i64) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        inner.owned_task_mut(owner, id)?;
        inner.tasks.remove(&id);
        inner.grants.remove(&id);
        Ok(())
    }

    /// Tasks shared with `user`, with the role granted.
    pub async fn shared_with(&self, user: i64) -> Vec<(TaskRow, String)> {
        let inner = self.inner.read().await;
        inner
            .grants
            .iter()
            .flat_map(|(task, grants)| {
                grants
                    .iter()
                    .filter(|(u, _)| *u == user)
                    .filter_map(|(_, role)| Some((inner.tasks.get(task)?.clone(), role.clone())))
            })
            .collect()
    }

    /// Collaborators of a task `owner` owns.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::TaskNotFound`] or [`StoreError::NotOwner`].
    pub async fn collaborators(&self, owner: i64, task: i64) -> Result<Vec<Grant>, StoreError> {
        let mut inner = self.inner.write().await;
        inner.owned_task_mut(owner, task)?;
        Ok(inner
            .grants
            .get(&task)
            .into_iter()
            .flatten()
            .filter_map(|(user, role)| {
                Some(Grant {
                    user: inner.user(*user)?.clone(),
                    role: role.clone(),
                })
            })
            .collect())
    }

    /// Shares a task `owner` owns with the user registered under `email`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::TaskNotFound`], [`StoreError::NotOwner`],
    /// [`StoreError::UnknownUser`] or [`StoreError::AlreadyShared`].
    pub async fn add_collaborator(
        &self,
        owner: i64,
        task: i64,
        email: &str,
        role: &str,
    ) -> Result<Grant, StoreError> {
        let mut inner = self.inner.write().await;
        inner.owned_task_mut(owner, task)?;
        let user = inner
            .users
            .iter()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned()
            .ok_or(StoreError::UnknownUser)?;
        let grants = inner.grants.entry(task).or_default();
        if user.id == owner || grants.iter().any(|(u, _)| *u == user.id) {
            return Err(StoreError::AlreadyShared);
        }
        grants.push((user.id, role.to_string()));
        Ok(Grant {
            user,
            role: role.to_string(),
        })
    }

    /// Revokes a user's access to a task `owner` owns.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::TaskNotFound`], [`StoreError::NotOwner`] or
    /// [`StoreError::NotCollaborator`].
    pub async fn remove_collaborator(
        &self,
        owner: i64,
        task: i64,
        user: i64,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        inner.owned_task_mut(owner, task)?;
        let grants = inner.grants.entry(task).or_default();
        let before = grants.len();
        grants.retain(|(u, _)| *u != user);
        if grants.len() == before {
            return Err(StoreError::NotCollaborator);
        }
        Ok(())
    }
}
