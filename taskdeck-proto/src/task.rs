//! Task model, status normalization, and mutation payloads.
//!
//! [`Task`] is the canonical in-memory shape. It is decoded through a
//! permissive raw form that understands every field spelling the backend
//! has used: `tagId` vs `tag` vs `tags`, `createdAt` vs `created_at`,
//! `"PENDING"` vs `"TaskStatus.PENDING"`.

use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{FieldError, InputError};
use crate::ids::{TagId, TaskId, UserId};
use crate::tag::{RawTagRef, TagRef};

/// Minimum task title length in characters.
pub const TITLE_MIN_CHARS: usize = 2;
/// Maximum task title length in characters.
pub const TITLE_MAX_CHARS: usize = 40;
/// Minimum task content length in characters.
pub const CONTENT_MIN_CHARS: usize = 5;
/// Maximum task content length in characters.
pub const CONTENT_MAX_CHARS: usize = 600;

/// Status of a task. Any status may be assigned at any time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    /// Not started.
    #[default]
    Pending,
    /// Being worked on.
    InProgress,
    /// Done.
    Completed,
}

impl TaskStatus {
    /// Every status, in workflow order.
    pub const ALL: [Self; 3] = [Self::Pending, Self::InProgress, Self::Completed];

    /// The bare upper-case form sent to the server.
    #[must_use]
    pub const fn as_wire(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::InProgress => "IN_PROGRESS",
            Self::Completed => "COMPLETED",
        }
    }

    /// Human-readable label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::InProgress => "In Progress",
            Self::Completed => "Completed",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_wire())
    }
}

/// A status string that matches none of the known statuses.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown task status: {0:?}")]
pub struct UnknownStatus(pub String);

impl FromStr for TaskStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        // Some revisions namespace the enum: "TaskStatus.IN_PROGRESS".
        let bare = match trimmed.rsplit_once('.') {
            Some((ns, rest)) if ns.eq_ignore_ascii_case("taskstatus") => rest,
            _ => trimmed,
        };
        let normalized: String = bare
            .chars()
            .map(|c| match c {
                '-' | ' ' => '_',
                c => c.to_ascii_uppercase(),
            })
            .collect();
        match normalized.as_str() {
            "PENDING" => Ok(Self::Pending),
            "IN_PROGRESS" | "INPROGRESS" => Ok(Self::InProgress),
            "COMPLETED" => Ok(Self::Completed),
            _ => Err(UnknownStatus(s.to_string())),
        }
    }
}

impl Serialize for TaskStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_wire())
    }
}

impl<'de> Deserialize<'de> for TaskStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// A task, in canonical form.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "RawTask")]
pub struct Task {
    /// Task identifier.
    pub id: TaskId,
    /// Title (2–40 characters when created by this client).
    pub title: String,
    /// Body text (5–600 characters when created by this client).
    pub content: String,
    /// Attached tags. Single-tag backends produce a one-element list.
    pub tags: Vec<TagRef>,
    /// Current status.
    pub status: TaskStatus,
    /// Owning user, when reported.
    pub owner: Option<UserId>,
    /// Creation time, when reported and parseable.
    pub created_at: Option<DateTime<Utc>>,
}

impl Task {
    /// The first attached tag, if any.
    #[must_use]
    pub fn primary_tag(&self) -> Option<&TagRef> {
        self.tags.first()
    }

    /// Whether the task carries the given tag.
    #[must_use]
    pub fn has_tag(&self, id: TagId) -> bool {
        self.tags.iter().any(|t| t.id == id)
    }
}

/// Owner as sent by the server: an id or a user object.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawOwner {
    Object { id: UserId },
    Id(UserId),
}

impl From<RawOwner> for UserId {
    fn from(raw: RawOwner) -> Self {
        match raw {
            RawOwner::Object { id } | RawOwner::Id(id) => id,
        }
    }
}

#[derive(Deserialize)]
struct RawTask {
    id: TaskId,
    title: String,
    #[serde(default, alias = "description")]
    content: String,
    #[serde(default)]
    status: Option<TaskStatus>,
    #[serde(default, rename = "tagId", alias = "tag_id")]
    tag_id: Option<RawTagRef>,
    #[serde(default)]
    tag: Option<RawTagRef>,
    #[serde(default)]
    tags: Option<Vec<RawTagRef>>,
    #[serde(default)]
    owner: Option<RawOwner>,
    #[serde(default, rename = "ownerId", alias = "owner_id")]
    owner_id: Option<RawOwner>,
    #[serde(default, rename = "userId", alias = "user_id")]
    user_id: Option<RawOwner>,
    #[serde(default, rename = "createdAt", alias = "created_at")]
    created_at: Option<String>,
}

impl From<RawTask> for Task {
    fn from(raw: RawTask) -> Self {
        let tags = match (raw.tags, raw.tag, raw.tag_id) {
            (Some(list), _, _) if !list.is_empty() => list.into_iter().map(TagRef::from).collect(),
            (_, Some(tag), _) | (_, None, Some(tag)) => vec![TagRef::from(tag)],
            _ => Vec::new(),
        };
        Self {
            id: raw.id,
            title: raw.title,
            content: raw.content,
            tags,
            status: raw.status.unwrap_or_default(),
            owner: raw.owner.or(raw.owner_id).or(raw.user_id).map(UserId::from),
            created_at: raw.created_at.as_deref().and_then(parse_timestamp),
        }
    }
}

/// Parses RFC 3339, or a naive ISO timestamp taken as UTC.
#[must_use]
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// A task shared with the caller, with the caller's role on it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "RawSharedTask")]
pub struct SharedTask {
    /// The shared task.
    pub task: Task,
    /// The caller's role (e.g. `collaborator`), when reported.
    pub role: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawSharedTask {
    Nested {
        task: Task,
        #[serde(default)]
        role: Option<String>,
    },
    Flat {
        #[serde(flatten)]
        task: Task,
        #[serde(default)]
        role: Option<String>,
    },
}

impl From<RawSharedTask> for SharedTask {
    fn from(raw: RawSharedTask) -> Self {
        match raw {
            RawSharedTask::Nested { task, role } | RawSharedTask::Flat { task, role } => {
                Self { task, role }
            }
        }
    }
}

/// Body of `POST /tasks`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTask {
    /// Title, 2–40 characters.
    pub title: String,
    /// Content, 5–600 characters.
    pub content: String,
    /// Tag to attach.
    pub tag_id: TagId,
    /// Initial status.
    pub status: TaskStatus,
}

impl NewTask {
    /// Checks every field, reporting all failures at once.
    ///
    /// # Errors
    ///
    /// Returns [`InputError`] naming each invalid field.
    pub fn validate(&self) -> Result<(), InputError> {
        let mut fields = Vec::new();
        check_title(&self.title, &mut fields);
        check_content(&self.content, &mut fields);
        check_tag(self.tag_id, &mut fields);
        InputError::check(fields)
    }
}

/// Body of a task update. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskUpdate {
    /// New title.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// New content.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// New tag.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag_id: Option<TagId>,
    /// New status.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
}

impl TaskUpdate {
    /// An update that only changes the status.
    #[must_use]
    pub fn status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// Whether the update changes nothing.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.content.is_none()
            && self.tag_id.is_none()
            && self.status.is_none()
    }

    /// Checks the fields that are present.
    ///
    /// # Errors
    ///
    /// Returns [`InputError`] naming each invalid field, or a single
    /// error when the update is empty.
    pub fn validate(&self) -> Result<(), InputError> {
        if self.is_empty() {
            return Err(InputError {
                fields: vec![FieldError::new("task", "Nothing to update")],
            });
        }
        let mut fields = Vec::new();
        if let Some(title) = &self.title {
            check_title(title, &mut fields);
        }
        if let Some(content) = &self.content {
            check_content(content, &mut fields);
        }
        if let Some(tag) = self.tag_id {
            check_tag(tag, &mut fields);
        }
        InputError::check(fields)
    }

    /// `task` with these changes applied, every field present. Backends
    /// that update with `PUT` replace the whole task and need this body.
    #[must_use]
    pub fn applied_to(&self, task: &Task) -> Self {
        Self {
            title: Some(self.title.clone().unwrap_or_else(|| task.title.clone())),
            content: Some(
                self.content
                    .clone()
                    .unwrap_or_else(|| task.content.clone()),
            ),
            tag_id: self.tag_id.or_else(|| task.primary_tag().map(|t| t.id)),
            status: Some(self.status.unwrap_or(task.status)),
        }
    }
}

fn check_title(title: &str, fields: &mut Vec<FieldError>) {
    let len = title.trim().chars().count();
    if len < TITLE_MIN_CHARS {
        fields.push(FieldError::new(
            "title",
            format!("Title must be at least {TITLE_MIN_CHARS} characters"),
        ));
    } else if title.chars().count() > TITLE_MAX_CHARS {
        fields.push(FieldError::new(
            "title",
            format!("Title must be at most {TITLE_MAX_CHARS} characters"),
        ));
    }
}

fn check_content(content: &str, fields: &mut Vec<FieldError>) {
    let len = content.trim().chars().count();
    if len < CONTENT_MIN_CHARS {
        fields.push(FieldError::new(
            "content",
            format!("Content must be at least {CONTENT_MIN_CHARS} characters"),
        ));
    } else if content.chars().count() > CONTENT_MAX_CHARS {
        fields.push(FieldError::new(
            "content",
            format!("Content must be at most {CONTENT_MAX_CHARS} characters"),
        ));
    }
}

fn check_tag(tag: TagId, fields: &mut Vec<FieldError>) {
    if !tag.is_valid() {
        fields.push(FieldError::new("tagId", "Please select a valid tag"));
    }
}
