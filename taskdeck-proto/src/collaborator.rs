//! Task collaborators.

use serde::{Deserialize, Serialize};

use crate::error::{FieldError, InputError};
use crate::ids::UserId;

/// Role given to collaborators added by email when none is chosen.
pub const DEFAULT_ROLE: &str = "collaborator";

/// A user a task is shared with.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "RawCollaborator")]
pub struct Collaborator {
    /// User id, when reported.
    pub user_id: Option<UserId>,
    /// Email, when reported.
    pub email: Option<String>,
    /// Username, when reported.
    pub username: Option<String>,
    /// Role on the task.
    pub role: String,
}

impl Collaborator {
    /// Best available name for display: username, then email, then id.
    #[must_use]
    pub fn display_name(&self) -> String {
        self.username
            .clone()
            .or_else(|| self.email.clone())
            .or_else(|| self.user_id.as_ref().map(|id| format!("user #{id}")))
            .unwrap_or_else(|| "unknown user".to_string())
    }
}

#[derive(Deserialize)]
struct RawUser {
    #[serde(default)]
    id: Option<UserId>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    username: Option<String>,
}

#[derive(Deserialize)]
struct RawCollaborator {
    #[serde(default, rename = "userId", alias = "user_id")]
    user_id: Option<UserId>,
    // Some revisions only send the row id; it is the user id there.
    #[serde(default)]
    id: Option<UserId>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    user: Option<RawUser>,
}

impl From<RawCollaborator> for Collaborator {
    fn from(raw: RawCollaborator) -> Self {
        let (nested_id, nested_email, nested_username) = raw
            .user
            .map(|u| (u.id, u.email, u.username))
            .unwrap_or_default();
        Self {
            user_id: raw.user_id.or(nested_id).or(raw.id),
            email: raw.email.or(nested_email),
            username: raw.username.or(nested_username),
            role: raw
                .role
                .filter(|r| !r.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_ROLE.to_string()),
        }
    }
}

/// Body of `POST /tasks/{id}/collaborators`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddCollaborator {
    /// Email of the user to add.
    pub email: String,
    /// Role to give them.
    pub role: String,
}

impl AddCollaborator {
    /// Adds `email` with the default role.
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            role: DEFAULT_ROLE.to_string(),
        }
    }

    /// Checks the email looks like one.
    ///
    /// # Errors
    ///
    /// Returns [`InputError`] when the email is missing or malformed.
    pub fn validate(&self) -> Result<(), InputError> {
        let email = self.email.trim();
        let mut fields = Vec::new();
        if email.is_empty() {
            fields.push(FieldError::new("email", "Email is required"));
        } else if !email.contains('@') {
            fields.push(FieldError::new("email", "Invalid email address"));
        }
        InputError::check(fields)
    }
}
