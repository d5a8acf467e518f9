//! One method per REST endpoint the client consumes.
//!
//! | Method | Path | Auth |
//! |---|---|---|
//! | GET | `/tags` | no |
//! | POST | `/users` | no |
//! | POST | `/auth/sign-in` | no |
//! | GET | `/tasks/user` | bearer |
//! | POST | `/tasks` | bearer |
//! | PATCH or PUT | `/tasks/{id}` | bearer |
//! | DELETE | `/tasks/{id}` | bearer |
//! | GET | `/tasks/collaborative` | bearer |
//! | GET | `/tasks/{id}/collaborators` | bearer |
//! | POST | `/tasks/{id}/collaborators` | bearer |
//! | DELETE | `/tasks/{id}/collaborators/{userId}` | bearer |

use reqwest::Method;
use serde_json::Value;
use taskdeck_proto::auth::{CreateAccount, SignIn, SignInResponse};
use taskdeck_proto::collaborator::{AddCollaborator, Collaborator};
use taskdeck_proto::ids::{TaskId, UserId};
use taskdeck_proto::tag::Tag;
use taskdeck_proto::task::{NewTask, SharedTask, Task, TaskUpdate};

use super::{ApiClient, ApiError, first_update_method};
use crate::config::UpdateMethod;

/// Cheapest unauthenticated endpoint; doubles as the health probe target.
pub const HEALTH_PATH: &[&str] = &["tags"];

const NO_BODY: Option<&()> = None;

/// Some revisions wrap collections: `{"tasks": [...]}`, `{"data": [...]}`.
fn unwrap_collection(value: Value, keys: &[&str]) -> Value {
    match value {
        Value::Object(mut map) => {
            let list = keys
                .iter()
                .chain(["data", "items"].iter())
                .find_map(|k| map.remove(*k).filter(Value::is_array));
            list.unwrap_or(Value::Object(map))
        }
        Value::Null => Value::Array(Vec::new()),
        other => other,
    }
}

fn decode_list<T: serde::de::DeserializeOwned>(
    value: Value,
    keys: &[&str],
) -> Result<Vec<T>, ApiError> {
    serde_json::from_value(unwrap_collection(value, keys)).map_err(|e| ApiError::Decode {
        reason: e.to_string(),
    })
}

impl ApiClient {
    /// `GET /tags`.
    ///
    /// # Errors
    ///
    /// Returns the [`ApiError`] for the failed request.
    pub async fn list_tags(&self) -> Result<Vec<Tag>, ApiError> {
        let value = self.send_value(Method::GET, &["tags"], NO_BODY, None).await?;
        decode_list(value, &["tags"])
    }

    /// `POST /users`. The response body is ignored.
    ///
    /// # Errors
    ///
    /// Returns the [`ApiError`] for the failed request.
    pub async fn create_account(&self, account: &CreateAccount) -> Result<(), ApiError> {
        self.send_value(Method::POST, &["users"], Some(account), None)
            .await
            .map(drop)
    }

    /// `POST /auth/sign-in`.
    ///
    /// # Errors
    ///
    /// Returns the [`ApiError`] for the failed request. A 2xx without a
    /// token is not an error here; the caller decides.
    pub async fn sign_in(&self, credentials: &SignIn) -> Result<SignInResponse, ApiError> {
        self.send(Method::POST, &["auth", "sign-in"], Some(credentials), None)
            .await
    }

    /// `GET /tasks/user`.
    ///
    /// # Errors
    ///
    /// Returns the [`ApiError`] for the failed request.
    pub async fn list_own_tasks(&self, token: &str) -> Result<Vec<Task>, ApiError> {
        let value = self
            .send_value(Method::GET, &["tasks", "user"], NO_BODY, Some(token))
            .await?;
        decode_list(value, &["tasks"])
    }

    /// `POST /tasks`. The response body is ignored; callers refetch.
    ///
    /// # Errors
    ///
    /// Returns the [`ApiError`] for the failed request.
    pub async fn create_task(&self, token: &str, task: &NewTask) -> Result<(), ApiError> {
        self.send_value(Method::POST, &["tasks"], Some(task), Some(token))
            .await
            .map(drop)
    }

    /// `PATCH /tasks/{id}` or `PUT /tasks/{id}`, per the configured
    /// [`UpdateMethod`].
    ///
    /// `PATCH` sends `changes`. `PUT` replaces the task, so it sends
    /// `replacement` (see [`TaskUpdate::applied_to`]), or `changes` when
    /// no replacement is given.
    ///
    /// With [`UpdateMethod::Auto`], a `PATCH` the deployment has no route
    /// for (405, or a bare 404 or 501) is retried once as `PUT`, and `PUT`
    /// is used from then on.
    ///
    /// # Errors
    ///
    /// Returns the [`ApiError`] for the failed request.
    pub async fn update_task(
        &self,
        token: &str,
        id: &TaskId,
        changes: &TaskUpdate,
        replacement: Option<&TaskUpdate>,
    ) -> Result<(), ApiError> {
        let path = ["tasks", id.as_str()];
        let put_body = replacement.unwrap_or(changes);
        let mode = self.update_method();
        let first = first_update_method(mode);
        let body = if first == Method::PUT { put_body } else { changes };
        let result = self.send_value(first, &path, Some(body), Some(token)).await;
        match result {
            Err(e) if mode == UpdateMethod::Auto && route_missing(&e) => {
                tracing::info!(
                    task = %id,
                    status = e.status(),
                    "PATCH not routed, switching task updates to PUT"
                );
                self.remember_update_method(UpdateMethod::Put);
                self.send_value(Method::PUT, &path, Some(put_body), Some(token))
                    .await
                    .map(drop)
            }
            other => other.map(drop),
        }
    }

    /// `DELETE /tasks/{id}`.
    ///
    /// # Errors
    ///
    /// Returns the [`ApiError`] for the failed request.
    pub async fn delete_task(&self, token: &str, id: &TaskId) -> Result<(), ApiError> {
        self.send_value(Method::DELETE, &["tasks", id.as_str()], NO_BODY, Some(token))
            .await
            .map(drop)
    }

    /// `GET /tasks/collaborative`.
    ///
    /// # Errors
    ///
    /// Returns the [`ApiError`] for the failed request.
    pub async fn list_shared_tasks(&self, token: &str) -> Result<Vec<SharedTask>, ApiError> {
        let value = self
            .send_value(
                Method::GET,
                &["tasks", "collaborative"],
                NO_BODY,
                Some(token),
            )
            .await?;
        decode_list(value, &["tasks"])
    }

    /// `GET /tasks/{id}/collaborators`.
    ///
    /// # Errors
    ///
    /// Returns the [`ApiError`] for the failed request, including the
    /// 404 some deployments answer with; see
    /// [`crate::cache::CollaboratorCache`] for how that is absorbed.
    pub async fn list_collaborators(
        &self,
        token: &str,
        task: &TaskId,
    ) -> Result<Vec<Collaborator>, ApiError> {
        let value = self
            .send_value(
                Method::GET,
                &["tasks", task.as_str(), "collaborators"],
                NO_BODY,
                Some(token),
            )
            .await?;
        decode_list(value, &["collaborators"])
    }

    /// `POST /tasks/{id}/collaborators`.
    ///
    /// # Errors
    ///
    /// Returns the [`ApiError`] for the failed request.
    pub async fn add_collaborator(
        &self,
        token: &str,
        task: &TaskId,
        collaborator: &AddCollaborator,
    ) -> Result<(), ApiError> {
        self.send_value(
            Method::POST,
            &["tasks", task.as_str(), "collaborators"],
            Some(collaborator),
            Some(token),
        )
        .await
        .map(drop)
    }

    /// `DELETE /tasks/{id}/collaborators/{userId}`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Unsupported`] when the deployment has no such
    /// route (404, 405 or 501 without an application message), otherwise
    /// the [`ApiError`] for the failed request.
    pub async fn remove_collaborator(
        &self,
        token: &str,
        task: &TaskId,
        user: &UserId,
    ) -> Result<(), ApiError> {
        let result = self
            .send_value(
                Method::DELETE,
                &["tasks", task.as_str(), "collaborators", user.as_str()],
                NO_BODY,
                Some(token),
            )
            .await;
        match result {
            Ok(_) => Ok(()),
            Err(e) if route_missing(&e) => Err(ApiError::Unsupported {
                operation: "Removing collaborators",
            }),
            Err(e) => Err(e),
        }
    }
}

/// A missing route, as opposed to a route that answered "not found" for
/// a specific record with its own message.
fn route_missing(err: &ApiError) -> bool {
    match err {
        ApiError::Application { status, .. }
        | ApiError::Validation {
            status: Some(status),
            ..
        } => *status == 405 || *status == 501,
        other => other.is_absent_route(),
    }
}
