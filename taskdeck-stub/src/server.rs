//! HTTP surface of the stub backend.
//!
//! Routes mirror the task service. [`Behavior`] switches between the
//! response shapes and quirks different deployments have shown, and can
//! inject faults (slow `/tags`, HTML outage pages, missing routes).
//! Routes are served both at the root and under `/api/v1`.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::extract::{Path, Request, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};
use taskdeck_proto::task::{
    CONTENT_MAX_CHARS, CONTENT_MIN_CHARS, TITLE_MAX_CHARS, TITLE_MIN_CHARS, TaskStatus,
};
use tokio::sync::RwLock;

use crate::store::{Grant, StoreError, StubStore, TagRow, TaskChanges, TaskRow, User};

/// Shortest password the stub accepts at sign-up.
pub const MIN_PASSWORD_CHARS: usize = 6;

/// How task statuses are written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum StatusStyle {
    /// `"IN_PROGRESS"`.
    #[default]
    Bare,
    /// `"TaskStatus.IN_PROGRESS"`.
    Namespaced,
}

/// How a task's tag is written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum TagStyle {
    /// `"tagId": 1`; shared tasks are flat objects with a `role`.
    #[default]
    Single,
    /// `"tags": [{"id": 1, "name": "Work"}]`; shared tasks are
    /// `{"task": {...}, "role": ...}`.
    Array,
}

/// Which methods `/tasks/{id}` accepts for updates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum UpdateMethods {
    /// `PATCH` and `PUT`.
    #[default]
    Both,
    /// Only `PATCH`.
    PatchOnly,
    /// Only `PUT`; `PATCH` gets a bare 405.
    PutOnly,
    /// Only `PUT`; `PATCH` gets the HTML 404 an Express app serves for a
    /// method it has no route for.
    ExpressPutOnly,
}

/// A non-JSON answer served for every request while set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outage {
    /// HTTP status.
    pub status: u16,
    /// HTML body.
    pub body: String,
}

impl Outage {
    /// The page a cold-starting platform serves while the app boots.
    #[must_use]
    pub fn application_error() -> Self {
        Self {
            status: 503,
            body: "<!DOCTYPE html><html><head><title>Application Error</title></head>\
                   <body>Application Error</body></html>"
                .to_string(),
        }
    }

    /// An arbitrary HTML page.
    pub fn html(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// Response shapes and injected faults.
#[derive(Debug, Clone, Default)]
pub struct Behavior {
    /// Status spelling.
    pub status_style: StatusStyle,
    /// Tag field shape.
    pub tag_style: TagStyle,
    /// Wrap list responses as `{"tasks": [...]}` etc.
    pub wrap_collections: bool,
    /// Accepted update methods.
    pub update_methods: UpdateMethods,
    /// Serve `GET /tasks/{id}/collaborators`.
    pub collaborator_listing: bool,
    /// Serve `DELETE /tasks/{id}/collaborators/{userId}`.
    pub collaborator_removal: bool,
    /// Answer sign-in without a token.
    pub omit_token: bool,
    /// Delay before answering `GET /tags`.
    pub tags_delay: Option<Duration>,
    /// Serve this page for every request.
    pub outage: Option<Outage>,
}

impl Behavior {
    /// Every feature on, canonical shapes.
    #[must_use]
    pub fn full() -> Self {
        Self {
            collaborator_listing: true,
            collaborator_removal: true,
            ..Self::default()
        }
    }
}

/// Shared state of one stub server.
pub struct StubState {
    /// The data.
    pub store: StubStore,
    behavior: RwLock<Behavior>,
    requests: AtomicUsize,
}

impl Default for StubState {
    fn default() -> Self {
        Self::new(Behavior::full())
    }
}

impl StubState {
    /// Empty store with the given behavior.
    #[must_use]
    pub fn new(behavior: Behavior) -> Self {
        Self {
            store: StubStore::new(),
            behavior: RwLock::new(behavior),
            requests: AtomicUsize::new(0),
        }
    }

    /// Current behavior.
    pub async fn behavior(&self) -> Behavior {
        self.behavior.read().await.clone()
    }

    /// Changes the behavior of a running server.
    pub async fn set_behavior(&self, f: impl FnOnce(&mut Behavior)) {
        f(&mut *self.behavior.write().await);
    }

    /// Requests received so far, including ones answered by an outage.
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// Registers a user and returns a valid token for them.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::EmailTaken`] if the email is in use.
    pub async fn seed_user(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<(User, String), StoreError> {
        let user = self.store.create_user(username, email, password).await?;
        let (token, _) = self
            .store
            .sign_in(email, password)
            .await
            .ok_or(StoreError::UnknownUser)?;
        Ok((user, token))
    }
}

/// An error answer.
#[derive(Debug)]
pub struct Failure {
    status: StatusCode,
    body: Option<Value>,
}

impl Failure {
    fn message(status: StatusCode, message: &str) -> Self {
        Self {
            status,
            body: Some(json!({ "message": message })),
        }
    }

    fn fields(fields: &[(&str, String)]) -> Self {
        let errors: serde_json::Map<String, Value> = fields
            .iter()
            .map(|(field, msg)| ((*field).to_string(), json!([msg])))
            .collect();
        Self {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            body: Some(json!({ "message": "Validation failed", "errors": errors })),
        }
    }

    const fn bare(status: StatusCode) -> Self {
        Self { status, body: None }
    }

    fn unauthorized() -> Self {
        Self::message(StatusCode::UNAUTHORIZED, "Unauthorized")
    }
}

impl IntoResponse for Failure {
    fn into_response(self) -> Response {
        match self.body {
            Some(body) => (self.status, Json(body)).into_response(),
            None => self.status.into_response(),
        }
    }
}

impl From<StoreError> for Failure {
    fn from(err: StoreError) -> Self {
        let status = match err {
            StoreError::EmailTaken | StoreError::AlreadyShared => StatusCode::CONFLICT,
            StoreError::TaskNotFound | StoreError::UnknownUser | StoreError::NotCollaborator => {
                StatusCode::NOT_FOUND
            }
            StoreError::NotOwner => StatusCode::FORBIDDEN,
            StoreError::TagNotFound => {
                return Self::fields(&[("tagId", err.to_string())]);
            }
        };
        Self::message(status, &err.to_string())
    }
}

type Reply = Result<Response, Failure>;

/// Express-style page for a route the deployment does not have.
fn missing_route(method: &str, path: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
        format!("<!DOCTYPE html><html><body><pre>Cannot {method} {path}</pre></body></html>"),
    )
        .into_response()
}

async fn authenticate(state: &StubState, headers: &HeaderMap) -> Result<User, Failure> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(Failure::unauthorized)?;
    state
        .store
        .user_for_token(token.trim())
        .await
        .ok_or_else(Failure::unauthorized)
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

fn render_status(status: TaskStatus, behavior: &Behavior) -> String {
    match behavior.status_style {
        StatusStyle::Bare => status.as_wire().to_string(),
        StatusStyle::Namespaced => format!("TaskStatus.{}", status.as_wire()),
    }
}

fn render_task(task: &TaskRow, tags: &[TagRow], behavior: &Behavior) -> Value {
    let mut value = json!({
        "id": task.id,
        "title": task.title,
        "content": task.content,
        "status": render_status(task.status, behavior),
        "userId": task.owner,
        "createdAt": task.created_at.to_rfc3339(),
    });
    match behavior.tag_style {
        TagStyle::Single => value["tagId"] = json!(task.tag_id),
        TagStyle::Array => {
            let name = tags
                .iter()
                .find(|t| t.id == task.tag_id)
                .map(|t| t.name.clone());
            value["tags"] = json!([{ "id": task.tag_id, "name": name }]);
        }
    }
    value
}

fn render_user(user: &User) -> Value {
    json!({ "id": user.id, "username": user.username, "email": user.email })
}

fn render_grant(grant: &Grant) -> Value {
    json!({
        "userId": grant.user.id,
        "email": grant.user.email,
        "username": grant.user.username,
        "role": grant.role,
    })
}

fn render_list(key: &str, items: Vec<Value>, behavior: &Behavior) -> Response {
    if behavior.wrap_collections {
        Json(json!({ key: items })).into_response()
    } else {
        Json(Value::Array(items)).into_response()
    }
}

// ---------------------------------------------------------------------------
// Request bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SignUpBody {
    username: String,
    email: String,
    password: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SignInBody {
    email: String,
    password: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TaskBody {
    title: Option<String>,
    content: Option<String>,
    #[serde(rename = "tagId", alias = "tag_id")]
    tag_id: Option<i64>,
    status: Option<String>,
}

/// What a task body is for, which decides the required fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyKind {
    /// `POST`: title, content and tag.
    Create,
    /// `PUT` replaces the task: title, content and status.
    Replace,
    /// `PATCH`: nothing.
    Patch,
}

impl TaskBody {
    /// Validates present fields and the ones `kind` requires.
    fn into_changes(self, kind: BodyKind) -> Result<TaskChanges, Failure> {
        let create = kind == BodyKind::Create;
        let whole = kind != BodyKind::Patch;
        let mut errors = Vec::new();
        match &self.title {
            Some(t) if !(TITLE_MIN_CHARS..=TITLE_MAX_CHARS).contains(&t.trim().chars().count()) => {
                errors.push((
                    "title",
                    format!("Title must be {TITLE_MIN_CHARS}-{TITLE_MAX_CHARS} characters"),
                ));
            }
            None if whole => errors.push(("title", "Title is required".to_string())),
            _ => {}
        }
        match &self.content {
            Some(c)
                if !(CONTENT_MIN_CHARS..=CONTENT_MAX_CHARS).contains(&c.trim().chars().count()) =>
            {
                errors.push((
                    "content",
                    format!("Content must be {CONTENT_MIN_CHARS}-{CONTENT_MAX_CHARS} characters"),
                ));
            }
            None if whole => errors.push(("content", "Content is required".to_string())),
            _ => {}
        }
        if create && self.tag_id.is_none() {
            errors.push(("tagId", "Tag is required".to_string()));
        }
        let status = match self.status.as_deref().map(str::parse::<TaskStatus>) {
            Some(Ok(s)) => Some(s),
            Some(Err(e)) => {
                errors.push(("status", e.to_string()));
                None
            }
            None => {
                if kind == BodyKind::Replace {
                    errors.push(("status", "Status is required".to_string()));
                }
                None
            }
        };
        if !errors.is_empty() {
            return Err(Failure::fields(&errors));
        }
        Ok(TaskChanges {
            title: self.title,
            content: self.content,
            tag_id: self.tag_id,
            status,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CollaboratorBody {
    email: String,
    role: Option<String>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn list_tags(State(state): State<Arc<StubState>>) -> Response {
    let behavior = state.behavior().await;
    if let Some(delay) = behavior.tags_delay {
        tokio::time::sleep(delay).await;
    }
    let tags = state
        .store
        .tags()
        .await
        .iter()
        .map(|t| json!({ "id": t.id, "name": t.name }))
        .collect();
    render_list("tags", tags, &behavior)
}

async fn sign_up(State(state): State<Arc<StubState>>, Json(body): Json<SignUpBody>) -> Reply {
    let mut errors = Vec::new();
    if body.username.trim().is_empty() {
        errors.push(("username", "Username is required".to_string()));
    }
    if !body.email.contains('@') {
        errors.push(("email", "A valid email is required".to_string()));
    }
    if body.password.chars().count() < MIN_PASSWORD_CHARS {
        errors.push((
            "password",
            format!("Password must be at least {MIN_PASSWORD_CHARS} characters"),
        ));
    }
    if !errors.is_empty() {
        return Err(Failure::fields(&errors));
    }
    let user = state
        .store
        .create_user(body.username.trim(), body.email.trim(), &body.password)
        .await?;
    tracing::info!(user = user.id, "account created");
    Ok((StatusCode::CREATED, Json(render_user(&user))).into_response())
}

async fn sign_in(State(state): State<Arc<StubState>>, Json(body): Json<SignInBody>) -> Reply {
    let Some((token, user)) = state.store.sign_in(body.email.trim(), &body.password).await else {
        return Err(Failure::message(StatusCode::UNAUTHORIZED, "Invalid email or password"));
    };
    tracing::info!(user = user.id, "signed in");
    if state.behavior().await.omit_token {
        return Ok(Json(json!({ "user": render_user(&user) })).into_response());
    }
    Ok(Json(json!({ "token": token, "user": render_user(&user) })).into_response())
}

async fn own_tasks(State(state): State<Arc<StubState>>, headers: HeaderMap) -> Reply {
    let user = authenticate(&state, &headers).await?;
    let behavior = state.behavior().await;
    let tags = state.store.tags().await;
    let tasks = state
        .store
        .tasks_of(user.id)
        .await
        .iter()
        .map(|t| render_task(t, &tags, &behavior))
        .collect();
    Ok(render_list("tasks", tasks, &behavior))
}

async fn create_task(
    State(state): State<Arc<StubState>>,
    headers: HeaderMap,
    Json(body): Json<TaskBody>,
) -> Reply {
    let user = authenticate(&state, &headers).await?;
    let changes = body.into_changes(BodyKind::Create)?;
    let (Some(title), Some(content), Some(tag_id)) =
        (changes.title, changes.content, changes.tag_id)
    else {
        return Err(Failure::bare(StatusCode::UNPROCESSABLE_ENTITY));
    };
    let task = state
        .store
        .create_task(
            user.id,
            title.trim(),
            content.trim(),
            tag_id,
            changes.status.unwrap_or_default(),
        )
        .await?;
    tracing::info!(task = task.id, owner = user.id, "task created");
    let behavior = state.behavior().await;
    let tags = state.store.tags().await;
    Ok((StatusCode::CREATED, Json(render_task(&task, &tags, &behavior))).into_response())
}

async fn update_task(
    state: &StubState,
    headers: &HeaderMap,
    id: i64,
    body: TaskBody,
    kind: BodyKind,
) -> Reply {
    let user = authenticate(state, headers).await?;
    let changes = body.into_changes(kind)?;
    let task = state.store.update_task(user.id, id, changes).await?;
    tracing::info!(task = task.id, "task updated");
    let behavior = state.behavior().await;
    let tags = state.store.tags().await;
    Ok(Json(render_task(&task, &tags, &behavior)).into_response())
}

async fn patch_task(
    State(state): State<Arc<StubState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(body): Json<TaskBody>,
) -> Reply {
    match state.behavior().await.update_methods {
        UpdateMethods::PutOnly => return Err(Failure::bare(StatusCode::METHOD_NOT_ALLOWED)),
        UpdateMethods::ExpressPutOnly => {
            return Ok(missing_route("PATCH", &format!("/tasks/{id}")));
        }
        UpdateMethods::Both | UpdateMethods::PatchOnly => {}
    }
    update_task(&state, &headers, id, body, BodyKind::Patch).await
}

async fn put_task(
    State(state): State<Arc<StubState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(body): Json<TaskBody>,
) -> Reply {
    if state.behavior().await.update_methods == UpdateMethods::PatchOnly {
        return Err(Failure::bare(StatusCode::METHOD_NOT_ALLOWED));
    }
    update_task(&state, &headers, id, body, BodyKind::Replace).await
}

async fn delete_task(
    State(state): State<Arc<StubState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Reply {
    let user = authenticate(&state, &headers).await?;
    state.store.delete_task(user.id, id).await?;
    tracing::info!(task = id, "task deleted");
    Ok(StatusCode::NO_CONTENT.into_response())
}

async fn shared_tasks(State(state): State<Arc<StubState>>, headers: HeaderMap) -> Reply {
    let user = authenticate(&state, &headers).await?;
    let behavior = state.behavior().await;
    let tags = state.store.tags().await;
    let items = state
        .store
        .shared_with(user.id)
        .await
        .iter()
        .map(|(task, role)| {
            let rendered = render_task(task, &tags, &behavior);
            match behavior.tag_style {
                TagStyle::Array => json!({ "task": rendered, "role": role }),
                TagStyle::Single => {
                    let mut flat = rendered;
                    flat["role"] = json!(role);
                    flat
                }
            }
        })
        .collect();
    Ok(render_list("tasks", items, &behavior))
}

async fn list_collaborators(
    State(state): State<Arc<StubState>>,
    headers: HeaderMap,
    Path(task): Path<i64>,
) -> Reply {
    let behavior = state.behavior().await;
    if !behavior.collaborator_listing {
        return Ok(missing_route("GET", &format!("/tasks/{task}/collaborators")));
    }
    let user = authenticate(&state, &headers).await?;
    let grants = state.store.collaborators(user.id, task).await?;
    Ok(render_list(
        "collaborators",
        grants.iter().map(render_grant).collect(),
        &behavior,
    ))
}

async fn add_collaborator(
    State(state): State<Arc<StubState>>,
    headers: HeaderMap,
    Path(task): Path<i64>,
    Json(body): Json<CollaboratorBody>,
) -> Reply {
    let user = authenticate(&state, &headers).await?;
    if !body.email.contains('@') {
        return Err(Failure::fields(&[(
            "email",
            "A valid email is required".to_string(),
        )]));
    }
    let role = body
        .role
        .filter(|r| !r.trim().is_empty())
        .unwrap_or_else(|| "collaborator".to_string());
    let grant = state
        .store
        .add_collaborator(user.id, task, body.email.trim(), &role)
        .await?;
    tracing::info!(task, collaborator = grant.user.id, "collaborator added");
    Ok((StatusCode::CREATED, Json(render_grant(&grant))).into_response())
}

async fn remove_collaborator(
    State(state): State<Arc<StubState>>,
    headers: HeaderMap,
    Path((task, collaborator)): Path<(i64, i64)>,
) -> Reply {
    if !state.behavior().await.collaborator_removal {
        return Ok(missing_route(
            "DELETE",
            &format!("/tasks/{task}/collaborators/{collaborator}"),
        ));
    }
    let user = authenticate(&state, &headers).await?;
    state
        .store
        .remove_collaborator(user.id, task, collaborator)
        .await?;
    tracing::info!(task, collaborator, "collaborator removed");
    Ok(StatusCode::NO_CONTENT.into_response())
}

/// Counts requests and serves the outage page while one is set.
async fn fault_layer(State(state): State<Arc<StubState>>, request: Request, next: Next) -> Response {
    state.requests.fetch_add(1, Ordering::SeqCst);
    tracing::debug!(method = %request.method(), path = %request.uri().path(), "request");
    if let Some(outage) = state.behavior().await.outage {
        let status = StatusCode::from_u16(outage.status).unwrap_or(StatusCode::SERVICE_UNAVAILABLE);
        return (
            status,
            [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
            outage.body,
        )
            .into_response();
    }
    next.run(request).await
}

fn api_routes() -> Router<Arc<StubState>> {
    Router::new()
        .route("/tags", get(list_tags))
        .route("/users", post(sign_up))
        .route("/auth/sign-in", post(sign_in))
        .route("/tasks", post(create_task))
        .route("/tasks/user", get(own_tasks))
        .route("/tasks/collaborative", get(shared_tasks))
        .route(
            "/tasks/{id}",
            axum::routing::patch(patch_task).put(put_task).delete(delete_task),
        )
        .route(
            "/tasks/{id}/collaborators",
            get(list_collaborators).post(add_collaborator),
        )
        .route(
            "/tasks/{id}/collaborators/{user_id}",
            axum::routing::delete(remove_collaborator),
        )
}

/// Builds the router for `state`.
pub fn router(state: Arc<StubState>) -> Router {
    Router::new()
        .merge(api_routes())
        .nest("/api/v1", api_routes())
        .layer(middleware::from_fn_with_state(Arc::clone(&state), fault_layer))
        .with_state(state)
}

/// Starts the stub server on the given address with default behavior.
///
/// Returns the actual bound address and a handle to the server task.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server(
    addr: &str,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    start_server_with_state(addr, Arc::new(StubState::default())).await
}

/// Starts the stub server with a pre-configured [`StubState`].
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server_with_state(
    addr: &str,
    state: Arc<StubState>,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "stub server error");
        }
    });

    Ok((bound_addr, handle))
}
