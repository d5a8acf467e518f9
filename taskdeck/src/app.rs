//! Application facade: bootstrap, authentication and the caches.
//!
//! [`App::bootstrap`] builds the client, loads the session and runs the
//! health gate. A healthy backend yields [`Bootstrap::Ready`]; otherwise
//! [`Bootstrap::Unavailable`] carries what is needed to run the whole
//! bootstrap again.

use std::fmt;
use std::sync::Arc;

use taskdeck_proto::auth::{CreateAccount, SignIn};

use crate::api::{ApiClient, ApiError};
use crate::cache::{CollaboratorCache, SharedTaskCache, TagCache, TaskCache};
use crate::config::ApiConfig;
use crate::health::{HealthFailure, HealthGate, HealthState};
use crate::session::{SessionStorage, SessionStore};

/// Shown after a successful sign-up.
pub const ACCOUNT_CREATED: &str = "Account created successfully! Please sign in.";

/// Severity of a [`Notice`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    /// The operation succeeded.
    Success,
    /// Informational; nothing failed.
    Info,
    /// The operation failed.
    Error,
}

impl NoticeLevel {
    /// Prefix symbol for terminal output.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Success => "✓",
            Self::Info => "ℹ",
            Self::Error => "✗",
        }
    }
}

/// One user-facing notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    /// Severity.
    pub level: NoticeLevel,
    /// Text to show.
    pub message: String,
}

impl Notice {
    /// A success notice.
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            message: message.into(),
        }
    }

    /// An informational notice.
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    /// An error notice.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }

    /// The notice for a failed operation. Unsupported operations are
    /// informational, not failures.
    #[must_use]
    pub fn from_error(err: &ApiError) -> Self {
        match err {
            ApiError::Unsupported { .. } => Self::info(err.user_message()),
            _ => Self::error(err.user_message()),
        }
    }

    /// Whether this notice reports a failure.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.level == NoticeLevel::Error
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.level.symbol(), self.message)
    }
}

/// Outcome of [`App::bootstrap`].
pub enum Bootstrap {
    /// The backend is healthy.
    Ready(App),
    /// The health probe failed.
    Unavailable(Unavailable),
}

/// A failed bootstrap, with the inputs to try again.
pub struct Unavailable {
    failure: HealthFailure,
    config: ApiConfig,
    storage: Arc<dyn SessionStorage>,
}

impl Unavailable {
    /// Why the backend was judged unhealthy.
    #[must_use]
    pub const fn failure(&self) -> &HealthFailure {
        &self.failure
    }

    /// The notice to show on the unavailable screen.
    #[must_use]
    pub fn notice(&self) -> Notice {
        Notice::error(self.failure.to_string())
    }

    /// Runs the full bootstrap again: new client, reloaded session, new
    /// health gate.
    ///
    /// # Errors
    ///
    /// As [`App::bootstrap`].
    pub async fn retry(self) -> Result<Bootstrap, ApiError> {
        tracing::info!("retrying bootstrap");
        App::bootstrap(self.config, self.storage).await
    }
}

/// A bootstrapped client.
pub struct App {
    api: Arc<ApiClient>,
    session: Arc<SessionStore>,
    health: HealthGate,
    /// The caller's tasks.
    pub tasks: TaskCache,
    /// Tasks shared with the caller.
    pub shared: SharedTaskCache,
    /// Tags.
    pub tags: TagCache,
    /// Per-task collaborators.
    pub collaborators: CollaboratorCache,
}

impl App {
    /// Builds the client and runs the health gate.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Network`] if the HTTP client cannot be built.
    /// An unhealthy backend is not an error; it is
    /// [`Bootstrap::Unavailable`].
    pub async fn bootstrap(
        config: ApiConfig,
        storage: Arc<dyn SessionStorage>,
    ) -> Result<Bootstrap, ApiError> {
        let app = Self::new(&config, Arc::clone(&storage))?;
        match app.health.check(&app.api).await {
            Ok(()) => Ok(Bootstrap::Ready(app)),
            Err(failure) => Ok(Bootstrap::Unavailable(Unavailable {
                failure,
                config,
                storage,
            })),
        }
    }

    fn new(config: &ApiConfig, storage: Arc<dyn SessionStorage>) -> Result<Self, ApiError> {
        let api = Arc::new(ApiClient::new(config)?);
        let session = Arc::new(SessionStore::load(storage));
        Ok(Self {
            tasks: TaskCache::new(Arc::clone(&api), Arc::clone(&session)),
            shared: SharedTaskCache::new(Arc::clone(&api), Arc::clone(&session)),
            tags: TagCache::new(Arc::clone(&api)),
            collaborators: CollaboratorCache::new(Arc::clone(&api), Arc::clone(&session)),
            health: HealthGate::new(),
            api,
            session,
        })
    }

    /// The session store.
    #[must_use]
    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    /// The API client.
    #[must_use]
    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    /// State of this bootstrap's health gate.
    #[must_use]
    pub fn health(&self) -> HealthState {
        self.health.state()
    }

    /// Creates an account. Does not sign in.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Validation`] for bad input before any request,
    /// or the error of the request.
    pub async fn sign_up(&self, account: &CreateAccount) -> Result<Notice, ApiError> {
        account.validate()?;
        self.api.create_account(account).await?;
        tracing::info!("account created");
        Ok(Notice::success(ACCOUNT_CREATED))
    }

    /// Signs in and stores the token.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Validation`] for bad input before any request,
    /// [`ApiError::MissingToken`] when the server accepted the credentials
    /// without returning a token, or the error of the request. The session
    /// is unchanged on error.
    pub async fn sign_in(&self, credentials: &SignIn) -> Result<(), ApiError> {
        credentials.validate()?;
        let response = self.api.sign_in(credentials).await?;
        let token = response
            .token
            .filter(|t| !t.trim().is_empty())
            .ok_or(ApiError::MissingToken)?;
        self.session.sign_in(token);
        Ok(())
    }

    /// Clears the session and every cached collection.
    pub fn logout(&self) {
        self.session.logout();
        self.tasks.clear();
        self.shared.clear();
        self.collaborators.clear();
    }

    /// Refreshes tasks and tags concurrently; both finish before this
    /// returns.
    pub async fn load_dashboard(&self) -> DashboardLoad {
        let (tasks, tags) =
            futures_util::future::join(self.tasks.refresh(), self.tags.refresh()).await;
        DashboardLoad { tasks, tags }
    }
}

/// Results of [`App::load_dashboard`].
#[derive(Debug)]
pub struct DashboardLoad {
    /// Outcome of the task refresh.
    pub tasks: Result<(), ApiError>,
    /// Outcome of the tag refresh.
    pub tags: Result<(), ApiError>,
}

impl DashboardLoad {
    /// Notices for whatever failed.
    #[must_use]
    pub fn notices(&self) -> Vec<Notice> {
        [&self.tasks, &self.tags]
            .into_iter()
            .filter_map(|r| r.as_ref().err())
            .map(Notice::from_error)
            .collect()
    }
}
