//! Session store: the bearer token and logged-in flag.
//!
//! One [`SessionStore`] exists per running client. Its state is only
//! changed through [`SessionStore::sign_in`] and [`SessionStore::logout`];
//! every change is persisted through a [`SessionStorage`] backend and
//! broadcast to subscribers.
//!
//! # Invariant
//!
//! `is_logged_in() == token().is_some()` at all times, including after a
//! load from storage whose record disagrees with itself.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::watch;

/// Key the session record is stored under.
pub const STORAGE_KEY: &str = "session";

/// Authentication state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    token: Option<String>,
}

impl Session {
    /// A session holding `token`.
    pub fn authenticated(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
        }
    }

    /// The empty session.
    #[must_use]
    pub const fn anonymous() -> Self {
        Self { token: None }
    }

    /// Bearer token, if signed in.
    #[must_use]
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Whether a token is held.
    #[must_use]
    pub const fn is_logged_in(&self) -> bool {
        self.token.is_some()
    }

    fn to_record(&self) -> SessionRecord {
        SessionRecord {
            token: self.token.clone(),
            is_logged_in: self.is_logged_in(),
        }
    }
}

/// Persisted form: `{"token": ..., "isLoggedIn": ...}`.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct SessionRecord {
    token: Option<String>,
    is_logged_in: bool,
}

impl From<SessionRecord> for Session {
    fn from(record: SessionRecord) -> Self {
        // The token is authoritative; a stray flag without one is dropped.
        Self {
            token: record.token.filter(|t| !t.is_empty()),
        }
    }
}

/// Errors from a session storage backend.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Reading or writing the backing file failed.
    #[error("session storage I/O error at {path}: {source}")]
    Io {
        /// File involved.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The stored data is not valid JSON.
    #[error("session storage is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Durable key/value storage for client state.
pub trait SessionStorage: Send + Sync {
    /// Reads the value under `key`, if present.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] when the backend cannot be read.
    fn load(&self, key: &str) -> Result<Option<Value>, SessionError>;

    /// Writes `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] when the backend cannot be written.
    fn save(&self, key: &str, value: Value) -> Result<(), SessionError>;
}

/// Storage that lives only as long as the process.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, Value>>,
}

impl MemoryStorage {
    /// Creates empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStorage for MemoryStorage {
    fn load(&self, key: &str) -> Result<Option<Value>, SessionError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn save(&self, key: &str, value: Value) -> Result<(), SessionError> {
        self.entries.lock().insert(key.to_string(), value);
        Ok(())
    }
}

/// Storage backed by one JSON object file, one entry per key.
///
/// Writes go to a sibling temp file first and are renamed into place, so
/// a crash never leaves a half-written session behind.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStorage {
    /// Storage at `path`. The file and its parent are created on first save.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// The backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<serde_json::Map<String, Value>, SessionError> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) if contents.trim().is_empty() => Ok(serde_json::Map::new()),
            Ok(contents) => match serde_json::from_str(&contents)? {
                Value::Object(map) => Ok(map),
                _ => Ok(serde_json::Map::new()),
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(serde_json::Map::new()),
            Err(e) => Err(self.io_error(e)),
        }
    }

    fn io_error(&self, source: std::io::Error) -> SessionError {
        SessionError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl SessionStorage for FileStorage {
    fn load(&self, key: &str) -> Result<Option<Value>, SessionError> {
        Ok(self.read_all()?.remove(key))
    }

    fn save(&self, key: &str, value: Value) -> Result<(), SessionError> {
        let _guard = self.write_lock.lock();
        let mut all = self.read_all()?;
        all.insert(key.to_string(), value);

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }
        let tmp = self.path.with_extension("json.tmp");
        let contents = serde_json::to_vec_pretty(&Value::Object(all))?;
        std::fs::write(&tmp, contents).map_err(|e| self.io_error(e))?;
        restrict_permissions(&tmp).map_err(|e| self.io_error(e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| self.io_error(e))
    }
}

/// The token is a credential; keep the file private to the user.
#[cfg(unix)]
fn restrict_permissions(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

/// Process-wide holder of the current [`Session`].
pub struct SessionStore {
    storage: Arc<dyn SessionStorage>,
    tx: watch::Sender<Session>,
}

impl SessionStore {
    /// Loads the persisted session, or starts anonymous.
    ///
    /// Unreadable or corrupt storage is logged and treated as empty.
    #[must_use]
    pub fn load(storage: Arc<dyn SessionStorage>) -> Self {
        let initial = match storage.load(STORAGE_KEY) {
            Ok(Some(value)) => serde_json::from_value::<SessionRecord>(value)
                .map(Session::from)
                .unwrap_or_else(|e| {
                    tracing::warn!(error = %e, "ignoring malformed session record");
                    Session::anonymous()
                }),
            Ok(None) => Session::anonymous(),
            Err(e) => {
                tracing::warn!(error = %e, "failed to load session, starting signed out");
                Session::anonymous()
            }
        };
        tracing::debug!(logged_in = initial.is_logged_in(), "session loaded");
        let (tx, _rx) = watch::channel(initial);
        Self { storage, tx }
    }

    /// A store with no durable backing.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::load(Arc::new(MemoryStorage::new()))
    }

    /// Snapshot of the current session.
    #[must_use]
    pub fn current(&self) -> Session {
        self.tx.borrow().clone()
    }

    /// The bearer token, if signed in.
    #[must_use]
    pub fn token(&self) -> Option<String> {
        self.tx.borrow().token.clone()
    }

    /// Whether a token is held.
    #[must_use]
    pub fn is_logged_in(&self) -> bool {
        self.tx.borrow().is_logged_in()
    }

    /// Stores `token` and marks the session logged in.
    ///
    /// The caller is responsible for having obtained a valid token.
    pub fn sign_in(&self, token: impl Into<String>) {
        self.replace(Session::authenticated(token));
        tracing::info!("signed in");
    }

    /// Clears the token and the logged-in flag.
    pub fn logout(&self) {
        self.replace(Session::anonymous());
        tracing::info!("signed out");
    }

    /// Receiver that observes every session change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.tx.subscribe()
    }

    fn replace(&self, session: Session) {
        let record = session.to_record();
        self.tx.send_replace(session);
        let persisted = serde_json::to_value(record)
            .map_err(SessionError::from)
            .and_then(|value| self.storage.save(STORAGE_KEY, value));
        if let Err(e) = persisted {
            // In-memory state stays authoritative for this process.
            tracing::warn!(error = %e, "failed to persist session");
        }
    }
}
