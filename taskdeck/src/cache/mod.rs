//! Client-side mirrors of server collections.
//!
//! Every cache is fetch-all, replace-all: a refresh swaps in the whole
//! collection on success and leaves it untouched on failure. Mutations go
//! to the server first and only a confirmed success triggers a refresh;
//! nothing is changed locally ahead of the server.
//!
//! Refreshes are numbered. A result is applied only if no newer refresh
//! has already been applied, so overlapping refreshes settle on the
//! latest issued one that succeeded.

mod collaborators;
mod tags;
mod tasks;

pub use collaborators::{CollaboratorCache, ShareFailure, ShareReport};
pub use tags::TagCache;
pub use tasks::{SharedTaskCache, TaskCache, TaskStats};

use std::future::Future;

use parking_lot::Mutex;

use crate::api::ApiError;
use crate::session::SessionStore;

/// What happened to the collection after a successful mutation.
#[derive(Debug)]
#[must_use]
pub enum Synced {
    /// The follow-up refresh succeeded; the cache matches the server.
    Fresh,
    /// The mutation succeeded but the refresh failed; the cache still
    /// shows the previous collection.
    Stale(ApiError),
}

impl Synced {
    /// Whether the follow-up refresh succeeded.
    #[must_use]
    pub const fn is_fresh(&self) -> bool {
        matches!(self, Self::Fresh)
    }
}

/// Outcome of a refresh whose fetch succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// The result replaced the collection.
    Replaced,
    /// A newer refresh had already been applied; the result was dropped.
    Superseded,
}

#[derive(Debug)]
struct CacheState<T> {
    items: Vec<T>,
    /// Generation handed to the most recently started refresh.
    issued: u64,
    /// Generation of the result currently held; 0 before the first load.
    applied: u64,
    in_flight: usize,
}

/// A replace-all collection with a loading flag and a generation guard.
///
/// The lock is never held across an `.await`.
#[derive(Debug)]
pub struct ResourceCache<T> {
    state: Mutex<CacheState<T>>,
}

impl<T> Default for ResourceCache<T> {
    fn default() -> Self {
        Self {
            state: Mutex::new(CacheState {
                items: Vec::new(),
                issued: 0,
                applied: 0,
                in_flight: 0,
            }),
        }
    }
}

impl<T: Clone> ResourceCache<T> {
    /// Creates an empty, never-loaded cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the current collection.
    #[must_use]
    pub fn items(&self) -> Vec<T> {
        self.state.lock().items.clone()
    }

    /// Runs `f` over the current collection without copying it.
    pub fn with_items<R>(&self, f: impl FnOnce(&[T]) -> R) -> R {
        f(&self.state.lock().items)
    }

    /// Whether a refresh or a mutation is in flight.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.state.lock().in_flight > 0
    }

    /// Raises the loading flag until the returned guard is dropped. Held
    /// by mutations around their request.
    pub fn begin_mutation(&self) -> LoadingGuard<'_, T> {
        self.state.lock().in_flight += 1;
        LoadingGuard { cache: self }
    }

    /// Whether any refresh has ever been applied.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.state.lock().applied > 0
    }

    /// Empties the collection, e.g. on logout. In-flight refreshes
    /// started before the clear are discarded.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.items.clear();
        state.applied = state.issued;
    }

    /// Fetches with `fetch` and replaces the collection on success.
    ///
    /// # Errors
    ///
    /// Returns the fetch error; the collection is left as it was.
    pub async fn refresh_with<F>(&self, fetch: F) -> Result<Applied, ApiError>
    where
        F: Future<Output = Result<Vec<T>, ApiError>>,
    {
        let ticket = self.begin();
        let result = fetch.await;
        drop(ticket.guard);
        result.map(|items| self.apply(ticket.generation, items))
    }

    fn begin(&self) -> Ticket<'_, T> {
        let mut state = self.state.lock();
        state.issued += 1;
        state.in_flight += 1;
        Ticket {
            generation: state.issued,
            guard: LoadingGuard { cache: self },
        }
    }

    fn apply(&self, generation: u64, items: Vec<T>) -> Applied {
        let mut state = self.state.lock();
        if generation > state.applied {
            state.items = items;
            state.applied = generation;
            Applied::Replaced
        } else {
            tracing::debug!(
                generation,
                applied = state.applied,
                "discarding superseded refresh"
            );
            Applied::Superseded
        }
    }
}

struct Ticket<'a, T> {
    generation: u64,
    guard: LoadingGuard<'a, T>,
}

/// Lowers the loading flag on drop, even if the request future is dropped
/// mid-await.
#[must_use = "the loading flag is lowered as soon as the guard is dropped"]
pub struct LoadingGuard<'a, T> {
    cache: &'a ResourceCache<T>,
}

impl<T> Drop for LoadingGuard<'_, T> {
    fn drop(&mut self) {
        let mut state = self.cache.state.lock();
        state.in_flight = state.in_flight.saturating_sub(1);
    }
}

/// The bearer token, or [`ApiError::NotAuthenticated`].
fn require_token(session: &SessionStore) -> Result<String, ApiError> {
    session.token().ok_or(ApiError::NotAuthenticated)
}

/// Runs the follow-up refresh of a confirmed mutation.
async fn settle<F>(refresh: F) -> Synced
where
    F: Future<Output = Result<(), ApiError>>,
{
    match refresh.await {
        Ok(()) => Synced::Fresh,
        Err(e) => {
            tracing::warn!(error = %e, "refresh after mutation failed");
            Synced::Stale(e)
        }
    }
}
