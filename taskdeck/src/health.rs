//! One-shot liveness probe run before anything else talks to the backend.
//!
//! ```text
//! Checking ──probe──▶ Healthy
//!     │
//!     └──────────────▶ Unhealthy(reason)
//! ```
//!
//! Both outcomes are terminal for the gate; probing again means building a
//! new gate, which [`crate::app::Unavailable::retry`] does as part of a full
//! bootstrap.

use std::fmt;

use tokio::sync::OnceCell;

use crate::api::endpoints::HEALTH_PATH;
use crate::api::{ApiClient, ApiError, STARTING_UP};

/// Why the backend was judged unhealthy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthFailure {
    /// The probe hit its time bound; the backend is probably cold-starting.
    StartingUp,
    /// The backend could not be reached at all.
    Unreachable(String),
    /// The backend answered, but not with a 2xx JSON response.
    BadResponse(String),
}

impl HealthFailure {
    fn from_error(err: &ApiError) -> Self {
        match err {
            ApiError::Timeout => Self::StartingUp,
            ApiError::Protocol { message, .. } if *message == STARTING_UP => Self::StartingUp,
            ApiError::Network { reason } => Self::Unreachable(reason.clone()),
            other => Self::BadResponse(other.to_string()),
        }
    }
}

impl fmt::Display for HealthFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StartingUp => f.write_str(STARTING_UP),
            Self::Unreachable(_) => f.write_str("Backend connection failed. Please wait and retry."),
            Self::BadResponse(detail) => write!(f, "Backend is not responding correctly: {detail}"),
        }
    }
}

/// State of the health gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthState {
    /// Probe not finished.
    Checking,
    /// The backend answered the probe with 2xx JSON.
    Healthy,
    /// The probe failed.
    Unhealthy(HealthFailure),
}

impl HealthState {
    /// Whether the gate is open.
    #[must_use]
    pub const fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }
}

/// Runs the probe at most once and remembers the outcome.
#[derive(Debug, Default)]
pub struct HealthGate {
    outcome: OnceCell<Result<(), HealthFailure>>,
}

impl HealthGate {
    /// A gate that has not probed yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state without probing.
    #[must_use]
    pub fn state(&self) -> HealthState {
        match self.outcome.get() {
            None => HealthState::Checking,
            Some(Ok(())) => HealthState::Healthy,
            Some(Err(failure)) => HealthState::Unhealthy(failure.clone()),
        }
    }

    /// Probes `GET /tags` on first call; later calls return the stored
    /// outcome. Concurrent first calls share one probe.
    ///
    /// # Errors
    ///
    /// Returns the [`HealthFailure`] when the backend is unhealthy.
    pub async fn check(&self, api: &ApiClient) -> Result<(), HealthFailure> {
        self.outcome
            .get_or_init(|| async {
                tracing::info!(url = %api.base_url(), "probing backend health");
                match api.probe(HEALTH_PATH).await {
                    Ok(()) => {
                        tracing::info!("backend healthy");
                        Ok(())
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, status = e.status(), "backend unhealthy");
                        Err(HealthFailure::from_error(&e))
                    }
                }
            })
            .await
            .clone()
    }
}
