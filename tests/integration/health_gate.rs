// Test-specific lint overrides: integration tests use unwrap/expect freely,
// and some pedantic/nursery lints are not appropriate for test code.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::doc_markdown,
    clippy::future_not_send,
    clippy::missing_panics_doc
)]

//! Integration tests for the startup health gate.
//!
//! The gate probes `GET /tags` once per bootstrap. A slow or cold-starting
//! backend yields an unavailable screen whose retry runs the whole
//! bootstrap again.

use std::sync::Arc;
use std::time::Duration;

use taskdeck::api::STARTING_UP;
use taskdeck::app::{App, Bootstrap, Unavailable};
use taskdeck::config::{ApiConfig, Environment};
use taskdeck::health::{HealthFailure, HealthState};
use taskdeck::session::MemoryStorage;
use taskdeck_stub::server::{Behavior, Outage, StubState, start_server_with_state};

// =============================================================================
// Helpers
// =============================================================================

async fn start_stub(behavior: Behavior) -> (Arc<StubState>, String) {
    let state = Arc::new(StubState::new(behavior));
    let (addr, _handle) = start_server_with_state("127.0.0.1:0", Arc::clone(&state))
        .await
        .expect("stub should start");
    (state, format!("http://{addr}"))
}

fn config(base: &str) -> ApiConfig {
    ApiConfig::new(base, Environment::Development)
        .unwrap()
        .with_health_timeout(Duration::from_millis(300))
}

async fn bootstrap(config: ApiConfig) -> Bootstrap {
    App::bootstrap(config, Arc::new(MemoryStorage::new()))
        .await
        .unwrap()
}

fn expect_unavailable(outcome: Bootstrap) -> Unavailable {
    match outcome {
        Bootstrap::Unavailable(u) => u,
        Bootstrap::Ready(_) => panic!("expected the backend to be unavailable"),
    }
}

fn expect_ready(outcome: Bootstrap) -> App {
    match outcome {
        Bootstrap::Ready(app) => app,
        Bootstrap::Unavailable(u) => panic!("backend unavailable: {}", u.failure()),
    }
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn healthy_backend_opens_the_gate_with_one_request() {
    let (state, base) = start_stub(Behavior::full()).await;

    let app = expect_ready(bootstrap(config(&base)).await);

    assert_eq!(app.health(), HealthState::Healthy);
    assert!(app.health().is_healthy());
    assert_eq!(state.requests(), 1);
}

#[tokio::test]
async fn health_timeout_means_starting_up() {
    let behavior = Behavior {
        tags_delay: Some(Duration::from_secs(3)),
        ..Behavior::full()
    };
    let (_state, base) = start_stub(behavior).await;

    let unavailable = expect_unavailable(bootstrap(config(&base)).await);

    assert_eq!(unavailable.failure(), &HealthFailure::StartingUp);
    assert_eq!(unavailable.notice().message, STARTING_UP);
    assert!(unavailable.notice().is_error());
}

#[tokio::test]
async fn cold_start_page_means_starting_up() {
    let behavior = Behavior {
        outage: Some(Outage::application_error()),
        ..Behavior::full()
    };
    let (_state, base) = start_stub(behavior).await;

    let unavailable = expect_unavailable(bootstrap(config(&base)).await);

    assert_eq!(unavailable.failure(), &HealthFailure::StartingUp);
}

#[tokio::test]
async fn non_json_success_is_not_healthy() {
    let behavior = Behavior {
        outage: Some(Outage::html(200, "<html>Parked domain</html>")),
        ..Behavior::full()
    };
    let (_state, base) = start_stub(behavior).await;

    let unavailable = expect_unavailable(bootstrap(config(&base)).await);

    assert!(
        matches!(unavailable.failure(), HealthFailure::BadResponse(_)),
        "got {:?}",
        unavailable.failure()
    );
}

#[tokio::test]
async fn unreachable_backend_says_so() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let unavailable = expect_unavailable(bootstrap(config(&format!("http://{addr}"))).await);

    assert!(matches!(unavailable.failure(), HealthFailure::Unreachable(_)));
    assert_eq!(
        unavailable.notice().message,
        "Backend connection failed. Please wait and retry."
    );
}

#[tokio::test]
async fn retry_succeeds_once_the_backend_is_up() {
    let behavior = Behavior {
        outage: Some(Outage::application_error()),
        ..Behavior::full()
    };
    let (state, base) = start_stub(behavior).await;

    let unavailable = expect_unavailable(bootstrap(config(&base)).await);
    let still_down = expect_unavailable(unavailable.retry().await.unwrap());
    assert_eq!(state.requests(), 2);

    state.set_behavior(|b| b.outage = None).await;
    let app = expect_ready(still_down.retry().await.unwrap());

    assert!(app.health().is_healthy());
    assert_eq!(state.requests(), 3);
    app.tags.refresh().await.unwrap();
    assert_eq!(app.tags.tags().len(), 3);
}
