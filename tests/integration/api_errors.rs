// Test-specific lint overrides: integration tests use unwrap/expect freely,
// and some pedantic/nursery lints are not appropriate for test code.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::doc_markdown,
    clippy::future_not_send,
    clippy::missing_panics_doc
)]

//! Integration tests for failure classification over real HTTP.
//!
//! Each failure category the client distinguishes (validation, application
//! message, non-JSON page, timeout, unreachable host, missing session) is
//! provoked against the stub backend and checked for its user text.

use std::sync::Arc;
use std::time::Duration;

use taskdeck::api::{ApiClient, ApiError};
use taskdeck::app::{App, Bootstrap, Notice, NoticeLevel};
use taskdeck::config::{ApiConfig, Environment};
use taskdeck::session::MemoryStorage;
use taskdeck_proto::auth::CreateAccount;
use taskdeck_proto::ids::{TagId, TaskId};
use taskdeck_proto::task::{NewTask, TaskStatus};
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

fn client(base: &str) -> ApiClient {
    ApiClient::new(&ApiConfig::new(base, Environment::Development).unwrap()).unwrap()
}

async fn ready_app(base: &str) -> App {
    let config = ApiConfig::new(base, Environment::Development).unwrap();
    match App::bootstrap(config, Arc::new(MemoryStorage::new()))
        .await
        .unwrap()
    {
        Bootstrap::Ready(app) => app,
        Bootstrap::Unavailable(u) => panic!("backend unavailable: {}", u.failure()),
    }
}

// =============================================================================
// Server-reported errors
// =============================================================================

#[tokio::test]
async fn server_field_errors_become_validation() {
    let (_state, base) = start_stub(Behavior::full()).await;
    let api = client(&base);

    // Passes local checks; the server wants a longer password.
    let err = api
        .create_account(&CreateAccount {
            username: "ada".to_string(),
            email: "a@b.com".to_string(),
            password: "abc".to_string(),
        })
        .await
        .unwrap_err();

    match &err {
        ApiError::Validation { status, fields } => {
            assert_eq!(*status, Some(422));
            assert_eq!(fields.len(), 1);
            assert_eq!(fields[0].field, "password");
        }
        other => panic!("expected validation error, got {other:?}"),
    }
    assert_eq!(
        err.user_message(),
        "password: Password must be at least 6 characters"
    );
}

#[tokio::test]
async fn every_server_field_error_is_shown() {
    let (state, base) = start_stub(Behavior::full()).await;
    let (_, token) = state.seed_user("ada", "a@b.com", "secret1A").await.unwrap();
    let api = client(&base);

    // Bypasses the cache so local validation does not run.
    let err = api
        .create_task(
            &token,
            &NewTask {
                title: "x".to_string(),
                content: "tiny".to_string(),
                tag_id: TagId::new(1),
                status: TaskStatus::Pending,
            },
        )
        .await
        .unwrap_err();

    let message = err.user_message();
    assert!(message.contains("title:"), "{message}");
    assert!(message.contains("content:"), "{message}");
}

#[tokio::test]
async fn server_message_is_shown_verbatim() {
    let (state, base) = start_stub(Behavior::full()).await;
    let (_, token) = state.seed_user("ada", "a@b.com", "secret1A").await.unwrap();
    let api = client(&base);

    let err = api
        .delete_task(&token, &TaskId::from(999))
        .await
        .unwrap_err();

    assert!(matches!(err, ApiError::Application { status: 404, .. }));
    assert_eq!(err.user_message(), "Task not found");
    assert!(!err.is_transient());
}

#[tokio::test]
async fn foreign_task_is_forbidden() {
    let (state, base) = start_stub(Behavior::full()).await;
    let (owner, _) = state.seed_user("ada", "a@b.com", "secret1A").await.unwrap();
    let (_, intruder) = state.seed_user("eve", "e@b.com", "secret1A").await.unwrap();
    let task = state
        .store
        .create_task(owner.id, "Mine", "not yours", 1, TaskStatus::Pending)
        .await
        .unwrap();
    let api = client(&base);

    let err = api
        .delete_task(&intruder, &TaskId::from(task.id))
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(403));
    assert_eq!(err.user_message(), "You do not own this task");
}

// =============================================================================
// Authentication
// =============================================================================

#[tokio::test]
async fn public_routes_need_no_token() {
    let (_state, base) = start_stub(Behavior::full()).await;
    let tags = client(&base).list_tags().await.unwrap();
    let names: Vec<_> = tags.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, ["Work", "Personal", "Urgent"]);
}

#[tokio::test]
async fn bad_token_is_rejected_by_the_server() {
    let (_state, base) = start_stub(Behavior::full()).await;
    let err = client(&base).list_own_tasks("forged").await.unwrap_err();
    assert_eq!(err.status(), Some(401));
    assert_eq!(err.user_message(), "Unauthorized");
}

#[tokio::test]
async fn protected_calls_without_session_send_nothing() {
    let (state, base) = start_stub(Behavior::full()).await;
    let app = ready_app(&base).await;
    let before = state.requests();

    let err = app.tasks.refresh().await.unwrap_err();
    assert!(matches!(err, ApiError::NotAuthenticated));
    let err = app.shared.refresh().await.unwrap_err();
    assert!(matches!(err, ApiError::NotAuthenticated));

    assert_eq!(state.requests(), before);
}

// =============================================================================
// Transport and protocol failures
// =============================================================================

#[tokio::test]
async fn html_error_page_is_a_protocol_error() {
    let (state, base) = start_stub(Behavior::full()).await;
    state
        .set_behavior(|b| b.outage = Some(Outage::html(502, "<html>Bad Gateway</html>")))
        .await;

    let err = client(&base).list_tags().await.unwrap_err();

    match &err {
        ApiError::Protocol {
            status, snippet, ..
        } => {
            assert_eq!(*status, 502);
            assert!(snippet.contains("Bad Gateway"));
        }
        other => panic!("expected protocol error, got {other:?}"),
    }
    assert!(err.is_transient());
    assert_eq!(Notice::from_error(&err).level, NoticeLevel::Error);
}

#[tokio::test]
async fn slow_response_times_out() {
    let behavior = Behavior {
        tags_delay: Some(Duration::from_secs(2)),
        ..Behavior::full()
    };
    let (_state, base) = start_stub(behavior).await;
    let config = ApiConfig::new(&base, Environment::Development)
        .unwrap()
        .with_request_timeout(Duration::from_millis(200));
    let api = ApiClient::new(&config).unwrap();

    let err = api.list_tags().await.unwrap_err();

    assert!(matches!(err, ApiError::Timeout), "got {err:?}");
    assert!(err.is_transient());
}

#[tokio::test]
async fn unreachable_host_is_a_network_error() {
    // Bind then drop to get a port with nothing listening.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = client(&format!("http://{addr}")).list_tags().await.unwrap_err();

    assert!(matches!(err, ApiError::Network { .. }), "got {err:?}");
    assert_eq!(
        err.user_message(),
        "Cannot connect to server. Please check your internet connection."
    );
}
