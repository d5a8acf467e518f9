// Test-specific lint overrides: integration tests use unwrap/expect freely,
// and some pedantic/nursery lints are not appropriate for test code.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::doc_markdown,
    clippy::future_not_send,
    clippy::missing_panics_doc
)]

//! Integration tests for sharing tasks with collaborators.
//!
//! Deployments differ in which collaborator routes exist; the stub can
//! drop the listing and removal routes to check the client degrades
//! instead of failing.

use std::sync::Arc;

use taskdeck::api::ApiError;
use taskdeck::app::{App, Bootstrap, Notice, NoticeLevel};
use taskdeck::cache::Synced;
use taskdeck::config::{ApiConfig, Environment};
use taskdeck::session::MemoryStorage;
use taskdeck_proto::auth::SignIn;
use taskdeck_proto::collaborator::{AddCollaborator, DEFAULT_ROLE};
use taskdeck_proto::ids::{TaskId, UserId};
use taskdeck_proto::task::TaskStatus;
use taskdeck_stub::server::{Behavior, StubState, start_server_with_state};

// =============================================================================
// Helpers
// =============================================================================

struct Fixture {
    state: Arc<StubState>,
    app: App,
    task: TaskId,
    other_task: TaskId,
    carol: UserId,
}

/// Ada owns two tasks; Carol and Dan have accounts.
async fn fixture(behavior: Behavior) -> Fixture {
    let state = Arc::new(StubState::new(behavior));
    let (addr, _handle) = start_server_with_state("127.0.0.1:0", Arc::clone(&state))
        .await
        .expect("stub should start");

    let (ada, _) = state.seed_user("ada", "a@b.com", "secret1A").await.unwrap();
    let (carol, _) = state
        .seed_user("carol", "carol@b.com", "secret1A")
        .await
        .unwrap();
    state.seed_user("dan", "dan@b.com", "secret1A").await.unwrap();
    let task = state
        .store
        .create_task(ada.id, "Plan trip", "Book flights", 2, TaskStatus::Pending)
        .await
        .unwrap();
    let other_task = state
        .store
        .create_task(ada.id, "Taxes", "File by April", 1, TaskStatus::Pending)
        .await
        .unwrap();

    let config = ApiConfig::new(&format!("http://{addr}"), Environment::Development).unwrap();
    let app = match App::bootstrap(config, Arc::new(MemoryStorage::new()))
        .await
        .unwrap()
    {
        Bootstrap::Ready(app) => app,
        Bootstrap::Unavailable(u) => panic!("backend unavailable: {}", u.failure()),
    };
    app.sign_in(&SignIn {
        email: "a@b.com".to_string(),
        password: "secret1A".to_string(),
    })
    .await
    .unwrap();

    Fixture {
        state,
        app,
        task: TaskId::from(task.id),
        other_task: TaskId::from(other_task.id),
        carol: UserId::from(carol.id),
    }
}

// =============================================================================
// Listing
// =============================================================================

#[tokio::test]
async fn missing_listing_route_reads_as_empty() {
    let behavior = Behavior {
        collaborator_listing: false,
        ..Behavior::full()
    };
    let f = fixture(behavior).await;

    f.app.collaborators.refresh(&f.task).await.unwrap();

    assert!(f.app.collaborators.collaborators(&f.task).is_empty());
    assert!(!f.app.collaborators.is_loading(&f.task));
}

#[tokio::test]
async fn listing_other_peoples_tasks_fails() {
    let f = fixture(Behavior::full()).await;
    let (mallory, _) = f
        .state
        .seed_user("mallory", "m@b.com", "secret1A")
        .await
        .unwrap();
    let foreign = f
        .state
        .store
        .create_task(mallory.id, "Secret", "Not for Ada", 1, TaskStatus::Pending)
        .await
        .unwrap();

    let err = f
        .app
        .collaborators
        .refresh(&TaskId::from(foreign.id))
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(403));
}

// =============================================================================
// Adding
// =============================================================================

#[tokio::test]
async fn added_collaborator_is_listed_for_that_task_only() {
    let f = fixture(Behavior::full()).await;

    let synced = f
        .app
        .collaborators
        .add(&f.task, &AddCollaborator::new("carol@b.com"))
        .await
        .unwrap();
    assert!(synced.is_fresh());

    let listed = f.app.collaborators.collaborators(&f.task);
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].username.as_deref(), Some("carol"));
    assert_eq!(listed[0].user_id.as_ref(), Some(&f.carol));
    assert_eq!(listed[0].role, DEFAULT_ROLE);

    f.app.collaborators.refresh(&f.other_task).await.unwrap();
    assert!(f.app.collaborators.collaborators(&f.other_task).is_empty());
    assert_eq!(f.app.collaborators.collaborators(&f.task).len(), 1);
}

#[tokio::test]
async fn loading_covers_the_add_request() {
    let f = fixture(Behavior::full()).await;
    let request = AddCollaborator::new("carol@b.com");

    let add = f.app.collaborators.add(&f.task, &request);
    tokio::pin!(add);
    assert!(futures_util::poll!(add.as_mut()).is_pending());
    assert!(f.app.collaborators.is_loading(&f.task));
    assert!(!f.app.collaborators.is_loading(&f.other_task));

    let synced = add.await.unwrap();
    assert!(synced.is_fresh());
    assert!(!f.app.collaborators.is_loading(&f.task));
}

#[tokio::test]
async fn unknown_email_is_reported_from_the_server() {
    let f = fixture(Behavior::full()).await;

    let err = f
        .app
        .collaborators
        .add(&f.task, &AddCollaborator::new("ghost@b.com"))
        .await
        .unwrap_err();

    assert_eq!(err.user_message(), "No user with that email");
    assert!(f.app.collaborators.collaborators(&f.task).is_empty());
}

#[tokio::test]
async fn sharing_with_many_reports_each_failure() {
    let f = fixture(Behavior::full()).await;

    let report = f
        .app
        .collaborators
        .share_many(
            &f.task,
            ["carol@b.com", "not-an-email", "ghost@b.com", "dan@b.com"],
            "editor",
        )
        .await
        .unwrap();

    assert_eq!(report.added, ["carol@b.com", "dan@b.com"]);
    assert!(!report.all_added());
    let failed: Vec<_> = report.failed.iter().map(|f| f.email.as_str()).collect();
    assert_eq!(failed, ["not-an-email", "ghost@b.com"]);
    assert!(matches!(
        report.failed[0].error,
        ApiError::Validation { status: None, .. }
    ));
    assert!(matches!(report.synced, Some(Synced::Fresh)));

    let listed = f.app.collaborators.collaborators(&f.task);
    assert_eq!(listed.len(), 2);
    assert!(listed.iter().all(|c| c.role == "editor"));
}

#[tokio::test]
async fn the_shared_user_sees_the_task() {
    let f = fixture(Behavior::full()).await;
    f.app
        .collaborators
        .add(&f.task, &AddCollaborator::new("carol@b.com"))
        .await
        .unwrap();

    let (carol_token, _) = f
        .state
        .store
        .sign_in("carol@b.com", "secret1A")
        .await
        .unwrap();
    let shared = f.app.api().list_shared_tasks(&carol_token).await.unwrap();

    assert_eq!(shared.len(), 1);
    assert_eq!(shared[0].task.title, "Plan trip");
    assert_eq!(shared[0].role.as_deref(), Some(DEFAULT_ROLE));
}

// =============================================================================
// Removing
// =============================================================================

#[tokio::test]
async fn removal_refetches_the_list() {
    let f = fixture(Behavior::full()).await;
    f.app
        .collaborators
        .add(&f.task, &AddCollaborator::new("carol@b.com"))
        .await
        .unwrap();

    f.app
        .collaborators
        .remove(&f.task, &f.carol)
        .await
        .unwrap();

    assert!(f.app.collaborators.collaborators(&f.task).is_empty());
}

#[tokio::test]
async fn missing_removal_route_is_unsupported_not_an_error() {
    let behavior = Behavior {
        collaborator_removal: false,
        ..Behavior::full()
    };
    let f = fixture(behavior).await;
    f.app
        .collaborators
        .add(&f.task, &AddCollaborator::new("carol@b.com"))
        .await
        .unwrap();

    let err = f
        .app
        .collaborators
        .remove(&f.task, &f.carol)
        .await
        .unwrap_err();

    assert!(matches!(err, ApiError::Unsupported { .. }), "got {err:?}");
    let notice = Notice::from_error(&err);
    assert_eq!(notice.level, NoticeLevel::Info);
    assert_eq!(notice.message, "Removing collaborators is not available yet.");
    assert_eq!(f.app.collaborators.collaborators(&f.task).len(), 1);
}

#[tokio::test]
async fn removing_a_stranger_is_a_real_error() {
    let f = fixture(Behavior::full()).await;

    let err = f
        .app
        .collaborators
        .remove(&f.task, &f.carol)
        .await
        .unwrap_err();

    // The route exists; the server explained the 404.
    assert!(matches!(err, ApiError::Application { status: 404, .. }));
    assert_eq!(err.user_message(), "Collaborator not found");
}
