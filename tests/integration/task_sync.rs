// Test-specific lint overrides: integration tests use unwrap/expect freely,
// and some pedantic/nursery lints are not appropriate for test code.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::doc_markdown,
    clippy::future_not_send,
    clippy::missing_panics_doc
)]

//! Integration tests for the task caches against the stub backend.
//!
//! Covers create/update/delete with refetch-after-mutation, overlapping
//! mutations, failed mutations leaving the cache alone, local validation
//! short-circuiting, the PATCH→PUT fallback with whole-task PUT bodies, and
//! every response shape the backend has been seen to use.

use std::sync::Arc;

use taskdeck::api::ApiError;
use taskdeck::app::{App, Bootstrap};
use taskdeck::cache::Synced;
use taskdeck::config::{ApiConfig, Environment, UpdateMethod};
use taskdeck::session::MemoryStorage;
use taskdeck_proto::auth::SignIn;
use taskdeck_proto::ids::{TagId, TaskId};
use taskdeck_proto::task::{NewTask, TaskStatus, TaskUpdate};
use taskdeck_stub::server::{
    Behavior, StatusStyle, StubState, TagStyle, UpdateMethods, start_server_with_state,
};

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

async fn signed_in_app(state: &StubState, config: ApiConfig) -> App {
    state
        .seed_user("ada", "a@b.com", "secret1A")
        .await
        .unwrap();
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
    app
}

async fn app_for(behavior: Behavior) -> (Arc<StubState>, App) {
    let (state, base) = start_stub(behavior).await;
    let config = ApiConfig::new(&base, Environment::Development).unwrap();
    let app = signed_in_app(&state, config).await;
    (state, app)
}

fn new_task(title: &str) -> NewTask {
    NewTask {
        title: title.to_string(),
        content: "Some content".to_string(),
        tag_id: TagId::new(1),
        status: TaskStatus::Pending,
    }
}

// =============================================================================
// Create / update / delete
// =============================================================================

#[tokio::test]
async fn created_task_appears_after_refetch() {
    let (_state, app) = app_for(Behavior::full()).await;

    let synced = app.tasks.create(&new_task("Write docs")).await.unwrap();
    assert!(synced.is_fresh());

    let tasks = app.tasks.tasks();
    assert_eq!(tasks.len(), 1);
    let task = &tasks[0];
    assert_eq!(task.title, "Write docs");
    assert_eq!(task.content, "Some content");
    assert_eq!(task.status, TaskStatus::Pending);
    assert!(task.has_tag(TagId::new(1)));
    assert!(task.owner.is_some());
    assert!(task.created_at.is_some());
    assert!(!app.tasks.is_loading());
}

#[tokio::test]
async fn create_then_delete_ends_empty_despite_overlap() {
    let (_state, app) = app_for(Behavior::full()).await;

    app.tasks.create(&new_task("Short-lived")).await.unwrap();
    let id = app.tasks.tasks()[0].id.clone();

    // A plain refresh races the delete; the delete's own refetch is issued
    // last and must win.
    let (deleted, refreshed) =
        futures_util::future::join(app.tasks.delete(&id), app.tasks.refresh()).await;
    deleted.unwrap();
    refreshed.unwrap();

    assert!(app.tasks.tasks().is_empty());
    assert!(app.tasks.get(&id).is_none());
}

#[tokio::test]
async fn concurrent_creates_are_all_visible() {
    let (_state, app) = app_for(Behavior::full()).await;

    let (a, b) = futures_util::future::join(
        app.tasks.create(&new_task("First")),
        app.tasks.create(&new_task("Second")),
    )
    .await;
    a.unwrap();
    b.unwrap();

    let mut titles: Vec<_> = app.tasks.tasks().into_iter().map(|t| t.title).collect();
    titles.sort();
    assert_eq!(titles, ["First", "Second"]);
}

#[tokio::test]
async fn update_and_status_change_round_trip() {
    let (_state, app) = app_for(Behavior::full()).await;
    app.tasks.create(&new_task("Draft")).await.unwrap();
    let id = app.tasks.tasks()[0].id.clone();

    app.tasks
        .update(
            &id,
            &TaskUpdate {
                title: Some("Final".to_string()),
                tag_id: Some(TagId::new(3)),
                ..TaskUpdate::default()
            },
        )
        .await
        .unwrap();
    app.tasks
        .set_status(&id, TaskStatus::Completed)
        .await
        .unwrap();

    let task = app.tasks.get(&id).unwrap();
    assert_eq!(task.title, "Final");
    assert_eq!(task.content, "Some content");
    assert!(task.has_tag(TagId::new(3)));
    assert_eq!(task.status, TaskStatus::Completed);

    let stats = app.tasks.stats();
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.total(), 1);
}

#[tokio::test]
async fn failed_mutation_leaves_cache_unchanged() {
    let (_state, app) = app_for(Behavior::full()).await;
    app.tasks.create(&new_task("Keep me")).await.unwrap();
    let before = app.tasks.tasks();
    let id = before[0].id.clone();

    // Tag 99 passes local checks but does not exist on the server.
    let err = app
        .tasks
        .update(
            &id,
            &TaskUpdate {
                tag_id: Some(TagId::new(99)),
                ..TaskUpdate::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Validation { status: Some(422), .. }));
    assert_eq!(app.tasks.tasks(), before);

    let err = app.tasks.delete(&TaskId::from(12345)).await.unwrap_err();
    assert_eq!(err.status(), Some(404));
    assert_eq!(app.tasks.tasks(), before);
}

#[tokio::test]
async fn refresh_is_idempotent() {
    let (_state, app) = app_for(Behavior::full()).await;
    app.tasks.create(&new_task("Stable")).await.unwrap();

    app.tasks.refresh().await.unwrap();
    let first = app.tasks.tasks();
    app.tasks.refresh().await.unwrap();
    assert_eq!(app.tasks.tasks(), first);
}

#[tokio::test]
async fn invalid_task_is_rejected_before_the_network() {
    let (state, app) = app_for(Behavior::full()).await;
    let before = state.requests();

    let err = app
        .tasks
        .create(&new_task(&"x".repeat(41)))
        .await
        .unwrap_err();

    match &err {
        ApiError::Validation { status, fields } => {
            assert_eq!(*status, None);
            assert_eq!(fields[0].field, "title");
        }
        other => panic!("expected validation error, got {other:?}"),
    }
    assert_eq!(state.requests(), before);
    assert!(app.tasks.tasks().is_empty());

    // Exactly 40 is fine.
    app.tasks.create(&new_task(&"x".repeat(40))).await.unwrap();
    assert_eq!(app.tasks.tasks().len(), 1);
}

#[tokio::test]
async fn loading_covers_the_mutation_request() {
    let (_state, app) = app_for(Behavior::full()).await;
    assert!(!app.tasks.is_loading());

    let busy = new_task("Busy");
    let create = app.tasks.create(&busy);
    tokio::pin!(create);
    assert!(futures_util::poll!(create.as_mut()).is_pending());
    assert!(app.tasks.is_loading());

    create.await.unwrap();
    assert!(!app.tasks.is_loading());
    assert_eq!(app.tasks.tasks().len(), 1);
}

#[tokio::test]
async fn logout_clears_cached_tasks() {
    let (_state, app) = app_for(Behavior::full()).await;
    app.tasks.create(&new_task("Private")).await.unwrap();

    app.logout();

    assert!(app.tasks.tasks().is_empty());
    let err = app.tasks.refresh().await.unwrap_err();
    assert!(matches!(err, ApiError::NotAuthenticated));
}

// =============================================================================
// Update method negotiation
// =============================================================================

#[tokio::test]
async fn auto_update_falls_back_to_put() {
    let behavior = Behavior {
        update_methods: UpdateMethods::PutOnly,
        ..Behavior::full()
    };
    let (state, base) = start_stub(behavior).await;
    let config = ApiConfig::new(&base, Environment::Development)
        .unwrap()
        .with_update_method(UpdateMethod::Auto);
    let app = signed_in_app(&state, config).await;
    app.tasks.create(&new_task("Negotiate")).await.unwrap();
    let id = app.tasks.tasks()[0].id.clone();

    let before = state.requests();
    app.tasks
        .set_status(&id, TaskStatus::InProgress)
        .await
        .unwrap();
    // PATCH (405), PUT, refetch.
    assert_eq!(state.requests() - before, 3);
    assert_eq!(app.api().update_method(), UpdateMethod::Put);

    let before = state.requests();
    app.tasks
        .set_status(&id, TaskStatus::Completed)
        .await
        .unwrap();
    // PUT, refetch.
    assert_eq!(state.requests() - before, 2);
    assert_eq!(app.tasks.get(&id).unwrap().status, TaskStatus::Completed);
}

#[tokio::test]
async fn auto_update_falls_back_on_express_missing_route_page() {
    let behavior = Behavior {
        update_methods: UpdateMethods::ExpressPutOnly,
        ..Behavior::full()
    };
    let (state, base) = start_stub(behavior).await;
    let config = ApiConfig::new(&base, Environment::Development)
        .unwrap()
        .with_update_method(UpdateMethod::Auto);
    let app = signed_in_app(&state, config).await;
    app.tasks.create(&new_task("Express")).await.unwrap();
    let id = app.tasks.tasks()[0].id.clone();

    let before = state.requests();
    let synced = app
        .tasks
        .set_status(&id, TaskStatus::Completed)
        .await
        .unwrap();

    assert!(synced.is_fresh());
    // PATCH (HTML 404), PUT, refetch.
    assert_eq!(state.requests() - before, 3);
    assert_eq!(app.api().update_method(), UpdateMethod::Put);
    let task = app.tasks.get(&id).unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.title, "Express");
}

#[tokio::test]
async fn put_sends_the_whole_task() {
    let behavior = Behavior {
        update_methods: UpdateMethods::PutOnly,
        ..Behavior::full()
    };
    let (state, base) = start_stub(behavior).await;
    let config = ApiConfig::new(&base, Environment::Development)
        .unwrap()
        .with_update_method(UpdateMethod::Put);
    let app = signed_in_app(&state, config).await;
    let mut draft = new_task("Replace me");
    draft.tag_id = TagId::new(2);
    app.tasks.create(&draft).await.unwrap();
    let id = app.tasks.tasks()[0].id.clone();

    // A status-only PUT is refused by a replacing backend.
    let token = app.session().token().unwrap();
    let err = app
        .api()
        .update_task(&token, &id, &TaskUpdate::status(TaskStatus::Completed), None)
        .await
        .unwrap_err();
    assert!(
        matches!(err, ApiError::Validation { status: Some(422), .. }),
        "got {err:?}"
    );

    app.tasks
        .set_status(&id, TaskStatus::Completed)
        .await
        .unwrap();
    app.tasks
        .update(
            &id,
            &TaskUpdate {
                content: Some("Replaced content".to_string()),
                ..TaskUpdate::default()
            },
        )
        .await
        .unwrap();

    let task = app.tasks.get(&id).unwrap();
    assert_eq!(task.title, "Replace me");
    assert_eq!(task.content, "Replaced content");
    assert_eq!(task.status, TaskStatus::Completed);
    assert!(task.has_tag(TagId::new(2)));
}

#[tokio::test]
async fn put_refreshes_before_updating_an_uncached_task() {
    let behavior = Behavior {
        update_methods: UpdateMethods::PutOnly,
        ..Behavior::full()
    };
    let (state, base) = start_stub(behavior).await;
    let config = ApiConfig::new(&base, Environment::Development)
        .unwrap()
        .with_update_method(UpdateMethod::Put);
    let app = signed_in_app(&state, config).await;
    let token = app.session().token().unwrap();
    let user = state.store.user_for_token(&token).await.unwrap();
    let task = state
        .store
        .create_task(
            user.id,
            "Made elsewhere",
            "Created by another client",
            1,
            TaskStatus::Pending,
        )
        .await
        .unwrap();
    let id = TaskId::from(task.id);
    assert!(app.tasks.get(&id).is_none());

    let before = state.requests();
    app.tasks
        .set_status(&id, TaskStatus::InProgress)
        .await
        .unwrap();

    // Refresh, PUT, refetch.
    assert_eq!(state.requests() - before, 3);
    let task = app.tasks.get(&id).unwrap();
    assert_eq!(task.title, "Made elsewhere");
    assert_eq!(task.status, TaskStatus::InProgress);

    // Still unknown after the refresh: nothing is sent.
    let before = state.requests();
    let err = app
        .tasks
        .set_status(&TaskId::from(4242), TaskStatus::Completed)
        .await
        .unwrap_err();
    match &err {
        ApiError::Validation { status, fields } => {
            assert_eq!(*status, None);
            assert_eq!(fields[0].field, "task");
        }
        other => panic!("expected validation error, got {other:?}"),
    }
    assert_eq!(state.requests() - before, 1);
}

#[tokio::test]
async fn fixed_patch_does_not_fall_back() {
    let behavior = Behavior {
        update_methods: UpdateMethods::PutOnly,
        ..Behavior::full()
    };
    let (state, base) = start_stub(behavior).await;
    let config = ApiConfig::new(&base, Environment::Development)
        .unwrap()
        .with_update_method(UpdateMethod::Patch);
    let app = signed_in_app(&state, config).await;
    app.tasks.create(&new_task("Stuck")).await.unwrap();
    let id = app.tasks.tasks()[0].id.clone();

    let err = app
        .tasks
        .set_status(&id, TaskStatus::Completed)
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(405));
    assert_eq!(app.tasks.get(&id).unwrap().status, TaskStatus::Pending);
}

// =============================================================================
// Response shapes
// =============================================================================

#[tokio::test]
async fn every_response_shape_normalizes_the_same() {
    let shapes = [
        (StatusStyle::Bare, TagStyle::Single, false),
        (StatusStyle::Namespaced, TagStyle::Single, false),
        (StatusStyle::Bare, TagStyle::Array, true),
        (StatusStyle::Namespaced, TagStyle::Array, true),
    ];
    for (status_style, tag_style, wrap_collections) in shapes {
        let behavior = Behavior {
            status_style,
            tag_style,
            wrap_collections,
            ..Behavior::full()
        };
        let (_state, app) = app_for(behavior).await;
        let mut task = new_task("Shaped");
        task.tag_id = TagId::new(2);
        task.status = TaskStatus::InProgress;
        app.tasks.create(&task).await.unwrap();

        let tasks = app.tasks.tasks();
        assert_eq!(tasks.len(), 1, "{status_style:?} {tag_style:?}");
        assert_eq!(tasks[0].status, TaskStatus::InProgress, "{status_style:?}");
        let tag = tasks[0].primary_tag().unwrap();
        assert_eq!(tag.id, TagId::new(2), "{tag_style:?}");

        app.tags.refresh().await.unwrap();
        assert_eq!(app.tags.label(tag), "Personal");
    }
}

#[tokio::test]
async fn shared_tasks_in_both_shapes() {
    for tag_style in [TagStyle::Single, TagStyle::Array] {
        let behavior = Behavior {
            tag_style,
            ..Behavior::full()
        };
        let (state, base) = start_stub(behavior).await;
        let (owner, _) = state.seed_user("bob", "bob@b.com", "secret1A").await.unwrap();
        let task = state
            .store
            .create_task(owner.id, "Team task", "Shared work", 1, TaskStatus::Pending)
            .await
            .unwrap();
        let config = ApiConfig::new(&base, Environment::Development).unwrap();
        let app = signed_in_app(&state, config).await;
        state
            .store
            .add_collaborator(owner.id, task.id, "a@b.com", "editor")
            .await
            .unwrap();

        app.shared.refresh().await.unwrap();
        let shared = app.shared.tasks();
        assert_eq!(shared.len(), 1, "{tag_style:?}");
        assert_eq!(shared[0].task.title, "Team task");
        assert_eq!(shared[0].role.as_deref(), Some("editor"));

        // Shared tasks never leak into the own-task list.
        app.tasks.refresh().await.unwrap();
        assert!(app.tasks.tasks().is_empty());
    }
}

#[tokio::test]
async fn base_path_prefix_is_kept() {
    let (state, base) = start_stub(Behavior::full()).await;
    let config = ApiConfig::new(&format!("{base}/api/v1/"), Environment::Development).unwrap();
    let app = signed_in_app(&state, config).await;

    let synced = app.tasks.create(&new_task("Nested")).await.unwrap();

    assert!(matches!(synced, Synced::Fresh));
    assert_eq!(app.tasks.tasks().len(), 1);
    let token = app.session().token().unwrap();
    let user = state.store.user_for_token(&token).await.unwrap();
    assert_eq!(state.store.tasks_of(user.id).await.len(), 1);
}
