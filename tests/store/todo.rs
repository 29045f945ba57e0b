#[path = "../common/mod.rs"]
mod common;

use common::{TickingClock, now};
use plangate::core::error::{ErrorKind, PlanGateError};
use plangate::core::store::{FieldUpdate, NewTask, TaskPatch, TaskStatus, TaskStore, UserScope};
use plangate::core::todo::SqliteTaskStore;
use plangate::engine::filters::FilterContext;
use plangate::engine::query::QueryBuilder;
use plangate::engine::session::{OrdinalBuffer, SessionStore};
use std::sync::Arc;
use tempfile::TempDir;

fn open(tmp: &TempDir) -> SqliteTaskStore {
    SqliteTaskStore::open(
        &tmp.path().join("data").join("tasks.db"),
        None,
        Arc::new(TickingClock::new(now())),
    )
    .expect("open store")
}

fn user(id: &str) -> UserScope {
    UserScope::new(id).expect("user")
}

fn new_task(title: &str) -> NewTask {
    NewTask {
        title: title.to_string(),
        description: None,
        category: Some("home".to_string()),
        priority: 1,
        status: TaskStatus::Pending,
        scheduled_time: None,
    }
}

#[test]
fn insert_assigns_id_and_timestamps() {
    let tmp = TempDir::new().expect("tempdir");
    let store = open(&tmp);
    let alice = user("alice");

    let task = store.insert(&alice, &new_task("Buy milk")).expect("insert");
    assert!(task.id.starts_with("task_"));
    assert_eq!(task.user_id, "alice");
    assert_eq!(task.status, "pending");
    assert_eq!(task.created_at, "2026-10-16T12:00:00.000Z");
    assert_eq!(task.created_at, task.updated_at);
    assert!(task.completed_at.is_none());

    let fetched = store.get(&alice, &task.id).expect("get").expect("row");
    assert_eq!(fetched, task);
}

#[test]
fn completing_stamps_and_reopening_clears_completed_at() {
    let tmp = TempDir::new().expect("tempdir");
    let store = open(&tmp);
    let alice = user("alice");
    let task = store.insert(&alice, &new_task("Laundry")).expect("insert");

    let done = store
        .update(
            &alice,
            &task.id,
            &TaskPatch {
                status: Some(TaskStatus::Completed),
                ..TaskPatch::default()
            },
        )
        .expect("update")
        .expect("row");
    assert_eq!(done.status, "completed");
    assert!(done.completed_at.is_some());
    assert_ne!(done.updated_at, task.updated_at);

    let reopened = store
        .update(
            &alice,
            &task.id,
            &TaskPatch {
                status: Some(TaskStatus::InProgress),
                category: FieldUpdate::Clear,
                ..TaskPatch::default()
            },
        )
        .expect("update")
        .expect("row");
    assert_eq!(reopened.status, "in_progress");
    assert!(reopened.completed_at.is_none());
    assert!(reopened.category.is_none());
    assert_eq!(reopened.title, "Laundry");
}

#[test]
fn other_users_rows_are_invisible() {
    let tmp = TempDir::new().expect("tempdir");
    let store = open(&tmp);
    let alice = user("alice");
    let bob = user("bob");
    let task = store.insert(&alice, &new_task("Private")).expect("insert");

    assert!(store.get(&bob, &task.id).expect("get").is_none());
    let patch = TaskPatch {
        title: Some("Hijacked".into()),
        ..TaskPatch::default()
    };
    assert!(store.update(&bob, &task.id, &patch).expect("update").is_none());
    assert_eq!(store.delete(&bob, &[task.id.clone()]).expect("delete"), 0);

    let queries = QueryBuilder::new(50, 200);
    let ctx = FilterContext { now: now() };
    let query = queries.build(&bob, &[], None, &ctx).expect("build").expect("query");
    assert!(store.select(&query).expect("select").is_empty());

    let query = queries.build(&alice, &[], None, &ctx).expect("build").expect("query");
    assert_eq!(store.select(&query).expect("select").len(), 1);
}

#[test]
fn check_constraints_surface_as_constraint_violation() {
    let tmp = TempDir::new().expect("tempdir");
    let store = open(&tmp);
    let mut bad = new_task("Too important");
    bad.priority = 9;

    let err = store.insert(&user("alice"), &bad).expect_err("check constraint");
    assert!(matches!(err, PlanGateError::ConstraintViolation(_)));
    assert_eq!(err.kind(), ErrorKind::ConstraintViolation);
}

#[test]
fn delete_counts_only_removed_rows() {
    let tmp = TempDir::new().expect("tempdir");
    let store = open(&tmp);
    let alice = user("alice");
    let a = store.insert(&alice, &new_task("A")).expect("insert");
    let b = store.insert(&alice, &new_task("B")).expect("insert");

    let removed = store
        .delete(&alice, &[a.id.clone(), b.id.clone(), "task_missing".into()])
        .expect("delete");
    assert_eq!(removed, 2);
    assert_eq!(store.delete(&alice, &[]).expect("delete"), 0);
}

#[test]
fn session_ordinals_persist_per_user() {
    let tmp = TempDir::new().expect("tempdir");
    let store = open(&tmp);
    let alice = user("alice");

    let mut session = store.load_session(&alice, "kitchen").expect("load");
    assert!(session.ordinals.is_empty());
    session.ordinals = OrdinalBuffer::from_ids(vec!["task_a".into(), "task_b".into()]);
    store.save_session(&session).expect("save");

    let reloaded = store.load_session(&alice, "kitchen").expect("load");
    assert_eq!(reloaded.ordinals.resolve(2), Some("task_b"));

    // Another user presenting the same session id starts clean.
    let stolen = store.load_session(&user("mallory"), "kitchen").expect("load");
    assert!(stolen.ordinals.is_empty());
}

#[test]
fn reopening_an_existing_database_keeps_rows() {
    let tmp = TempDir::new().expect("tempdir");
    let alice = user("alice");
    let id = {
        let store = open(&tmp);
        store.insert(&alice, &new_task("Survives")).expect("insert").id
    };
    let store = open(&tmp);
    assert_eq!(
        store.get(&alice, &id).expect("get").map(|t| t.title),
        Some("Survives".to_string())
    );
}
