mod common;

use chrono::Utc;
use std::time::Duration;

use mailsieve::actions::{ActionExecutor, ActionFailure, ActionOutcome, RetryPolicy};
use mailsieve::gateway::{GatewayError, LabelModification};
use mailsieve::rules::Action;
use mailsieve::store::{MessageStore, MemoryStore};

use common::{record, FakeGateway};

/// Paused-clock durations land on the timer tick, not on the exact nanosecond
fn assert_about(actual: Duration, expected: Duration) {
    let tolerance = Duration::from_millis(50);
    assert!(
        actual + tolerance >= expected && actual <= expected + tolerance,
        "expected about {:?}, got {:?}",
        expected,
        actual
    );
}

fn rate_limited() -> Result<(), GatewayError> {
    Err(GatewayError::from_status(429, "rate limit exceeded"))
}

#[tokio::test]
async fn test_mark_as_read_updates_mailbox_then_store() {
    let gateway = FakeGateway::new();
    let mut spam = record("m1", "promo@spam.com", "Win now", Utc::now());
    let store = MemoryStore::with_records(vec![spam.clone()]);
    let executor = ActionExecutor::new(&gateway, RetryPolicy::default());

    let report = executor.apply_all(&store, &mut spam, &[Action::MarkAsRead]).await;

    assert_eq!(report.applied, 1);
    assert_eq!(report.failed, 0);
    assert!(report.committed);
    assert_eq!(
        gateway.modify_calls(),
        vec![("m1".to_string(), LabelModification::remove(["UNREAD"]))]
    );

    let stored = store.find_by_external_id("m1").await.unwrap().unwrap();
    assert!(stored.is_read);
    assert!(spam.is_read);
}

#[tokio::test]
async fn test_mark_as_unread_adds_unread_label() {
    let gateway = FakeGateway::new();
    let mut message = record("m1", "a@example.com", "Hi", Utc::now());
    message.is_read = true;
    let executor = ActionExecutor::new(&gateway, RetryPolicy::default());

    assert_eq!(executor.apply(&mut message, &Action::MarkAsUnread).await, ActionOutcome::Applied);
    assert!(!message.is_read);
    assert_eq!(gateway.modify_calls()[0].1, LabelModification::add(["UNREAD"]));
}

#[tokio::test]
async fn test_move_creates_missing_label_once() {
    let gateway = FakeGateway::new();
    gateway.add_label("INBOX", "INBOX");
    let mut message = record("m1", "a@example.com", "Invoice", Utc::now());
    let executor = ActionExecutor::new(&gateway, RetryPolicy::default());

    let outcome = executor.apply(&mut message, &Action::MoveToLabel("Finance".to_string())).await;

    assert_eq!(outcome, ActionOutcome::Applied);
    assert_eq!(gateway.create_calls(), vec!["Finance".to_string()]);
    assert_eq!(
        gateway.modify_calls(),
        vec![("m1".to_string(), LabelModification::add(["Label_2"]))]
    );
    assert!(message.has_label("Label_2"));
}

#[tokio::test]
async fn test_move_reuses_label_with_different_case() {
    let gateway = FakeGateway::new();
    gateway.add_label("Label_7", "finance");
    let mut message = record("m1", "a@example.com", "Invoice", Utc::now());
    let executor = ActionExecutor::new(&gateway, RetryPolicy::default());

    let outcome = executor.apply(&mut message, &Action::MoveToLabel("Finance".to_string())).await;

    assert_eq!(outcome, ActionOutcome::Applied);
    assert!(gateway.create_calls().is_empty());
    assert_eq!(gateway.modify_calls()[0].1, LabelModification::add(["Label_7"]));
}

#[tokio::test(start_paused = true)]
async fn test_rate_limited_modify_backs_off_then_succeeds() {
    let gateway = FakeGateway::new();
    gateway.script_modify(vec![rate_limited(), rate_limited(), Ok(())]);
    let mut message = record("m1", "a@example.com", "Hi", Utc::now());
    let executor = ActionExecutor::new(&gateway, RetryPolicy::default());

    let start = tokio::time::Instant::now();
    let outcome = executor.apply(&mut message, &Action::MarkAsRead).await;

    assert_eq!(outcome, ActionOutcome::Applied);
    assert!(message.is_read);

    let instants = gateway.modify_instants();
    assert_eq!(instants.len(), 3);
    assert_about(instants[1] - instants[0], Duration::from_secs(1));
    assert_about(instants[2] - instants[1], Duration::from_secs(2));
    assert_about(start.elapsed(), Duration::from_secs(3));
}

#[tokio::test(start_paused = true)]
async fn test_retries_exhausted_leaves_record_unchanged() {
    let gateway = FakeGateway::new();
    gateway.script_modify(vec![rate_limited(), rate_limited(), rate_limited()]);
    let mut message = record("m1", "a@example.com", "Hi", Utc::now());
    let before = message.clone();
    let executor = ActionExecutor::new(&gateway, RetryPolicy::default());

    let start = tokio::time::Instant::now();
    let outcome = executor.apply(&mut message, &Action::MarkAsRead).await;

    match outcome {
        ActionOutcome::Failed(ActionFailure::RetriesExhausted { attempts, last }) => {
            assert_eq!(attempts, 3);
            assert_eq!(last.status(), Some(429));
        }
        other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(gateway.modify_calls().len(), 3);
    // No wait after the last attempt
    assert_about(start.elapsed(), Duration::from_secs(3));
    assert_eq!(message, before);
}

#[tokio::test]
async fn test_permanent_failure_is_not_retried() {
    let gateway = FakeGateway::new();
    gateway.script_modify(vec![Err(GatewayError::from_status(404, "Requested entity was not found."))]);
    let mut message = record("m1", "a@example.com", "Hi", Utc::now());
    let executor = ActionExecutor::new(&gateway, RetryPolicy::default());

    let outcome = executor.apply(&mut message, &Action::MarkAsRead).await;

    assert!(matches!(outcome, ActionOutcome::Failed(ActionFailure::Remote(_))));
    assert_eq!(gateway.modify_calls().len(), 1);
    assert!(!message.is_read);
}

#[tokio::test]
async fn test_label_failure_skips_modify() {
    let gateway = FakeGateway::new();
    gateway.fail_label_listing();
    let mut message = record("m1", "a@example.com", "Hi", Utc::now());
    let before = message.clone();
    let executor = ActionExecutor::new(&gateway, RetryPolicy::default());

    let outcome = executor.apply(&mut message, &Action::MoveToLabel("Archive".to_string())).await;

    match outcome {
        ActionOutcome::Failed(ActionFailure::Label { label, .. }) => assert_eq!(label, "Archive"),
        other => panic!("unexpected outcome {:?}", other),
    }
    assert!(gateway.modify_calls().is_empty());
    assert!(gateway.create_calls().is_empty());
    assert_eq!(message, before);
}

#[tokio::test]
async fn test_failed_action_does_not_stop_the_list() {
    let gateway = FakeGateway::new();
    gateway.fail_label_listing();
    let mut message = record("m1", "a@example.com", "Hi", Utc::now());
    let store = MemoryStore::with_records(vec![message.clone()]);
    let executor = ActionExecutor::new(&gateway, RetryPolicy::default());

    let actions = [Action::MoveToLabel("Archive".to_string()), Action::MarkAsRead];
    let report = executor.apply_all(&store, &mut message, &actions).await;

    assert_eq!(report.applied, 1);
    assert_eq!(report.failed, 1);
    assert!(report.committed);
    assert!(store.find_by_external_id("m1").await.unwrap().unwrap().is_read);
}

#[tokio::test]
async fn test_commit_failure_restores_record() {
    let gateway = FakeGateway::new();
    let mut message = record("m1", "a@example.com", "Hi", Utc::now());
    let store = MemoryStore::with_records(vec![message.clone()]);
    store.fail_next_commits(1);
    let executor = ActionExecutor::new(&gateway, RetryPolicy::default());

    let report = executor.apply_all(&store, &mut message, &[Action::MarkAsRead]).await;

    assert_eq!(report.applied, 1);
    assert!(!report.committed);
    // The remote change stays, the local one is gone
    assert_eq!(gateway.modify_calls().len(), 1);
    assert!(!message.is_read);
    assert!(!store.find_by_external_id("m1").await.unwrap().unwrap().is_read);
}
