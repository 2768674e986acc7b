//! Change Audit Integration Tests
//!
//! Exercises the audit logger against real SQLite lock contention: a second
//! connection holds a write lock while the logger tries to insert.

mod common;

use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use common::{count, open_file, seeded, seeded_file};
use tempfile::TempDir;
use ticketdesk::core::{
    add_comment, history, update_field, AuditError, AuditLogger, ContentionRetry, TicketField,
};
use ticketdesk::store::ErrorClass;

fn quick_retry(backoff_ms: u64) -> AuditLogger {
    AuditLogger::new(ContentionRetry {
        max_attempts: 3,
        backoff_ms,
    })
}

#[test]
fn test_noop_change_writes_nothing() {
    let mut db = seeded();
    let logger = AuditLogger::default();

    let result = logger
        .log_change(&mut db, 42, "priority", Some("high"), Some("  high\n"), 1)
        .unwrap();

    assert!(result.is_none());
    assert_eq!(count(&db, "SELECT COUNT(*) FROM ticket_history WHERE ticket_id = 42"), 2);
}

#[test]
fn test_exhausted_retries_propagate_and_write_nothing() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("desk.db");
    let mut db = seeded_file(&path);

    let locker = open_file(&path);
    locker.connection().execute_batch("BEGIN IMMEDIATE;").unwrap();

    let started = Instant::now();
    let err = quick_retry(20)
        .log_change(&mut db, 42, "status", Some("Open"), Some("Closed"), 1)
        .unwrap_err();

    assert!(matches!(err, AuditError::ContentionExhausted { attempts: 3, .. }));
    assert_eq!(err.class(), ErrorClass::TransientContention);
    // Two backoffs between three attempts
    assert!(started.elapsed() >= Duration::from_millis(40));

    locker.connection().execute_batch("ROLLBACK;").unwrap();
    assert_eq!(
        count(&db, "SELECT COUNT(*) FROM ticket_history WHERE field_name = 'status' AND new_value = 'Closed'"),
        0
    );
}

#[test]
fn test_succeeds_once_lock_is_released() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("desk.db");
    let mut db = seeded_file(&path);

    let (locked_tx, locked_rx) = mpsc::channel();
    let lock_path = path.clone();
    let holder = thread::spawn(move || {
        let locker = open_file(&lock_path);
        locker.connection().execute_batch("BEGIN IMMEDIATE;").unwrap();
        locked_tx.send(()).unwrap();
        thread::sleep(Duration::from_millis(100));
        locker.connection().execute_batch("COMMIT;").unwrap();
    });

    locked_rx.recv().unwrap();
    let entry = quick_retry(400)
        .log_change(&mut db, 42, "status", Some("Open"), Some("Closed"), 1)
        .unwrap()
        .unwrap();
    holder.join().unwrap();

    let entries = history(&db, 42).unwrap();
    assert_eq!(entries.len(), 3);
    assert_eq!(entries.last().unwrap().id, entry.id);
    assert_eq!(entries.last().unwrap().new_value, "Closed");
}

#[test]
fn test_non_transient_error_is_not_retried() {
    let mut db = seeded();
    let started = Instant::now();

    // Actor 99 does not exist: foreign key failure, surfaced at once
    let err = quick_retry(1_000)
        .log_change(&mut db, 42, "status", Some("Open"), Some("Closed"), 99)
        .unwrap_err();

    assert_eq!(err.class(), ErrorClass::ReferentialIntegrity);
    assert!(started.elapsed() < Duration::from_millis(1_000));
}

#[test]
fn test_field_edit_goes_through_audit() {
    let mut db = seeded();
    let logger = AuditLogger::default();

    let entry = update_field(&mut db, &logger, 43, TicketField::Title, "Laptop for new hire", 2)
        .unwrap()
        .unwrap();
    assert_eq!(entry.old_value, "New laptop for onboarding");
    assert_eq!(entry.actor_id, Some(2));

    let unchanged =
        update_field(&mut db, &logger, 43, TicketField::Title, " Laptop for new hire ", 2).unwrap();
    assert!(unchanged.is_none());

    let entries = history(&db, 43).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].field_name, "title");
}

#[test]
fn test_field_edit_rolls_back_when_history_fails() {
    let mut db = seeded();
    let logger = AuditLogger::default();

    // Actor 999 does not exist, so the history row cannot be written
    let err = update_field(&mut db, &logger, 43, TicketField::Title, "Changed title", 999)
        .unwrap_err();

    assert_eq!(err.class(), ErrorClass::ReferentialIntegrity);
    assert_eq!(
        count(&db, "SELECT COUNT(*) FROM ticket WHERE ticket_id = 43 AND title = 'New laptop for onboarding'"),
        1
    );
    assert_eq!(count(&db, "SELECT COUNT(*) FROM ticket_history WHERE ticket_id = 43"), 0);
}

#[test]
fn test_contended_field_edit_writes_nothing() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("desk.db");
    let mut db = seeded_file(&path);

    let locker = open_file(&path);
    locker.connection().execute_batch("BEGIN IMMEDIATE;").unwrap();

    let err = update_field(&mut db, &quick_retry(10), 43, TicketField::Status, "2", 1).unwrap_err();
    assert_eq!(err.class(), ErrorClass::TransientContention);

    locker.connection().execute_batch("ROLLBACK;").unwrap();
    assert_eq!(count(&db, "SELECT COUNT(*) FROM ticket WHERE ticket_id = 43 AND status_id = 1"), 1);
    assert_eq!(count(&db, "SELECT COUNT(*) FROM ticket_history WHERE ticket_id = 43"), 0);
}

#[test]
fn test_category_change_and_comment_are_audited() {
    let mut db = seeded();
    let logger = AuditLogger::default();

    let entry = update_field(&mut db, &logger, 43, TicketField::Category, "2", 1)
        .unwrap()
        .unwrap();
    assert_eq!((entry.old_value.as_str(), entry.new_value.as_str()), ("1", "2"));
    assert_eq!(
        count(&db, "SELECT COUNT(*) FROM ticket_category WHERE ticket_id = 43 AND category_id = 2"),
        1
    );
    assert_eq!(count(&db, "SELECT COUNT(*) FROM ticket_category WHERE ticket_id = 43"), 1);

    add_comment(&mut db, &logger, 43, "Shipped with the docking station", 2).unwrap();
    assert_eq!(count(&db, "SELECT COUNT(*) FROM ticket_comment WHERE ticket_id = 43"), 2);

    let fields: Vec<_> = history(&db, 43)
        .unwrap()
        .into_iter()
        .map(|entry| entry.field_name)
        .collect();
    assert_eq!(fields, ["category", "comment"]);
}

#[test]
fn test_comment_with_unknown_author_is_rolled_back() {
    let mut db = seeded();
    let err = add_comment(&mut db, &AuditLogger::default(), 43, "Hello", 999).unwrap_err();

    assert_eq!(err.class(), ErrorClass::ReferentialIntegrity);
    assert_eq!(count(&db, "SELECT COUNT(*) FROM ticket_comment WHERE ticket_id = 43"), 1);
}
