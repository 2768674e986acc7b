//! Staged Deletion Integration Tests
//!
//! Drives deletion sessions against a seeded database: full runs, skips,
//! blocked steps, lock contention, abort and resume from disk.

mod common;

use common::{count, open_file, seeded, seeded_file};
use tempfile::TempDir;
use ticketdesk::core::{
    DeletionError, DeletionSession, Progress, SessionStatus, SessionStore, StepDecision,
    StepOutcome,
};
use ticketdesk::domain::{EntityType, StepKind};
use ticketdesk::store::ErrorClass;

fn executing(db: &ticketdesk::Database, entity: EntityType, id: i64) -> DeletionSession {
    let mut session = DeletionSession::start(db, entity, id).unwrap();
    session.confirm(db, true).unwrap();
    assert_eq!(session.status(), SessionStatus::Executing);
    session
}

#[test]
fn test_ticket_deletion_runs_to_done() {
    let mut db = seeded();
    let mut session = DeletionSession::start(&db, EntityType::Ticket, 42).unwrap();

    let names: Vec<_> = session
        .plan()
        .unwrap()
        .steps()
        .iter()
        .map(|s| s.name.clone())
        .collect();
    assert_eq!(
        names,
        ["comments", "history", "assignment-links", "category-links", "ticket-row"]
    );

    session.confirm(&db, true).unwrap();

    let expected_rows = [3, 2, 2, 2, 1];
    for (index, rows) in expected_rows.into_iter().enumerate() {
        let peeked = session.next_step().unwrap().clone();
        let result = session.run_step(&mut db, StepDecision::Confirm).unwrap();

        assert_eq!(result.step, peeked);
        assert_eq!(result.outcome, StepOutcome::Executed { rows_affected: rows });
        assert_eq!(result.progress, Progress { cursor: index + 1, total: 5 });
    }

    assert_eq!(session.status(), SessionStatus::Done);
    assert!(session.next_step().is_none());

    assert_eq!(count(&db, "SELECT COUNT(*) FROM ticket WHERE ticket_id = 42"), 0);
    assert_eq!(count(&db, "SELECT COUNT(*) FROM ticket_comment WHERE ticket_id = 42"), 0);
    assert_eq!(count(&db, "SELECT COUNT(*) FROM ticket_history WHERE ticket_id = 42"), 0);

    // Ticket 43 and the shared customer are untouched
    assert_eq!(count(&db, "SELECT COUNT(*) FROM ticket WHERE ticket_id = 43"), 1);
    assert_eq!(count(&db, "SELECT COUNT(*) FROM ticket_comment WHERE ticket_id = 43"), 1);
    assert_eq!(count(&db, "SELECT COUNT(*) FROM customer"), 1);
}

#[test]
fn test_skip_leaves_rows_and_later_steps_still_run() {
    let mut db = seeded();
    let mut session = executing(&db, EntityType::Ticket, 42);

    session.run_step(&mut db, StepDecision::Confirm).unwrap();
    session.run_step(&mut db, StepDecision::Confirm).unwrap();

    let skipped = session.run_step(&mut db, StepDecision::Skip).unwrap();
    assert_eq!(skipped.step.name, "assignment-links");
    assert_eq!(skipped.outcome, StepOutcome::Skipped);
    assert_eq!(session.cursor(), 3);
    assert_eq!(
        count(&db, "SELECT COUNT(*) FROM ticket_assignment WHERE ticket_id = 42"),
        2
    );

    session.run_step(&mut db, StepDecision::Confirm).unwrap();
    let last = session.run_step(&mut db, StepDecision::Confirm).unwrap();
    assert_eq!(last.status, SessionStatus::Done);
    assert_eq!(count(&db, "SELECT COUNT(*) FROM ticket WHERE ticket_id = 42"), 0);

    // The trail tells the skip apart from executed steps
    let outcomes: Vec<_> = session.history().iter().map(|r| r.outcome).collect();
    assert_eq!(outcomes[2], StepOutcome::Skipped);
    assert!(outcomes
        .iter()
        .enumerate()
        .all(|(i, o)| i == 2 || matches!(o, StepOutcome::Executed { .. })));
}

#[test]
fn test_employee_deletion_detaches_references() {
    let mut db = seeded();
    let mut session = executing(&db, EntityType::Employee, 1);

    let kinds: Vec<_> = session
        .plan()
        .unwrap()
        .steps()
        .iter()
        .map(|s| s.kind)
        .collect();
    assert_eq!(
        kinds,
        [StepKind::Remove, StepKind::Detach, StepKind::Detach, StepKind::Detach, StepKind::Remove]
    );

    while session.next_step().is_some() {
        session.run_step(&mut db, StepDecision::Confirm).unwrap();
    }

    assert_eq!(session.status(), SessionStatus::Done);
    assert_eq!(count(&db, "SELECT COUNT(*) FROM employee WHERE employee_id = 1"), 0);
    // Tickets, comments and history survive with the employee nulled out
    assert_eq!(count(&db, "SELECT COUNT(*) FROM ticket WHERE ticket_id = 42 AND employee_id IS NULL"), 1);
    assert_eq!(count(&db, "SELECT COUNT(*) FROM ticket_comment WHERE author_id IS NULL"), 2);
    assert_eq!(count(&db, "SELECT COUNT(*) FROM ticket_history WHERE changed_by IS NULL"), 1);
}

#[test]
fn test_blocked_step_is_referential_integrity_and_retryable() {
    let mut db = seeded();
    db.connection()
        .execute_batch(
            "CREATE TABLE ticket_attachment (
                 attachment_id INTEGER PRIMARY KEY,
                 ticket_id INTEGER NOT NULL REFERENCES ticket(ticket_id),
                 file_name TEXT NOT NULL
             );
             INSERT INTO ticket_attachment (ticket_id, file_name) VALUES (42, 'switch.log');",
        )
        .unwrap();

    let mut session = executing(&db, EntityType::Ticket, 42);
    for _ in 0..4 {
        session.run_step(&mut db, StepDecision::Confirm).unwrap();
    }

    let err = session.run_step(&mut db, StepDecision::Confirm).unwrap_err();
    assert_eq!(err.class(), ErrorClass::ReferentialIntegrity);
    assert!(matches!(
        &err,
        DeletionError::ReferentialIntegrity { step, relation, .. }
            if step == "ticket-row" && relation == "ticket"
    ));

    // Same step is offered again, nothing advanced
    assert_eq!(session.cursor(), 4);
    assert_eq!(session.status(), SessionStatus::Executing);
    assert_eq!(session.next_step().unwrap().name, "ticket-row");
    assert_eq!(count(&db, "SELECT COUNT(*) FROM ticket WHERE ticket_id = 42"), 1);

    // Operator clears the blocker out of band, then retries
    db.connection()
        .execute("DELETE FROM ticket_attachment WHERE ticket_id = 42", [])
        .unwrap();
    let result = session.run_step(&mut db, StepDecision::Confirm).unwrap();
    assert_eq!(result.status, SessionStatus::Done);
    assert!(session.last_error().is_none());
}

#[test]
fn test_locked_step_is_transient_and_not_advanced() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("desk.db");
    let mut db = seeded_file(&path);
    let mut session = executing(&db, EntityType::Customer, 1);

    let locker = open_file(&path);
    locker.connection().execute_batch("BEGIN IMMEDIATE;").unwrap();

    let err = session.run_step(&mut db, StepDecision::Confirm).unwrap_err();
    assert_eq!(err.class(), ErrorClass::TransientContention);
    assert_eq!(session.cursor(), 0);

    locker.connection().execute_batch("ROLLBACK;").unwrap();

    let result = session.run_step(&mut db, StepDecision::Confirm).unwrap();
    assert_eq!(result.outcome, StepOutcome::Executed { rows_affected: 2 });
}

#[test]
fn test_missing_entity_is_not_found() {
    let db = seeded();
    let err = DeletionSession::start(&db, EntityType::Ticket, 999).unwrap_err();
    assert_eq!(err.class(), ErrorClass::NotFound);

    let err = DeletionSession::start(&db, EntityType::parse("no_such_table"), 1).unwrap_err();
    assert_eq!(err.class(), ErrorClass::NotFound);
}

#[test]
fn test_invalid_input_is_validation() {
    let db = seeded();
    let err = DeletionSession::start(&db, EntityType::Ticket, 0).unwrap_err();
    assert_eq!(err.class(), ErrorClass::Validation);

    let err = DeletionSession::start(&db, EntityType::parse("ticket; DROP TABLE ticket"), 1)
        .unwrap_err();
    assert_eq!(err.class(), ErrorClass::Validation);
    assert_eq!(count(&db, "SELECT COUNT(*) FROM ticket"), 2);
}

#[test]
fn test_unknown_table_uses_declared_key() {
    let mut db = seeded();
    db.connection()
        .execute_batch(
            "CREATE TABLE invoice (invoice_no INTEGER PRIMARY KEY, amount REAL);
             INSERT INTO invoice (invoice_no, amount) VALUES (7, 120.0), (8, 80.0);",
        )
        .unwrap();

    let mut session = executing(&db, EntityType::parse("Invoice"), 7);
    let plan = session.plan().unwrap();
    assert_eq!(plan.len(), 1);
    assert_eq!(plan.steps()[0].predicate.column, "invoice_no");

    session.run_step(&mut db, StepDecision::Confirm).unwrap();
    assert_eq!(session.status(), SessionStatus::Done);
    assert_eq!(count(&db, "SELECT COUNT(*) FROM invoice"), 1);
}

#[test]
fn test_abort_keeps_committed_steps() {
    let mut db = seeded();
    let mut session = executing(&db, EntityType::Ticket, 42);

    session.run_step(&mut db, StepDecision::Confirm).unwrap();
    session.run_step(&mut db, StepDecision::Confirm).unwrap();
    session.abort().unwrap();
    session.abort().unwrap();

    assert_eq!(session.status(), SessionStatus::Aborted);
    assert_eq!(session.progress(), Progress { cursor: 2, total: 5 });
    assert!(session.next_step().is_none());

    // Comments and history are gone, everything after them is intact
    assert_eq!(count(&db, "SELECT COUNT(*) FROM ticket_comment WHERE ticket_id = 42"), 0);
    assert_eq!(count(&db, "SELECT COUNT(*) FROM ticket_history WHERE ticket_id = 42"), 0);
    assert_eq!(count(&db, "SELECT COUNT(*) FROM ticket_assignment WHERE ticket_id = 42"), 2);
    assert_eq!(count(&db, "SELECT COUNT(*) FROM ticket WHERE ticket_id = 42"), 1);

    let err = session.run_step(&mut db, StepDecision::Confirm).unwrap_err();
    assert!(matches!(
        err,
        DeletionError::InvalidState { actual: SessionStatus::Aborted, .. }
    ));
}

#[test]
fn test_entity_deleted_before_confirmation() {
    let db = seeded();
    let mut session = DeletionSession::start(&db, EntityType::Customer, 1).unwrap();

    db.connection()
        .execute_batch(
            "UPDATE ticket SET customer_id = NULL;
             DELETE FROM customer WHERE customer_id = 1;",
        )
        .unwrap();

    let err = session.confirm(&db, true).unwrap_err();
    assert_eq!(err.class(), ErrorClass::NotFound);
    assert_eq!(session.status(), SessionStatus::Confirming);
}

#[test]
fn test_resume_from_disk_after_interruption() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("desk.db");
    let store = SessionStore::open(temp.path().join("sessions")).unwrap();

    let id = {
        let mut db = seeded_file(&path);
        let mut session = executing(&db, EntityType::Ticket, 42);
        session.run_step(&mut db, StepDecision::Confirm).unwrap();
        session.run_step(&mut db, StepDecision::Confirm).unwrap();
        store.save(&session).unwrap();
        session.id()
    };

    let mut db = open_file(&path);
    let mut session = store.load(id).unwrap();
    assert_eq!(session.status(), SessionStatus::Executing);
    assert_eq!(session.cursor(), 2);
    assert_eq!(session.next_step().unwrap().name, "assignment-links");
    assert_eq!(session.history().len(), 2);

    session.run_step(&mut db, StepDecision::Skip).unwrap();
    store.save(&session).unwrap();
    while session.next_step().is_some() {
        session.run_step(&mut db, StepDecision::Confirm).unwrap();
        store.save(&session).unwrap();
    }

    assert_eq!(session.status(), SessionStatus::Done);
    assert!(store.list().unwrap().is_empty());
    assert_eq!(count(&db, "SELECT COUNT(*) FROM ticket WHERE ticket_id = 42"), 0);
}
