//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::path::Path;

use ticketdesk::store::{Database, StoreSettings};

/// Ticket 42 with comments, history, two assignees and two categories.
/// Ticket 43 belongs to the same customer and must survive every test.
pub const FIXTURE: &str = "
    INSERT INTO role (role_id, name) VALUES (1, 'Agent');
    INSERT INTO employee (employee_id, name, email, role_id) VALUES
        (1, 'Dana Weber', 'dana@desk.test', 1),
        (2, 'Omar Haddad', 'omar@desk.test', 1);
    INSERT INTO customer (customer_id, name, email) VALUES (1, 'Acme GmbH', 'it@acme.test');
    INSERT INTO category (category_id, name) VALUES (1, 'Hardware'), (2, 'Network');
    INSERT INTO status (status_id, name) VALUES (1, 'Open'), (2, 'Closed');

    INSERT INTO ticket (ticket_id, title, status_id, customer_id, employee_id, created_at, updated_at) VALUES
        (42, 'Switch in room 3 keeps rebooting', 1, 1, 1, '2024-03-01T09:00:00Z', '2024-03-01T09:00:00Z'),
        (43, 'New laptop for onboarding', 1, 1, 2, '2024-03-02T09:00:00Z', '2024-03-02T09:00:00Z');

    INSERT INTO ticket_comment (ticket_id, author_id, body, created_at) VALUES
        (42, 1, 'Replaced the power supply', '2024-03-01T10:00:00Z'),
        (42, 2, 'Still rebooting', '2024-03-01T11:00:00Z'),
        (42, 1, 'Ordered a new switch', '2024-03-01T12:00:00Z'),
        (43, 2, 'Laptop is on its way', '2024-03-02T10:00:00Z');

    INSERT INTO ticket_history (ticket_id, field_name, old_value, new_value, changed_by, changed_at) VALUES
        (42, 'status', 'New', 'Open', 1, '2024-03-01T09:05:00Z'),
        (42, 'priority', 'normal', 'high', 2, '2024-03-01T09:10:00Z');

    INSERT INTO ticket_assignment (ticket_id, employee_id, role_in_ticket) VALUES
        (42, 1, 'primary'), (42, 2, 'support'), (43, 2, 'primary');
    INSERT INTO ticket_category (ticket_id, category_id) VALUES (42, 1), (42, 2), (43, 1);
";

pub fn seeded() -> Database {
    let db = Database::open_in_memory().unwrap();
    db.connection().execute_batch(FIXTURE).unwrap();
    db
}

/// On-disk database with no busy wait, so a held lock fails immediately.
pub fn seeded_file(path: &Path) -> Database {
    let db = open_file(path);
    db.connection().execute_batch(FIXTURE).unwrap();
    db
}

pub fn open_file(path: &Path) -> Database {
    Database::open(path, &StoreSettings { busy_timeout_ms: 0 }).unwrap()
}

pub fn count(db: &Database, sql: &str) -> i64 {
    db.connection().query_row(sql, [], |row| row.get(0)).unwrap()
}
