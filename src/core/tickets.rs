//! Ticket writes: creation with its relation links, audited field edits and
//! comments.

use std::fmt;
use std::str::FromStr;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, instrument};

use crate::domain::{is_change, AuditEntry};
use crate::store::{Database, ErrorClass, StoreError};

use super::audit::{AuditError, AuditLogger, FieldChange};

/// Role recorded for the assignee a ticket is created with
pub const PRIMARY_ROLE: &str = "primary";

/// History field name for added comments
pub const COMMENT_FIELD: &str = "comment";

#[derive(Debug, Error)]
pub enum TicketError {
    #[error("ticket {0} not found")]
    NotFound(i64),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error(transparent)]
    Audit(#[from] AuditError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl TicketError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::NotFound(_) => ErrorClass::NotFound,
            Self::Validation(_) => ErrorClass::Validation,
            Self::Audit(err) => err.class(),
            Self::Store(err) => err.class(),
        }
    }
}

/// Values for a new ticket
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTicket {
    pub title: String,
    pub description: Option<String>,
    pub priority: Option<String>,
    pub status_id: Option<i64>,
    pub customer_id: Option<i64>,

    /// Primary assignee; also linked through `ticket_assignment`
    pub employee_id: Option<i64>,

    /// Linked through `ticket_category` when the category exists
    pub category_id: Option<i64>,
}

/// Insert a ticket and its relation links on an open transaction.
///
/// The assignee link is written with [`PRIMARY_ROLE`]. A category link is
/// only written when the category exists.
pub(crate) fn insert_ticket(conn: &Connection, ticket: &NewTicket) -> Result<i64, StoreError> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO ticket (title, description, priority, status_id, customer_id, employee_id, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
        params![
            ticket.title,
            ticket.description,
            ticket.priority,
            ticket.status_id,
            ticket.customer_id,
            ticket.employee_id,
            now,
        ],
    )?;
    let ticket_id = conn.last_insert_rowid();

    if let Some(employee_id) = ticket.employee_id {
        conn.execute(
            "INSERT OR IGNORE INTO ticket_assignment (ticket_id, employee_id, role_in_ticket)
             VALUES (?1, ?2, ?3)",
            params![ticket_id, employee_id, PRIMARY_ROLE],
        )?;
    }

    if let Some(category_id) = ticket.category_id {
        let exists = conn
            .query_row(
                "SELECT 1 FROM category WHERE category_id = ?1",
                params![category_id],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        if exists {
            conn.execute(
                "INSERT OR IGNORE INTO ticket_category (ticket_id, category_id) VALUES (?1, ?2)",
                params![ticket_id, category_id],
            )?;
        }
    }

    Ok(ticket_id)
}

/// Create a ticket with its links in one transaction.
pub fn create_ticket(db: &mut Database, ticket: &NewTicket) -> Result<i64, TicketError> {
    if ticket.title.trim().is_empty() {
        return Err(TicketError::Validation("ticket title must not be empty".to_string()));
    }

    let ticket_id = db.transaction(|tx| insert_ticket(tx, ticket))?;
    info!(ticket_id, "Created ticket");
    Ok(ticket_id)
}

/// Editable ticket fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketField {
    Title,
    Description,
    Priority,
    Status,
    Customer,
    Employee,

    /// Stored in `ticket_category`; an edit replaces every link
    Category,
}

impl TicketField {
    pub const ALL: [TicketField; 7] = [
        Self::Title,
        Self::Description,
        Self::Priority,
        Self::Status,
        Self::Customer,
        Self::Employee,
        Self::Category,
    ];

    /// Column holding the value
    pub fn column(self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::Description => "description",
            Self::Priority => "priority",
            Self::Status => "status_id",
            Self::Customer => "customer_id",
            Self::Employee => "employee_id",
            Self::Category => "category_id",
        }
    }

    /// Name recorded in the change history
    pub fn name(self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::Description => "description",
            Self::Priority => "priority",
            Self::Status => "status",
            Self::Customer => "customer",
            Self::Employee => "employee",
            Self::Category => "category",
        }
    }

    /// True for foreign-key fields that hold an id
    pub fn is_reference(self) -> bool {
        matches!(
            self,
            Self::Status | Self::Customer | Self::Employee | Self::Category
        )
    }
}

impl fmt::Display for TicketField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TicketField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|field| field.name() == wanted || field.column() == wanted)
            .ok_or_else(|| {
                let names: Vec<_> = Self::ALL.iter().map(|f| f.name()).collect();
                format!("unknown field {s:?} (expected one of: {})", names.join(", "))
            })
    }
}

/// Change one field of a ticket and record it in the history.
///
/// Edits that do not change the normalized value write nothing and return
/// `Ok(None)`. Reference fields take an id; an empty value clears them.
/// The update and its history row commit together or not at all.
#[instrument(skip(db, logger, new_value))]
pub fn update_field(
    db: &mut Database,
    logger: &AuditLogger,
    ticket_id: i64,
    field: TicketField,
    new_value: &str,
    actor_id: i64,
) -> Result<Option<AuditEntry>, TicketError> {
    let current = current_value(db, ticket_id, field)?;
    if !is_change(current.as_deref(), Some(new_value)) {
        return Ok(None);
    }

    let value = FieldValue::parse(field, new_value)?;
    let now = Utc::now().to_rfc3339();
    let change = FieldChange {
        field_name: field.name(),
        old_value: current.as_deref(),
        new_value: Some(new_value),
    };

    let entry = logger.record_with(db, ticket_id, actor_id, &change, |conn| {
        write_field(conn, ticket_id, field, &value, &now)
    })?;
    Ok(entry)
}

/// Add a comment to a ticket and record it in the history.
#[instrument(skip(db, logger, body))]
pub fn add_comment(
    db: &mut Database,
    logger: &AuditLogger,
    ticket_id: i64,
    body: &str,
    actor_id: i64,
) -> Result<AuditEntry, TicketError> {
    if body.trim().is_empty() {
        return Err(TicketError::Validation("comment must not be empty".to_string()));
    }
    if !db.row_exists("ticket", "ticket_id", ticket_id)? {
        return Err(TicketError::NotFound(ticket_id));
    }

    let now = Utc::now().to_rfc3339();
    let change = FieldChange {
        field_name: COMMENT_FIELD,
        old_value: None,
        new_value: Some(body),
    };

    let entry = logger.record_with(db, ticket_id, actor_id, &change, |conn| {
        conn.execute(
            "INSERT INTO ticket_comment (ticket_id, author_id, body, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![ticket_id, actor_id, body, now],
        )?;
        Ok(())
    })?;

    entry.ok_or_else(|| TicketError::Validation("comment must not be empty".to_string()))
}

fn write_field(
    conn: &Connection,
    ticket_id: i64,
    field: TicketField,
    value: &FieldValue,
    now: &str,
) -> Result<(), StoreError> {
    if field == TicketField::Category {
        conn.execute("DELETE FROM ticket_category WHERE ticket_id = ?1", params![ticket_id])?;
        if let FieldValue::Id(Some(category_id)) = value {
            conn.execute(
                "INSERT INTO ticket_category (ticket_id, category_id) VALUES (?1, ?2)",
                params![ticket_id, category_id],
            )?;
        }
        conn.execute(
            "UPDATE ticket SET updated_at = ?1 WHERE ticket_id = ?2",
            params![now, ticket_id],
        )?;
        return Ok(());
    }

    let sql = format!(
        "UPDATE ticket SET {} = ?1, updated_at = ?2 WHERE ticket_id = ?3",
        field.column()
    );
    match value {
        FieldValue::Text(text) => conn.execute(&sql, params![text, now, ticket_id])?,
        FieldValue::Id(id) => conn.execute(&sql, params![id, now, ticket_id])?,
    };
    Ok(())
}

enum FieldValue {
    Text(Option<String>),
    Id(Option<i64>),
}

impl FieldValue {
    fn parse(field: TicketField, raw: &str) -> Result<Self, TicketError> {
        let trimmed = raw.trim();

        if field.is_reference() {
            if trimmed.is_empty() {
                return Ok(Self::Id(None));
            }
            return trimmed
                .parse::<i64>()
                .ok()
                .filter(|id| *id > 0)
                .map(|id| Self::Id(Some(id)))
                .ok_or_else(|| {
                    TicketError::Validation(format!("{field} must be a positive id, got {raw:?}"))
                });
        }

        if field == TicketField::Title && trimmed.is_empty() {
            return Err(TicketError::Validation("ticket title must not be empty".to_string()));
        }
        Ok(Self::Text((!trimmed.is_empty()).then(|| raw.to_string())))
    }
}

fn current_value(
    db: &Database,
    ticket_id: i64,
    field: TicketField,
) -> Result<Option<String>, TicketError> {
    if field == TicketField::Category {
        if !db.row_exists("ticket", "ticket_id", ticket_id)? {
            return Err(TicketError::NotFound(ticket_id));
        }
        let current = db
            .connection()
            .query_row(
                "SELECT CAST(category_id AS TEXT) FROM ticket_category
                 WHERE ticket_id = ?1 ORDER BY category_id LIMIT 1",
                params![ticket_id],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .map_err(StoreError::from)?;
        return Ok(current);
    }

    let sql = format!(
        "SELECT CAST({} AS TEXT) FROM ticket WHERE ticket_id = ?1",
        field.column()
    );
    db.connection()
        .query_row(&sql, params![ticket_id], |row| row.get::<_, Option<String>>(0))
        .optional()
        .map_err(StoreError::from)?
        .ok_or(TicketError::NotFound(ticket_id))
}
