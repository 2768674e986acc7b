//! Change-audit logger.
//!
//! Records one history row per effective field change. Values are compared
//! after normalization (absent reads as empty, whitespace trimmed) so a
//! form re-submitting an unchanged field writes nothing. Inserts that hit a
//! lock-wait timeout are retried under [`ContentionRetry`]; when the budget
//! runs out the failure is surfaced and nothing is written.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::domain::{is_change, AuditEntry};
use crate::store::{Database, ErrorClass, StoreError};

use super::retry::{ContentionRetry, RetryFailure};

/// Errors from the audit logger
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit write still contended after {attempts} attempt(s): {source}")]
    ContentionExhausted {
        attempts: u32,
        #[source]
        source: StoreError,
    },

    #[error("field name must not be empty")]
    EmptyField,

    #[error("invalid timestamp in history row {id}: {value:?}")]
    BadTimestamp { id: i64, value: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AuditError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::ContentionExhausted { .. } => ErrorClass::TransientContention,
            Self::EmptyField => ErrorClass::Validation,
            Self::BadTimestamp { .. } => ErrorClass::Other,
            Self::Store(err) => err.class(),
        }
    }
}

impl From<RetryFailure> for AuditError {
    fn from(failure: RetryFailure) -> Self {
        if failure.source.is_transient() {
            Self::ContentionExhausted {
                attempts: failure.attempts,
                source: failure.source,
            }
        } else {
            Self::Store(failure.source)
        }
    }
}

/// Writes field-level change history for tickets.
#[derive(Debug, Clone, Default)]
pub struct AuditLogger {
    retry: ContentionRetry,
}

impl AuditLogger {
    pub fn new(retry: ContentionRetry) -> Self {
        Self { retry }
    }

    pub fn retry_policy(&self) -> &ContentionRetry {
        &self.retry
    }

    /// Record a change of `field_name` on ticket `entity_id`.
    ///
    /// Returns `Ok(None)` without touching the store when old and new are
    /// equal after normalization. Otherwise inserts exactly one entry (the
    /// raw, untrimmed values are stored) and returns it.
    #[instrument(skip(self, db, old_value, new_value))]
    pub fn log_change(
        &self,
        db: &mut Database,
        entity_id: i64,
        field_name: &str,
        old_value: Option<&str>,
        new_value: Option<&str>,
        actor_id: i64,
    ) -> Result<Option<AuditEntry>, AuditError> {
        let change = FieldChange {
            field_name,
            old_value,
            new_value,
        };
        self.record_with(db, entity_id, actor_id, &change, |_| Ok(()))
    }

    /// Apply `write` and record `change` in the same transaction.
    ///
    /// Either both the write and its history row commit, or neither does.
    /// The whole transaction is retried on contention. An unchanged value
    /// skips `write` entirely.
    pub fn record_with<F>(
        &self,
        db: &mut Database,
        entity_id: i64,
        actor_id: i64,
        change: &FieldChange<'_>,
        mut write: F,
    ) -> Result<Option<AuditEntry>, AuditError>
    where
        F: FnMut(&Connection) -> Result<(), StoreError>,
    {
        let field_name = change.field_name;
        if field_name.trim().is_empty() {
            return Err(AuditError::EmptyField);
        }

        if !is_change(change.old_value, change.new_value) {
            debug!(field_name, "Value unchanged, nothing to record");
            return Ok(None);
        }

        let old_value = change.old_value.unwrap_or_default().to_string();
        let new_value = change.new_value.unwrap_or_default().to_string();
        let timestamp = Utc::now();
        let stamp = timestamp.to_rfc3339();

        let id = self.retry.run("audit.record", |_attempt| {
            db.transaction(|tx| {
                write(tx)?;
                insert_entry(tx, entity_id, field_name, &old_value, &new_value, actor_id, &stamp)
            })
        })?;

        info!(history_id = id, field_name, "Recorded field change");

        Ok(Some(AuditEntry {
            id,
            entity_id,
            field_name: field_name.to_string(),
            old_value,
            new_value,
            actor_id: Some(actor_id),
            timestamp,
        }))
    }
}

/// A field change as seen by the audit log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldChange<'a> {
    pub field_name: &'a str,
    pub old_value: Option<&'a str>,
    pub new_value: Option<&'a str>,
}

/// Insert a history row on an existing connection or transaction.
pub(crate) fn insert_entry(
    conn: &Connection,
    entity_id: i64,
    field_name: &str,
    old_value: &str,
    new_value: &str,
    actor_id: i64,
    changed_at: &str,
) -> Result<i64, StoreError> {
    conn.execute(
        "INSERT INTO ticket_history (ticket_id, field_name, old_value, new_value, changed_by, changed_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![entity_id, field_name, old_value, new_value, actor_id, changed_at],
    )?;
    Ok(conn.last_insert_rowid())
}

/// History of one ticket, oldest first.
pub fn history(db: &Database, ticket_id: i64) -> Result<Vec<AuditEntry>, AuditError> {
    let mut stmt = db.connection().prepare(
        "SELECT history_id, ticket_id, field_name, old_value, new_value, changed_by, changed_at
         FROM ticket_history WHERE ticket_id = ?1 ORDER BY history_id",
    ).map_err(StoreError::from)?;

    let rows = stmt
        .query_map(params![ticket_id], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, Option<i64>>(5)?,
                row.get::<_, String>(6)?,
            ))
        })
        .map_err(StoreError::from)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(StoreError::from)?;

    rows.into_iter()
        .map(|(id, entity_id, field_name, old_value, new_value, actor_id, changed_at)| {
            let timestamp = DateTime::parse_from_rfc3339(&changed_at)
                .map_err(|_| AuditError::BadTimestamp {
                    id,
                    value: changed_at.clone(),
                })?
                .with_timezone(&Utc);

            Ok(AuditEntry {
                id,
                entity_id,
                field_name,
                old_value: old_value.unwrap_or_default(),
                new_value: new_value.unwrap_or_default(),
                actor_id,
                timestamp,
            })
        })
        .collect()
}
