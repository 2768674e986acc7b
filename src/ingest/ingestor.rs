//! Idempotent event ingestor.
//!
//! Each event is handled on its own: a ledger hit is skipped, anything else
//! is materialized as customer + ticket + ledger entry inside one
//! transaction. A failing event is reported and the batch moves on.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::adapters::{EventSource, SourceError};
use crate::core::tickets::{insert_ticket, NewTicket};
use crate::domain::{ExternalEvent, SenderIdentity};
use crate::store::{Database, ErrorClass, StoreError};

use super::ledger;

/// Title used when a message has a blank subject
const NO_SUBJECT: &str = "(no subject)";

/// Category linked to new tickets when it exists
pub const DEFAULT_CATEGORY_ID: i64 = 1;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("event has an empty external id")]
    MissingExternalId,

    #[error("invalid sender {sender:?}: {reason}")]
    InvalidSender { sender: String, reason: String },

    #[error("external id {0} was already processed")]
    AlreadyProcessed(String),

    #[error("event source failed: {0}")]
    Source(#[from] SourceError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IngestError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::MissingExternalId | Self::InvalidSender { .. } => ErrorClass::Validation,
            Self::AlreadyProcessed(_) => ErrorClass::Duplicate,
            Self::Source(err) => err.class(),
            Self::Store(err) => err.class(),
        }
    }
}

/// Values applied to every ticket created from an event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestDefaults {
    #[serde(default = "default_priority")]
    pub priority: Option<String>,

    #[serde(default)]
    pub status_id: Option<i64>,

    #[serde(default = "default_category_id")]
    pub category_id: Option<i64>,

    #[serde(default)]
    pub assignee_id: Option<i64>,
}

fn default_priority() -> Option<String> {
    Some("normal".to_string())
}

fn default_category_id() -> Option<i64> {
    Some(DEFAULT_CATEGORY_ID)
}

impl Default for IngestDefaults {
    fn default() -> Self {
        Self {
            priority: default_priority(),
            status_id: None,
            category_id: default_category_id(),
            assignee_id: None,
        }
    }
}

/// One event that could not be ingested
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestFailure {
    pub external_id: String,
    pub class: ErrorClass,
    pub error: String,
}

/// Ticket created for an event
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreatedTicket {
    pub external_id: String,
    pub ticket_id: i64,
}

/// Counts and details for one ingest run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestionReport {
    pub created: usize,
    pub skipped: usize,
    pub failed: usize,
    pub tickets: Vec<CreatedTicket>,
    pub failures: Vec<IngestFailure>,
}

impl IngestionReport {
    /// Number of events looked at
    pub fn total(&self) -> usize {
        self.created + self.skipped + self.failed
    }
}

/// Turns external events into tickets exactly once.
#[derive(Debug, Clone, Default)]
pub struct Ingestor {
    defaults: IngestDefaults,
}

impl Ingestor {
    pub fn new(defaults: IngestDefaults) -> Self {
        Self { defaults }
    }

    pub fn defaults(&self) -> &IngestDefaults {
        &self.defaults
    }

    /// Fetch one batch from `source` and ingest it.
    pub fn poll<S>(&self, db: &mut Database, source: &mut S) -> Result<IngestionReport, IngestError>
    where
        S: EventSource + ?Sized,
    {
        let events = source.fetch()?;
        debug!(source = source.name(), count = events.len(), "Polled event source");
        Ok(self.ingest(db, &events))
    }

    /// Ingest a batch. Never fails as a whole; per-event failures are
    /// counted and listed in the report.
    #[instrument(skip_all, fields(events = events.len()))]
    pub fn ingest(&self, db: &mut Database, events: &[ExternalEvent]) -> IngestionReport {
        let mut report = IngestionReport::default();

        for event in events {
            match self.ingest_one(db, event) {
                Ok(Some(ticket_id)) => {
                    info!(external_id = %event.external_id, ticket_id, "Created ticket from event");
                    report.created += 1;
                    report.tickets.push(CreatedTicket {
                        external_id: event.external_id.clone(),
                        ticket_id,
                    });
                }
                Ok(None) | Err(IngestError::AlreadyProcessed(_)) => {
                    debug!(external_id = %event.external_id, "Event already processed");
                    report.skipped += 1;
                }
                Err(err) => {
                    warn!(
                        external_id = %event.external_id,
                        class = %err.class(),
                        error = %err,
                        "Failed to ingest event"
                    );
                    report.failed += 1;
                    report.failures.push(IngestFailure {
                        external_id: event.external_id.clone(),
                        class: err.class(),
                        error: err.to_string(),
                    });
                }
            }
        }

        info!(
            created = report.created,
            skipped = report.skipped,
            failed = report.failed,
            "Ingest run complete"
        );
        report
    }

    /// `Ok(None)` when the ledger already holds the id.
    fn ingest_one(&self, db: &mut Database, event: &ExternalEvent) -> Result<Option<i64>, IngestError> {
        if event.external_id.trim().is_empty() {
            return Err(IngestError::MissingExternalId);
        }
        if ledger::contains(db.connection(), &event.external_id)? {
            return Ok(None);
        }
        self.commit(db, event).map(Some)
    }

    /// Customer, ticket and ledger entry in one transaction. A ledger
    /// collision rolls back the whole event.
    fn commit(&self, db: &mut Database, event: &ExternalEvent) -> Result<i64, IngestError> {
        let sender = SenderIdentity::parse(&event.sender).map_err(|reason| {
            IngestError::InvalidSender {
                sender: event.sender.clone(),
                reason,
            }
        })?;

        db.transaction(|tx| {
            let customer_id = resolve_customer(tx, &sender)?;
            let ticket_id = insert_ticket(tx, &self.ticket_for(event, customer_id))?;

            ledger::record(tx, &event.external_id, Some(ticket_id), Utc::now()).map_err(
                |err| match err {
                    StoreError::Duplicate(_) => {
                        IngestError::AlreadyProcessed(event.external_id.clone())
                    }
                    other => IngestError::Store(other),
                },
            )?;
            Ok(ticket_id)
        })
    }

    fn ticket_for(&self, event: &ExternalEvent, customer_id: i64) -> NewTicket {
        let subject = event.subject.trim();
        NewTicket {
            title: if subject.is_empty() {
                NO_SUBJECT.to_string()
            } else {
                subject.to_string()
            },
            description: (!event.body.trim().is_empty()).then(|| event.body.clone()),
            priority: self.defaults.priority.clone(),
            status_id: self.defaults.status_id,
            customer_id: Some(customer_id),
            employee_id: self.defaults.assignee_id,
            category_id: self.defaults.category_id,
        }
    }
}

/// Find a customer by email, creating one with a derived name if absent.
fn resolve_customer(conn: &Connection, sender: &SenderIdentity) -> Result<i64, StoreError> {
    if let Some(id) = find_customer(conn, &sender.email)? {
        return Ok(id);
    }

    let inserted = conn.execute(
        "INSERT INTO customer (name, email) VALUES (?1, ?2)",
        params![sender.display_name(), sender.email],
    );
    match inserted {
        Ok(_) => Ok(conn.last_insert_rowid()),
        // Another writer created it first
        Err(err) => match StoreError::from(err) {
            StoreError::Duplicate(message) => find_customer(conn, &sender.email)?
                .ok_or(StoreError::Duplicate(message)),
            other => Err(other),
        },
    }
}

fn find_customer(conn: &Connection, email: &str) -> Result<Option<i64>, StoreError> {
    Ok(conn
        .query_row(
            "SELECT customer_id FROM customer WHERE lower(email) = ?1 ORDER BY customer_id LIMIT 1",
            params![email],
            |row| row.get(0),
        )
        .optional()?)
}
