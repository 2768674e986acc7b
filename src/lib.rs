//! ticketdesk - data consistency core for a SQL-backed ticket desk
//!
//! Keeps a web of foreign-key relationships intact while operators delete
//! records, edit fields, and while inbound mail is turned into tickets.
//!
//! # Architecture
//!
//! - Deletions are planned from a static dependency catalog and executed one
//!   confirmed step at a time; each step is its own transaction
//! - Field edits append to an audit history, retrying lock-wait timeouts
//! - Mail ingestion is exactly-once through a ledger keyed on the external id
//!
//! # Modules
//!
//! - `store`: SQLite access and error classification
//! - `domain`: Data structures (EntityType, DeletionStep, AuditEntry, ExternalEvent)
//! - `core`: Catalog, plans, deletion sessions, audit logger, ticket writes
//! - `ingest`: Idempotent event ingestor and its ledger
//! - `adapters`: Event sources (JSONL mailbox export)
//! - `auth`: Password hashing
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Preview what deleting ticket 42 would touch
//! ticketdesk plan ticket 42
//!
//! # Delete it, confirming each step
//! ticketdesk delete ticket 42
//!
//! # Pick up an interrupted deletion
//! ticketdesk resume <session-id>
//! ```

pub mod adapters;
pub mod auth;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod ingest;
pub mod store;

// Re-export main types at crate root for convenience
pub use crate::core::{
    AuditLogger, DeletionError, DeletionPlan, DeletionSession, SessionStatus, StepDecision,
};
pub use domain::{AuditEntry, DeletionStep, EntityType, ExternalEvent, StepKind};
pub use ingest::{IngestionReport, Ingestor};
pub use store::{Database, ErrorClass, StoreError};
