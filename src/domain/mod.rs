//! Domain types for the ticket desk core.
//!
//! This module contains the core data structures:
//! - EntityType: deletion targets known to the dependency catalog
//! - DeletionStep: one DETACH/REMOVE operation
//! - AuditEntry: field-level change history
//! - ExternalEvent: inbound messages and their ledger records

pub mod audit;
pub mod entity;
pub mod event;
pub mod step;

// Re-export commonly used types
pub use audit::{is_change, normalize_value, AuditEntry};
pub use entity::EntityType;
pub use event::{ExternalEvent, LedgerEntry, SenderIdentity};
pub use step::{DeletionStep, Predicate, StepKind};
