//! Data consistency core.
//!
//! This module contains:
//! - catalog / plan: which dependents to clean up, bound to one entity
//! - deletion: the step-gated deletion session
//! - audit: field-level change history with contention retry
//! - tickets: ticket creation, audited edits and comments
//! - session_store: on-disk persistence of open deletion sessions

pub mod audit;
pub mod catalog;
pub mod deletion;
pub mod plan;
pub mod retry;
pub mod session_store;
pub mod tickets;

// Re-export commonly used types
pub use audit::{history, AuditError, AuditLogger, FieldChange};
pub use catalog::{known_entity_types, plan_template, StepTemplate};
pub use deletion::{
    DeletionError, DeletionSession, Progress, SessionStatus, StepDecision, StepOutcome,
    StepRecord, StepResult,
};
pub use plan::{build_plan, build_plan_with_key, DeletionPlan};
pub use retry::{ContentionRetry, RetryFailure};
pub use session_store::{SessionStore, SessionStoreError};
pub use tickets::{
    add_comment, create_ticket, update_field, NewTicket, TicketError, TicketField,
};
