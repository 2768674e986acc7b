//! Inbound message ingestion.
//!
//! Turns external events into tickets exactly once:
//!
//! ```text
//! EventSource → Ingestor ─┬─ ledger hit  → skipped
//!                         └─ ledger miss → customer + ticket + ledger (one tx)
//! ```

pub mod ingestor;
pub mod ledger;

// Re-export key types
pub use ingestor::{IngestDefaults, IngestError, IngestFailure, IngestionReport, Ingestor};
