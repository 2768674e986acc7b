//! Adapter interfaces for external event sources.
//!
//! An [`EventSource`] yields inbound messages; the ingestor never talks to a
//! mail server directly. The only built-in source reads a JSONL mailbox
//! export.

pub mod mailbox;

use thiserror::Error;

use crate::domain::ExternalEvent;
use crate::store::ErrorClass;

// Re-export the mailbox adapter
pub use mailbox::JsonlMailbox;

/// Errors raised while fetching from a source
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("source unavailable: {0}")]
    Unavailable(String),
}

impl SourceError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound => {
                ErrorClass::NotFound
            }
            _ => ErrorClass::Other,
        }
    }
}

/// Trait for inbound message sources
pub trait EventSource {
    /// Human-readable source name
    fn name(&self) -> &str;

    /// Fetch the current batch of messages, oldest first.
    ///
    /// Sources may return messages that were already fetched before;
    /// deduplication is the ingestor's job.
    fn fetch(&mut self) -> Result<Vec<ExternalEvent>, SourceError>;
}

/// In-memory source; yields the same batch on every fetch.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    events: Vec<ExternalEvent>,
}

impl StaticSource {
    pub fn new(events: Vec<ExternalEvent>) -> Self {
        Self { events }
    }
}

impl EventSource for StaticSource {
    fn name(&self) -> &str {
        "static"
    }

    fn fetch(&mut self) -> Result<Vec<ExternalEvent>, SourceError> {
        Ok(self.events.clone())
    }
}
