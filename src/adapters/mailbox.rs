//! JSONL mailbox export.
//!
//! Each non-blank line is one [`ExternalEvent`] object. Lines that do not
//! parse are logged and skipped so a single bad export line does not block
//! the rest of the batch.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::domain::ExternalEvent;

use super::{EventSource, SourceError};

/// Default number of messages returned per fetch
pub const DEFAULT_FETCH_LIMIT: usize = 10;

/// Reads the most recent messages from a JSONL file
#[derive(Debug, Clone)]
pub struct JsonlMailbox {
    path: PathBuf,
    limit: usize,
}

impl JsonlMailbox {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            limit: DEFAULT_FETCH_LIMIT,
        }
    }

    /// Cap the batch size (0 means unlimited)
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl EventSource for JsonlMailbox {
    fn name(&self) -> &str {
        "jsonl-mailbox"
    }

    fn fetch(&mut self) -> Result<Vec<ExternalEvent>, SourceError> {
        let content = fs::read_to_string(&self.path).map_err(|source| SourceError::Io {
            path: self.path.display().to_string(),
            source,
        })?;

        let mut events = Vec::new();
        for (line_no, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<ExternalEvent>(line) {
                Ok(event) => events.push(event),
                Err(e) => warn!(
                    path = %self.path.display(),
                    line = line_no + 1,
                    error = %e,
                    "Skipping malformed mailbox line"
                ),
            }
        }

        // Keep the newest `limit` messages, then hand them out oldest first.
        events.sort_by(|a, b| b.received_at.cmp(&a.received_at));
        if self.limit > 0 {
            events.truncate(self.limit);
        }
        events.reverse();

        debug!(path = %self.path.display(), count = events.len(), "Fetched mailbox batch");
        Ok(events)
    }
}
