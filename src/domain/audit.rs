//! Field-level change history entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One recorded field change.
///
/// Entries are append-only; the core never updates or deletes them (the
/// ticket deletion plan removes a ticket's history together with the ticket).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Row id assigned by the store
    pub id: i64,

    /// The ticket the change belongs to
    pub entity_id: i64,

    pub field_name: String,

    pub old_value: String,

    pub new_value: String,

    /// Employee who made the change (None once the employee is detached)
    pub actor_id: Option<i64>,

    pub timestamp: DateTime<Utc>,
}

/// Normalize a field value for comparison: absent reads as "", whitespace trimmed.
pub fn normalize_value(value: Option<&str>) -> &str {
    value.unwrap_or("").trim()
}

/// True when old and new differ after normalization.
pub fn is_change(old_value: Option<&str>, new_value: Option<&str>) -> bool {
    normalize_value(old_value) != normalize_value(new_value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_change_detection() {
        assert!(!is_change(Some("open"), Some("open")));
        assert!(!is_change(Some(" open "), Some("open")));
        assert!(!is_change(None, Some("")));
        assert!(!is_change(None, Some("   ")));

        assert!(is_change(Some("open"), Some("closed")));
        assert!(is_change(None, Some("open")));
        assert!(is_change(Some("Open"), Some("open")));
    }
}
