//! Ingestion ledger: the set of external ids already turned into tickets.
//!
//! The PRIMARY KEY on `external_id` is what makes ingestion exactly-once.
//! [`record`] surfaces a collision as [`StoreError::Duplicate`] and never
//! overwrites an existing entry.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::domain::LedgerEntry;
use crate::store::StoreError;

/// Check whether an external id was already processed.
pub fn contains(conn: &Connection, external_id: &str) -> Result<bool, StoreError> {
    let found = conn
        .query_row(
            "SELECT 1 FROM ingestion_ledger WHERE external_id = ?1",
            params![external_id],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Append an entry. Fails with `Duplicate` if the id is already present.
pub fn record(
    conn: &Connection,
    external_id: &str,
    ticket_id: Option<i64>,
    processed_at: DateTime<Utc>,
) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO ingestion_ledger (external_id, ticket_id, processed_at) VALUES (?1, ?2, ?3)",
        params![external_id, ticket_id, processed_at.to_rfc3339()],
    )?;
    Ok(())
}

/// Fetch the entry for an external id, if any.
pub fn get(conn: &Connection, external_id: &str) -> Result<Option<LedgerEntry>, StoreError> {
    let row = conn
        .query_row(
            "SELECT external_id, ticket_id, processed_at FROM ingestion_ledger WHERE external_id = ?1",
            params![external_id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<i64>>(1)?,
                    row.get::<_, String>(2)?,
                ))
            },
        )
        .optional()?;

    let Some((external_id, ticket_id, processed_at)) = row else {
        return Ok(None);
    };

    let processed_at = DateTime::parse_from_rfc3339(&processed_at)
        .map_err(|e| StoreError::InvalidValue(format!("ledger timestamp {processed_at:?}: {e}")))?
        .with_timezone(&Utc);

    Ok(Some(LedgerEntry {
        external_id,
        ticket_id,
        processed_at,
    }))
}
