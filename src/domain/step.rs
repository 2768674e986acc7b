//! Deletion steps: one DETACH or REMOVE against a dependent relation.

use std::fmt;

use rusqlite::{params, Transaction};
use serde::{Deserialize, Serialize};

use crate::store::{ensure_identifier, StoreError};

/// What a step does to the matching rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    /// Null the foreign key, keep the row
    Detach,

    /// Delete the row
    Remove,
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Detach => f.write_str("DETACH"),
            Self::Remove => f.write_str("REMOVE"),
        }
    }
}

/// Row selector: `column = value`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Predicate {
    pub column: String,
    pub value: i64,
}

/// A single bound step of a deletion plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletionStep {
    /// Human-readable step name (e.g. "comments")
    pub name: String,

    pub kind: StepKind,

    /// Relation the step mutates
    pub relation: String,

    pub predicate: Predicate,
}

impl DeletionStep {
    /// Reject malformed identifiers or a non-positive key value.
    pub fn validate(&self) -> Result<(), StoreError> {
        ensure_identifier(&self.relation)?;
        ensure_identifier(&self.predicate.column)?;
        if self.predicate.value <= 0 {
            return Err(StoreError::InvalidValue(format!(
                "{}.{} = {}",
                self.relation, self.predicate.column, self.predicate.value
            )));
        }
        Ok(())
    }

    /// SQL text for this step, with `?1` bound to the predicate value.
    pub fn statement(&self) -> String {
        let relation = &self.relation;
        let column = &self.predicate.column;
        match self.kind {
            StepKind::Detach => {
                format!("UPDATE {relation} SET {column} = NULL WHERE {column} = ?1")
            }
            StepKind::Remove => format!("DELETE FROM {relation} WHERE {column} = ?1"),
        }
    }

    /// Execute inside an open transaction. Returns the affected row count.
    pub fn execute(&self, tx: &Transaction<'_>) -> Result<usize, StoreError> {
        self.validate()?;
        Ok(tx.execute(&self.statement(), params![self.predicate.value])?)
    }
}

impl fmt::Display for DeletionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} where {} = {}",
            self.name, self.kind, self.relation, self.predicate.column, self.predicate.value
        )
    }
}
