//! Storage failures and their classification.
//!
//! Every error that leaves the core carries one of the [`ErrorClass`]
//! categories so that callers can tell an integrity problem from a lock
//! timeout without parsing messages.

use std::fmt;

use rusqlite::ffi;
use rusqlite::ErrorCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classification shared by all error types in the crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// A row is still referenced by a relation the operation did not clean up.
    ReferentialIntegrity,

    /// Lock-wait timeout or busy database; expected to clear if retried.
    TransientContention,

    /// The targeted entity does not exist.
    NotFound,

    /// Input rejected before any transaction was opened.
    Validation,

    /// Unique or primary-key collision.
    Duplicate,

    /// Anything else.
    Other,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ReferentialIntegrity => "referential_integrity",
            Self::TransientContention => "transient_contention",
            Self::NotFound => "not_found",
            Self::Validation => "validation",
            Self::Duplicate => "duplicate",
            Self::Other => "other",
        };
        f.write_str(name)
    }
}

/// Errors raised by the storage layer.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("referential integrity violation: {0}")]
    ReferentialIntegrity(String),

    #[error("transient contention: {0}")]
    Contention(String),

    #[error("duplicate key: {0}")]
    Duplicate(String),

    #[error("invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    #[error("invalid predicate value: {0}")]
    InvalidValue(String),

    #[error("SQLite error: {0}")]
    Sqlite(rusqlite::Error),

    #[error("Failed to create database directory: {0}")]
    CreateDir(std::io::Error),
}

impl StoreError {
    /// Classification of this failure.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::ReferentialIntegrity(_) => ErrorClass::ReferentialIntegrity,
            Self::Contention(_) => ErrorClass::TransientContention,
            Self::Duplicate(_) => ErrorClass::Duplicate,
            Self::InvalidIdentifier(_) | Self::InvalidValue(_) => ErrorClass::Validation,
            Self::Sqlite(_) | Self::CreateDir(_) => ErrorClass::Other,
        }
    }

    /// True for lock-wait/busy failures.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Contention(_))
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match classify(&err) {
            ErrorClass::ReferentialIntegrity => Self::ReferentialIntegrity(err.to_string()),
            ErrorClass::TransientContention => Self::Contention(err.to_string()),
            ErrorClass::Duplicate => Self::Duplicate(err.to_string()),
            _ => Self::Sqlite(err),
        }
    }
}

/// Classify a raw SQLite failure by result code.
pub fn classify(err: &rusqlite::Error) -> ErrorClass {
    let rusqlite::Error::SqliteFailure(failure, _) = err else {
        return ErrorClass::Other;
    };

    match failure.code {
        ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => ErrorClass::TransientContention,
        ErrorCode::ConstraintViolation => {
            let extended = failure.extended_code;
            if extended == ffi::SQLITE_CONSTRAINT_FOREIGNKEY {
                ErrorClass::ReferentialIntegrity
            } else if extended == ffi::SQLITE_CONSTRAINT_UNIQUE
                || extended == ffi::SQLITE_CONSTRAINT_PRIMARYKEY
            {
                ErrorClass::Duplicate
            } else {
                ErrorClass::Other
            }
        }
        _ => ErrorClass::Other,
    }
}
