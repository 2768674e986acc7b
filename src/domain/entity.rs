//! Entity types that can be targeted by a staged deletion.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Which catalog entry applies to a deletion target.
///
/// The known variants map to hand-curated dependency lists. Any other table
/// name is carried as [`EntityType::Other`] and receives the generic
/// single-step fallback.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EntityType {
    Ticket,
    Employee,
    Customer,
    Category,
    Status,
    Role,

    /// A table with no catalog entry
    Other(String),
}

impl EntityType {
    /// All entity types with a catalog entry
    pub const KNOWN: [EntityType; 6] = [
        EntityType::Ticket,
        EntityType::Employee,
        EntityType::Customer,
        EntityType::Category,
        EntityType::Status,
        EntityType::Role,
    ];

    /// Parse a user-supplied name. Never fails: unknown names become `Other`.
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "ticket" => Self::Ticket,
            "employee" => Self::Employee,
            "customer" => Self::Customer,
            "category" => Self::Category,
            "status" => Self::Status,
            "role" => Self::Role,
            _ => Self::Other(name.trim().to_string()),
        }
    }

    /// The relation holding this entity's own rows
    pub fn relation(&self) -> &str {
        match self {
            Self::Ticket => "ticket",
            Self::Employee => "employee",
            Self::Customer => "customer",
            Self::Category => "category",
            Self::Status => "status",
            Self::Role => "role",
            Self::Other(table) => table,
        }
    }

    /// Key column of the entity's own relation, if known statically
    pub fn key_column(&self) -> Option<&'static str> {
        match self {
            Self::Ticket => Some("ticket_id"),
            Self::Employee => Some("employee_id"),
            Self::Customer => Some("customer_id"),
            Self::Category => Some("category_id"),
            Self::Status => Some("status_id"),
            Self::Role => Some("role_id"),
            Self::Other(_) => None,
        }
    }

    /// True when the catalog has a curated entry for this type
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Other(_))
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.relation())
    }
}

impl From<String> for EntityType {
    fn from(name: String) -> Self {
        Self::parse(&name)
    }
}

impl From<EntityType> for String {
    fn from(entity: EntityType) -> Self {
        entity.relation().to_string()
    }
}
