//! Dependency catalog: which relations must be cleaned up, and in what
//! order, before an entity's own row can be removed.
//!
//! Pure data. Leaf relations come first, the entity's own row is always
//! last. Adding an entity type means adding a table here, not new control
//! flow anywhere else.

use std::borrow::Cow;

use crate::domain::{EntityType, StepKind};

/// Key column assumed for tables without a catalog entry
pub const DEFAULT_KEY_COLUMN: &str = "id";

/// An unbound step: relation and column, no id yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepTemplate {
    pub name: Cow<'static, str>,
    pub kind: StepKind,
    pub relation: Cow<'static, str>,
    pub column: Cow<'static, str>,
}

impl StepTemplate {
    const fn fixed(
        name: &'static str,
        kind: StepKind,
        relation: &'static str,
        column: &'static str,
    ) -> Self {
        Self {
            name: Cow::Borrowed(name),
            kind,
            relation: Cow::Borrowed(relation),
            column: Cow::Borrowed(column),
        }
    }

    /// Single REMOVE of `relation` keyed on `column`
    pub fn remove_own_row(relation: &str, column: &str) -> Self {
        Self {
            name: Cow::Owned(relation.to_string()),
            kind: StepKind::Remove,
            relation: Cow::Owned(relation.to_string()),
            column: Cow::Owned(column.to_string()),
        }
    }
}

use StepKind::{Detach, Remove};

const TICKET: &[StepTemplate] = &[
    StepTemplate::fixed("comments", Remove, "ticket_comment", "ticket_id"),
    StepTemplate::fixed("history", Remove, "ticket_history", "ticket_id"),
    StepTemplate::fixed("assignment-links", Remove, "ticket_assignment", "ticket_id"),
    StepTemplate::fixed("category-links", Remove, "ticket_category", "ticket_id"),
    StepTemplate::fixed("ticket-row", Remove, "ticket", "ticket_id"),
];

const EMPLOYEE: &[StepTemplate] = &[
    StepTemplate::fixed("assignment-links", Remove, "ticket_assignment", "employee_id"),
    StepTemplate::fixed("history-authorship", Detach, "ticket_history", "changed_by"),
    StepTemplate::fixed("ticket-assignee", Detach, "ticket", "employee_id"),
    StepTemplate::fixed("comment-authorship", Detach, "ticket_comment", "author_id"),
    StepTemplate::fixed("employee-row", Remove, "employee", "employee_id"),
];

const CUSTOMER: &[StepTemplate] = &[
    StepTemplate::fixed("ticket-customer", Detach, "ticket", "customer_id"),
    StepTemplate::fixed("customer-row", Remove, "customer", "customer_id"),
];

const CATEGORY: &[StepTemplate] = &[
    StepTemplate::fixed("category-links", Remove, "ticket_category", "category_id"),
    StepTemplate::fixed("category-row", Remove, "category", "category_id"),
];

const STATUS: &[StepTemplate] = &[
    StepTemplate::fixed("ticket-status", Detach, "ticket", "status_id"),
    StepTemplate::fixed("status-row", Remove, "status", "status_id"),
];

const ROLE: &[StepTemplate] = &[
    StepTemplate::fixed("employee-role", Detach, "employee", "role_id"),
    StepTemplate::fixed("role-row", Remove, "role", "role_id"),
];

/// Ordered step templates for an entity type.
///
/// Unknown types get a single REMOVE of their own table keyed on
/// [`DEFAULT_KEY_COLUMN`].
pub fn plan_template(entity_type: &EntityType) -> Vec<StepTemplate> {
    match curated(entity_type) {
        Some(steps) => steps.to_vec(),
        None => vec![StepTemplate::remove_own_row(
            entity_type.relation(),
            DEFAULT_KEY_COLUMN,
        )],
    }
}

fn curated(entity_type: &EntityType) -> Option<&'static [StepTemplate]> {
    match entity_type {
        EntityType::Ticket => Some(TICKET),
        EntityType::Employee => Some(EMPLOYEE),
        EntityType::Customer => Some(CUSTOMER),
        EntityType::Category => Some(CATEGORY),
        EntityType::Status => Some(STATUS),
        EntityType::Role => Some(ROLE),
        EntityType::Other(_) => None,
    }
}

/// Entity types with a curated entry
pub fn known_entity_types() -> Vec<EntityType> {
    EntityType::KNOWN.to_vec()
}
