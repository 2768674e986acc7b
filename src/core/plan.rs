//! Deletion plan builder.
//!
//! Binds catalog templates to a concrete entity id. The builder never
//! reorders or merges steps: later steps assume the earlier ones ran.

use serde::{Deserialize, Serialize};

use crate::domain::{DeletionStep, EntityType, Predicate, StepKind};
use crate::store::is_identifier;

use super::catalog::{plan_template, StepTemplate, DEFAULT_KEY_COLUMN};
use super::deletion::DeletionError;

/// An ordered, immutable sequence of steps for one (entity type, id).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletionPlan {
    entity_type: EntityType,
    entity_id: i64,
    steps: Vec<DeletionStep>,
}

impl DeletionPlan {
    pub fn entity_type(&self) -> &EntityType {
        &self.entity_type
    }

    pub fn entity_id(&self) -> i64 {
        self.entity_id
    }

    pub fn steps(&self) -> &[DeletionStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Always false for a plan produced by the builder
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn step(&self, index: usize) -> Option<&DeletionStep> {
        self.steps.get(index)
    }

    /// The final step: REMOVE of the entity's own row
    pub fn target(&self) -> Option<&DeletionStep> {
        self.steps.last()
    }

    /// Verify the structural guarantees (used after deserialization).
    pub fn check_shape(&self) -> Result<(), DeletionError> {
        let Some(last) = self.steps.last() else {
            return Err(DeletionError::Validation("deletion plan is empty".to_string()));
        };
        if last.kind != StepKind::Remove || last.relation != self.entity_type.relation() {
            return Err(DeletionError::Validation(format!(
                "last step of a {} plan must remove from {}",
                self.entity_type,
                self.entity_type.relation()
            )));
        }
        Ok(())
    }
}

/// Build the plan for `entity_type` / `entity_id`.
///
/// Unknown types are keyed on the default `id` column; use
/// [`build_plan_with_key`] when the real key column is known.
pub fn build_plan(entity_type: &EntityType, entity_id: i64) -> Result<DeletionPlan, DeletionError> {
    let key = entity_type.key_column().unwrap_or(DEFAULT_KEY_COLUMN);
    build_plan_with_key(entity_type, entity_id, key)
}

/// Build a plan, overriding the key column of the final own-row step for
/// entity types without a catalog entry.
pub fn build_plan_with_key(
    entity_type: &EntityType,
    entity_id: i64,
    key_column: &str,
) -> Result<DeletionPlan, DeletionError> {
    if entity_id <= 0 {
        return Err(DeletionError::Validation(format!(
            "entity id must be positive, got {entity_id}"
        )));
    }

    let templates = if entity_type.is_known() {
        plan_template(entity_type)
    } else {
        vec![StepTemplate::remove_own_row(entity_type.relation(), key_column)]
    };

    let steps = templates
        .into_iter()
        .map(|template| bind(template, entity_id))
        .collect::<Result<Vec<_>, _>>()?;

    let plan = DeletionPlan {
        entity_type: entity_type.clone(),
        entity_id,
        steps,
    };
    plan.check_shape()?;
    Ok(plan)
}

fn bind(template: StepTemplate, entity_id: i64) -> Result<DeletionStep, DeletionError> {
    for ident in [template.relation.as_ref(), template.column.as_ref()] {
        if !is_identifier(ident) {
            return Err(DeletionError::Validation(format!(
                "{ident:?} is not a valid table or column name"
            )));
        }
    }

    Ok(DeletionStep {
        name: template.name.into_owned(),
        kind: template.kind,
        relation: template.relation.into_owned(),
        predicate: Predicate {
            column: template.column.into_owned(),
            value: entity_id,
        },
    })
}
