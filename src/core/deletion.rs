//! Staged deletion orchestrator.
//!
//! A [`DeletionSession`] walks a [`DeletionPlan`] one step at a time:
//!
//! ```text
//! Selecting ──prepare──▶ Confirming ──confirm(yes)──▶ Executing ──▶ Done
//!     ▲                      │                            │
//!     └─────confirm(no)──────┘        abort() ──────────▶ Aborted
//! ```
//!
//! Every confirmed step runs in its own transaction. A failed step leaves the
//! cursor where it was so the same step is offered again. Aborting never
//! undoes steps that already committed.
//!
//! The session is a plain value owned by the caller. It holds no connection
//! and can be serialized between steps and resumed later.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::domain::{DeletionStep, EntityType};
use crate::store::{Database, ErrorClass, StoreError};

use super::plan::{build_plan, build_plan_with_key, DeletionPlan};

/// Lifecycle state of a deletion session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// No plan yet
    Selecting,

    /// Plan built, waiting for the operator to confirm intent
    Confirming,

    /// Steps are being offered one at a time
    Executing,

    /// Every step has been executed or skipped
    Done,

    /// Operator aborted; committed steps remain in effect
    Aborted,
}

impl SessionStatus {
    /// True for Done and Aborted
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Aborted)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Selecting => "selecting",
            Self::Confirming => "confirming",
            Self::Executing => "executing",
            Self::Done => "done",
            Self::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// Operator decision for the current step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepDecision {
    Confirm,
    Skip,
}

/// What happened to a step that the cursor moved past
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum StepOutcome {
    /// The step's statement committed
    Executed { rows_affected: usize },

    /// The operator bypassed the step; nothing was written
    Skipped,
}

/// One entry of the session's step trail
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    pub index: usize,
    pub name: String,
    pub outcome: StepOutcome,
    pub at: DateTime<Utc>,
}

/// Progress for display: `cursor` of `total` steps done
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub cursor: usize,
    pub total: usize,
}

/// Result of one `run_step` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepResult {
    pub step: DeletionStep,
    pub outcome: StepOutcome,
    pub progress: Progress,
    pub status: SessionStatus,
}

/// Errors from planning or executing a staged deletion
#[derive(Debug, Error)]
pub enum DeletionError {
    #[error("{entity_type} {id} not found")]
    NotFound { entity_type: String, id: i64 },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("session is {actual}, expected {expected}")]
    InvalidState {
        expected: &'static str,
        actual: SessionStatus,
    },

    #[error("step '{step}' is blocked by rows that still reference {relation}: {message}")]
    ReferentialIntegrity {
        step: String,
        relation: String,
        message: String,
    },

    #[error("step '{step}' hit lock contention: {message}")]
    Contention { step: String, message: String },

    #[error("step '{step}' failed: {source}")]
    StepFailed {
        step: String,
        #[source]
        source: StoreError,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl DeletionError {
    /// Classification of this failure.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::NotFound { .. } => ErrorClass::NotFound,
            Self::Validation(_) => ErrorClass::Validation,
            Self::InvalidState { .. } => ErrorClass::Validation,
            Self::ReferentialIntegrity { .. } => ErrorClass::ReferentialIntegrity,
            Self::Contention { .. } => ErrorClass::TransientContention,
            Self::StepFailed { source, .. } => source.class(),
            Self::Store(err) => err.class(),
        }
    }

    fn from_step(step: &DeletionStep, err: StoreError) -> Self {
        match err {
            StoreError::ReferentialIntegrity(message) => Self::ReferentialIntegrity {
                step: step.name.clone(),
                relation: step.relation.clone(),
                message,
            },
            StoreError::Contention(message) => Self::Contention {
                step: step.name.clone(),
                message,
            },
            StoreError::InvalidIdentifier(message) | StoreError::InvalidValue(message) => {
                Self::Validation(message)
            }
            other => Self::StepFailed {
                step: step.name.clone(),
                source: other,
            },
        }
    }
}

/// A resumable, step-gated deletion of one entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeletionSession {
    id: Uuid,
    entity_type: EntityType,
    entity_id: i64,
    status: SessionStatus,
    plan: Option<DeletionPlan>,
    cursor: usize,
    #[serde(default)]
    history: Vec<StepRecord>,
    last_error: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl DeletionSession {
    /// A new session in `Selecting`; nothing is planned or executed yet.
    pub fn new(entity_type: EntityType, entity_id: i64) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            entity_type,
            entity_id,
            status: SessionStatus::Selecting,
            plan: None,
            cursor: 0,
            history: Vec::new(),
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Create a session and build its plan in one go.
    pub fn start(
        db: &Database,
        entity_type: EntityType,
        entity_id: i64,
    ) -> Result<Self, DeletionError> {
        let mut session = Self::new(entity_type, entity_id);
        session.prepare(db)?;
        Ok(session)
    }

    /// Build the plan and verify the target exists. `Selecting → Confirming`.
    #[instrument(skip(self, db), fields(session = %self.id, entity = %self.entity_type, id = self.entity_id))]
    pub fn prepare(&mut self, db: &Database) -> Result<&DeletionPlan, DeletionError> {
        self.expect(SessionStatus::Selecting, "selecting")?;

        let plan = if self.entity_type.is_known() {
            build_plan(&self.entity_type, self.entity_id)?
        } else {
            // Validate the table name before it is used for introspection.
            build_plan(&self.entity_type, self.entity_id)?;
            let key = db
                .primary_key_column(self.entity_type.relation())?
                .ok_or_else(|| self.not_found())?;
            build_plan_with_key(&self.entity_type, self.entity_id, &key)?
        };

        self.ensure_target_exists(db, &plan)?;

        info!(steps = plan.len(), "Deletion plan ready for confirmation");
        self.cursor = 0;
        self.history.clear();
        self.last_error = None;
        self.status = SessionStatus::Confirming;
        self.touch();

        Ok(&*self.plan.insert(plan))
    }

    /// Answer the confirmation prompt.
    ///
    /// `true` re-checks the target and moves to `Executing`; `false` returns
    /// to `Selecting` and discards the plan.
    #[instrument(skip(self, db), fields(session = %self.id))]
    pub fn confirm(&mut self, db: &Database, approve: bool) -> Result<SessionStatus, DeletionError> {
        self.expect(SessionStatus::Confirming, "confirming")?;

        if !approve {
            info!("Deletion cancelled at confirmation");
            self.plan = None;
            self.cursor = 0;
            self.status = SessionStatus::Selecting;
            self.touch();
            return Ok(self.status);
        }

        let plan = self.plan.as_ref().ok_or(DeletionError::InvalidState {
            expected: "a built plan",
            actual: self.status,
        })?;
        self.ensure_target_exists(db, plan)?;

        info!(steps = plan.len(), "Deletion confirmed");
        self.status = SessionStatus::Executing;
        self.touch();
        Ok(self.status)
    }

    /// Peek at the step the next `run_step` would act on.
    pub fn next_step(&self) -> Option<&DeletionStep> {
        if self.status != SessionStatus::Executing {
            return None;
        }
        self.plan.as_ref()?.step(self.cursor)
    }

    /// Execute or skip the current step.
    ///
    /// On success (or skip) the cursor advances, and the session becomes
    /// `Done` after the last step. On failure the cursor stays put and the
    /// classified error is returned; the same step will be offered again.
    #[instrument(skip(self, db), fields(session = %self.id, cursor = self.cursor))]
    pub fn run_step(
        &mut self,
        db: &mut Database,
        decision: StepDecision,
    ) -> Result<StepResult, DeletionError> {
        self.expect(SessionStatus::Executing, "executing")?;

        let step = self
            .next_step()
            .cloned()
            .ok_or(DeletionError::InvalidState {
                expected: "a pending step",
                actual: self.status,
            })?;

        let outcome = match decision {
            StepDecision::Skip => {
                info!(step = %step.name, relation = %step.relation, "Step skipped by operator");
                StepOutcome::Skipped
            }
            StepDecision::Confirm => {
                step.validate()
                    .map_err(|err| DeletionError::from_step(&step, err))?;

                match db.transaction(|tx| step.execute(tx)) {
                    Ok(rows_affected) => {
                        info!(
                            step = %step.name,
                            kind = %step.kind,
                            relation = %step.relation,
                            rows_affected,
                            "Step executed"
                        );
                        StepOutcome::Executed { rows_affected }
                    }
                    Err(err) => {
                        let err = DeletionError::from_step(&step, err);
                        warn!(step = %step.name, class = %err.class(), error = %err, "Step failed");
                        self.last_error = Some(err.to_string());
                        self.touch();
                        return Err(err);
                    }
                }
            }
        };

        self.history.push(StepRecord {
            index: self.cursor,
            name: step.name.clone(),
            outcome,
            at: Utc::now(),
        });
        self.cursor += 1;
        self.last_error = None;

        let progress = self.progress();
        if progress.cursor == progress.total {
            info!(entity = %self.entity_type, id = self.entity_id, "Deletion complete");
            self.status = SessionStatus::Done;
        }
        self.touch();

        Ok(StepResult {
            step,
            outcome,
            progress,
            status: self.status,
        })
    }

    /// Abandon the session. Committed steps stay committed.
    ///
    /// Allowed from `Confirming` or `Executing`; a second call on an aborted
    /// session is a no-op.
    pub fn abort(&mut self) -> Result<(), DeletionError> {
        match self.status {
            SessionStatus::Aborted => Ok(()),
            SessionStatus::Confirming | SessionStatus::Executing => {
                warn!(
                    session = %self.id,
                    completed = self.cursor,
                    total = self.progress().total,
                    "Deletion aborted; completed steps are not rolled back"
                );
                self.status = SessionStatus::Aborted;
                self.touch();
                Ok(())
            }
            actual => Err(DeletionError::InvalidState {
                expected: "confirming or executing",
                actual,
            }),
        }
    }

    /// `(cursor, len(plan))`; `(0, 0)` before a plan exists
    pub fn progress(&self) -> Progress {
        Progress {
            cursor: self.cursor,
            total: self.plan.as_ref().map_or(0, DeletionPlan::len),
        }
    }

    /// Check the structural invariants of a session loaded from storage.
    pub fn validate(&self) -> Result<(), DeletionError> {
        match (&self.plan, self.status) {
            (None, SessionStatus::Selecting) => {}
            (None, status) => {
                return Err(DeletionError::Validation(format!(
                    "session is {status} but has no plan"
                )))
            }
            (Some(plan), _) => {
                plan.check_shape()?;
                if plan.entity_type() != &self.entity_type || plan.entity_id() != self.entity_id {
                    return Err(DeletionError::Validation(
                        "plan does not match the session's target".to_string(),
                    ));
                }
            }
        }

        let total = self.progress().total;
        if self.cursor > total {
            return Err(DeletionError::Validation(format!(
                "cursor {} is past the end of a {total}-step plan",
                self.cursor
            )));
        }
        if self.status == SessionStatus::Done && self.cursor != total {
            return Err(DeletionError::Validation(
                "session is done but steps remain".to_string(),
            ));
        }
        if self.status == SessionStatus::Executing && self.cursor == total {
            return Err(DeletionError::Validation(
                "session is executing but has no steps left".to_string(),
            ));
        }
        Ok(())
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn entity_type(&self) -> &EntityType {
        &self.entity_type
    }

    pub fn entity_id(&self) -> i64 {
        self.entity_id
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn plan(&self) -> Option<&DeletionPlan> {
        self.plan.as_ref()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Steps the cursor has moved past, with how each was handled
    pub fn history(&self) -> &[StepRecord] {
        &self.history
    }

    /// Message of the most recent failed attempt at the current step
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    fn expect(&self, wanted: SessionStatus, expected: &'static str) -> Result<(), DeletionError> {
        if self.status == wanted {
            Ok(())
        } else {
            Err(DeletionError::InvalidState {
                expected,
                actual: self.status,
            })
        }
    }

    fn ensure_target_exists(&self, db: &Database, plan: &DeletionPlan) -> Result<(), DeletionError> {
        let target = plan
            .target()
            .ok_or_else(|| DeletionError::Validation("deletion plan is empty".to_string()))?;

        if db.row_exists(&target.relation, &target.predicate.column, self.entity_id)? {
            Ok(())
        } else {
            Err(self.not_found())
        }
    }

    fn not_found(&self) -> DeletionError {
        DeletionError::NotFound {
            entity_type: self.entity_type.to_string(),
            id: self.entity_id,
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
