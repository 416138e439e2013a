use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

/// Lifecycle status of a live scoring session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Scores and position can still change.
    Active,
    /// Final scores were persisted; the session is over.
    Finalized,
    /// The session was discarded without persisting anything.
    Stopped,
}

impl SessionStatus {
    /// Whether no further mutation is allowed.
    pub fn is_terminal(self) -> bool {
        !matches!(self, SessionStatus::Active)
    }
}

/// Commands that can be applied to a session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// A scorer upserted a score entry.
    SubmitScore,
    /// A scorer moved the current inning or hole.
    AdvancePosition,
    /// Final scores are being persisted.
    Finalize,
    /// The session is discarded.
    Stop,
}

/// Error returned when attempting to apply an invalid transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while {from:?}")]
pub struct InvalidTransition {
    /// The status the session was in when the event was received.
    pub from: SessionStatus,
    /// The event that cannot be applied from this status.
    pub event: LifecycleEvent,
}

/// Errors that can occur when planning a lifecycle transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    /// A transition is already pending and must be applied or aborted.
    #[error("a lifecycle transition is already pending")]
    AlreadyPending,
    /// The requested transition is not valid from the current status.
    #[error(transparent)]
    InvalidTransition(InvalidTransition),
}

/// Errors that can occur when applying a planned transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApplyError {
    /// No transition is currently pending.
    #[error("no transition is pending")]
    NoPending,
    /// Plan ID does not match the pending plan.
    #[error("pending transition {expected} does not match {got}")]
    IdMismatch {
        /// Expected plan ID.
        expected: PlanId,
        /// Provided plan ID.
        got: PlanId,
    },
    /// Status changed since the plan was created.
    #[error("status changed during transition (expected {expected:?}, got {actual:?})")]
    StatusMismatch {
        /// Status when the plan was created.
        expected: SessionStatus,
        /// Current status.
        actual: SessionStatus,
    },
    /// Version changed since the plan was created.
    #[error("version changed during transition (expected {expected}, got {actual})")]
    VersionMismatch {
        /// Version the plan would produce.
        expected: u64,
        /// Version applying now would produce.
        actual: u64,
    },
}

/// Errors that can occur when aborting a planned transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AbortError {
    /// No transition is currently pending.
    #[error("no transition is pending")]
    NoPending,
    /// Plan ID does not match the pending plan.
    #[error("pending transition {expected} does not match {got}")]
    IdMismatch {
        /// Expected plan ID.
        expected: PlanId,
        /// Provided plan ID.
        got: PlanId,
    },
}

/// Unique identifier for a planned transition.
pub type PlanId = Uuid;

/// A validated transition that has not been applied yet.
#[derive(Debug, Clone)]
pub struct Plan {
    /// Unique identifier for this plan.
    pub id: PlanId,
    /// Status the session is currently in.
    pub from: SessionStatus,
    /// Status the session will move to.
    pub to: SessionStatus,
    /// Event that triggered this transition.
    pub event: LifecycleEvent,
    /// Version number after applying this transition.
    pub version_next: u64,
}

/// Status machine of one session: `active → finalized | stopped`, never backwards.
///
/// Every applied event bumps the version so observers can order and de-duplicate the
/// resulting broadcasts. Terminal transitions that need asynchronous work (persisting final
/// scores) are planned first and applied or aborted once the work completes.
#[derive(Debug, Clone)]
pub struct SessionLifecycle {
    status: SessionStatus,
    version: u64,
    pending: Option<Plan>,
}

impl Default for SessionLifecycle {
    fn default() -> Self {
        Self {
            status: SessionStatus::Active,
            version: 1,
            pending: None,
        }
    }
}

impl SessionLifecycle {
    /// Lifecycle of a freshly started session.
    pub fn started() -> Self {
        Self::default()
    }

    /// Inspect the current status.
    pub fn status(&self) -> SessionStatus {
        self.status
    }

    /// Current version.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Validate and immediately apply an event, returning the new version.
    pub fn record(&mut self, event: LifecycleEvent) -> Result<u64, PlanError> {
        if self.pending.is_some() {
            return Err(PlanError::AlreadyPending);
        }
        self.status = self
            .compute_transition(event)
            .map_err(PlanError::InvalidTransition)?;
        self.version += 1;
        Ok(self.version)
    }

    /// Plan a transition by validating that the event can be applied from the current status.
    pub fn plan(&mut self, event: LifecycleEvent) -> Result<Plan, PlanError> {
        if self.pending.is_some() {
            return Err(PlanError::AlreadyPending);
        }

        let next = self
            .compute_transition(event)
            .map_err(PlanError::InvalidTransition)?;

        let plan = Plan {
            id: Uuid::new_v4(),
            from: self.status,
            to: next,
            event,
            version_next: self.version + 1,
        };
        self.pending = Some(plan.clone());
        Ok(plan)
    }

    /// Apply a planned transition, returning the new status.
    pub fn apply(&mut self, plan_id: PlanId) -> Result<SessionStatus, ApplyError> {
        let plan = self.pending.take().ok_or(ApplyError::NoPending)?;

        if plan.id != plan_id {
            let expected = plan.id;
            self.pending = Some(plan);
            return Err(ApplyError::IdMismatch {
                expected,
                got: plan_id,
            });
        }

        if self.status != plan.from {
            return Err(ApplyError::StatusMismatch {
                expected: plan.from,
                actual: self.status,
            });
        }

        if self.version + 1 != plan.version_next {
            return Err(ApplyError::VersionMismatch {
                expected: plan.version_next,
                actual: self.version + 1,
            });
        }

        self.status = plan.to;
        self.version = plan.version_next;
        Ok(self.status)
    }

    /// Drop a planned transition, leaving the lifecycle untouched.
    pub fn abort(&mut self, plan_id: PlanId) -> Result<(), AbortError> {
        let plan = self.pending.as_ref().ok_or(AbortError::NoPending)?;

        if plan.id != plan_id {
            return Err(AbortError::IdMismatch {
                expected: plan.id,
                got: plan_id,
            });
        }

        self.pending = None;
        Ok(())
    }

    fn compute_transition(&self, event: LifecycleEvent) -> Result<SessionStatus, InvalidTransition> {
        let next = match (self.status, event) {
            (SessionStatus::Active, LifecycleEvent::SubmitScore)
            | (SessionStatus::Active, LifecycleEvent::AdvancePosition) => SessionStatus::Active,
            (SessionStatus::Active, LifecycleEvent::Finalize) => SessionStatus::Finalized,
            (SessionStatus::Active, LifecycleEvent::Stop) => SessionStatus::Stopped,
            (from, event) => return Err(InvalidTransition { from, event }),
        };
        Ok(next)
    }
}
