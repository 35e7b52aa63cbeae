//! Workflow step model and status lifecycle.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::AppError;

/// Unit of pipeline work tracked per skill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    /// Capture skill name, type, and domain.
    Scoping,
    /// Research agents write the clarifications document.
    Research,
    /// Human answers clarifications; evaluated for sufficiency.
    ClarificationReview,
    /// Research agents append refinement questions.
    DetailedResearch,
    /// Decisions synthesized from answers.
    Decisions,
    /// Skill files generated from decisions.
    Generation,
    /// Generated skill validated.
    Validation,
    /// Iterative improvement of a finished skill.
    Refine,
    /// One-off question answered about the skill; never changes phase.
    Companion,
}

impl Step {
    /// Every step in pipeline order.
    pub const ALL: [Step; 9] = [
        Step::Scoping,
        Step::Research,
        Step::ClarificationReview,
        Step::DetailedResearch,
        Step::Decisions,
        Step::Generation,
        Step::Validation,
        Step::Refine,
        Step::Companion,
    ];

    /// Stable numeric identifier stored in `workflow_step.step_id`.
    #[must_use]
    pub fn id(self) -> i64 {
        match self {
            Self::Scoping => 0,
            Self::Research => 1,
            Self::ClarificationReview => 2,
            Self::DetailedResearch => 3,
            Self::Decisions => 4,
            Self::Generation => 5,
            Self::Validation => 6,
            Self::Refine => 7,
            Self::Companion => 8,
        }
    }

    /// Inverse of [`Step::id`].
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` for an unknown identifier.
    pub fn from_id(id: i64) -> crate::Result<Self> {
        Step::ALL
            .into_iter()
            .find(|step| step.id() == id)
            .ok_or_else(|| AppError::Db(format!("invalid step id: {id}")))
    }

    /// Human-readable name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Scoping => "scoping",
            Self::Research => "research",
            Self::ClarificationReview => "clarification_review",
            Self::DetailedResearch => "detailed_research",
            Self::Decisions => "decisions",
            Self::Generation => "generation",
            Self::Validation => "validation",
            Self::Refine => "refine",
            Self::Companion => "companion",
        }
    }
}

impl Display for Step {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a single step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Not started.
    Pending,
    /// Agents running.
    InProgress,
    /// Agents finished; waiting on human answers.
    WaitingForUser,
    /// Finished successfully.
    Completed,
    /// Failed; retry is an explicit caller action.
    Error,
}

impl StepStatus {
    /// Wire/database representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::WaitingForUser => "waiting_for_user",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }

    /// Determine whether a lifecycle transition is permitted.
    ///
    /// Any state may be reset to `Pending`, and finished states may be
    /// re-entered when the pipeline loops back.
    #[must_use]
    pub fn can_transition_to(self, next: StepStatus) -> bool {
        if self == next {
            return true;
        }
        matches!(
            (self, next),
            (_, StepStatus::Pending)
                | (
                    StepStatus::Pending
                        | StepStatus::WaitingForUser
                        | StepStatus::Completed
                        | StepStatus::Error,
                    StepStatus::InProgress
                )
                | (
                    StepStatus::InProgress,
                    StepStatus::WaitingForUser | StepStatus::Completed | StepStatus::Error
                )
                | (StepStatus::WaitingForUser, StepStatus::Completed)
        )
    }
}

impl FromStr for StepStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "waiting_for_user" => Ok(Self::WaitingForUser),
            "completed" => Ok(Self::Completed),
            "error" => Ok(Self::Error),
            other => Err(AppError::Db(format!("invalid step status: {other}"))),
        }
    }
}

/// Persisted status of one step of one skill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowStep {
    /// Owning skill.
    pub skill_name: String,
    /// Which step.
    pub step: Step,
    /// Current status.
    pub status: StepStatus,
    /// When the step last entered `InProgress`.
    pub started_at: Option<DateTime<Utc>>,
    /// When the step last reached `Completed`.
    pub completed_at: Option<DateTime<Utc>>,
}
