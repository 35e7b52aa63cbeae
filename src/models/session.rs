//! Workflow session model and phase ordering.

use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::AppError;

/// Discrete pipeline stage, ordered from least to most advanced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// No session record and no artifacts.
    Fresh,
    /// Session created; research has not produced clarifications yet.
    Scoping,
    /// Clarifications written, no answers yet.
    Research,
    /// At least one clarification answered.
    Clarification,
    /// Refinement questions written, none answered.
    RefinementPending,
    /// Refinement questions being answered.
    Refinement,
    /// Decisions synthesized from the answers.
    Decisions,
    /// Skill files generated.
    Generation,
    /// Validation report written.
    Validation,
}

impl Phase {
    /// Every phase in pipeline order.
    pub const ALL: [Phase; 9] = [
        Phase::Fresh,
        Phase::Scoping,
        Phase::Research,
        Phase::Clarification,
        Phase::RefinementPending,
        Phase::Refinement,
        Phase::Decisions,
        Phase::Generation,
        Phase::Validation,
    ];

    /// Wire/database representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fresh => "fresh",
            Self::Scoping => "scoping",
            Self::Research => "research",
            Self::Clarification => "clarification",
            Self::RefinementPending => "refinement_pending",
            Self::Refinement => "refinement",
            Self::Decisions => "decisions",
            Self::Generation => "generation",
            Self::Validation => "validation",
        }
    }

    /// Whether the skill's entry file has already been produced.
    #[must_use]
    pub fn has_finished_artifact(self) -> bool {
        matches!(self, Self::Generation | Self::Validation)
    }

    /// Whether the phase is waiting on human answers in the clarifications file.
    #[must_use]
    pub fn awaits_answers(self) -> bool {
        matches!(
            self,
            Self::Research | Self::Clarification | Self::RefinementPending | Self::Refinement
        )
    }
}

impl Display for Phase {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Phase::ALL
            .into_iter()
            .find(|phase| phase.as_str() == s)
            .ok_or_else(|| AppError::Db(format!("invalid phase: {s}")))
    }
}

/// How much human involvement the pipeline expects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowMode {
    /// Every clarification round waits for a human.
    #[default]
    Guided,
    /// Empty answers are auto-filled from recommendations.
    Express,
    /// Refining an already generated skill.
    Iterative,
}

impl WorkflowMode {
    /// Wire/database representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Guided => "guided",
            Self::Express => "express",
            Self::Iterative => "iterative",
        }
    }
}

impl FromStr for WorkflowMode {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "guided" => Ok(Self::Guided),
            "express" => Ok(Self::Express),
            "iterative" => Ok(Self::Iterative),
            other => Err(AppError::Db(format!("invalid workflow mode: {other}"))),
        }
    }
}

/// Answer progress of the clarifications document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClarificationStatus {
    /// Number of questions, refinements included.
    pub total: u32,
    /// Number of answered questions.
    pub answered: u32,
}

/// One workflow record per skill build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct WorkflowSession {
    /// Unique skill name (primary key).
    pub skill_name: String,
    /// Kind of skill being built (e.g. `domain`, `platform`).
    pub skill_type: String,
    /// Functional domain the skill documents.
    pub domain: String,
    /// Directory holding the skill's artifacts.
    pub skill_dir: PathBuf,
    /// Cached phase; the artifact-derived phase wins on disagreement.
    pub current_phase: Phase,
    /// Completed phases in completion order, without duplicates.
    pub phases_completed: Vec<Phase>,
    /// Human-involvement mode.
    pub mode: WorkflowMode,
    /// Clarification answer counts at last detection.
    pub clarification_status: ClarificationStatus,
    /// Whether empty answers were filled from recommendations.
    pub auto_filled: bool,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp.
    pub last_activity: DateTime<Utc>,
}

impl WorkflowSession {
    /// Construct a new session entering the scoping phase.
    #[must_use]
    pub fn new(
        skill_name: String,
        skill_type: String,
        domain: String,
        skill_dir: PathBuf,
        mode: WorkflowMode,
    ) -> Self {
        let now = Utc::now();
        Self {
            skill_name,
            skill_type,
            domain,
            skill_dir,
            current_phase: Phase::Scoping,
            phases_completed: Vec::new(),
            mode,
            clarification_status: ClarificationStatus::default(),
            auto_filled: false,
            created_at: now,
            last_activity: now,
        }
    }

    /// Record `phase` as completed, keeping insertion order and uniqueness.
    pub fn mark_completed(&mut self, phase: Phase) {
        if !self.phases_completed.contains(&phase) {
            self.phases_completed.push(phase);
        }
    }

    /// Move to `phase`, marking every earlier phase as completed.
    pub fn advance_to(&mut self, phase: Phase) {
        for earlier in Phase::ALL.into_iter().filter(|p| *p < phase) {
            if earlier != Phase::Fresh {
                self.mark_completed(earlier);
            }
        }
        self.phases_completed.retain(|p| *p < phase);
        self.current_phase = phase;
        self.touch();
    }

    /// Bump `last_activity` to now.
    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }
}
