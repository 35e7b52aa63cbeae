//! Filesystem-driven phase detection.
//!
//! Artifacts on disk are authoritative. The persisted session phase is a
//! cache and is overridden whenever the two disagree.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::clarifications::ClarificationsDocument;
use crate::models::session::{ClarificationStatus, Phase, WorkflowSession};
use crate::persistence::session_repo::SessionStore;
use crate::Result;

/// Clarifications document, relative to the skill directory.
pub const CLARIFICATIONS_FILE: &str = "context/clarifications.md";
/// Decisions document, relative to the skill directory.
pub const DECISIONS_FILE: &str = "context/decisions.md";
/// Generated skill entry file, relative to the skill directory.
pub const SKILL_FILE: &str = "SKILL.md";
/// Validation report, relative to the skill directory.
pub const VALIDATION_REPORT_FILE: &str = "context/validation-report.md";
/// Working directory for intermediate artifacts.
pub const CONTEXT_DIR: &str = "context";

/// Resolved artifact paths for one skill.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkillArtifacts {
    /// Skill directory.
    pub root: PathBuf,
}

impl SkillArtifacts {
    /// Artifacts under `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `context/clarifications.md`.
    #[must_use]
    pub fn clarifications(&self) -> PathBuf {
        self.root.join(CLARIFICATIONS_FILE)
    }

    /// `context/decisions.md`.
    #[must_use]
    pub fn decisions(&self) -> PathBuf {
        self.root.join(DECISIONS_FILE)
    }

    /// `SKILL.md`.
    #[must_use]
    pub fn skill(&self) -> PathBuf {
        self.root.join(SKILL_FILE)
    }

    /// `context/validation-report.md`.
    #[must_use]
    pub fn validation_report(&self) -> PathBuf {
        self.root.join(VALIDATION_REPORT_FILE)
    }

    /// `context/`.
    #[must_use]
    pub fn context_dir(&self) -> PathBuf {
        self.root.join(CONTEXT_DIR)
    }
}

/// Facts gathered from the skill directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArtifactScan {
    /// Validation report exists.
    pub validation_report: bool,
    /// Skill entry file exists.
    pub skill_file: bool,
    /// Decisions document exists.
    pub decisions: bool,
    /// Clarification counts, refinements included, if the document exists.
    pub clarifications: Option<ClarificationStatus>,
    /// Refinement-only counts, if any refinements exist.
    pub refinements: Option<ClarificationStatus>,
    /// Whether a session record exists.
    pub has_session: bool,
    /// Whether `context/` exists.
    pub context_dir: bool,
}

impl ArtifactScan {
    /// Read the skill directory.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the clarifications file exists but cannot
    /// be read. Unparseable content never errors.
    pub fn scan(artifacts: &SkillArtifacts, has_session: bool) -> Result<Self> {
        let document = ClarificationsDocument::load_if_exists(&artifacts.clarifications())?;
        let refinements = document
            .as_ref()
            .filter(|doc| doc.has_refinements())
            .map(ClarificationsDocument::refinement_status);

        Ok(Self {
            validation_report: artifacts.validation_report().is_file(),
            skill_file: artifacts.skill().is_file(),
            decisions: artifacts.decisions().is_file(),
            clarifications: document.as_ref().map(ClarificationsDocument::status),
            refinements,
            has_session,
            context_dir: artifacts.context_dir().is_dir(),
        })
    }
}

/// One row of the detection table.
struct PhaseRule {
    phase: Phase,
    matches: fn(&ArtifactScan) -> bool,
}

/// Most advanced phase first; the first matching row wins.
const PHASE_RULES: &[PhaseRule] = &[
    PhaseRule {
        phase: Phase::Validation,
        matches: |scan| scan.validation_report,
    },
    PhaseRule {
        phase: Phase::Generation,
        matches: |scan| scan.skill_file,
    },
    PhaseRule {
        phase: Phase::Decisions,
        matches: |scan| scan.decisions,
    },
    PhaseRule {
        phase: Phase::Refinement,
        matches: |scan| scan.refinements.is_some_and(|r| r.answered > 0),
    },
    PhaseRule {
        phase: Phase::RefinementPending,
        matches: |scan| scan.refinements.is_some_and(|r| r.answered == 0),
    },
    PhaseRule {
        phase: Phase::Clarification,
        matches: |scan| scan.clarifications.is_some_and(|c| c.answered > 0),
    },
    PhaseRule {
        phase: Phase::Research,
        matches: |scan| scan.clarifications.is_some(),
    },
    PhaseRule {
        phase: Phase::Scoping,
        matches: |scan| scan.has_session || scan.context_dir,
    },
];

/// Pure phase derivation from scanned facts.
#[must_use]
pub fn phase_from_scan(scan: &ArtifactScan) -> Phase {
    PHASE_RULES
        .iter()
        .find(|rule| (rule.matches)(scan))
        .map_or(Phase::Fresh, |rule| rule.phase)
}

/// Result of a detection pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    /// Authoritative, artifact-derived phase.
    pub phase: Phase,
    /// Phase recorded in the session, if any.
    pub persisted: Option<Phase>,
    /// Whether the persisted phase disagreed and was overridden.
    pub corrected: bool,
    /// Clarification counts, if the document exists.
    pub clarification_status: Option<ClarificationStatus>,
}

/// Detect the phase of the skill in `skill_dir`.
///
/// Idempotent: with no filesystem change, repeated calls return the same
/// result. Disagreement with the persisted phase is logged as a
/// correction.
///
/// # Errors
///
/// Returns `AppError::Io` if an existing artifact cannot be read.
pub fn detect_phase(skill_dir: &Path, session: Option<&WorkflowSession>) -> Result<Detection> {
    let artifacts = SkillArtifacts::new(skill_dir);
    let scan = ArtifactScan::scan(&artifacts, session.is_some())?;
    let phase = phase_from_scan(&scan);
    let persisted = session.map(|s| s.current_phase);
    let corrected = persisted.is_some_and(|p| p != phase);

    if let Some(persisted) = persisted.filter(|_| corrected) {
        info!(
            skill_dir = %skill_dir.display(),
            persisted = %persisted,
            detected = %phase,
            "phase corrected from artifacts"
        );
    }

    Ok(Detection {
        phase,
        persisted,
        corrected,
        clarification_status: scan.clarifications,
    })
}

/// Detect the phase and write any correction back to the store.
///
/// Returns the detection and the reconciled session (if one exists).
///
/// # Errors
///
/// Returns `AppError::Io` on artifact read failure or `AppError::Db` if the
/// corrected session cannot be saved.
pub async fn reconcile(
    store: &SessionStore,
    skill_dir: &Path,
    skill_name: &str,
) -> Result<(Detection, Option<WorkflowSession>)> {
    let mut session = store.get(skill_name).await?;
    let detection = detect_phase(skill_dir, session.as_ref())?;

    if let Some(session) = session.as_mut() {
        let status = detection.clarification_status.unwrap_or_default();
        if detection.corrected || session.clarification_status != status {
            if detection.corrected {
                session.advance_to(detection.phase);
            }
            session.clarification_status = status;
            session.touch();
            store.save(session).await?;
        }
    }

    Ok((detection, session))
}
