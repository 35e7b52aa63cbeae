//! Workflow session and step repository for `SQLite` persistence.
//!
//! Saves are idempotent upserts. I/O errors surface unmodified as
//! `AppError::Db`; nothing here retries.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::models::session::{ClarificationStatus, Phase, WorkflowSession};
use crate::models::step::{Step, StepStatus, WorkflowStep};
use crate::{AppError, Result};

use super::db::Database;

/// Repository wrapper around `SQLite` for workflow sessions and steps.
#[derive(Clone)]
pub struct SessionStore {
    db: Arc<Database>,
}

/// Internal row struct for `SQLite` deserialization.
#[derive(sqlx::FromRow)]
struct SessionRow {
    skill_name: String,
    skill_type: String,
    domain: String,
    skill_dir: String,
    current_phase: String,
    phases_completed: String,
    mode: String,
    clarifications_total: i64,
    clarifications_answered: i64,
    auto_filled: i64,
    created_at: String,
    last_activity: String,
}

impl SessionRow {
    /// Convert a database row into the domain model.
    fn into_session(self) -> Result<WorkflowSession> {
        let phases_completed: Vec<Phase> = serde_json::from_str(&self.phases_completed)
            .map_err(|e| AppError::Db(format!("invalid phases_completed: {e}")))?;

        Ok(WorkflowSession {
            skill_name: self.skill_name,
            skill_type: self.skill_type,
            domain: self.domain,
            skill_dir: PathBuf::from(self.skill_dir),
            current_phase: self.current_phase.parse()?,
            phases_completed,
            mode: self.mode.parse()?,
            clarification_status: ClarificationStatus {
                total: u32::try_from(self.clarifications_total).unwrap_or(0),
                answered: u32::try_from(self.clarifications_answered).unwrap_or(0),
            },
            auto_filled: self.auto_filled != 0,
            created_at: parse_ts("created_at", &self.created_at)?,
            last_activity: parse_ts("last_activity", &self.last_activity)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct StepRow {
    skill_name: String,
    step_id: i64,
    status: String,
    started_at: Option<String>,
    completed_at: Option<String>,
}

impl StepRow {
    fn into_step(self) -> Result<WorkflowStep> {
        Ok(WorkflowStep {
            skill_name: self.skill_name,
            step: Step::from_id(self.step_id)?,
            status: self.status.parse()?,
            started_at: self
                .started_at
                .as_deref()
                .map(|s| parse_ts("started_at", s))
                .transpose()?,
            completed_at: self
                .completed_at
                .as_deref()
                .map(|s| parse_ts("completed_at", s))
                .transpose()?,
        })
    }
}

pub(crate) fn parse_ts(field: &str, raw: &str) -> Result<DateTime<Utc>> {
    chrono::DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| AppError::Db(format!("invalid {field}: {e}")))
}

impl SessionStore {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Retrieve the session for a skill.
    ///
    /// Returns `Ok(None)` if no session exists.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn get(&self, skill_name: &str) -> Result<Option<WorkflowSession>> {
        let row: Option<SessionRow> =
            sqlx::query_as("SELECT * FROM workflow_session WHERE skill_name = ?1")
                .bind(skill_name)
                .fetch_optional(self.db.as_ref())
                .await?;

        row.map(SessionRow::into_session).transpose()
    }

    /// Insert or replace the session record.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the upsert fails.
    pub async fn save(&self, session: &WorkflowSession) -> Result<()> {
        let phases_completed = serde_json::to_string(&session.phases_completed)
            .map_err(|e| AppError::Db(format!("serialize phases_completed: {e}")))?;

        sqlx::query(
            "INSERT INTO workflow_session (skill_name, skill_type, domain, skill_dir,
             current_phase, phases_completed, mode, clarifications_total,
             clarifications_answered, auto_filled, created_at, last_activity)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
             ON CONFLICT(skill_name) DO UPDATE SET
                 skill_type = ?2, domain = ?3, skill_dir = ?4, current_phase = ?5,
                 phases_completed = ?6, mode = ?7, clarifications_total = ?8,
                 clarifications_answered = ?9, auto_filled = ?10, last_activity = ?12",
        )
        .bind(&session.skill_name)
        .bind(&session.skill_type)
        .bind(&session.domain)
        .bind(session.skill_dir.to_string_lossy().as_ref())
        .bind(session.current_phase.as_str())
        .bind(&phases_completed)
        .bind(session.mode.as_str())
        .bind(i64::from(session.clarification_status.total))
        .bind(i64::from(session.clarification_status.answered))
        .bind(i64::from(session.auto_filled))
        .bind(session.created_at.to_rfc3339())
        .bind(session.last_activity.to_rfc3339())
        .execute(self.db.as_ref())
        .await?;

        Ok(())
    }

    /// List every session, most recently active first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn list_all(&self) -> Result<Vec<WorkflowSession>> {
        let rows: Vec<SessionRow> =
            sqlx::query_as("SELECT * FROM workflow_session ORDER BY last_activity DESC")
                .fetch_all(self.db.as_ref())
                .await?;

        rows.into_iter().map(SessionRow::into_session).collect()
    }

    /// List step statuses for a skill in pipeline order.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn list_steps(&self, skill_name: &str) -> Result<Vec<WorkflowStep>> {
        let rows: Vec<StepRow> = sqlx::query_as(
            "SELECT skill_name, step_id, status, started_at, completed_at
             FROM workflow_step WHERE skill_name = ?1 ORDER BY step_id",
        )
        .bind(skill_name)
        .fetch_all(self.db.as_ref())
        .await?;

        rows.into_iter().map(StepRow::into_step).collect()
    }

    /// Set the status of one step, enforcing the step lifecycle.
    ///
    /// Entering `InProgress` stamps `started_at`; reaching `Completed`
    /// stamps `completed_at`; `Pending` clears both.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidTransition` for a forbidden transition, or
    /// `AppError::Db` if persistence fails.
    pub async fn update_step(&self, skill_name: &str, step: Step, status: StepStatus) -> Result<()> {
        let current: Option<(String,)> = sqlx::query_as(
            "SELECT status FROM workflow_step WHERE skill_name = ?1 AND step_id = ?2",
        )
        .bind(skill_name)
        .bind(step.id())
        .fetch_optional(self.db.as_ref())
        .await?;

        let from = match current {
            Some((raw,)) => raw.parse()?,
            None => StepStatus::Pending,
        };
        if !from.can_transition_to(status) {
            return Err(AppError::InvalidTransition(format!(
                "step {step} of '{skill_name}': {} -> {}",
                from.as_str(),
                status.as_str()
            )));
        }

        let now = Utc::now().to_rfc3339();
        let (started, completed) = match status {
            StepStatus::InProgress => (Some(now), None),
            StepStatus::Completed => (None, Some(now)),
            _ => (None, None),
        };

        sqlx::query(
            "INSERT INTO workflow_step (skill_name, step_id, status, started_at, completed_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(skill_name, step_id) DO UPDATE SET
                 status = ?3,
                 started_at = CASE WHEN ?3 = 'pending' THEN NULL
                                   ELSE COALESCE(?4, started_at) END,
                 completed_at = ?5",
        )
        .bind(skill_name)
        .bind(step.id())
        .bind(status.as_str())
        .bind(&started)
        .bind(&completed)
        .execute(self.db.as_ref())
        .await?;

        Ok(())
    }

    /// Reset `from` and every later pipeline step back to `Pending`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    pub async fn reset_steps_from(&self, skill_name: &str, from: Step) -> Result<()> {
        sqlx::query(
            "UPDATE workflow_step SET status = 'pending', started_at = NULL, completed_at = NULL
             WHERE skill_name = ?1 AND step_id >= ?2",
        )
        .bind(skill_name)
        .bind(from.id())
        .execute(self.db.as_ref())
        .await?;

        Ok(())
    }

    /// Delete the session and its steps. Agent-run history is kept.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if either delete fails.
    pub async fn delete_skill(&self, skill_name: &str) -> Result<()> {
        sqlx::query("DELETE FROM workflow_step WHERE skill_name = ?1")
            .bind(skill_name)
            .execute(self.db.as_ref())
            .await?;
        sqlx::query("DELETE FROM workflow_session WHERE skill_name = ?1")
            .bind(skill_name)
            .execute(self.db.as_ref())
            .await?;

        Ok(())
    }
}
