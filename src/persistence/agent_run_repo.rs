//! Agent run history repository.

use std::sync::Arc;

use chrono::Utc;

use crate::models::agent_run::{AgentRun, AgentRunStatus, TokenUsage};
use crate::models::step::Step;
use crate::{AppError, Result};

use super::db::Database;
use super::session_repo::parse_ts;

/// Repository for one-row-per-invocation agent records.
#[derive(Clone)]
pub struct AgentRunRepo {
    db: Arc<Database>,
}

#[derive(sqlx::FromRow)]
struct AgentRunRow {
    agent_id: String,
    skill_name: String,
    step_id: i64,
    model: String,
    status: String,
    input_tokens: i64,
    output_tokens: i64,
    cache_read_tokens: i64,
    cache_creation_tokens: i64,
    total_cost: f64,
    session_id: Option<String>,
    started_at: String,
    ended_at: Option<String>,
    stop_reason: Option<String>,
}

impl AgentRunRow {
    fn into_run(self) -> Result<AgentRun> {
        Ok(AgentRun {
            agent_id: self.agent_id,
            skill_name: self.skill_name,
            step: Step::from_id(self.step_id)?,
            model: self.model,
            status: parse_status(&self.status)?,
            usage: TokenUsage {
                input_tokens: to_u64(self.input_tokens),
                output_tokens: to_u64(self.output_tokens),
                cache_read_input_tokens: to_u64(self.cache_read_tokens),
                cache_creation_input_tokens: to_u64(self.cache_creation_tokens),
            },
            total_cost: self.total_cost,
            session_id: self.session_id,
            started_at: parse_ts("started_at", &self.started_at)?,
            ended_at: self
                .ended_at
                .as_deref()
                .map(|s| parse_ts("ended_at", s))
                .transpose()?,
            stop_reason: self.stop_reason,
        })
    }
}

fn parse_status(raw: &str) -> Result<AgentRunStatus> {
    match raw {
        "running" => Ok(AgentRunStatus::Running),
        "completed" => Ok(AgentRunStatus::Completed),
        "error" => Ok(AgentRunStatus::Error),
        "cancelled" => Ok(AgentRunStatus::Cancelled),
        other => Err(AppError::Db(format!("invalid agent run status: {other}"))),
    }
}

fn to_u64(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

impl AgentRunRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert a freshly started run.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the insert fails (including a duplicate id).
    pub async fn create(&self, run: &AgentRun) -> Result<()> {
        sqlx::query(
            "INSERT INTO agent_run (agent_id, skill_name, step_id, model, status,
             input_tokens, output_tokens, cache_read_tokens, cache_creation_tokens,
             total_cost, session_id, started_at, ended_at, stop_reason)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        )
        .bind(&run.agent_id)
        .bind(&run.skill_name)
        .bind(run.step.id())
        .bind(&run.model)
        .bind(run.status.as_str())
        .bind(to_i64(run.usage.input_tokens))
        .bind(to_i64(run.usage.output_tokens))
        .bind(to_i64(run.usage.cache_read_input_tokens))
        .bind(to_i64(run.usage.cache_creation_input_tokens))
        .bind(run.total_cost)
        .bind(&run.session_id)
        .bind(run.started_at.to_rfc3339())
        .bind(run.ended_at.map(|ts| ts.to_rfc3339()))
        .bind(&run.stop_reason)
        .execute(self.db.as_ref())
        .await?;

        Ok(())
    }

    /// Record the terminal state of a run.
    ///
    /// Only a run still marked `running` is updated, so a finalized record
    /// never changes afterwards. Returns whether a row was updated.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    pub async fn finalize(
        &self,
        agent_id: &str,
        status: AgentRunStatus,
        usage: TokenUsage,
        total_cost: f64,
        session_id: Option<&str>,
        stop_reason: Option<&str>,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE agent_run SET status = ?1, input_tokens = ?2, output_tokens = ?3,
                 cache_read_tokens = ?4, cache_creation_tokens = ?5, total_cost = ?6,
                 session_id = COALESCE(?7, session_id), ended_at = ?8, stop_reason = ?9
             WHERE agent_id = ?10 AND status = 'running'",
        )
        .bind(status.as_str())
        .bind(to_i64(usage.input_tokens))
        .bind(to_i64(usage.output_tokens))
        .bind(to_i64(usage.cache_read_input_tokens))
        .bind(to_i64(usage.cache_creation_input_tokens))
        .bind(total_cost)
        .bind(session_id)
        .bind(Utc::now().to_rfc3339())
        .bind(stop_reason)
        .bind(agent_id)
        .execute(self.db.as_ref())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Retrieve one run by id.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn get(&self, agent_id: &str) -> Result<Option<AgentRun>> {
        let row: Option<AgentRunRow> = sqlx::query_as("SELECT * FROM agent_run WHERE agent_id = ?1")
            .bind(agent_id)
            .fetch_optional(self.db.as_ref())
            .await?;

        row.map(AgentRunRow::into_run).transpose()
    }

    /// List every run for a skill, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn list_for_skill(&self, skill_name: &str) -> Result<Vec<AgentRun>> {
        let rows: Vec<AgentRunRow> = sqlx::query_as(
            "SELECT * FROM agent_run WHERE skill_name = ?1 ORDER BY started_at, agent_id",
        )
        .bind(skill_name)
        .fetch_all(self.db.as_ref())
        .await?;

        rows.into_iter().map(AgentRunRow::into_run).collect()
    }
}
