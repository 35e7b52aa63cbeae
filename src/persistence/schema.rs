//! `SQLite` schema bootstrap logic.
//!
//! All table definitions use `CREATE TABLE IF NOT EXISTS` and are re-run
//! on every startup.

use sqlx::SqlitePool;

use crate::Result;

/// Apply all table definitions to the connected `SQLite` database.
///
/// # Errors
///
/// Returns `AppError::Db` if any DDL statement fails.
pub async fn bootstrap_schema(pool: &SqlitePool) -> Result<()> {
    let ddl = r"
CREATE TABLE IF NOT EXISTS workflow_session (
    skill_name      TEXT PRIMARY KEY NOT NULL,
    skill_type      TEXT NOT NULL,
    domain          TEXT NOT NULL,
    skill_dir       TEXT NOT NULL,
    current_phase   TEXT NOT NULL CHECK(current_phase IN ('fresh','scoping','research','clarification','refinement_pending','refinement','decisions','generation','validation')),
    phases_completed TEXT NOT NULL DEFAULT '[]',
    mode            TEXT NOT NULL CHECK(mode IN ('guided','express','iterative')),
    clarifications_total    INTEGER NOT NULL DEFAULT 0,
    clarifications_answered INTEGER NOT NULL DEFAULT 0,
    auto_filled     INTEGER NOT NULL DEFAULT 0,
    created_at      TEXT NOT NULL,
    last_activity   TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS workflow_step (
    skill_name      TEXT NOT NULL,
    step_id         INTEGER NOT NULL,
    status          TEXT NOT NULL CHECK(status IN ('pending','in_progress','waiting_for_user','completed','error')),
    started_at      TEXT,
    completed_at    TEXT,
    PRIMARY KEY (skill_name, step_id)
);

CREATE TABLE IF NOT EXISTS agent_run (
    agent_id        TEXT PRIMARY KEY NOT NULL,
    skill_name      TEXT NOT NULL,
    step_id         INTEGER NOT NULL,
    model           TEXT NOT NULL,
    status          TEXT NOT NULL CHECK(status IN ('running','completed','error','cancelled')),
    input_tokens    INTEGER NOT NULL DEFAULT 0,
    output_tokens   INTEGER NOT NULL DEFAULT 0,
    cache_read_tokens     INTEGER NOT NULL DEFAULT 0,
    cache_creation_tokens INTEGER NOT NULL DEFAULT 0,
    total_cost      REAL NOT NULL DEFAULT 0,
    session_id      TEXT,
    started_at      TEXT NOT NULL,
    ended_at        TEXT,
    stop_reason     TEXT
);

CREATE TABLE IF NOT EXISTS skill_lock (
    skill_name      TEXT PRIMARY KEY NOT NULL,
    instance_id     TEXT NOT NULL,
    pid             INTEGER NOT NULL,
    acquired_at     TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_agent_run_skill ON agent_run(skill_name);
CREATE INDEX IF NOT EXISTS idx_skill_lock_instance ON skill_lock(instance_id);
";

    sqlx::raw_sql(ddl).execute(pool).await?;
    Ok(())
}
