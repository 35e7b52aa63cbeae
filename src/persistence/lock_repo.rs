//! Skill lock table access.
//!
//! Every mutation is a single statement so concurrent instances sharing
//! the database file cannot interleave inside one operation.

use std::sync::Arc;

use crate::models::lock::SkillLock;
use crate::Result;

use super::db::Database;
use super::session_repo::parse_ts;

/// Repository for the `skill_lock` table.
#[derive(Clone)]
pub struct LockRepo {
    db: Arc<Database>,
}

#[derive(sqlx::FromRow)]
struct LockRow {
    skill_name: String,
    instance_id: String,
    pid: i64,
    acquired_at: String,
}

impl LockRow {
    fn into_lock(self) -> Result<SkillLock> {
        Ok(SkillLock {
            skill_name: self.skill_name,
            instance_id: self.instance_id,
            pid: u32::try_from(self.pid).unwrap_or(0),
            acquired_at: parse_ts("acquired_at", &self.acquired_at)?,
        })
    }
}

impl LockRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert the lock unless a row for the skill already exists.
    ///
    /// Returns `true` when this call created the row.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the insert fails.
    pub async fn try_insert(&self, lock: &SkillLock) -> Result<bool> {
        let result = sqlx::query(
            "INSERT INTO skill_lock (skill_name, instance_id, pid, acquired_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(skill_name) DO NOTHING",
        )
        .bind(&lock.skill_name)
        .bind(&lock.instance_id)
        .bind(i64::from(lock.pid))
        .bind(lock.acquired_at.to_rfc3339())
        .execute(self.db.as_ref())
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Read the current holder of a skill lock.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn get(&self, skill_name: &str) -> Result<Option<SkillLock>> {
        let row: Option<LockRow> = sqlx::query_as("SELECT * FROM skill_lock WHERE skill_name = ?1")
            .bind(skill_name)
            .fetch_optional(self.db.as_ref())
            .await?;

        row.map(LockRow::into_lock).transpose()
    }

    /// Delete `expected` only if it is still the exact holder.
    ///
    /// Returns `true` when the row was removed. A concurrent reclaim that
    /// already replaced the holder makes this a no-op.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the delete fails.
    pub async fn delete_if_holder(&self, expected: &SkillLock) -> Result<bool> {
        let result = sqlx::query(
            "DELETE FROM skill_lock
             WHERE skill_name = ?1 AND instance_id = ?2 AND pid = ?3 AND acquired_at = ?4",
        )
        .bind(&expected.skill_name)
        .bind(&expected.instance_id)
        .bind(i64::from(expected.pid))
        .bind(expected.acquired_at.to_rfc3339())
        .execute(self.db.as_ref())
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Delete the lock on `skill_name` if owned by `instance_id`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the delete fails.
    pub async fn delete_owned(&self, skill_name: &str, instance_id: &str) -> Result<bool> {
        let result =
            sqlx::query("DELETE FROM skill_lock WHERE skill_name = ?1 AND instance_id = ?2")
                .bind(skill_name)
                .bind(instance_id)
                .execute(self.db.as_ref())
                .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Delete every lock owned by `instance_id`. Returns the count removed.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the delete fails.
    pub async fn delete_all_owned(&self, instance_id: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM skill_lock WHERE instance_id = ?1")
            .bind(instance_id)
            .execute(self.db.as_ref())
            .await?;

        Ok(result.rows_affected())
    }

    /// List every lock row.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn list(&self) -> Result<Vec<SkillLock>> {
        let rows: Vec<LockRow> = sqlx::query_as("SELECT * FROM skill_lock ORDER BY skill_name")
            .fetch_all(self.db.as_ref())
            .await?;

        rows.into_iter().map(LockRow::into_lock).collect()
    }
}
