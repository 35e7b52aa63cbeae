//! Skill-level advisory lock manager.
//!
//! Exactly one live lock may exist per skill. A lock whose holder process
//! is gone (or whose pid was reused by a younger process) is stale and is
//! reclaimed transparently by the next `acquire`.
//!
//! Within one instance, every clone of a [`LockManager`] shares a claim
//! set, so concurrent callers of the same instance contend with each
//! other exactly like callers of different instances.

pub mod liveness;

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::models::lock::SkillLock;
use crate::persistence::db::Database;
use crate::persistence::lock_repo::LockRepo;
use crate::{AppError, Result};

/// Skills claimed by live handles of this instance.
type Claims = Arc<Mutex<HashSet<String>>>;

/// In-process claim on one skill, dropped with its [`LockHandle`].
#[derive(Debug)]
struct Claim {
    skill_name: String,
    claims: Claims,
}

impl Drop for Claim {
    fn drop(&mut self) {
        self.claims
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.skill_name);
    }
}

/// Proof of ownership returned by [`LockManager::acquire`].
///
/// Dropping a handle without [`LockManager::release`] frees the skill for
/// other callers of this instance but leaves the persisted record, which
/// this instance adopts on its next `acquire`.
#[derive(Debug)]
pub struct LockHandle {
    lock: SkillLock,
    _claim: Claim,
}

impl LockHandle {
    /// Locked skill.
    #[must_use]
    pub fn skill_name(&self) -> &str {
        &self.lock.skill_name
    }

    /// The persisted record this handle represents.
    #[must_use]
    pub fn record(&self) -> &SkillLock {
        &self.lock
    }
}

/// Acquires and releases skill locks on behalf of one orchestrator instance.
#[derive(Clone)]
pub struct LockManager {
    repo: LockRepo,
    instance_id: String,
    pid: u32,
    claims: Claims,
}

impl LockManager {
    /// Create a manager for this process.
    #[must_use]
    pub fn new(db: Arc<Database>, instance_id: impl Into<String>) -> Self {
        Self::with_pid(db, instance_id, std::process::id())
    }

    /// Create a manager that records `pid` as the holder process.
    #[must_use]
    pub fn with_pid(db: Arc<Database>, instance_id: impl Into<String>, pid: u32) -> Self {
        Self {
            repo: LockRepo::new(db),
            instance_id: instance_id.into(),
            pid,
            claims: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Identity written into lock records.
    #[must_use]
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Acquire the lock on `skill_name`.
    ///
    /// A skill already claimed by a live handle of this instance is
    /// contention. A persisted record left by this instance and process
    /// without a live handle is adopted.
    ///
    /// # Errors
    ///
    /// Returns `AppError::LockContention` naming the holder when another
    /// live caller owns the lock, or `AppError::Db` on store failure.
    pub async fn acquire(&self, skill_name: &str) -> Result<LockHandle> {
        let Some(claim) = self.claim(skill_name) else {
            let holder = self.repo.get(skill_name).await?.unwrap_or_else(|| SkillLock {
                skill_name: skill_name.to_owned(),
                instance_id: self.instance_id.clone(),
                pid: self.pid,
                acquired_at: Utc::now(),
            });
            debug!(skill_name, "skill already claimed within this instance");
            return Err(AppError::LockContention(holder));
        };

        // On any error the claim drops and the skill is free again.
        let lock = self.acquire_record(skill_name).await?;
        Ok(LockHandle {
            lock,
            _claim: claim,
        })
    }

    fn claim(&self, skill_name: &str) -> Option<Claim> {
        let inserted = self
            .claims
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(skill_name.to_owned());
        inserted.then(|| Claim {
            skill_name: skill_name.to_owned(),
            claims: Arc::clone(&self.claims),
        })
    }

    async fn acquire_record(&self, skill_name: &str) -> Result<SkillLock> {
        // A stale holder gets one reclaim attempt; losing the race after
        // that is contention like any other.
        for attempt in 0..2 {
            let candidate = SkillLock {
                skill_name: skill_name.to_owned(),
                instance_id: self.instance_id.clone(),
                pid: self.pid,
                acquired_at: Utc::now(),
            };

            if self.repo.try_insert(&candidate).await? {
                debug!(skill_name, instance_id = %self.instance_id, "lock acquired");
                return Ok(candidate);
            }

            let Some(holder) = self.repo.get(skill_name).await? else {
                // Released between insert and read; try again.
                continue;
            };

            if holder.instance_id == self.instance_id && holder.pid == self.pid {
                debug!(skill_name, "adopted lock record left by this instance");
                return Ok(holder);
            }

            if liveness::is_alive(holder.pid, holder.acquired_at).await || attempt > 0 {
                return Err(AppError::LockContention(holder));
            }

            if self.repo.delete_if_holder(&holder).await? {
                info!(
                    skill_name,
                    stale_instance = %holder.instance_id,
                    stale_pid = holder.pid,
                    "reclaimed stale lock"
                );
            }
        }

        match self.repo.get(skill_name).await? {
            Some(holder) => Err(AppError::LockContention(holder)),
            None => Err(AppError::Db(format!(
                "lock on '{skill_name}' could not be acquired"
            ))),
        }
    }

    /// Release a held lock. Only removes the record if this instance owns it.
    ///
    /// The in-process claim is given up after the record is removed.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` on store failure.
    pub async fn release(&self, handle: LockHandle) -> Result<()> {
        let removed = self
            .repo
            .delete_owned(&handle.lock.skill_name, &self.instance_id)
            .await?;
        if removed {
            debug!(skill_name = %handle.lock.skill_name, "lock released");
        } else {
            warn!(
                skill_name = %handle.lock.skill_name,
                "lock was no longer held by this instance at release"
            );
        }
        Ok(())
    }

    /// Release every lock held by this instance. Returns the count released.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` on store failure.
    pub async fn release_all(&self) -> Result<u64> {
        let released = self.repo.delete_all_owned(&self.instance_id).await?;
        if released > 0 {
            info!(released, instance_id = %self.instance_id, "released all held locks");
        }
        Ok(released)
    }

    /// List every lock record, live or stale.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` on store failure.
    pub async fn list_locked(&self) -> Result<Vec<SkillLock>> {
        self.repo.list().await
    }

    /// Delete every lock whose holder is no longer alive.
    ///
    /// Returns the skills that were reclaimed.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` on store failure.
    pub async fn reclaim_stale(&self) -> Result<Vec<String>> {
        let mut reclaimed = Vec::new();
        for lock in self.repo.list().await? {
            if liveness::is_alive(lock.pid, lock.acquired_at).await {
                continue;
            }
            if self.repo.delete_if_holder(&lock).await? {
                info!(skill_name = %lock.skill_name, stale_pid = lock.pid, "reclaimed stale lock");
                reclaimed.push(lock.skill_name);
            }
        }
        Ok(reclaimed)
    }

    /// Whether this instance currently owns the lock on `skill_name`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` on store failure.
    pub async fn is_held_by_me(&self, skill_name: &str) -> Result<bool> {
        Ok(self
            .repo
            .get(skill_name)
            .await?
            .is_some_and(|lock| lock.instance_id == self.instance_id))
    }
}
