//! Skill lock record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Advisory exclusivity record for one skill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillLock {
    /// Locked skill.
    pub skill_name: String,
    /// Orchestrator instance holding the lock.
    pub instance_id: String,
    /// OS process id of the holder.
    pub pid: u32,
    /// Acquisition timestamp; used to detect PID reuse.
    pub acquired_at: DateTime<Utc>,
}
