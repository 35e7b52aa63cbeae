//! Agent run history model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::step::Step;

/// Terminal or running state of one agent subprocess.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AgentRunStatus {
    /// Subprocess alive.
    Running,
    /// Exited 0 after a terminal `result` message.
    Completed,
    /// Crashed, exited non-zero, or reported an error result.
    Error,
    /// Killed by an explicit cancel.
    Cancelled,
}

impl AgentRunStatus {
    /// Wire/database representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Error => "error",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Token counters reported by the terminal `result` message.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenUsage {
    /// Prompt tokens.
    #[serde(default)]
    pub input_tokens: u64,
    /// Completion tokens.
    #[serde(default)]
    pub output_tokens: u64,
    /// Prompt tokens served from cache.
    #[serde(default)]
    pub cache_read_input_tokens: u64,
    /// Prompt tokens written to cache.
    #[serde(default)]
    pub cache_creation_input_tokens: u64,
}

/// One row per agent subprocess invocation; immutable once finalized.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentRun {
    /// Unique agent identifier.
    pub agent_id: String,
    /// Owning skill.
    pub skill_name: String,
    /// Step the agent worked on.
    pub step: Step,
    /// Model identifier passed to the sidecar.
    pub model: String,
    /// Current status.
    pub status: AgentRunStatus,
    /// Token counters.
    pub usage: TokenUsage,
    /// Monetary cost in USD.
    pub total_cost: f64,
    /// Sidecar session id, usable to resume the conversation.
    pub session_id: Option<String>,
    /// Spawn timestamp.
    pub started_at: DateTime<Utc>,
    /// Finalization timestamp.
    pub ended_at: Option<DateTime<Utc>>,
    /// Stop reason from the `result` message, or the failure reason.
    pub stop_reason: Option<String>,
}

impl AgentRun {
    /// Construct a running record for a freshly spawned agent.
    #[must_use]
    pub fn started(agent_id: String, skill_name: String, step: Step, model: String) -> Self {
        Self {
            agent_id,
            skill_name,
            step,
            model,
            status: AgentRunStatus::Running,
            usage: TokenUsage::default(),
            total_cost: 0.0,
            session_id: None,
            started_at: Utc::now(),
            ended_at: None,
            stop_reason: None,
        }
    }
}
