//! Agent subprocess management.
//!
//! One OS process per agent invocation. Each process receives a single
//! JSON configuration object on stdin and streams newline-delimited JSON
//! messages on stdout, consumed by a dedicated reader task.
//!
//! - `codec`: bounded NDJSON line framing.
//! - `protocol`: stdin/stdout wire types.
//! - `reader`: per-agent stdout consumer.
//! - `manager`: spawn, supervise, cancel, and the shared registry.

pub mod codec;
pub mod manager;
pub mod protocol;
pub mod reader;

use std::path::PathBuf;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::models::agent_run::{AgentRunStatus, TokenUsage};

pub use manager::{AgentHandle, AgentManager};
pub use protocol::{AgentMessage, LaunchConfig, ResultMessage};

/// Capacity of the event channel created by callers of the manager.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Events emitted by agent reader and supervisor tasks.
///
/// Events for one agent arrive in emission order; events of different
/// agents interleave arbitrarily.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    /// The subprocess was spawned.
    Started {
        /// Agent identifier.
        agent_id: String,
        /// OS process id, if still known.
        pid: Option<u32>,
    },
    /// A decoded stdout message.
    Message {
        /// Agent identifier.
        agent_id: String,
        /// The message.
        message: AgentMessage,
    },
    /// Exited 0 after a successful `result` message.
    Completed {
        /// Agent identifier.
        agent_id: String,
        /// Terminal totals.
        result: ResultMessage,
    },
    /// Crashed, exited non-zero, or reported an error result.
    Failed {
        /// Agent identifier.
        agent_id: String,
        /// Human-readable cause.
        reason: String,
        /// Exit code when the process exited normally.
        exit_code: Option<i32>,
    },
    /// Killed by an explicit cancel.
    Cancelled {
        /// Agent identifier.
        agent_id: String,
    },
}

impl AgentEvent {
    /// The agent this event belongs to.
    #[must_use]
    pub fn agent_id(&self) -> &str {
        match self {
            Self::Started { agent_id, .. }
            | Self::Message { agent_id, .. }
            | Self::Completed { agent_id, .. }
            | Self::Failed { agent_id, .. }
            | Self::Cancelled { agent_id } => agent_id,
        }
    }

    /// Whether this is the last event for its agent.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed { .. } | Self::Failed { .. } | Self::Cancelled { .. }
        )
    }
}

/// A request to run one agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentRequest {
    /// Explicit identifier; a UUID is generated when absent.
    pub agent_id: Option<String>,
    /// Opaque instruction payload.
    pub prompt: String,
    /// Model override; the sidecar default applies when absent.
    pub model: Option<String>,
    /// Working directory of the subprocess.
    pub cwd: PathBuf,
    /// Sidecar session to continue.
    pub resume_session_id: Option<String>,
}

impl AgentRequest {
    /// Request with defaults for everything but the prompt and directory.
    #[must_use]
    pub fn new(prompt: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            agent_id: None,
            prompt: prompt.into(),
            model: None,
            cwd: cwd.into(),
            resume_session_id: None,
        }
    }

    /// Set an explicit agent id.
    #[must_use]
    pub fn with_agent_id(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    /// Override the model.
    #[must_use]
    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }

    /// Resume a previous sidecar session.
    #[must_use]
    pub fn resuming(mut self, session_id: impl Into<String>) -> Self {
        self.resume_session_id = Some(session_id.into());
        self
    }
}

/// Final state of one agent invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentOutcome {
    /// Agent identifier.
    pub agent_id: String,
    /// Terminal status (never `Running`).
    pub status: AgentRunStatus,
    /// Process exit code, if it exited normally.
    pub exit_code: Option<i32>,
    /// Terminal `result` message, if one was received.
    pub result: Option<ResultMessage>,
    /// Sidecar session id, usable to resume.
    pub session_id: Option<String>,
    /// Failure or cancellation cause.
    pub reason: Option<String>,
    /// Lines skipped as malformed.
    pub skipped_lines: usize,
}

impl AgentOutcome {
    /// Whether the agent completed successfully.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == AgentRunStatus::Completed
    }

    /// Token counters from the result, or zeros.
    #[must_use]
    pub fn usage(&self) -> TokenUsage {
        self.result.as_ref().map(|r| r.usage).unwrap_or_default()
    }

    /// Cost from the result, or zero.
    #[must_use]
    pub fn total_cost(&self) -> f64 {
        self.result.as_ref().map_or(0.0, |r| r.cost)
    }

    /// Stop reason from the result, falling back to the failure reason.
    #[must_use]
    pub fn stop_reason(&self) -> Option<&str> {
        self.result
            .as_ref()
            .and_then(|r| r.stop_reason.as_deref())
            .or(self.reason.as_deref())
    }
}

/// Drain `rx`, logging each event. Used where no UI consumes events.
#[must_use]
pub fn spawn_event_logger(mut rx: mpsc::Receiver<AgentEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match &event {
                AgentEvent::Started { agent_id, pid } => {
                    info!(agent_id, ?pid, "agent started");
                }
                AgentEvent::Message { agent_id, message } => {
                    debug!(agent_id, kind = message.kind(), "agent message");
                }
                AgentEvent::Completed { agent_id, result } => {
                    info!(
                        agent_id,
                        cost = result.cost,
                        input_tokens = result.usage.input_tokens,
                        output_tokens = result.usage.output_tokens,
                        "agent completed"
                    );
                }
                AgentEvent::Failed {
                    agent_id,
                    reason,
                    exit_code,
                } => {
                    warn!(agent_id, reason, ?exit_code, "agent failed");
                }
                AgentEvent::Cancelled { agent_id } => {
                    info!(agent_id, "agent cancelled");
                }
            }
        }
    })
}
