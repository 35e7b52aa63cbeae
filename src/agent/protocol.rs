//! Wire types for the agent sidecar protocol.
//!
//! | Direction | Shape                                                   |
//! |-----------|---------------------------------------------------------|
//! | stdin     | one [`LaunchConfig`] JSON object, then EOF             |
//! | stdout    | one [`AgentMessage`] per line, discriminated by `type`  |
//!
//! Unknown `type` values decode to [`AgentMessage::Other`] so a newer
//! sidecar never breaks an older orchestrator.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::agent_run::TokenUsage;
use crate::{AppError, Result};

/// Configuration object written to the sidecar's stdin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchConfig {
    /// Agent identifier echoed in logs.
    pub agent_id: String,
    /// Opaque instruction payload.
    pub prompt: String,
    /// Model identifier.
    pub model: String,
    /// Working directory for the agent.
    pub cwd: PathBuf,
    /// Tools the agent may use.
    pub allowed_capabilities: Vec<String>,
    /// Turn cap.
    pub max_turns: u32,
    /// Sidecar session to continue, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume_session_id: Option<String>,
}

/// Terminal `result` message payload.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ResultMessage {
    /// Monetary cost in USD.
    #[serde(default, alias = "total_cost_usd")]
    pub cost: f64,
    /// Token counters.
    #[serde(default)]
    pub usage: TokenUsage,
    /// Why the agent stopped.
    #[serde(default)]
    pub stop_reason: Option<String>,
    /// Wall-clock duration reported by the sidecar.
    #[serde(default)]
    pub duration_ms: Option<u64>,
    /// Whether the sidecar flagged the run as failed.
    #[serde(default)]
    pub is_error: bool,
    /// Sidecar session id, if reported here.
    #[serde(default)]
    pub session_id: Option<String>,
}

/// One decoded stdout message.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentMessage {
    /// Initialization info; may carry the sidecar session id.
    System {
        /// Optional `subtype` (e.g. `init`).
        subtype: Option<String>,
        /// Sidecar session id.
        session_id: Option<String>,
        /// Entire message.
        raw: Value,
    },
    /// Incremental assistant output.
    Assistant {
        /// Entire message.
        raw: Value,
    },
    /// Terminal totals.
    Result(ResultMessage),
    /// Error reported by the sidecar.
    Error {
        /// Error text.
        message: String,
    },
    /// Any other `type`, passed through untouched.
    Other {
        /// The unrecognized discriminator.
        kind: String,
        /// Entire message.
        raw: Value,
    },
}

impl AgentMessage {
    /// The `type` discriminator.
    #[must_use]
    pub fn kind(&self) -> &str {
        match self {
            Self::System { .. } => "system",
            Self::Assistant { .. } => "assistant",
            Self::Result(_) => "result",
            Self::Error { .. } => "error",
            Self::Other { kind, .. } => kind,
        }
    }
}

/// Parse one stdout line.
///
/// Returns `Ok(None)` for blank lines.
///
/// # Errors
///
/// Returns `AppError::Agent` if the line is not a JSON object with a string
/// `type` field, or if a `result` payload has the wrong shape.
pub fn parse_line(line: &str) -> Result<Option<AgentMessage>> {
    if line.trim().is_empty() {
        return Ok(None);
    }

    let value: Value = serde_json::from_str(line)
        .map_err(|e| AppError::Agent(format!("malformed json: {e}")))?;

    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| AppError::Agent("message has no string `type` field".into()))?
        .to_owned();

    let message = match kind.as_str() {
        "system" => AgentMessage::System {
            subtype: string_field(&value, "subtype"),
            session_id: string_field(&value, "session_id"),
            raw: value,
        },
        "assistant" => AgentMessage::Assistant { raw: value },
        "result" => {
            let result: ResultMessage = serde_json::from_value(value)
                .map_err(|e| AppError::Agent(format!("invalid result message: {e}")))?;
            AgentMessage::Result(result)
        }
        "error" => AgentMessage::Error {
            message: string_field(&value, "message")
                .or_else(|| string_field(&value, "error"))
                .unwrap_or_else(|| "unspecified agent error".to_owned()),
        },
        _ => AgentMessage::Other { kind, raw: value },
    };

    Ok(Some(message))
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_owned)
}
