//! Error types shared across the application.

use std::fmt::{Display, Formatter};

use crate::models::lock::SkillLock;

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// Persistence failure when interacting with `SQLite`.
    Db(String),
    /// Agent subprocess spawn, protocol, or stream failure.
    Agent(String),
    /// File-system or I/O operation failure.
    Io(String),
    /// Requested entity does not exist.
    NotFound(String),
    /// A live lock on the skill is held by another instance.
    LockContention(SkillLock),
    /// A workflow or step transition that the state machine forbids.
    InvalidTransition(String),
    /// Explicit document validation failure (parsing itself never fails).
    Document(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Db(msg) => write!(f, "db: {msg}"),
            Self::Agent(msg) => write!(f, "agent: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
            Self::NotFound(msg) => write!(f, "not found: {msg}"),
            Self::LockContention(holder) => write!(
                f,
                "lock contention: skill '{}' is held by instance {} (pid {}) since {}",
                holder.skill_name,
                holder.instance_id,
                holder.pid,
                holder.acquired_at.to_rfc3339()
            ),
            Self::InvalidTransition(msg) => write!(f, "invalid transition: {msg}"),
            Self::Document(msg) => write!(f, "document: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        Self::Db(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Agent(format!("json: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
