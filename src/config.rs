//! Global configuration parsing, validation, and credential loading.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::warn;

use crate::workflow::intent::Intent;
use crate::{AppError, Result};

/// Keychain service name used for credential lookup.
const KEYRING_SERVICE: &str = "skillforge";

/// Sidecar runtime that hosts agent invocations.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SidecarConfig {
    /// Executable launched once per agent (e.g. `node`).
    pub command: String,
    /// Arguments passed before the stdin configuration is written.
    #[serde(default)]
    pub args: Vec<String>,
    /// Model used when a task does not name one.
    #[serde(default = "default_model")]
    pub default_model: String,
    /// Turn cap forwarded to every agent.
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,
    /// Capabilities (tools) agents may use.
    #[serde(default = "default_capabilities")]
    pub allowed_capabilities: Vec<String>,
    /// API key injected into the sidecar environment (populated at runtime).
    #[serde(skip)]
    pub api_key: Option<String>,
}

fn default_model() -> String {
    "sonnet".into()
}

fn default_max_turns() -> u32 {
    50
}

fn default_capabilities() -> Vec<String> {
    ["Read", "Write", "Edit", "Glob", "Grep", "WebSearch", "WebFetch"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Thresholds for the answer sufficiency evaluator.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SufficiencyConfig {
    /// Answers shorter than this (trimmed, in chars) are vague.
    #[serde(default = "default_min_answer_chars")]
    pub min_answer_chars: usize,
    /// Extra hedge phrases appended to the built-in list.
    #[serde(default)]
    pub vague_phrases: Vec<String>,
}

fn default_min_answer_chars() -> usize {
    4
}

impl Default for SufficiencyConfig {
    fn default() -> Self {
        Self {
            min_answer_chars: default_min_answer_chars(),
            vague_phrases: Vec::new(),
        }
    }
}

/// Extra intent rule consulted before the built-in table.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct IntentRuleConfig {
    /// Case-insensitive regular expression.
    pub pattern: String,
    /// Intent selected on match.
    pub intent: Intent,
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Directory under which every skill directory lives.
    pub skills_root: PathBuf,
    /// `SQLite` database path; defaults beneath `skills_root`.
    #[serde(default)]
    pub db_path: Option<PathBuf>,
    /// Identity of this orchestrator instance in lock records.
    #[serde(default = "default_instance_id")]
    pub instance_id: String,
    /// Agent sidecar settings.
    pub sidecar: SidecarConfig,
    /// Sufficiency evaluator thresholds.
    #[serde(default)]
    pub sufficiency: SufficiencyConfig,
    /// Additional classifier rules.
    #[serde(default)]
    pub intent_rules: Vec<IntentRuleConfig>,
}

fn default_instance_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and normalize paths.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load the sidecar API key from the OS keychain with env-var fallback.
    ///
    /// A missing key is not an error: the sidecar may authenticate itself.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the keychain task panics.
    pub async fn load_credentials(&mut self) -> Result<()> {
        self.sidecar.api_key = load_credential("anthropic_api_key", "ANTHROPIC_API_KEY").await?;
        if self.sidecar.api_key.is_none() {
            warn!("no API key in keychain or ANTHROPIC_API_KEY; relying on sidecar auth");
        }
        Ok(())
    }

    /// Effective database path.
    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.db_path.clone().unwrap_or_else(|| {
            self.skills_root
                .join(".skillforge")
                .join("skillforge.db")
        })
    }

    fn validate(&mut self) -> Result<()> {
        if self.sidecar.command.trim().is_empty() {
            return Err(AppError::Config("sidecar.command must not be empty".into()));
        }

        if self.sidecar.max_turns == 0 {
            return Err(AppError::Config(
                "sidecar.max_turns must be greater than zero".into(),
            ));
        }

        if self.instance_id.trim().is_empty() {
            return Err(AppError::Config("instance_id must not be empty".into()));
        }

        for rule in &self.intent_rules {
            regex::Regex::new(&rule.pattern).map_err(|err| {
                AppError::Config(format!("invalid intent rule '{}': {err}", rule.pattern))
            })?;
        }

        let canonical_root = self
            .skills_root
            .canonicalize()
            .map_err(|err| AppError::Config(format!("skills_root invalid: {err}")))?;
        self.skills_root = canonical_root;

        Ok(())
    }
}

/// Load a single credential from OS keychain with env-var fallback.
async fn load_credential(keyring_key: &str, env_key: &str) -> Result<Option<String>> {
    let key = keyring_key.to_owned();

    // keyring is synchronous I/O.
    let keychain_result = tokio::task::spawn_blocking(move || {
        keyring::Entry::new(KEYRING_SERVICE, &key).and_then(|entry| entry.get_password())
    })
    .await
    .map_err(|err| AppError::Config(format!("keychain task panicked: {err}")))?;

    match keychain_result {
        Ok(value) if !value.is_empty() => return Ok(Some(value)),
        Ok(_) => {
            warn!(key = keyring_key, "keychain entry is empty, trying env var");
        }
        Err(err) => {
            tracing::debug!(
                key = keyring_key,
                ?err,
                "keychain lookup failed, trying env var"
            );
        }
    }

    Ok(env::var(env_key).ok().filter(|value| !value.is_empty()))
}
