//! Agent process manager.
//!
//! Spawns one sidecar process per agent with:
//! - `kill_on_drop(true)` so orphaned handles never leak processes.
//! - `env_clear()` plus an allowlist, so orchestrator secrets other than the
//!   configured API key never reach the agent.
//! - A supervisor task per agent that waits for exit or cancellation,
//!   emits exactly one terminal event, and removes the registry entry.
//!
//! The manager imposes no timeout. Callers that need one cancel the agent
//! after their own deadline.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, Command};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::agent::protocol::LaunchConfig;
use crate::agent::reader::{run_reader, StreamSummary};
use crate::agent::{AgentEvent, AgentOutcome, AgentRequest};
use crate::config::SidecarConfig;
use crate::models::agent_run::AgentRunStatus;
use crate::{AppError, Result};

/// Environment variables inherited by agent processes.
pub const ALLOWED_ENV_VARS: &[&str] = &[
    "PATH",
    "HOME",
    "RUST_LOG",
    // Windows-specific variables.
    "USERPROFILE",
    "SystemRoot",
    "TEMP",
    "TMP",
    "USERNAME",
    "APPDATA",
    "LOCALAPPDATA",
    "COMSPEC",
];

/// Environment variable carrying the API key into the sidecar.
pub const API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

struct RegistryEntry {
    pid: Option<u32>,
    cancel: CancellationToken,
}

/// Shared map of live agents, keyed by agent id.
type Registry = Arc<Mutex<HashMap<String, RegistryEntry>>>;

/// Handle to a spawned agent.
#[derive(Debug)]
pub struct AgentHandle {
    /// Agent identifier.
    pub agent_id: String,
    /// OS process id at spawn time.
    pub pid: Option<u32>,
    task: JoinHandle<AgentOutcome>,
}

impl AgentHandle {
    /// Wait for the agent to reach a terminal state.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Agent` if the supervisor task panicked.
    pub async fn wait(self) -> Result<AgentOutcome> {
        self.task
            .await
            .map_err(|err| AppError::Agent(format!("agent supervisor failed: {err}")))
    }
}

/// Spawns, tracks and cancels agent subprocesses.
#[derive(Clone)]
pub struct AgentManager {
    config: Arc<SidecarConfig>,
    registry: Registry,
    events: mpsc::Sender<AgentEvent>,
}

impl AgentManager {
    /// Create a manager that publishes events on `events`.
    ///
    /// The receiving side must be drained; a full channel applies
    /// back-pressure to every agent's reader.
    #[must_use]
    pub fn new(config: SidecarConfig, events: mpsc::Sender<AgentEvent>) -> Self {
        Self {
            config: Arc::new(config),
            registry: Arc::new(Mutex::new(HashMap::new())),
            events,
        }
    }

    /// Model applied when a request does not name one.
    #[must_use]
    pub fn default_model(&self) -> &str {
        &self.config.default_model
    }

    /// Spawn an agent and start supervising it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Agent` if the id is already running, the process
    /// cannot be spawned, or its stdio cannot be captured. Spawn failures
    /// are never retried.
    pub async fn spawn(&self, request: AgentRequest) -> Result<AgentHandle> {
        let agent_id = request
            .agent_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let launch = LaunchConfig {
            agent_id: agent_id.clone(),
            prompt: request.prompt,
            model: request
                .model
                .unwrap_or_else(|| self.config.default_model.clone()),
            cwd: request.cwd.clone(),
            allowed_capabilities: self.config.allowed_capabilities.clone(),
            max_turns: self.config.max_turns,
            resume_session_id: request.resume_session_id,
        };
        let payload = serde_json::to_string(&launch)
            .map_err(|err| AppError::Agent(format!("failed to encode launch config: {err}")))?;

        // Reserve the id first; the registry lock is never held across
        // process I/O.
        let cancel = CancellationToken::new();
        {
            let mut registry = self.registry.lock().await;
            if registry.contains_key(&agent_id) {
                return Err(AppError::Agent(format!("agent {agent_id} is already running")));
            }
            registry.insert(
                agent_id.clone(),
                RegistryEntry {
                    pid: None,
                    cancel: cancel.clone(),
                },
            );
        }

        let mut child = match self.command(&request.cwd).spawn() {
            Ok(child) => child,
            Err(err) => {
                self.unregister(&agent_id).await;
                return Err(AppError::Agent(format!(
                    "failed to spawn agent '{}': {err}",
                    self.config.command
                )));
            }
        };
        let pid = child.id();

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            self.unregister(&agent_id).await;
            return Err(AppError::Agent("failed to capture agent stdio".into()));
        };
        let stderr = child.stderr.take();

        if let Some(entry) = self.registry.lock().await.get_mut(&agent_id) {
            entry.pid = pid;
        }

        info!(agent_id, ?pid, model = %launch.model, "agent spawned");
        self.emit(AgentEvent::Started {
            agent_id: agent_id.clone(),
            pid,
        })
        .await;

        let span = info_span!("agent", agent_id = %agent_id);
        tokio::spawn(write_launch(stdin, payload, cancel.clone()).instrument(span.clone()));
        let reader = tokio::spawn(run_reader(agent_id.clone(), stdout, self.events.clone()));
        if let Some(stderr) = stderr {
            tokio::spawn(drain_stderr(agent_id.clone(), stderr));
        }

        let task = tokio::spawn(
            supervise(
                agent_id.clone(),
                child,
                reader,
                cancel,
                Arc::clone(&self.registry),
                self.events.clone(),
            )
            .instrument(span),
        );

        Ok(AgentHandle {
            agent_id,
            pid,
            task,
        })
    }

    /// Kill one agent. Returns `false` if it is not running.
    ///
    /// Only the named agent is affected; its supervisor emits the
    /// `Cancelled` event.
    pub async fn cancel(&self, agent_id: &str) -> bool {
        let registry = self.registry.lock().await;
        match registry.get(agent_id) {
            Some(entry) => {
                debug!(agent_id, pid = ?entry.pid, "cancelling agent");
                entry.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Kill every running agent. Returns how many were signalled.
    pub async fn cancel_all(&self) -> usize {
        let registry = self.registry.lock().await;
        for entry in registry.values() {
            entry.cancel.cancel();
        }
        registry.len()
    }

    /// Ids of agents still running, sorted.
    pub async fn running(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.registry.lock().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Whether `agent_id` is still running.
    pub async fn is_running(&self, agent_id: &str) -> bool {
        self.registry.lock().await.contains_key(agent_id)
    }

    async fn unregister(&self, agent_id: &str) {
        self.registry.lock().await.remove(agent_id);
    }

    fn command(&self, cwd: &std::path::Path) -> Command {
        let mut cmd = Command::new(&self.config.command);
        cmd.args(&self.config.args);

        cmd.env_clear();
        for &key in ALLOWED_ENV_VARS {
            if let Ok(val) = std::env::var(key) {
                cmd.env(key, val);
            }
        }
        if let Some(api_key) = &self.config.api_key {
            cmd.env(API_KEY_ENV, api_key);
        }

        cmd.current_dir(cwd)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    async fn emit(&self, event: AgentEvent) {
        if self.events.send(event).await.is_err() {
            debug!("agent event channel closed");
        }
    }
}

/// Write the launch config and close stdin, giving up on cancellation.
///
/// A process that dies before reading stdin surfaces as a crash via its
/// exit status, so write failures are only logged.
async fn write_launch(mut stdin: ChildStdin, payload: String, cancel: CancellationToken) {
    let write = async {
        stdin.write_all(payload.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.shutdown().await
    };
    tokio::select! {
        result = write => {
            if let Err(err) = result {
                warn!(%err, "failed to write launch config to agent stdin");
            }
        }
        () = cancel.cancelled() => debug!("launch config write abandoned"),
    }
}

enum Exit {
    Exited(Option<i32>),
    WaitFailed(String),
    Cancelled,
}

/// Wait for exit or cancellation, then publish the terminal event.
async fn supervise(
    agent_id: String,
    mut child: Child,
    reader: JoinHandle<StreamSummary>,
    cancel: CancellationToken,
    registry: Registry,
    events: mpsc::Sender<AgentEvent>,
) -> AgentOutcome {
    let exit = tokio::select! {
        status = child.wait() => match status {
            Ok(status) => Exit::Exited(status.code()),
            Err(err) => Exit::WaitFailed(err.to_string()),
        },
        () = cancel.cancelled() => {
            if let Err(err) = child.kill().await {
                warn!(agent_id, %err, "failed to kill cancelled agent");
            }
            Exit::Cancelled
        }
    };

    let summary = if matches!(exit, Exit::Cancelled) {
        // Grandchildren may still hold stdout open; do not wait on them.
        reader.abort();
        StreamSummary::default()
    } else {
        reader.await.unwrap_or_else(|err| StreamSummary {
            stream_error: Some(format!("reader task failed: {err}")),
            ..StreamSummary::default()
        })
    };

    registry.lock().await.remove(&agent_id);

    let outcome = resolve_outcome(agent_id, exit, summary);
    let event = match outcome.status {
        AgentRunStatus::Completed => outcome.result.clone().map(|result| AgentEvent::Completed {
            agent_id: outcome.agent_id.clone(),
            result,
        }),
        AgentRunStatus::Cancelled => Some(AgentEvent::Cancelled {
            agent_id: outcome.agent_id.clone(),
        }),
        AgentRunStatus::Error | AgentRunStatus::Running => Some(AgentEvent::Failed {
            agent_id: outcome.agent_id.clone(),
            reason: outcome.reason.clone().unwrap_or_default(),
            exit_code: outcome.exit_code,
        }),
    };

    match outcome.status {
        AgentRunStatus::Completed => info!("agent completed"),
        AgentRunStatus::Cancelled => info!("agent cancelled"),
        _ => warn!(reason = ?outcome.reason, exit_code = ?outcome.exit_code, "agent failed"),
    }

    if let Some(event) = event {
        if events.send(event).await.is_err() {
            debug!(agent_id = %outcome.agent_id, "event channel closed before terminal event");
        }
    }

    outcome
}

fn resolve_outcome(agent_id: String, exit: Exit, summary: StreamSummary) -> AgentOutcome {
    let mut outcome = AgentOutcome {
        agent_id,
        status: AgentRunStatus::Error,
        exit_code: None,
        result: None,
        session_id: summary.session_id,
        reason: None,
        skipped_lines: summary.skipped_lines,
    };

    match exit {
        Exit::Cancelled => {
            outcome.status = AgentRunStatus::Cancelled;
            outcome.reason = Some("cancelled".into());
        }
        Exit::WaitFailed(err) => {
            outcome.reason = Some(format!("wait error: {err}"));
            outcome.result = summary.result;
        }
        Exit::Exited(code) => {
            outcome.exit_code = code;
            match (code, summary.result) {
                (Some(0), Some(result)) if !result.is_error => {
                    outcome.status = AgentRunStatus::Completed;
                    outcome.result = Some(result);
                }
                (_, Some(result)) if result.is_error => {
                    outcome.reason = Some(
                        result
                            .stop_reason
                            .clone()
                            .or(summary.last_error)
                            .unwrap_or_else(|| "agent reported an error result".into()),
                    );
                    outcome.result = Some(result);
                }
                (code, result) => {
                    let exit = code.map_or_else(
                        || "terminated by signal".to_owned(),
                        |c| format!("exited with code {c}"),
                    );
                    let detail = summary
                        .last_error
                        .or(summary.stream_error)
                        .map(|e| format!(": {e}"))
                        .unwrap_or_default();
                    let missing = if result.is_some() { "" } else { " without a result message" };
                    outcome.reason = Some(format!("process crash: {exit}{missing}{detail}"));
                    outcome.result = result;
                }
            }
        }
    }

    outcome
}

async fn drain_stderr(agent_id: String, stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => debug!(agent_id, line, "agent stderr"),
            Ok(None) => break,
            Err(err) => {
                debug!(agent_id, %err, "agent stderr closed with error");
                break;
            }
        }
    }
}
