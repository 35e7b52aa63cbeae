//! Shared construction of databases, configuration and fake sidecars so
//! individual test modules can focus on behaviour.

use std::path::Path;
use std::sync::Arc;

use skillforge::agent::{AgentEvent, AgentManager, EVENT_CHANNEL_CAPACITY};
use skillforge::config::{GlobalConfig, SidecarConfig};
use skillforge::persistence::db::{self, Database};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Fresh in-memory database with the schema applied.
pub async fn memory_db() -> Arc<Database> {
    Arc::new(db::connect_memory().await.expect("in-memory db"))
}

/// Configuration rooted at `skills_root` with a fixed instance id.
pub fn test_config(skills_root: &Path) -> GlobalConfig {
    let toml = format!(
        r#"
skills_root = '{root}'
instance_id = "test-instance"

[sidecar]
command = "sh"
"#,
        root = skills_root.display(),
    );
    GlobalConfig::from_toml_str(&toml).expect("valid test config")
}

/// Sidecar that runs `script` under `sh -c`.
pub fn script_sidecar(script: &str) -> SidecarConfig {
    SidecarConfig {
        command: "sh".into(),
        args: vec!["-c".into(), script.into()],
        default_model: "sonnet".into(),
        max_turns: 5,
        allowed_capabilities: vec!["Read".into()],
        api_key: None,
    }
}

/// Agent manager whose events are collected by the returned task.
///
/// The task finishes once every sender (the manager and its agents) is
/// dropped, yielding all events in arrival order.
pub fn collecting_manager(sidecar: SidecarConfig) -> (AgentManager, JoinHandle<Vec<AgentEvent>>) {
    let (tx, mut rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let collector = tokio::spawn(async move {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    });
    (AgentManager::new(sidecar, tx), collector)
}

/// A JSON `result` line as a sidecar would print it.
pub const RESULT_LINE: &str = r#"{"type":"result","cost":0.25,"usage":{"input_tokens":100,"output_tokens":20},"stop_reason":"end_turn","session_id":"sess-final"}"#;
