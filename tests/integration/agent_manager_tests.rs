//! Agent subprocess lifecycle against scripted fake sidecars.

use std::time::Duration;

use skillforge::agent::{AgentEvent, AgentRequest};
use skillforge::models::agent_run::AgentRunStatus;
use skillforge::AppError;

use super::test_helpers::{collecting_manager, script_sidecar, RESULT_LINE};

fn request(dir: &std::path::Path, agent_id: &str) -> AgentRequest {
    AgentRequest::new("do the thing", dir).with_agent_id(agent_id)
}

#[tokio::test]
async fn successful_run_skips_malformed_lines_and_reports_totals() {
    let dir = tempfile::tempdir().expect("tempdir");
    let script = format!(
        "cat > /dev/null; \
         echo 'this is not json'; \
         echo '{{\"type\":\"system\",\"subtype\":\"init\",\"session_id\":\"sess-init\"}}'; \
         echo '{{\"type\":\"assistant\",\"message\":\"working\"}}'; \
         echo '{RESULT_LINE}'"
    );
    let (manager, collector) = collecting_manager(script_sidecar(&script));

    let handle = manager
        .spawn(request(dir.path(), "agent-ok"))
        .await
        .expect("spawn");
    let outcome = handle.wait().await.expect("outcome");

    assert_eq!(outcome.status, AgentRunStatus::Completed);
    assert_eq!(outcome.exit_code, Some(0));
    assert_eq!(outcome.skipped_lines, 1);
    assert_eq!(outcome.session_id.as_deref(), Some("sess-final"));
    assert!((outcome.total_cost() - 0.25).abs() < f64::EPSILON);
    assert_eq!(outcome.usage().input_tokens, 100);
    assert_eq!(outcome.stop_reason(), Some("end_turn"));
    assert!(!manager.is_running("agent-ok").await);

    drop(manager);
    let events = collector.await.expect("collector");
    assert!(matches!(events.first(), Some(AgentEvent::Started { agent_id, .. }) if agent_id == "agent-ok"));
    assert!(matches!(events.last(), Some(AgentEvent::Completed { result, .. }) if result.usage.output_tokens == 20));
    let kinds: Vec<_> = events
        .iter()
        .filter_map(|event| match event {
            AgentEvent::Message { message, .. } => Some(message.kind().to_owned()),
            _ => None,
        })
        .collect();
    assert_eq!(kinds, ["system", "assistant", "result"]);
    assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
}

#[tokio::test]
async fn launch_config_is_written_to_stdin() {
    let dir = tempfile::tempdir().expect("tempdir");
    let capture = dir.path().join("stdin.json");
    let script = format!("cat > '{}'; echo '{RESULT_LINE}'", capture.display());
    let (manager, collector) = collecting_manager(script_sidecar(&script));

    manager
        .spawn(request(dir.path(), "agent-stdin").with_model(Some("opus".into())))
        .await
        .expect("spawn")
        .wait()
        .await
        .expect("outcome");

    let raw = std::fs::read_to_string(&capture).expect("captured stdin");
    assert!(raw.ends_with('\n'));
    let launch: serde_json::Value = serde_json::from_str(raw.trim()).expect("json");
    assert_eq!(launch["agent_id"], "agent-stdin");
    assert_eq!(launch["prompt"], "do the thing");
    assert_eq!(launch["model"], "opus");
    assert_eq!(launch["max_turns"], 5);
    assert_eq!(launch["allowed_capabilities"], serde_json::json!(["Read"]));
    assert!(launch.get("resume_session_id").is_none());

    drop(manager);
    collector.await.expect("collector");
}

#[tokio::test]
async fn configured_api_key_reaches_the_sidecar() {
    let dir = tempfile::tempdir().expect("tempdir");
    let capture = dir.path().join("key.txt");
    let script = format!(
        "cat > /dev/null; printf '%s' \"$ANTHROPIC_API_KEY\" > '{}'; echo '{RESULT_LINE}'",
        capture.display()
    );
    let mut sidecar = script_sidecar(&script);
    sidecar.api_key = Some("sk-test-key".into());
    let (manager, collector) = collecting_manager(sidecar);

    manager
        .spawn(request(dir.path(), "agent-key"))
        .await
        .expect("spawn")
        .wait()
        .await
        .expect("outcome");

    assert_eq!(
        std::fs::read_to_string(&capture).expect("captured key"),
        "sk-test-key"
    );
    drop(manager);
    collector.await.expect("collector");
}

#[tokio::test]
async fn exit_without_result_is_a_crash() {
    let dir = tempfile::tempdir().expect("tempdir");
    let script = "cat > /dev/null; echo '{\"type\":\"error\",\"message\":\"boom\"}'; exit 3";
    let (manager, collector) = collecting_manager(script_sidecar(script));

    let outcome = manager
        .spawn(request(dir.path(), "agent-crash"))
        .await
        .expect("spawn")
        .wait()
        .await
        .expect("outcome");

    assert_eq!(outcome.status, AgentRunStatus::Error);
    assert_eq!(outcome.exit_code, Some(3));
    let reason = outcome.reason.expect("reason");
    assert!(
        reason.starts_with("process crash: exited with code 3 without a result message"),
        "{reason}"
    );
    assert!(reason.ends_with("boom"), "{reason}");

    drop(manager);
    let events = collector.await.expect("collector");
    assert!(matches!(
        events.last(),
        Some(AgentEvent::Failed { exit_code: Some(3), .. })
    ));
}

#[tokio::test]
async fn clean_exit_with_error_result_fails() {
    let dir = tempfile::tempdir().expect("tempdir");
    let script = "cat > /dev/null; \
                  echo '{\"type\":\"result\",\"is_error\":true,\"stop_reason\":\"max_turns\"}'";
    let (manager, collector) = collecting_manager(script_sidecar(script));

    let outcome = manager
        .spawn(request(dir.path(), "agent-error-result"))
        .await
        .expect("spawn")
        .wait()
        .await
        .expect("outcome");

    assert_eq!(outcome.status, AgentRunStatus::Error);
    assert_eq!(outcome.exit_code, Some(0));
    assert_eq!(outcome.reason.as_deref(), Some("max_turns"));

    drop(manager);
    collector.await.expect("collector");
}

#[tokio::test]
async fn cancelling_one_agent_leaves_others_running() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (manager, collector) =
        collecting_manager(script_sidecar("cat > /dev/null; exec sleep 30"));

    let first = manager
        .spawn(request(dir.path(), "agent-a"))
        .await
        .expect("spawn a");
    let second = manager
        .spawn(request(dir.path(), "agent-b"))
        .await
        .expect("spawn b");
    assert_eq!(manager.running().await, ["agent-a", "agent-b"]);

    assert!(manager.cancel("agent-a").await);
    let outcome = first.wait().await.expect("outcome a");
    assert_eq!(outcome.status, AgentRunStatus::Cancelled);
    assert!(manager.is_running("agent-b").await);
    assert!(!manager.cancel("agent-a").await);

    assert_eq!(manager.cancel_all().await, 1);
    let outcome = second.wait().await.expect("outcome b");
    assert_eq!(outcome.status, AgentRunStatus::Cancelled);
    assert!(manager.running().await.is_empty());

    drop(manager);
    let events = collector.await.expect("collector");
    let cancelled = events
        .iter()
        .filter(|e| matches!(e, AgentEvent::Cancelled { .. }))
        .count();
    assert_eq!(cancelled, 2);
}

#[tokio::test]
async fn registry_stays_responsive_while_a_large_prompt_is_unread() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (manager, collector) = collecting_manager(script_sidecar("exec sleep 30"));

    let prompt = "x".repeat(1024 * 1024);
    let handle = tokio::time::timeout(
        Duration::from_secs(2),
        manager.spawn(AgentRequest::new(prompt, dir.path()).with_agent_id("agent-big")),
    )
    .await
    .expect("spawn does not wait for stdin")
    .expect("spawn");

    let running = tokio::time::timeout(Duration::from_secs(2), manager.running())
        .await
        .expect("registry not blocked");
    assert_eq!(running, ["agent-big"]);

    assert!(manager.cancel("agent-big").await);
    let outcome = tokio::time::timeout(Duration::from_secs(5), handle.wait())
        .await
        .expect("cancel is prompt")
        .expect("outcome");
    assert_eq!(outcome.status, AgentRunStatus::Cancelled);

    drop(manager);
    collector.await.expect("collector");
}

#[tokio::test]
async fn duplicate_running_id_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (manager, collector) =
        collecting_manager(script_sidecar("cat > /dev/null; exec sleep 30"));

    let handle = manager
        .spawn(request(dir.path(), "agent-dup"))
        .await
        .expect("spawn");
    let err = manager
        .spawn(request(dir.path(), "agent-dup"))
        .await
        .expect_err("duplicate id");
    assert!(matches!(err, AppError::Agent(_)));

    manager.cancel("agent-dup").await;
    handle.wait().await.expect("outcome");
    drop(manager);
    collector.await.expect("collector");
}

#[tokio::test]
async fn missing_executable_fails_to_spawn() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut sidecar = script_sidecar("");
    sidecar.command = "/nonexistent/skillforge-sidecar".into();
    let (manager, collector) = collecting_manager(sidecar);

    let err = manager
        .spawn(request(dir.path(), "agent-missing"))
        .await
        .expect_err("spawn failure");
    assert!(matches!(err, AppError::Agent(_)));
    assert!(manager.running().await.is_empty());

    drop(manager);
    assert!(collector.await.expect("collector").is_empty());
}
