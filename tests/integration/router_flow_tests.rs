//! End-to-end dispatch through the router with a scripted sidecar that
//! writes each step's artifacts into the skill directory.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use skillforge::agent::AgentEvent;
use skillforge::clarifications::Verdict;
use skillforge::lock::LockManager;
use skillforge::models::agent_run::AgentRunStatus;
use skillforge::models::session::{Phase, WorkflowMode};
use skillforge::models::step::{Step, StepStatus};
use skillforge::workflow::{Action, DispatchRequest, Intent, Router};
use skillforge::AppError;
use tokio::task::JoinHandle;

use super::test_helpers::{collecting_manager, memory_db, script_sidecar, test_config, RESULT_LINE};

const SKILL: &str = "sales";

/// Six choice questions with recommendation `A`; `answers` per question.
fn clarifications(answers: [&str; 6], refinement: bool) -> String {
    let mut doc = String::from("# Clarifications\n\n## Scope\n\n");
    for (index, answer) in answers.iter().enumerate() {
        let n = index + 1;
        doc.push_str(&format!(
            "### Q{n}: Question number {n}\n\
             A. First option\n\
             B. Second option\n\
             \n\
             **Recommendation:** A\n\
             \n\
             **Answer:** {answer}\n\
             \n"
        ));
        if refinement && n == 1 {
            doc.push_str(
                "#### Refinements\n\
                 \n\
                 #### Q1.1: Which variant of the first option?\n\
                 A. Strict\n\
                 B. Lenient\n\
                 \n\
                 **Recommendation:** A\n\
                 \n\
                 **Answer:**\n\
                 \n",
            );
        }
    }
    doc
}

/// Sidecar script that dispatches on the agent id in its launch config.
fn pipeline_script(fixtures: &Path) -> String {
    let fx = fixtures.display();
    format!(
        r#"input=$(cat)
case "$input" in
  *'"agent_id":"sales-detailed-research-'*) cp '{fx}/refined.md' context/clarifications.md ;;
  *'"agent_id":"sales-research-'*) cp '{fx}/research.md' context/clarifications.md ;;
  *'"agent_id":"sales-decisions-'*) echo '# Decisions' > context/decisions.md ;;
  *'"agent_id":"sales-generate-'*) echo '# Sales' > SKILL.md ;;
  *'"agent_id":"sales-validate-'*) echo '# Report' > context/validation-report.md ;;
  *'"agent_id":"sales-refine-'*) printf '%s' "$input" > '{fx}/refine-launch.json' ;;
esac
echo '{RESULT_LINE}'
"#
    )
}

struct Harness {
    _root: tempfile::TempDir,
    skills_root: std::path::PathBuf,
    fixtures: std::path::PathBuf,
    router: Router,
    collector: JoinHandle<Vec<AgentEvent>>,
}

impl Harness {
    async fn with_script(script: impl FnOnce(&Path) -> String) -> Self {
        let root = tempfile::tempdir().expect("tempdir");
        let skills_root = root.path().join("skills");
        let fixtures = root.path().join("fixtures");
        std::fs::create_dir_all(&skills_root).expect("skills root");
        std::fs::create_dir_all(&fixtures).expect("fixtures");
        std::fs::write(fixtures.join("research.md"), clarifications([""; 6], false))
            .expect("research fixture");
        std::fs::write(
            fixtures.join("refined.md"),
            clarifications(["A", "B", "A", "B", "A", "B"], true),
        )
        .expect("refined fixture");

        let mut config = test_config(&skills_root);
        config.sidecar = script_sidecar(&script(&fixtures));
        let (agents, collector) = collecting_manager(config.sidecar.clone());
        let router = Router::new(&config, memory_db().await, agents);

        Self {
            skills_root: config.skills_root.clone(),
            fixtures,
            _root: root,
            router,
            collector,
        }
    }

    async fn pipeline() -> Self {
        Self::with_script(pipeline_script).await
    }

    fn skill_dir(&self) -> std::path::PathBuf {
        self.skills_root.join(SKILL)
    }

    async fn dispatch(&self, signal: &str) -> skillforge::Result<skillforge::workflow::DispatchOutcome> {
        self.router
            .dispatch(DispatchRequest::new(SKILL, signal))
            .await
    }

    async fn step_status(&self, step: Step) -> Option<StepStatus> {
        self.router
            .store()
            .list_steps(SKILL)
            .await
            .expect("steps")
            .into_iter()
            .find(|s| s.step == step)
            .map(|s| s.status)
    }

    async fn finish(self) -> Vec<AgentEvent> {
        drop(self.router);
        self.collector.await.expect("collector")
    }
}

#[tokio::test]
async fn full_pipeline_from_scoping_to_completion() {
    let h = Harness::pipeline().await;

    // New skill: scoping only, no agents.
    let outcome = h.dispatch("build a skill for sales pipelines").await.expect("scoping");
    assert_eq!(outcome.intent, Intent::NewSkill);
    assert_eq!(outcome.phase_before, Phase::Fresh);
    assert_eq!(
        outcome.action,
        Action::BeginScoping {
            mode: WorkflowMode::Guided
        }
    );
    assert_eq!(outcome.phase_after, Phase::Scoping);
    assert!(outcome.agents.is_empty());
    assert!(h.skill_dir().join("context").is_dir());
    assert_eq!(h.step_status(Step::Scoping).await, Some(StepStatus::Completed));

    // Research writes an unanswered clarifications document.
    let outcome = h.dispatch("continue").await.expect("research");
    assert_eq!(outcome.action, Action::RunResearch);
    assert_eq!(outcome.phase_after, Phase::Research);
    assert_eq!(outcome.agents.len(), 1);
    assert!(outcome.agents[0].is_success());
    assert!(outcome.agents[0].agent_id.starts_with("sales-research-"));
    assert_eq!(
        h.step_status(Step::Research).await,
        Some(StepStatus::WaitingForUser)
    );

    // The user answers four of six questions.
    std::fs::write(
        h.skill_dir().join("context/clarifications.md"),
        clarifications(["A", "B", "", "A", "", "B"], false),
    )
    .expect("answer questions");
    let outcome = h.dispatch("continue").await.expect("evaluate");
    assert_eq!(outcome.phase_before, Phase::Clarification);
    assert_eq!(outcome.action, Action::AwaitAnswers);
    assert_eq!(outcome.phase_after, Phase::Clarification);
    let report = outcome.report.as_ref().expect("report");
    assert_eq!(report.verdict, Verdict::Mixed);
    assert_eq!(report.empty, ["Q3", "Q5"]);
    assert!(outcome.message.contains("Q3, Q5"), "{}", outcome.message);
    assert!(outcome.agents.is_empty());
    assert_eq!(
        h.step_status(Step::ClarificationReview).await,
        Some(StepStatus::WaitingForUser)
    );

    // Express fills the gaps from recommendations and runs refinement research.
    let outcome = h.dispatch("express").await.expect("express");
    assert_eq!(outcome.intent, Intent::Express);
    assert_eq!(outcome.action, Action::RunRefinementResearch);
    assert_eq!(
        outcome.report.as_ref().map(|r| r.verdict),
        Some(Verdict::Sufficient)
    );
    assert_eq!(outcome.phase_after, Phase::RefinementPending);
    let session = h.router.store().get(SKILL).await.expect("get").expect("session");
    assert_eq!(session.mode, WorkflowMode::Express);
    assert!(session.auto_filled);
    assert_eq!(session.current_phase, Phase::RefinementPending);

    // Refinements are auto-filled too, then decisions run.
    let outcome = h.dispatch("continue").await.expect("decisions");
    assert_eq!(outcome.phase_before, Phase::RefinementPending);
    assert_eq!(outcome.action, Action::RunDecisions);
    assert_eq!(outcome.phase_after, Phase::Decisions);

    let outcome = h.dispatch("continue").await.expect("generation");
    assert_eq!(outcome.action, Action::RunGeneration);
    assert_eq!(outcome.phase_after, Phase::Generation);
    assert!(h.skill_dir().join("SKILL.md").is_file());

    // Improvement loops in iterative mode without changing the phase.
    let outcome = h.dispatch("improve the examples").await.expect("refine");
    assert_eq!(outcome.action, Action::EnterIterative);
    assert_eq!(outcome.phase_after, Phase::Generation);
    let session = h.router.store().get(SKILL).await.expect("get").expect("session");
    assert_eq!(session.mode, WorkflowMode::Iterative);
    let launch: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(h.fixtures.join("refine-launch.json")).expect("refine launch"),
    )
    .expect("launch json");
    assert_eq!(launch["resume_session_id"], "sess-final");

    let outcome = h.dispatch("validate").await.expect("validation");
    assert_eq!(outcome.action, Action::RunValidation);
    assert_eq!(outcome.agents.len(), 2);
    assert_eq!(outcome.phase_after, Phase::Validation);

    // Questions never advance the pipeline.
    let outcome = h
        .dispatch("what does the decisions file contain?")
        .await
        .expect("question");
    assert_eq!(outcome.action, Action::AnswerQuestion);
    assert_eq!(outcome.phase_after, Phase::Validation);

    let outcome = h.dispatch("continue").await.expect("complete");
    assert_eq!(outcome.action, Action::Complete);
    assert!(outcome.agents.is_empty());

    let status = h.router.status(SKILL).await.expect("status");
    assert_eq!(status.detection.phase, Phase::Validation);
    assert!(!status.detection.corrected);
    // research, detailed research, decisions, generate, refine, 2x validation, companion
    assert_eq!(status.runs.len(), 8);
    assert!(status
        .runs
        .iter()
        .all(|run| run.status == AgentRunStatus::Completed && run.ended_at.is_some()));
    assert!(h.router.locks().list_locked().await.expect("locks").is_empty());

    let events = h.finish().await;
    let completed = events
        .iter()
        .filter(|e| matches!(e, AgentEvent::Completed { .. }))
        .count();
    assert_eq!(completed, 8);
}

#[tokio::test]
async fn question_about_unknown_skill_is_reported() {
    let h = Harness::pipeline().await;

    let outcome = h.dispatch("what is a skill?").await.expect("dispatch");
    assert_eq!(outcome.intent, Intent::ProcessQuestion);
    assert!(matches!(outcome.action, Action::Report { .. }));
    assert_eq!(outcome.phase_after, Phase::Fresh);
    assert!(!h.skill_dir().exists());
    assert!(h.router.store().get(SKILL).await.expect("get").is_none());

    h.finish().await;
}

#[tokio::test]
async fn skill_names_that_escape_the_root_are_rejected() {
    let h = Harness::pipeline().await;

    for name in ["../etc", "", ".hidden", "a/b"] {
        let err = h
            .router
            .dispatch(DispatchRequest::new(name, "continue"))
            .await
            .expect_err("invalid name");
        assert!(matches!(err, AppError::Config(_)), "{name}: {err}");
    }

    h.finish().await;
}

#[tokio::test]
async fn dispatch_fails_while_another_instance_holds_the_skill() {
    let db = memory_db().await;
    let root = tempfile::tempdir().expect("tempdir");
    let config = test_config(root.path());
    let (agents, collector) = collecting_manager(script_sidecar("cat > /dev/null"));
    let router = Router::new(&config, Arc::clone(&db), agents);

    let other = LockManager::new(Arc::clone(&db), "other-instance");
    let _held = other.acquire(SKILL).await.expect("acquire");

    let err = router
        .dispatch(DispatchRequest::new(SKILL, "build a sales skill"))
        .await
        .expect_err("contention");
    match err {
        AppError::LockContention(holder) => assert_eq!(holder.instance_id, "other-instance"),
        other => panic!("expected contention, got {other}"),
    }
    assert!(router.store().get(SKILL).await.expect("get").is_none());

    drop(router);
    collector.await.expect("collector");
}

#[tokio::test]
async fn start_fresh_discards_artifacts_and_rescopes() {
    let h = Harness::pipeline().await;
    h.dispatch("new skill").await.expect("scoping");
    h.dispatch("continue").await.expect("research");
    assert!(h.skill_dir().join("context/clarifications.md").is_file());

    let outcome = h.dispatch("start fresh").await.expect("reset");
    assert_eq!(outcome.intent, Intent::StartFresh);
    assert_eq!(outcome.phase_before, Phase::Research);
    assert_eq!(outcome.action, Action::Reset);
    assert_eq!(outcome.phase_after, Phase::Scoping);
    assert!(!h.skill_dir().join("context/clarifications.md").exists());
    assert!(h.skill_dir().join("context").is_dir());

    let steps = h.router.store().list_steps(SKILL).await.expect("steps");
    assert_eq!(steps.len(), 1);
    assert_eq!(steps[0].step, Step::Scoping);

    h.finish().await;
}

#[tokio::test]
async fn failed_agent_marks_step_error_and_can_be_retried() {
    let h = Harness::with_script(|_| "cat > /dev/null; exit 1".to_owned()).await;
    h.dispatch("new skill").await.expect("scoping");

    let outcome = h.dispatch("continue").await.expect("dispatch");
    assert_eq!(outcome.action, Action::RunResearch);
    assert_eq!(outcome.phase_after, Phase::Scoping);
    assert_eq!(outcome.agents.len(), 1);
    assert_eq!(outcome.agents[0].status, AgentRunStatus::Error);
    assert!(outcome.message.contains("failed"), "{}", outcome.message);
    assert_eq!(h.step_status(Step::Research).await, Some(StepStatus::Error));

    let retry = h.dispatch("continue").await.expect("retry");
    assert_eq!(retry.action, Action::RunResearch);

    let runs = h.router.status(SKILL).await.expect("status").runs;
    assert_eq!(runs.len(), 2);
    assert!(runs.iter().all(|run| run.status == AgentRunStatus::Error));
    assert!(runs[0]
        .stop_reason
        .as_deref()
        .is_some_and(|reason| reason.starts_with("process crash")));

    h.finish().await;
}

#[tokio::test]
async fn evaluate_and_auto_fill_require_a_document() {
    let h = Harness::pipeline().await;
    h.dispatch("new skill").await.expect("scoping");

    assert!(matches!(h.router.evaluate(SKILL), Err(AppError::NotFound(_))));
    assert!(matches!(
        h.router.auto_fill(SKILL).await,
        Err(AppError::NotFound(_))
    ));

    h.dispatch("continue").await.expect("research");
    let report = h.router.evaluate(SKILL).expect("report");
    assert_eq!(report.verdict, Verdict::Insufficient);

    assert_eq!(h.router.auto_fill(SKILL).await.expect("auto fill"), 6);
    assert_eq!(
        h.router.evaluate(SKILL).expect("report").verdict,
        Verdict::Sufficient
    );
    let session = h.router.store().get(SKILL).await.expect("get").expect("session");
    assert!(session.auto_filled);
    assert_eq!(session.clarification_status.answered, 6);

    h.finish().await;
}

#[tokio::test]
async fn concurrent_dispatches_on_one_skill_run_one_at_a_time() {
    let h = Harness::with_script(|fx| format!("sleep 1\n{}", pipeline_script(fx))).await;
    h.dispatch("new skill").await.expect("scoping");

    let (first, second) = tokio::join!(h.dispatch("continue"), h.dispatch("continue"));
    let (ran, refused) = match (first, second) {
        (Ok(ran), Err(refused)) | (Err(refused), Ok(ran)) => (ran, refused),
        other => panic!("expected exactly one dispatch to run, got {other:?}"),
    };
    assert_eq!(ran.action, Action::RunResearch);
    assert!(
        matches!(&refused, AppError::LockContention(holder) if holder.instance_id == "test-instance"),
        "{refused}"
    );

    let status = h.router.status(SKILL).await.expect("status");
    assert_eq!(status.runs.len(), 1);
    assert!(h.router.locks().list_locked().await.expect("locks").is_empty());

    h.finish().await;
}

#[tokio::test]
async fn refinement_round_without_new_questions_moves_on_to_decisions() {
    let h = Harness::with_script(|fx| {
        let fx = fx.display();
        format!(
            r#"input=$(cat)
case "$input" in
  *'"agent_id":"sales-research-'*) cp '{fx}/research.md' context/clarifications.md ;;
  *'"agent_id":"sales-decisions-'*) echo '# Decisions' > context/decisions.md ;;
esac
echo '{RESULT_LINE}'
"#
        )
    })
    .await;
    h.dispatch("new skill").await.expect("scoping");
    h.dispatch("continue").await.expect("research");
    std::fs::write(
        h.skill_dir().join("context/clarifications.md"),
        clarifications(["A", "B", "A", "B", "A", "B"], false),
    )
    .expect("answer questions");

    let outcome = h.dispatch("continue").await.expect("refinement research");
    assert_eq!(outcome.action, Action::RunRefinementResearch);
    assert_eq!(outcome.agents.len(), 1);
    assert!(outcome.agents[0].agent_id.starts_with("sales-detailed-research-"));
    assert_eq!(outcome.phase_after, Phase::Clarification);
    assert_eq!(
        h.step_status(Step::DetailedResearch).await,
        Some(StepStatus::Completed)
    );

    let outcome = h.dispatch("continue").await.expect("decisions");
    assert_eq!(outcome.phase_before, Phase::Clarification);
    assert_eq!(outcome.action, Action::RunDecisions);
    assert!(outcome.agents[0].agent_id.starts_with("sales-decisions-"));
    assert_eq!(outcome.phase_after, Phase::Decisions);

    h.finish().await;
}

#[tokio::test]
async fn spawn_failure_marks_step_error_and_releases_the_skill() {
    let root = tempfile::tempdir().expect("tempdir");
    let config = test_config(root.path());
    let mut sidecar = script_sidecar("");
    sidecar.command = "/nonexistent/skillforge-sidecar".into();
    let (agents, collector) = collecting_manager(sidecar);
    let router = Router::new(&config, memory_db().await, agents);

    router
        .dispatch(DispatchRequest::new(SKILL, "new skill"))
        .await
        .expect("scoping");
    let err = router
        .dispatch(DispatchRequest::new(SKILL, "continue"))
        .await
        .expect_err("spawn failure");
    assert!(matches!(err, AppError::Agent(_)), "{err}");

    let status = router.status(SKILL).await.expect("status");
    assert!(status.runs.is_empty());
    assert!(status
        .steps
        .iter()
        .any(|s| s.step == Step::Research && s.status == StepStatus::Error));
    assert!(router.locks().list_locked().await.expect("locks").is_empty());

    drop(router);
    collector.await.expect("collector");
}

#[tokio::test]
async fn failing_to_record_a_run_cancels_the_started_agent() {
    let db = memory_db().await;
    let root = tempfile::tempdir().expect("tempdir");
    let config = test_config(root.path());
    let (agents, collector) = collecting_manager(script_sidecar("exec sleep 30"));
    let router = Router::new(&config, Arc::clone(&db), agents);

    router
        .dispatch(DispatchRequest::new(SKILL, "new skill"))
        .await
        .expect("scoping");
    sqlx::query("DROP TABLE agent_run")
        .execute(db.as_ref())
        .await
        .expect("drop run table");

    let err = tokio::time::timeout(
        Duration::from_secs(10),
        router.dispatch(DispatchRequest::new(SKILL, "continue")),
    )
    .await
    .expect("dispatch does not wait out the agent")
    .expect_err("run record failure");
    assert!(matches!(err, AppError::Db(_)), "{err}");
    assert!(router.agents().running().await.is_empty());

    let steps = router.store().list_steps(SKILL).await.expect("steps");
    assert!(steps
        .iter()
        .any(|s| s.step == Step::Research && s.status == StepStatus::Error));
    assert!(router.locks().list_locked().await.expect("locks").is_empty());

    drop(router);
    let events = collector.await.expect("collector");
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e, AgentEvent::Cancelled { .. }))
            .count(),
        1
    );
}
