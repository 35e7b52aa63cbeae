//! Dispatch router: (phase, intent) → action, and its execution.
//!
//! [`route`] is a total table over every phase and intent, written as an
//! exhaustive `match` so an unmapped pair fails to compile. [`Router`]
//! executes the chosen action while holding the skill lock.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures_util::future::join_all;
use serde::Serialize;
use tracing::{info, info_span, warn, Instrument};

use crate::agent::manager::AgentHandle;
use crate::agent::{AgentManager, AgentOutcome, AgentRequest};
use crate::clarifications::{
    auto_fill, ClarificationsDocument, SufficiencyEvaluator, SufficiencyReport, Verdict,
};
use crate::config::GlobalConfig;
use crate::lock::LockManager;
use crate::models::agent_run::{AgentRun, AgentRunStatus, TokenUsage};
use crate::models::session::{Phase, WorkflowMode, WorkflowSession};
use crate::models::step::{Step, StepStatus, WorkflowStep};
use crate::persistence::agent_run_repo::AgentRunRepo;
use crate::persistence::db::Database;
use crate::persistence::session_repo::SessionStore;
use crate::workflow::detector::{self, Detection, SkillArtifacts};
use crate::workflow::intent::{Intent, IntentClassifier};
use crate::workflow::prompts::{DefaultPromptCatalog, PromptCatalog, PromptContext};
use crate::{AppError, Result};

/// What the router decided to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "action")]
pub enum Action {
    /// Create the session and skill directory.
    BeginScoping {
        /// Mode recorded on the new session.
        mode: WorkflowMode,
    },
    /// Run research agents that write the clarifications document.
    RunResearch,
    /// Nothing to do until a human answers.
    AwaitAnswers,
    /// Evaluate answers, then re-ask or advance.
    EvaluateAnswers,
    /// Fill empty answers from recommendations, then evaluate.
    AutoFillAndContinue,
    /// Run agents that add refinement questions.
    RunRefinementResearch,
    /// Run the decisions agent.
    RunDecisions,
    /// Run the generation agent.
    RunGeneration,
    /// Run validation agents.
    RunValidation,
    /// Refine a finished skill.
    EnterIterative,
    /// Delete session and artifacts, then re-enter scoping.
    Reset,
    /// Run one companion agent; the phase does not change.
    AnswerQuestion,
    /// Nothing can be done; explain why.
    Report {
        /// Human-readable reason.
        reason: &'static str,
    },
    /// The pipeline has finished.
    Complete,
}

const NOTHING_TO_VALIDATE: &str = "nothing to validate: SKILL.md has not been generated yet";
const NO_SKILL_YET: &str = "there is no skill to ask about yet; start a new skill first";

/// The dispatch table.
#[must_use]
#[allow(clippy::match_same_arms)]
pub fn route(phase: Phase, intent: Intent) -> Action {
    use Intent as I;
    use Phase as P;

    match (phase, intent) {
        (
            P::Fresh
            | P::Scoping
            | P::Research
            | P::Clarification
            | P::RefinementPending
            | P::Refinement
            | P::Decisions
            | P::Generation
            | P::Validation,
            I::StartFresh,
        ) => Action::Reset,

        (P::Fresh, I::NewSkill | I::Resume | I::Improve) => Action::BeginScoping {
            mode: WorkflowMode::Guided,
        },
        (P::Fresh, I::Express) => Action::BeginScoping {
            mode: WorkflowMode::Express,
        },
        (P::Fresh, I::ValidateOnly) => Action::Report {
            reason: NOTHING_TO_VALIDATE,
        },
        (P::Fresh, I::ProcessQuestion) => Action::Report {
            reason: NO_SKILL_YET,
        },

        (P::Scoping, I::NewSkill | I::Resume | I::Improve | I::Express) => Action::RunResearch,

        (
            P::Research | P::Clarification | P::RefinementPending | P::Refinement,
            I::NewSkill | I::Resume | I::Improve,
        ) => Action::EvaluateAnswers,
        (P::Research | P::Clarification | P::RefinementPending | P::Refinement, I::Express) => {
            Action::AutoFillAndContinue
        }

        (P::Decisions, I::NewSkill | I::Resume | I::Improve | I::Express) => Action::RunGeneration,

        (P::Generation, I::NewSkill | I::Resume | I::Express | I::ValidateOnly) => {
            Action::RunValidation
        }
        (P::Validation, I::ValidateOnly) => Action::RunValidation,
        (P::Generation | P::Validation, I::Improve) => Action::EnterIterative,
        (P::Validation, I::NewSkill | I::Resume | I::Express) => Action::Complete,

        (
            P::Scoping
            | P::Research
            | P::Clarification
            | P::RefinementPending
            | P::Refinement
            | P::Decisions,
            I::ValidateOnly,
        ) => Action::Report {
            reason: NOTHING_TO_VALIDATE,
        },

        (
            P::Scoping
            | P::Research
            | P::Clarification
            | P::RefinementPending
            | P::Refinement
            | P::Decisions
            | P::Generation
            | P::Validation,
            I::ProcessQuestion,
        ) => Action::AnswerQuestion,
    }
}

/// A caller's request to advance one skill.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchRequest {
    /// Skill to act on.
    pub skill_name: String,
    /// Free-text signal to classify.
    pub signal: String,
    /// Skill type recorded when a session is created.
    pub skill_type: Option<String>,
    /// Domain recorded when a session is created.
    pub domain: Option<String>,
}

impl DispatchRequest {
    /// Request with no scoping details.
    #[must_use]
    pub fn new(skill_name: impl Into<String>, signal: impl Into<String>) -> Self {
        Self {
            skill_name: skill_name.into(),
            signal: signal.into(),
            skill_type: None,
            domain: None,
        }
    }
}

/// Result of one dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchOutcome {
    /// Classified intent.
    pub intent: Intent,
    /// Authoritative phase before acting.
    pub phase_before: Phase,
    /// Authoritative phase after acting.
    pub phase_after: Phase,
    /// Action taken.
    pub action: Action,
    /// Agents run, in completion order of their tasks.
    pub agents: Vec<AgentOutcome>,
    /// Sufficiency report, when answers were evaluated.
    pub report: Option<SufficiencyReport>,
    /// Summary for the caller.
    pub message: String,
}

/// Snapshot of one skill for status displays.
#[derive(Debug, Clone, PartialEq)]
pub struct SkillStatus {
    /// Artifact-derived detection.
    pub detection: Detection,
    /// Persisted session, if any.
    pub session: Option<WorkflowSession>,
    /// Step statuses.
    pub steps: Vec<WorkflowStep>,
    /// Agent run history.
    pub runs: Vec<AgentRun>,
}

/// Composes detection, classification, locking and agent execution.
#[derive(Clone)]
pub struct Router {
    skills_root: PathBuf,
    store: SessionStore,
    runs: AgentRunRepo,
    locks: LockManager,
    agents: AgentManager,
    classifier: Arc<IntentClassifier>,
    evaluator: SufficiencyEvaluator,
    prompts: Arc<dyn PromptCatalog>,
}

impl Router {
    /// Build a router from configuration.
    #[must_use]
    pub fn new(config: &GlobalConfig, db: Arc<Database>, agents: AgentManager) -> Self {
        Self {
            skills_root: config.skills_root.clone(),
            store: SessionStore::new(Arc::clone(&db)),
            runs: AgentRunRepo::new(Arc::clone(&db)),
            locks: LockManager::new(db, config.instance_id.clone()),
            agents,
            classifier: Arc::new(IntentClassifier::new(&config.intent_rules)),
            evaluator: SufficiencyEvaluator::new(&config.sufficiency),
            prompts: Arc::new(DefaultPromptCatalog),
        }
    }

    /// Replace the prompt catalog.
    #[must_use]
    pub fn with_prompts(mut self, prompts: Arc<dyn PromptCatalog>) -> Self {
        self.prompts = prompts;
        self
    }

    /// The lock manager used by this router.
    #[must_use]
    pub fn locks(&self) -> &LockManager {
        &self.locks
    }

    /// The agent manager used by this router.
    #[must_use]
    pub fn agents(&self) -> &AgentManager {
        &self.agents
    }

    /// The session store used by this router.
    #[must_use]
    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Directory of a skill.
    #[must_use]
    pub fn skill_dir(&self, skill_name: &str) -> PathBuf {
        self.skills_root.join(skill_name)
    }

    /// Classify, lock, detect, route and execute one request.
    ///
    /// The lock is released whether or not execution succeeds.
    ///
    /// # Errors
    ///
    /// Returns `AppError::LockContention` if another live instance holds
    /// the skill, `AppError::Agent` if an agent cannot be spawned, and
    /// store or I/O errors unmodified.
    pub async fn dispatch(&self, request: DispatchRequest) -> Result<DispatchOutcome> {
        validate_skill_name(&request.skill_name)?;

        let existing = self.store.get(&request.skill_name).await?;
        let intent = self.classifier.classify(&request.signal, existing.is_some());

        let span = info_span!("dispatch", skill_name = %request.skill_name, %intent);
        async {
            let handle = self.locks.acquire(&request.skill_name).await?;
            let result = self.execute(&request, intent).await;
            if let Err(err) = self.locks.release(handle).await {
                warn!(%err, "failed to release skill lock");
            }
            result
        }
        .instrument(span)
        .await
    }

    /// Fill empty answers from recommendations under the skill lock.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the clarifications document does not
    /// exist, plus lock, store and I/O errors.
    pub async fn auto_fill(&self, skill_name: &str) -> Result<usize> {
        validate_skill_name(skill_name)?;
        let handle = self.locks.acquire(skill_name).await?;
        let result = self.auto_fill_locked(skill_name).await;
        if let Err(err) = self.locks.release(handle).await {
            warn!(skill_name, %err, "failed to release skill lock");
        }
        result
    }

    /// Evaluate the clarifications document without changing anything.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the document does not exist.
    pub fn evaluate(&self, skill_name: &str) -> Result<SufficiencyReport> {
        validate_skill_name(skill_name)?;
        let path = SkillArtifacts::new(self.skill_dir(skill_name)).clarifications();
        let doc = ClarificationsDocument::load_if_exists(&path)?
            .ok_or_else(|| AppError::NotFound(format!("{}", path.display())))?;
        Ok(self.evaluator.evaluate(&doc))
    }

    /// Detection, session, steps and runs for one skill. Read-only.
    ///
    /// # Errors
    ///
    /// Returns store or I/O errors.
    pub async fn status(&self, skill_name: &str) -> Result<SkillStatus> {
        validate_skill_name(skill_name)?;
        let session = self.store.get(skill_name).await?;
        let detection = detector::detect_phase(&self.skill_dir(skill_name), session.as_ref())?;
        Ok(SkillStatus {
            detection,
            session,
            steps: self.store.list_steps(skill_name).await?,
            runs: self.runs.list_for_skill(skill_name).await?,
        })
    }

    async fn execute(&self, request: &DispatchRequest, intent: Intent) -> Result<DispatchOutcome> {
        let skill_name = request.skill_name.as_str();
        let skill_dir = self.skill_dir(skill_name);
        let artifacts = SkillArtifacts::new(&skill_dir);

        let (detection, session) = detector::reconcile(&self.store, &skill_dir, skill_name).await?;
        let phase_before = detection.phase;
        let action = route(phase_before, intent);
        info!(phase = %phase_before, ?action, "routing");

        let mut outcome = DispatchOutcome {
            intent,
            phase_before,
            phase_after: phase_before,
            action,
            agents: Vec::new(),
            report: None,
            message: String::new(),
        };

        match action {
            Action::Report { reason } => {
                outcome.message = reason.to_owned();
                return Ok(outcome);
            }
            Action::BeginScoping { mode } => {
                self.begin_scoping(request, &artifacts, mode).await?;
                outcome.phase_after = Phase::Scoping;
                outcome.message = format!("scoping recorded for '{skill_name}'");
                return Ok(outcome);
            }
            Action::Reset => {
                self.reset(skill_name, &skill_dir).await?;
                self.begin_scoping(request, &artifacts, WorkflowMode::Guided)
                    .await?;
                outcome.phase_after = Phase::Scoping;
                outcome.message = format!("'{skill_name}' reset; scoping recorded");
                return Ok(outcome);
            }
            _ => {}
        }

        let mut session = match session {
            Some(session) => session,
            None => {
                let mut session = new_session(request, &skill_dir, WorkflowMode::Guided);
                session.advance_to(phase_before);
                session
            }
        };

        if intent == Intent::Express && session.mode != WorkflowMode::Express {
            session.mode = WorkflowMode::Express;
        }

        match action {
            Action::RunResearch => {
                self.run_step(&mut session, &artifacts, Step::Research, &request.signal, &mut outcome)
                    .await?;
            }
            Action::EvaluateAnswers | Action::AutoFillAndContinue => {
                self.evaluate_and_advance(&mut session, &artifacts, request, &mut outcome)
                    .await?;
            }
            Action::RunRefinementResearch => {
                self.run_step(
                    &mut session,
                    &artifacts,
                    Step::DetailedResearch,
                    &request.signal,
                    &mut outcome,
                )
                .await?;
            }
            Action::RunDecisions => {
                self.run_step(&mut session, &artifacts, Step::Decisions, &request.signal, &mut outcome)
                    .await?;
            }
            Action::RunGeneration => {
                self.run_step(&mut session, &artifacts, Step::Generation, &request.signal, &mut outcome)
                    .await?;
            }
            Action::RunValidation => {
                self.run_step(&mut session, &artifacts, Step::Validation, &request.signal, &mut outcome)
                    .await?;
            }
            Action::EnterIterative => {
                session.mode = WorkflowMode::Iterative;
                self.store.reset_steps_from(skill_name, Step::Validation).await?;
                self.run_step(&mut session, &artifacts, Step::Refine, &request.signal, &mut outcome)
                    .await?;
            }
            Action::AnswerQuestion => {
                self.run_step(&mut session, &artifacts, Step::Companion, &request.signal, &mut outcome)
                    .await?;
            }
            Action::AwaitAnswers => {
                outcome.message = "waiting for answers in the clarifications document".into();
            }
            Action::Complete => {
                outcome.message = format!("skill '{skill_name}' is complete");
            }
            Action::BeginScoping { .. } | Action::Reset | Action::Report { .. } => {}
        }

        outcome.phase_after = if action == Action::AnswerQuestion {
            phase_before
        } else {
            let after = detector::detect_phase(&skill_dir, Some(&session))?;
            if after.phase != session.current_phase {
                session.advance_to(after.phase);
            }
            session.clarification_status = after.clarification_status.unwrap_or_default();
            after.phase
        };

        session.touch();
        self.store.save(&session).await?;

        if outcome.message.is_empty() {
            outcome.message = format!("{} → {}", outcome.phase_before, outcome.phase_after);
        }
        Ok(outcome)
    }

    async fn begin_scoping(
        &self,
        request: &DispatchRequest,
        artifacts: &SkillArtifacts,
        mode: WorkflowMode,
    ) -> Result<WorkflowSession> {
        std::fs::create_dir_all(artifacts.context_dir()).map_err(|err| {
            AppError::Io(format!(
                "failed to create {}: {err}",
                artifacts.context_dir().display()
            ))
        })?;

        let mut session = new_session(request, &artifacts.root, mode);
        session.advance_to(Phase::Scoping);
        self.store.save(&session).await?;
        self.store
            .update_step(&session.skill_name, Step::Scoping, StepStatus::InProgress)
            .await?;
        self.store
            .update_step(&session.skill_name, Step::Scoping, StepStatus::Completed)
            .await?;
        info!(mode = mode.as_str(), "scoping recorded");
        Ok(session)
    }

    async fn reset(&self, skill_name: &str, skill_dir: &Path) -> Result<()> {
        if skill_dir.exists() {
            std::fs::remove_dir_all(skill_dir).map_err(|err| {
                AppError::Io(format!("failed to remove {}: {err}", skill_dir.display()))
            })?;
        }
        self.store.delete_skill(skill_name).await?;
        info!("skill reset");
        Ok(())
    }

    async fn auto_fill_locked(&self, skill_name: &str) -> Result<usize> {
        let path = SkillArtifacts::new(self.skill_dir(skill_name)).clarifications();
        let mut doc = ClarificationsDocument::load_if_exists(&path)?
            .ok_or_else(|| AppError::NotFound(format!("{}", path.display())))?;
        let filled = auto_fill(&mut doc);
        if filled > 0 {
            doc.save(&path)?;
            if let Some(mut session) = self.store.get(skill_name).await? {
                session.auto_filled = true;
                session.clarification_status = doc.status();
                session.touch();
                self.store.save(&session).await?;
            }
        }
        info!(skill_name, filled, "auto-filled answers from recommendations");
        Ok(filled)
    }

    /// Evaluate answers (auto-filling first in express mode) and either
    /// re-ask or run the next research/decisions step.
    async fn evaluate_and_advance(
        &self,
        session: &mut WorkflowSession,
        artifacts: &SkillArtifacts,
        request: &DispatchRequest,
        outcome: &mut DispatchOutcome,
    ) -> Result<()> {
        let skill_name = session.skill_name.clone();
        let path = artifacts.clarifications();
        let Some(mut doc) = ClarificationsDocument::load_if_exists(&path)? else {
            outcome.message = "clarifications document is missing".into();
            return Ok(());
        };

        self.store
            .update_step(&skill_name, Step::ClarificationReview, StepStatus::InProgress)
            .await?;

        if session.mode == WorkflowMode::Express {
            let filled = auto_fill(&mut doc);
            if filled > 0 {
                doc.save(&path)?;
                session.auto_filled = true;
                info!(filled, "auto-filled answers from recommendations");
            }
        }

        let report = self.evaluator.evaluate(&doc);
        session.clarification_status = doc.status();
        info!(
            verdict = report.verdict.as_str(),
            answered = report.answered,
            total = report.total,
            "answers evaluated"
        );
        let verdict = report.verdict;
        outcome.report = Some(report);

        if verdict != Verdict::Sufficient {
            self.store
                .update_step(&skill_name, Step::ClarificationReview, StepStatus::WaitingForUser)
                .await?;
            self.store
                .reset_steps_from(&skill_name, Step::DetailedResearch)
                .await?;
            outcome.action = Action::AwaitAnswers;
            outcome.message = re_ask_message(outcome.report.as_ref());
            return Ok(());
        }

        self.store
            .update_step(&skill_name, Step::ClarificationReview, StepStatus::Completed)
            .await?;

        let refinement_done = self
            .store
            .list_steps(&skill_name)
            .await?
            .iter()
            .any(|s| s.step == Step::DetailedResearch && s.status == StepStatus::Completed);
        let (next, action) = if doc.has_refinements() || refinement_done {
            (Step::Decisions, Action::RunDecisions)
        } else {
            (Step::DetailedResearch, Action::RunRefinementResearch)
        };
        outcome.action = action;

        self.run_step(session, artifacts, next, &request.signal, outcome)
            .await
    }

    /// Launch every task for `step` concurrently and record the runs.
    ///
    /// If launching or recording fails part-way, the agents already started
    /// are cancelled and finalized and the step is marked `Error` before
    /// the failure is returned.
    async fn run_step(
        &self,
        session: &WorkflowSession,
        artifacts: &SkillArtifacts,
        step: Step,
        signal: &str,
        outcome: &mut DispatchOutcome,
    ) -> Result<()> {
        let skill_name = session.skill_name.clone();
        let tasks = self.prompts.tasks(
            step,
            &PromptContext {
                session,
                artifacts,
                signal,
            },
        );
        let resume = if step == Step::Refine {
            self.resumable_session(&skill_name).await?
        } else {
            None
        };

        self.store
            .update_step(&skill_name, step, StepStatus::InProgress)
            .await?;

        let mut handles = Vec::with_capacity(tasks.len());
        let mut launch_error = None;
        for task in tasks {
            let model = task
                .model
                .clone()
                .unwrap_or_else(|| self.agents.default_model().to_owned());
            let agent_id = format!(
                "{skill_name}-{}-{}",
                task.label,
                &uuid::Uuid::new_v4().simple().to_string()[..8]
            );
            let mut agent_request = AgentRequest::new(task.prompt, &artifacts.root)
                .with_agent_id(agent_id.clone())
                .with_model(Some(model.clone()));
            if let Some(session_id) = &resume {
                agent_request = agent_request.resuming(session_id.clone());
            }

            match self.agents.spawn(agent_request).await {
                Ok(handle) => {
                    handles.push(handle);
                    let run = AgentRun::started(agent_id, skill_name.clone(), step, model);
                    if let Err(err) = self.runs.create(&run).await {
                        launch_error = Some(err);
                        break;
                    }
                }
                Err(err) => {
                    launch_error = Some(err);
                    break;
                }
            }
        }

        if let Some(err) = launch_error {
            for handle in &handles {
                self.agents.cancel(&handle.agent_id).await;
            }
            if let Some(cleanup) = self.collect(handles, &mut Vec::new()).await {
                warn!(%cleanup, "cleanup after a failed launch was incomplete");
            }
            self.mark_failed(&skill_name, step).await;
            return Err(err);
        }

        if let Some(err) = self.collect(handles, &mut outcome.agents).await {
            self.mark_failed(&skill_name, step).await;
            return Err(err);
        }

        let all_ok = outcome.agents.iter().all(AgentOutcome::is_success);
        let status = if !all_ok {
            StepStatus::Error
        } else if step == Step::Research {
            StepStatus::WaitingForUser
        } else {
            StepStatus::Completed
        };
        self.store.update_step(&skill_name, step, status).await?;

        if !all_ok {
            outcome.message = format!("step {step} failed; retry with resume");
        }
        Ok(())
    }

    /// Wait for every handle and finalize every run, even after a failure.
    ///
    /// Returns the first supervisor or store error.
    async fn collect(
        &self,
        handles: Vec<AgentHandle>,
        agents: &mut Vec<AgentOutcome>,
    ) -> Option<AppError> {
        let ids: Vec<String> = handles.iter().map(|h| h.agent_id.clone()).collect();
        let results = join_all(handles.into_iter().map(AgentHandle::wait)).await;

        let mut first_error = None;
        for (agent_id, result) in ids.into_iter().zip(results) {
            let finalized = match result {
                Ok(agent) => {
                    let finalized = self.finalize_run(&agent).await;
                    agents.push(agent);
                    finalized
                }
                Err(err) => {
                    let reason = err.to_string();
                    first_error.get_or_insert(err);
                    self.runs
                        .finalize(
                            &agent_id,
                            AgentRunStatus::Error,
                            TokenUsage::default(),
                            0.0,
                            None,
                            Some(&reason),
                        )
                        .await
                        .map(|_| ())
                }
            };
            if let Err(err) = finalized {
                warn!(agent_id, %err, "failed to finalize agent run");
                first_error.get_or_insert(err);
            }
        }
        first_error
    }

    async fn mark_failed(&self, skill_name: &str, step: Step) {
        if let Err(err) = self
            .store
            .update_step(skill_name, step, StepStatus::Error)
            .await
        {
            warn!(%step, %err, "failed to mark step as failed");
        }
    }

    /// Sidecar session of the latest successful generation or refinement,
    /// continued by the next refinement.
    async fn resumable_session(&self, skill_name: &str) -> Result<Option<String>> {
        Ok(self
            .runs
            .list_for_skill(skill_name)
            .await?
            .into_iter()
            .rev()
            .filter(|run| {
                matches!(run.step, Step::Generation | Step::Refine)
                    && run.status == AgentRunStatus::Completed
            })
            .find_map(|run| run.session_id))
    }

    async fn finalize_run(&self, agent: &AgentOutcome) -> Result<()> {
        let status = match agent.status {
            AgentRunStatus::Running => AgentRunStatus::Error,
            other => other,
        };
        self.runs
            .finalize(
                &agent.agent_id,
                status,
                agent.usage(),
                agent.total_cost(),
                agent.session_id.as_deref(),
                agent.stop_reason(),
            )
            .await?;
        Ok(())
    }
}

fn new_session(request: &DispatchRequest, skill_dir: &Path, mode: WorkflowMode) -> WorkflowSession {
    WorkflowSession::new(
        request.skill_name.clone(),
        request
            .skill_type
            .clone()
            .unwrap_or_else(|| "domain".to_owned()),
        request
            .domain
            .clone()
            .unwrap_or_else(|| request.skill_name.clone()),
        skill_dir.to_path_buf(),
        mode,
    )
}

fn re_ask_message(report: Option<&SufficiencyReport>) -> String {
    let Some(report) = report else {
        return String::new();
    };
    let mut message = format!(
        "answers are {} ({}/{} answered)",
        report.verdict.as_str(),
        report.answered,
        report.total
    );
    if !report.empty.is_empty() {
        message.push_str(&format!("; unanswered: {}", report.empty.join(", ")));
    }
    if !report.vague.is_empty() {
        message.push_str(&format!("; too vague: {}", report.vague.join(", ")));
    }
    message
}

/// Skill names become directory names and must not escape `skills_root`.
fn validate_skill_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name != "."
        && name != ".."
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(AppError::Config(format!("invalid skill name '{name}'")))
    }
}
