//! Agent task catalog.
//!
//! Prompt text is an opaque payload for the sidecar. The router asks a
//! [`PromptCatalog`] which agents to launch for a step and never inspects
//! what they are told.

use crate::models::session::WorkflowSession;
use crate::models::step::Step;
use crate::workflow::detector::SkillArtifacts;

/// One agent to launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentTask {
    /// Short label, used in the agent id.
    pub label: String,
    /// Instruction payload.
    pub prompt: String,
    /// Model override.
    pub model: Option<String>,
}

impl AgentTask {
    fn new(label: &str, prompt: String) -> Self {
        Self {
            label: label.to_owned(),
            prompt,
            model: None,
        }
    }
}

/// Inputs available when building prompts.
#[derive(Debug, Clone, Copy)]
pub struct PromptContext<'a> {
    /// Session being advanced.
    pub session: &'a WorkflowSession,
    /// Artifact locations.
    pub artifacts: &'a SkillArtifacts,
    /// Caller's free-text signal.
    pub signal: &'a str,
}

/// Source of agent tasks per pipeline step.
pub trait PromptCatalog: Send + Sync {
    /// Agents to run for `step`. An empty list means the step needs none.
    fn tasks(&self, step: Step, ctx: &PromptContext<'_>) -> Vec<AgentTask>;
}

/// Minimal built-in prompts naming the artifacts each step reads and writes.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultPromptCatalog;

impl PromptCatalog for DefaultPromptCatalog {
    fn tasks(&self, step: Step, ctx: &PromptContext<'_>) -> Vec<AgentTask> {
        let session = ctx.session;
        let skill = format!(
            "skill '{}' (type: {}, domain: {})",
            session.skill_name, session.skill_type, session.domain
        );
        let clarifications = ctx.artifacts.clarifications().display().to_string();
        let decisions = ctx.artifacts.decisions().display().to_string();
        let skill_file = ctx.artifacts.skill().display().to_string();
        let report = ctx.artifacts.validation_report().display().to_string();

        match step {
            Step::Scoping | Step::ClarificationReview => Vec::new(),
            Step::Research => vec![AgentTask::new(
                "research",
                format!(
                    "Research the {skill}. Write clarification questions with lettered \
                     choices, a recommendation and an empty answer marker to {clarifications}."
                ),
            )],
            Step::DetailedResearch => vec![AgentTask::new(
                "detailed-research",
                format!(
                    "Read the answered questions in {clarifications} for the {skill}. Add a \
                     Refinements block under each question that needs follow-up."
                ),
            )],
            Step::Decisions => vec![AgentTask::new(
                "decisions",
                format!(
                    "Synthesize the answers in {clarifications} into confirmed decisions for \
                     the {skill}. Write them to {decisions}."
                ),
            )],
            Step::Generation => vec![AgentTask::new(
                "generate",
                format!(
                    "Generate the {skill} from {decisions}. Write the entry file to \
                     {skill_file} and reference files beside it."
                ),
            )],
            Step::Validation => vec![
                AgentTask::new(
                    "validate",
                    format!(
                        "Validate {skill_file} against {decisions} and write findings to {report}."
                    ),
                ),
                AgentTask::new(
                    "test-prompts",
                    format!(
                        "Exercise the {skill} at {skill_file} with realistic prompts and \
                         report gaps. Do not modify files."
                    ),
                ),
            ],
            Step::Refine => vec![AgentTask::new(
                "refine",
                format!(
                    "Improve the {skill} at {skill_file} as requested: {}",
                    ctx.signal
                ),
            )],
            Step::Companion => vec![AgentTask::new(
                "companion",
                format!(
                    "Answer this question about the {skill} using the files under {}. Do not \
                     modify files. Question: {}",
                    ctx.artifacts.root.display(),
                    ctx.signal
                ),
            )],
        }
    }
}
