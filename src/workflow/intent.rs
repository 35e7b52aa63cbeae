//! Rule-table intent classifier.
//!
//! Classification is pure: it inspects only the signal text and whether an
//! in-progress session exists. New trigger phrases are added as data, either
//! in [`BUILTIN_RULES`] or as `[[intent_rules]]` in the configuration.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::IntentRuleConfig;
use crate::AppError;

/// What the caller wants done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    /// Start building a new skill.
    NewSkill,
    /// Continue from the current phase.
    Resume,
    /// Only validate the generated skill.
    ValidateOnly,
    /// Refine an already generated skill.
    Improve,
    /// Discard progress and start over.
    StartFresh,
    /// Run without pausing for answers.
    Express,
    /// Answer a question about the skill without advancing.
    ProcessQuestion,
}

impl Intent {
    /// Every intent.
    pub const ALL: [Intent; 7] = [
        Intent::NewSkill,
        Intent::Resume,
        Intent::ValidateOnly,
        Intent::Improve,
        Intent::StartFresh,
        Intent::Express,
        Intent::ProcessQuestion,
    ];

    /// Wire representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NewSkill => "new_skill",
            Self::Resume => "resume",
            Self::ValidateOnly => "validate_only",
            Self::Improve => "improve",
            Self::StartFresh => "start_fresh",
            Self::Express => "express",
            Self::ProcessQuestion => "process_question",
        }
    }
}

impl Display for Intent {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Intent {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Intent::ALL
            .into_iter()
            .find(|intent| intent.as_str() == s)
            .ok_or_else(|| AppError::Config(format!("unknown intent: {s}")))
    }
}

/// Built-in rules, consulted in order after configured rules.
pub const BUILTIN_RULES: &[(&str, Intent)] = &[
    (
        r"\b(start (over|fresh|from scratch)|reset|wipe|discard (progress|everything))\b",
        Intent::StartFresh,
    ),
    (
        r"\b(validate|validation|verify|check)\b.*\b(only|just)\b|\b(only|just) (validate|verify|check)\b|^\s*(run )?(validate|validation|verify)\b",
        Intent::ValidateOnly,
    ),
    (
        r"\b(improve|refine|iterate on|polish|tweak|enhance|update the skill)\b",
        Intent::Improve,
    ),
    (
        r"\b(express|fast mode|quick mode|skip (the )?questions|use (the )?recommendations|auto-?fill)\b",
        Intent::Express,
    ),
    (
        r"\b(continue|resume|proceed|next step|carry on|keep going|i('ve| have) answered|answers? (are )?(done|ready))\b",
        Intent::Resume,
    ),
    (r"\?\s*$", Intent::ProcessQuestion),
    (r"\b(new skill|create|build|make|start)\b", Intent::NewSkill),
    (
        r"^\s*(what|why|how|which|where|when|who|does|is|are|should)\b",
        Intent::ProcessQuestion,
    ),
];

struct IntentRule {
    pattern: Regex,
    intent: Intent,
}

/// Ordered pattern table; the first match wins.
pub struct IntentClassifier {
    rules: Vec<IntentRule>,
}

impl Default for IntentClassifier {
    fn default() -> Self {
        Self::new(&[])
    }
}

impl IntentClassifier {
    /// Build a classifier whose configured rules precede the built-ins.
    ///
    /// Patterns that fail to compile are skipped with a warning; the
    /// configuration layer rejects them before this point.
    #[must_use]
    pub fn new(configured: &[IntentRuleConfig]) -> Self {
        let configured = configured
            .iter()
            .map(|rule| (rule.pattern.as_str(), rule.intent));
        let builtin = BUILTIN_RULES.iter().copied();

        let rules = configured
            .chain(builtin)
            .filter_map(|(pattern, intent)| {
                match RegexBuilder::new(pattern).case_insensitive(true).build() {
                    Ok(pattern) => Some(IntentRule { pattern, intent }),
                    Err(err) => {
                        warn!(pattern, %err, "skipping intent rule with invalid pattern");
                        None
                    }
                }
            })
            .collect();

        Self { rules }
    }

    /// Classify a free-text signal.
    ///
    /// Blank or unmatched signals default to `Resume` when a session is in
    /// progress, otherwise `NewSkill`.
    #[must_use]
    pub fn classify(&self, signal: &str, has_active_session: bool) -> Intent {
        let signal = signal.trim();
        if !signal.is_empty() {
            if let Some(rule) = self.rules.iter().find(|rule| rule.pattern.is_match(signal)) {
                return rule.intent;
            }
        }

        if has_active_session {
            Intent::Resume
        } else {
            Intent::NewSkill
        }
    }
}
