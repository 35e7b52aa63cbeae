//! Answer sufficiency evaluation and recommendation auto-fill.

use serde::Serialize;

use crate::config::SufficiencyConfig;

use super::model::{ClarificationsDocument, Question};

/// Hedge phrases that mark an answer as non-committal.
const HEDGE_PHRASES: &[&str] = &[
    "not sure",
    "unsure",
    "maybe",
    "idk",
    "i don't know",
    "i dont know",
    "tbd",
    "depends",
    "it depends",
    "whatever",
    "no preference",
    "either",
    "any",
    "?",
];

/// Gate between clarification rounds and the next pipeline step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Every required question answered, none vague.
    Sufficient,
    /// Majority answered but some answers are vague or missing.
    Mixed,
    /// More than half of the questions are unanswered.
    Insufficient,
}

impl Verdict {
    /// Wire representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sufficient => "sufficient",
            Self::Mixed => "mixed",
            Self::Insufficient => "insufficient",
        }
    }
}

/// Result of evaluating a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SufficiencyReport {
    /// Overall verdict.
    pub verdict: Verdict,
    /// Questions evaluated, refinements included.
    pub total: usize,
    /// Answered questions.
    pub answered: usize,
    /// Ids of unanswered questions.
    pub empty: Vec<String>,
    /// Ids of answered questions whose answer is vague.
    pub vague: Vec<String>,
}

/// Scores answers against length and hedge-phrase heuristics.
#[derive(Debug, Clone)]
pub struct SufficiencyEvaluator {
    min_answer_chars: usize,
    phrases: Vec<String>,
}

impl Default for SufficiencyEvaluator {
    fn default() -> Self {
        Self::new(&SufficiencyConfig::default())
    }
}

impl SufficiencyEvaluator {
    /// Build an evaluator from configuration.
    #[must_use]
    pub fn new(config: &SufficiencyConfig) -> Self {
        let phrases = HEDGE_PHRASES
            .iter()
            .map(|phrase| (*phrase).to_owned())
            .chain(
                config
                    .vague_phrases
                    .iter()
                    .map(|phrase| phrase.trim().to_lowercase())
                    .filter(|phrase| !phrase.is_empty()),
            )
            .collect();
        Self {
            min_answer_chars: config.min_answer_chars,
            phrases,
        }
    }

    /// Evaluate every question in `doc`.
    #[must_use]
    pub fn evaluate(&self, doc: &ClarificationsDocument) -> SufficiencyReport {
        let questions = doc.all_questions();
        let total = questions.len();

        let mut empty = Vec::new();
        let mut vague = Vec::new();
        let mut required_missing = false;
        for question in &questions {
            if !question.is_answered() {
                empty.push(question.id.clone());
                required_missing |= question.is_required();
            } else if self.is_vague(question) {
                vague.push(question.id.clone());
            }
        }
        let answered = total - empty.len();

        let verdict = if empty.len() * 2 > total {
            Verdict::Insufficient
        } else if !required_missing && vague.is_empty() {
            Verdict::Sufficient
        } else {
            Verdict::Mixed
        };

        SufficiencyReport {
            verdict,
            total,
            answered,
            empty,
            vague,
        }
    }

    /// Whether an answered question's answer is too weak to act on.
    ///
    /// A plain choice is never vague; an "Other" choice is judged by its
    /// accompanying text.
    #[must_use]
    pub fn is_vague(&self, question: &Question) -> bool {
        if let Some(choice) = question.answer_choice.as_deref() {
            let is_other = question.choice(choice).is_some_and(|c| c.is_other);
            if !is_other {
                return false;
            }
            return question
                .answer_text
                .as_deref()
                .is_none_or(|text| self.is_vague_text(text));
        }

        question
            .answer_text
            .as_deref()
            .is_some_and(|text| self.is_vague_text(text))
    }

    /// Length and hedge-phrase check for free text.
    #[must_use]
    pub fn is_vague_text(&self, text: &str) -> bool {
        let normalized = text.trim().to_lowercase();
        if normalized.chars().count() < self.min_answer_chars {
            return true;
        }
        self.phrases
            .iter()
            .any(|phrase| starts_with_phrase(&normalized, phrase))
    }
}

/// `text` equals `phrase` or starts with it at a word boundary.
fn starts_with_phrase(text: &str, phrase: &str) -> bool {
    let Some(rest) = text.strip_prefix(phrase) else {
        return false;
    };
    let phrase_ends_in_word = phrase.chars().last().is_some_and(char::is_alphanumeric);
    !phrase_ends_in_word || rest.chars().next().is_none_or(|c| !c.is_alphanumeric())
}

/// Fill every unanswered question that has a recommendation.
///
/// A recommendation naming one of the question's choices selects that
/// choice; anything else is copied as free text. Returns the number of
/// questions filled.
pub fn auto_fill(doc: &mut ClarificationsDocument) -> usize {
    let mut filled = 0;
    for section in &mut doc.sections {
        for question in section.questions_mut() {
            filled += fill_question(question);
        }
    }
    filled
}

fn fill_question(question: &mut Question) -> usize {
    let mut filled = 0;
    if !question.is_answered() {
        if let Some(choice) = question.recommended_choice().map(str::to_owned) {
            question.answer_choice = Some(choice);
            question.answer_text = None;
            filled += 1;
        } else if let Some(text) = question.recommendation.clone() {
            question.answer_text = Some(text);
            filled += 1;
        }
    }
    for refinement in &mut question.refinements {
        filled += fill_question(refinement);
    }
    filled
}
