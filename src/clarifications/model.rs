//! In-memory model of a clarifications (or decisions) document.

use crate::models::session::ClarificationStatus;
use crate::{AppError, Result};

/// Parsed clarifications document.
///
/// Text the grammar does not recognize is kept verbatim, either in the
/// preamble or as [`SectionBlock::Raw`] entries, so serialization can
/// reproduce the original bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClarificationsDocument {
    /// Everything before the first section header (title, frontmatter).
    pub preamble: String,
    /// Sections in document order.
    pub sections: Vec<Section>,
}

/// A `## title` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    /// Header text without the leading hashes.
    pub title: String,
    /// Question blocks and opaque text, in document order.
    pub blocks: Vec<SectionBlock>,
    pub(crate) header_raw: Option<String>,
}

/// One block inside a section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SectionBlock {
    /// A recognized question.
    Question(Question),
    /// Unrecognized text kept as-is.
    Raw(String),
}

/// A lettered answer option.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Choice {
    /// Single uppercase letter.
    pub id: String,
    /// Option text.
    pub text: String,
    /// Whether this is the free-form "Other" option.
    pub is_other: bool,
}

impl Choice {
    /// Build a choice, deriving `is_other` from its text.
    #[must_use]
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        let text = text.into();
        let is_other = text.trim_start().to_lowercase().starts_with("other");
        Self {
            id: id.into(),
            text,
            is_other,
        }
    }
}

/// A clarification question with optional nested refinements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    /// Identifier such as `Q3` or `R1.2`.
    pub id: String,
    /// Header title.
    pub title: String,
    /// Free text between the header and the markers.
    pub body_text: String,
    /// Lettered options.
    pub choices: Vec<Choice>,
    /// Recommended choice id or text.
    pub recommendation: Option<String>,
    /// Selected choice id.
    pub answer_choice: Option<String>,
    /// Free-form answer, or the note attached to a selected choice.
    pub answer_text: Option<String>,
    /// Follow-up questions.
    pub refinements: Vec<Question>,
    pub(crate) source: Option<QuestionSource>,
}

/// Original text of a parsed question, used for byte-exact re-emission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct QuestionSource {
    pub(crate) level: usize,
    pub(crate) eol: &'static str,
    /// Header line through the end of the question's own lines.
    pub(crate) own_raw: String,
    /// Byte range of the answer marker and its continuation lines in `own_raw`.
    pub(crate) answer_span: Option<(usize, usize)>,
    /// `Refinements` header plus any text before the first refinement.
    pub(crate) refinements_raw: Option<String>,
    pub(crate) snapshot: Snapshot,
}

/// Field values as parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Snapshot {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) body_text: String,
    pub(crate) choices: Vec<Choice>,
    pub(crate) recommendation: Option<String>,
    pub(crate) answer_choice: Option<String>,
    pub(crate) answer_text: Option<String>,
}

impl Snapshot {
    pub(crate) fn of(question: &Question) -> Self {
        Self {
            id: question.id.clone(),
            title: question.title.clone(),
            body_text: question.body_text.clone(),
            choices: question.choices.clone(),
            recommendation: question.recommendation.clone(),
            answer_choice: question.answer_choice.clone(),
            answer_text: question.answer_text.clone(),
        }
    }

    /// Whether every non-answer field still matches `question`.
    pub(crate) fn same_frame(&self, question: &Question) -> bool {
        self.id == question.id
            && self.title == question.title
            && self.body_text == question.body_text
            && self.choices == question.choices
            && self.recommendation == question.recommendation
    }

    pub(crate) fn same_answer(&self, question: &Question) -> bool {
        self.answer_choice == question.answer_choice && self.answer_text == question.answer_text
    }
}

impl Question {
    /// Create an unanswered question that renders canonically.
    #[must_use]
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            body_text: String::new(),
            choices: Vec::new(),
            recommendation: None,
            answer_choice: None,
            answer_text: None,
            refinements: Vec::new(),
            source: None,
        }
    }

    /// Answered iff a choice is selected or the free text is non-blank.
    #[must_use]
    pub fn is_answered(&self) -> bool {
        self.answer_choice.is_some()
            || self
                .answer_text
                .as_deref()
                .is_some_and(|text| !text.trim().is_empty())
    }

    /// Questions titled `... (optional)` do not block sufficiency.
    #[must_use]
    pub fn is_required(&self) -> bool {
        !self.title.trim_end().to_lowercase().ends_with("(optional)")
    }

    /// Look up a choice by id.
    #[must_use]
    pub fn choice(&self, id: &str) -> Option<&Choice> {
        self.choices.iter().find(|choice| choice.id == id)
    }

    /// The recommendation resolved to one of this question's choice ids.
    #[must_use]
    pub fn recommended_choice(&self) -> Option<&str> {
        let recommendation = self.recommendation.as_deref()?;
        let (id, _) = super::parser::split_choice_value(recommendation, &self.choices)?;
        self.choice(&id).map(|choice| choice.id.as_str())
    }

    fn visit<'a>(&'a self, out: &mut Vec<&'a Question>) {
        out.push(self);
        for refinement in &self.refinements {
            refinement.visit(out);
        }
    }

    fn find_mut(&mut self, id: &str) -> Option<&mut Question> {
        if self.id == id {
            return Some(self);
        }
        self.refinements
            .iter_mut()
            .find_map(|refinement| refinement.find_mut(id))
    }
}

impl Section {
    /// Create an empty section that renders canonically.
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            blocks: Vec::new(),
            header_raw: None,
        }
    }

    /// Top-level questions of this section.
    pub fn questions(&self) -> impl Iterator<Item = &Question> {
        self.blocks.iter().filter_map(|block| match block {
            SectionBlock::Question(question) => Some(question),
            SectionBlock::Raw(_) => None,
        })
    }

    /// Mutable top-level questions of this section.
    pub fn questions_mut(&mut self) -> impl Iterator<Item = &mut Question> {
        self.blocks.iter_mut().filter_map(|block| match block {
            SectionBlock::Question(question) => Some(question),
            SectionBlock::Raw(_) => None,
        })
    }
}

impl ClarificationsDocument {
    /// Every question, refinements included, depth-first in document order.
    #[must_use]
    pub fn all_questions(&self) -> Vec<&Question> {
        let mut out = Vec::new();
        for section in &self.sections {
            for question in section.questions() {
                question.visit(&mut out);
            }
        }
        out
    }

    /// Every refinement question (any nesting depth).
    #[must_use]
    pub fn refinement_questions(&self) -> Vec<&Question> {
        let mut out = Vec::new();
        for section in &self.sections {
            for question in section.questions() {
                for refinement in &question.refinements {
                    refinement.visit(&mut out);
                }
            }
        }
        out
    }

    /// Find a question or refinement by id.
    #[must_use]
    pub fn find_question(&self, id: &str) -> Option<&Question> {
        self.all_questions()
            .into_iter()
            .find(|question| question.id == id)
    }

    /// Mutable lookup of a question or refinement by id.
    pub fn find_question_mut(&mut self, id: &str) -> Option<&mut Question> {
        self.sections
            .iter_mut()
            .flat_map(Section::questions_mut)
            .find_map(|question| question.find_mut(id))
    }

    /// Record an answer.
    ///
    /// `choice` must name one of the question's choices. Passing `None`
    /// for both clears the answer.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` for an unknown question id and
    /// `AppError::Document` for an unknown choice id.
    pub fn set_answer(&mut self, id: &str, choice: Option<&str>, text: Option<&str>) -> Result<()> {
        let question = self
            .find_question_mut(id)
            .ok_or_else(|| AppError::NotFound(format!("question {id}")))?;

        if let Some(choice) = choice {
            if question.choice(choice).is_none() {
                return Err(AppError::Document(format!(
                    "question {id} has no choice {choice}"
                )));
            }
        }

        question.answer_choice = choice.map(str::to_owned);
        question.answer_text = text
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .map(str::to_owned);
        Ok(())
    }

    /// Answer counts across all questions, refinements included.
    #[must_use]
    pub fn status(&self) -> ClarificationStatus {
        count(&self.all_questions())
    }

    /// Answer counts across refinement questions only.
    #[must_use]
    pub fn refinement_status(&self) -> ClarificationStatus {
        count(&self.refinement_questions())
    }

    /// Whether any question carries refinements.
    #[must_use]
    pub fn has_refinements(&self) -> bool {
        self.sections
            .iter()
            .flat_map(Section::questions)
            .any(|question| !question.refinements.is_empty())
    }

    /// Whether at least one refinement has been answered.
    #[must_use]
    pub fn refinements_answered(&self) -> bool {
        self.refinement_questions()
            .iter()
            .any(|question| question.is_answered())
    }
}

fn count(questions: &[&Question]) -> ClarificationStatus {
    let answered = questions.iter().filter(|q| q.is_answered()).count();
    ClarificationStatus {
        total: u32::try_from(questions.len()).unwrap_or(u32::MAX),
        answered: u32::try_from(answered).unwrap_or(u32::MAX),
    }
}
