//! Serializer for clarifications documents.
//!
//! Unmodified questions are emitted from their original bytes. A question
//! whose only change is its answer gets just the answer segment rewritten
//! (or inserted, when it had no answer marker); any other change re-renders
//! the question in canonical form.
//!
//! Answer lines that would re-parse as something else (a choice, a marker,
//! a header, or a choice letter opening free text) are written with a
//! leading `\`, which the parser strips.

use std::fmt::Write as _;

use super::model::{ClarificationsDocument, Question, Section, SectionBlock};
use super::parser::{ends_answer, section_title, split_choice_value, ANSWER_ESCAPE};

/// Question header level used for questions created in code.
const DEFAULT_QUESTION_LEVEL: usize = 3;

/// Serialize a document.
#[must_use]
pub fn render(doc: &ClarificationsDocument) -> String {
    let mut out = String::with_capacity(doc.preamble.len() + 256);
    out.push_str(&doc.preamble);
    for section in &doc.sections {
        render_section(section, &mut out);
    }
    out
}

fn render_section(section: &Section, out: &mut String) {
    match &section.header_raw {
        Some(raw) if section_title(raw).as_deref() == Some(section.title.as_str()) => {
            out.push_str(raw);
        }
        _ => {
            ensure_line_start(out);
            let _ = write!(out, "## {}\n\n", section.title);
        }
    }

    for block in &section.blocks {
        match block {
            SectionBlock::Raw(raw) => out.push_str(raw),
            SectionBlock::Question(question) => {
                ensure_line_start(out);
                render_question(question, DEFAULT_QUESTION_LEVEL, out);
            }
        }
    }
}

fn render_question(question: &Question, default_level: usize, out: &mut String) {
    let (level, eol) = question
        .source
        .as_ref()
        .map_or((default_level, "\n"), |source| (source.level, source.eol));

    match &question.source {
        Some(source) if source.snapshot.same_frame(question) => {
            if source.snapshot.same_answer(question) {
                out.push_str(&source.own_raw);
            } else if let Some((start, end)) = source.answer_span {
                out.push_str(&source.own_raw[..start]);
                out.push_str(&answer_line(question, eol));
                out.push_str(&source.own_raw[end..]);
            } else {
                insert_answer(&source.own_raw, &answer_line(question, eol), eol, out);
            }
        }
        _ => render_canonical(question, level, eol, out),
    }

    let child_level = (level + 1).min(6);
    match question.source.as_ref().and_then(|s| s.refinements_raw.as_ref()) {
        Some(raw) => out.push_str(raw),
        None if !question.refinements.is_empty() => {
            ensure_line_start(out);
            let _ = write!(out, "{} Refinements{eol}{eol}", "#".repeat(child_level));
        }
        None => {}
    }

    for refinement in &question.refinements {
        ensure_line_start(out);
        render_question(refinement, child_level, out);
    }
}

/// Emit `own_raw` with an answer line placed after its last non-blank
/// line, keeping the trailing blank lines after the answer.
fn insert_answer(own_raw: &str, answer: &str, eol: &str, out: &mut String) {
    let mut body_end = 0;
    let mut offset = 0;
    for line in own_raw.split_inclusive('\n') {
        offset += line.len();
        if !line.trim().is_empty() {
            body_end = offset;
        }
    }

    let body = &own_raw[..body_end];
    out.push_str(body);
    if !body.ends_with('\n') {
        out.push_str(eol);
    }
    out.push_str(eol);
    out.push_str(answer);
    out.push_str(eol);
    out.push_str(&own_raw[body_end..]);
}

/// Canonical form of a question's own lines (refinements excluded).
fn render_canonical(question: &Question, level: usize, eol: &str, out: &mut String) {
    let _ = write!(
        out,
        "{} {}: {}{eol}{eol}",
        "#".repeat(level),
        question.id,
        question.title
    );

    if !question.body_text.trim().is_empty() {
        for line in question.body_text.lines() {
            out.push_str(line);
            out.push_str(eol);
        }
        out.push_str(eol);
    }

    if !question.choices.is_empty() {
        for choice in &question.choices {
            let _ = write!(out, "{}. {}{eol}", choice.id, choice.text);
        }
        out.push_str(eol);
    }

    if let Some(recommendation) = &question.recommendation {
        let _ = write!(out, "**Recommendation:** {recommendation}{eol}{eol}");
    }

    out.push_str(&answer_line(question, eol));
    out.push_str(eol);
    out.push_str(eol);
}

/// The `**Answer:**` marker with its value; no trailing line terminator.
fn answer_line(question: &Question, eol: &str) -> String {
    let text = question
        .answer_text
        .as_deref()
        .map(str::trim)
        .filter(|text| !text.is_empty());

    let value = match (question.answer_choice.as_deref(), text) {
        (Some(choice), Some(text)) => format!("{choice} — {text}"),
        (Some(choice), None) => choice.to_owned(),
        (None, Some(text)) => text.to_owned(),
        (None, None) => String::new(),
    };

    // Blank lines would terminate the answer on re-parse.
    let mut lines = value.lines().map(str::trim).filter(|line| !line.is_empty());
    let Some(first) = lines.next() else {
        return "**Answer:**".to_owned();
    };

    let free_text = question.answer_choice.is_none();
    let escape_first = free_text
        && (first.starts_with(ANSWER_ESCAPE)
            || split_choice_value(first, &question.choices).is_some());

    let mut out = String::from("**Answer:** ");
    if escape_first {
        out.push(ANSWER_ESCAPE);
    }
    out.push_str(first);
    for line in lines {
        out.push_str(eol);
        if line.starts_with(ANSWER_ESCAPE) || ends_answer(line) {
            out.push(ANSWER_ESCAPE);
        }
        out.push_str(line);
    }
    out
}

fn ensure_line_start(out: &mut String) {
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
}
