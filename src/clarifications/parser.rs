//! Line-oriented parser for clarifications documents.
//!
//! Parsing never fails. Lines that do not fit the grammar are carried as
//! raw text so that rendering an unmodified document reproduces it exactly.

use super::model::{
    Choice, ClarificationsDocument, Question, QuestionSource, Section, SectionBlock, Snapshot,
};

/// Leading character that makes an answer line literal text.
pub(crate) const ANSWER_ESCAPE: char = '\\';

/// Parse a clarifications document.
#[must_use]
pub fn parse(input: &str) -> ClarificationsDocument {
    let lines: Vec<&str> = input.split_inclusive('\n').collect();
    let mut cursor = 0;

    let mut preamble = String::new();
    while cursor < lines.len() && !is_section_header(lines[cursor]) {
        preamble.push_str(lines[cursor]);
        cursor += 1;
    }

    let mut sections = Vec::new();
    while cursor < lines.len() {
        let header_raw = lines[cursor];
        cursor += 1;

        let mut blocks = Vec::new();
        let mut raw = String::new();
        while cursor < lines.len() && !is_section_header(lines[cursor]) {
            if let Some(header) = question_header(lines[cursor]) {
                if !raw.is_empty() {
                    blocks.push(SectionBlock::Raw(std::mem::take(&mut raw)));
                }
                let (question, next) = parse_question(&lines, cursor, header.level);
                blocks.push(SectionBlock::Question(question));
                cursor = next;
            } else {
                raw.push_str(lines[cursor]);
                cursor += 1;
            }
        }
        if !raw.is_empty() {
            blocks.push(SectionBlock::Raw(raw));
        }

        sections.push(Section {
            title: section_title(header_raw).unwrap_or_default(),
            blocks,
            header_raw: Some(header_raw.to_owned()),
        });
    }

    ClarificationsDocument { preamble, sections }
}

/// Parse the question whose header is `lines[start]`; returns the index
/// of the first line after it.
fn parse_question(lines: &[&str], start: usize, level: usize) -> (Question, usize) {
    let header_line = lines[start];
    let eol = if header_line.ends_with("\r\n") {
        "\r\n"
    } else {
        "\n"
    };
    let (id, title) = question_header(header_line)
        .map(|header| (header.id, header.title))
        .unwrap_or_default();

    let mut own_raw = header_line.to_owned();
    let mut body_lines: Vec<&str> = Vec::new();
    let mut choices = Vec::new();
    let mut recommendation = None;
    let mut answer_value: Option<String> = None;
    let mut answer_span = None;
    let mut refinements = Vec::new();
    let mut refinements_raw = None;

    let mut i = start + 1;
    while i < lines.len() {
        let line = lines[i];
        let text = content(line);

        if let Some((header_level, rest)) = header(text) {
            if header_level <= level || question_header(text).is_some() {
                break;
            }
            if is_refinements_title(rest) {
                let (children, raw, next) = parse_refinements(lines, i, level);
                refinements = children;
                refinements_raw = Some(raw);
                i = next;
                break;
            }
        }

        if let Some(choice) = choice_line(text) {
            choices.push(choice);
        } else if let Some(value) = marker_value(text, "Recommendation") {
            let value = value.trim();
            recommendation = (!value.is_empty()).then(|| value.to_owned());
        } else if let Some(first) = marker_value(text, "Answer") {
            let span_start = own_raw.len();
            let mut value = first.trim().to_owned();
            own_raw.push_str(line);
            let mut last_eol = line.len() - text.len();
            i += 1;
            while i < lines.len() {
                let next = content(lines[i]);
                if ends_answer(next) {
                    break;
                }
                value.push('\n');
                let continued = next.trim();
                value.push_str(continued.strip_prefix(ANSWER_ESCAPE).unwrap_or(continued));
                own_raw.push_str(lines[i]);
                last_eol = lines[i].len() - next.len();
                i += 1;
            }
            answer_span = Some((span_start, own_raw.len() - last_eol));
            answer_value = Some(value);
            continue;
        } else {
            body_lines.push(text);
        }

        own_raw.push_str(line);
        i += 1;
    }

    let (answer_choice, answer_text) = answer_value
        .as_deref()
        .map(|value| interpret_answer(value, &choices))
        .unwrap_or_default();

    let mut question = Question {
        id,
        title,
        body_text: join_body(&body_lines),
        choices,
        recommendation,
        answer_choice,
        answer_text,
        refinements,
        source: None,
    };
    question.source = Some(QuestionSource {
        level,
        eol,
        own_raw,
        answer_span,
        refinements_raw,
        snapshot: Snapshot::of(&question),
    });

    (question, i)
}

/// Parse a `Refinements` sub-block opened at `lines[start]` inside a
/// question of `parent_level`.
fn parse_refinements(
    lines: &[&str],
    start: usize,
    parent_level: usize,
) -> (Vec<Question>, String, usize) {
    let mut raw = lines[start].to_owned();
    let mut children = Vec::new();
    let mut i = start + 1;

    while i < lines.len() {
        let text = content(lines[i]);
        if header(text).is_some() {
            match question_header(text) {
                Some(child) if child.level > parent_level => {
                    let (question, next) = parse_question(lines, i, child.level);
                    children.push(question);
                    i = next;
                    continue;
                }
                _ => break,
            }
        }
        // Child questions consume every non-header line, so only text
        // before the first refinement lands here.
        raw.push_str(lines[i]);
        i += 1;
    }

    (children, raw, i)
}

/// Whether `text` would stop an answer from continuing onto it.
pub(crate) fn ends_answer(text: &str) -> bool {
    text.trim().is_empty()
        || header(text).is_some()
        || choice_line(text).is_some()
        || marker_value(text, "Answer").is_some()
        || marker_value(text, "Recommendation").is_some()
}

fn join_body(lines: &[&str]) -> String {
    lines
        .iter()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_owned()
}

/// Split an answer marker value into `(choice, note)` or free text.
pub(crate) fn interpret_answer(value: &str, choices: &[Choice]) -> (Option<String>, Option<String>) {
    let value = value.trim();
    if value.is_empty() {
        return (None, None);
    }
    if let Some(literal) = value.strip_prefix(ANSWER_ESCAPE) {
        return (None, Some(literal.to_owned()));
    }
    match split_choice_value(value, choices) {
        Some((id, note)) => (Some(id), note),
        None => (None, Some(value.to_owned())),
    }
}

/// Recognize `B`, `B)`, `B.`, `B: note`, `B) note` or `B — note` where `B`
/// is one of `choices`.
pub(crate) fn split_choice_value(value: &str, choices: &[Choice]) -> Option<(String, Option<String>)> {
    let value = value.trim();
    let letter = value.chars().next().filter(char::is_ascii_uppercase)?;
    let id = letter.to_string();
    if !choices.iter().any(|choice| choice.id == id) {
        return None;
    }

    let rest = &value[letter.len_utf8()..];
    let note = if let Some(after) = rest.strip_prefix(['.', ')', ':']) {
        let after = after.trim_start();
        after
            .strip_prefix(['—', '–', '-'])
            .map_or(after, str::trim_start)
    } else if rest.is_empty() {
        ""
    } else if rest.starts_with(char::is_whitespace) {
        let after = rest.trim_start();
        after.strip_prefix(['—', '–', '-', ':'])?.trim_start()
    } else {
        return None;
    };

    let note = note.trim();
    Some((id, (!note.is_empty()).then(|| note.to_owned())))
}

/// A recognized question header line.
pub(crate) struct QuestionHeader {
    pub(crate) level: usize,
    pub(crate) id: String,
    pub(crate) title: String,
}

/// `#{3,6} ID: title` with ID matching `[A-Z]+\d+(\.\d+)*`.
pub(crate) fn question_header(line: &str) -> Option<QuestionHeader> {
    let (level, rest) = header(content(line))?;
    if level < 3 {
        return None;
    }
    let (id, title) = rest.split_once(':')?;
    let id = id.trim();
    if !is_question_id(id) {
        return None;
    }
    Some(QuestionHeader {
        level,
        id: id.to_owned(),
        title: title.trim().to_owned(),
    })
}

fn is_question_id(id: &str) -> bool {
    let letters = id.chars().take_while(char::is_ascii_uppercase).count();
    if letters == 0 {
        return false;
    }
    let numbers = &id[letters..];
    !numbers.is_empty()
        && numbers
            .split('.')
            .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit()))
}

/// Markdown ATX header: level and trimmed text.
pub(crate) fn header(text: &str) -> Option<(usize, &str)> {
    let level = text.chars().take_while(|c| *c == '#').count();
    if level == 0 || level > 6 {
        return None;
    }
    let rest = &text[level..];
    if !rest.is_empty() && !rest.starts_with([' ', '\t']) {
        return None;
    }
    Some((level, rest.trim()))
}

fn is_section_header(line: &str) -> bool {
    matches!(header(content(line)), Some((2, _)))
}

pub(crate) fn section_title(line: &str) -> Option<String> {
    match header(content(line)) {
        Some((2, title)) => Some(title.to_owned()),
        _ => None,
    }
}

fn is_refinements_title(title: &str) -> bool {
    title.trim_end_matches(':').eq_ignore_ascii_case("refinements")
}

/// `A. text` or `A) text`, optionally bulleted.
fn choice_line(text: &str) -> Option<Choice> {
    let trimmed = text.trim_start();
    let trimmed = trimmed
        .strip_prefix("- ")
        .or_else(|| trimmed.strip_prefix("* "))
        .unwrap_or(trimmed);
    let letter = trimmed.chars().next().filter(char::is_ascii_uppercase)?;
    let rest = trimmed[1..].strip_prefix(['.', ')'])?;
    if !rest.starts_with([' ', '\t']) {
        return None;
    }
    let choice_text = rest.trim();
    if choice_text.is_empty() {
        return None;
    }
    Some(Choice::new(letter.to_string(), choice_text))
}

/// Value after `**Name:**` or `**Name**:` at the start of a line.
fn marker_value<'a>(text: &'a str, name: &str) -> Option<&'a str> {
    let trimmed = text.trim_start();
    let rest = trimmed.strip_prefix("**")?;
    let head = rest.get(..name.len())?;
    if !head.eq_ignore_ascii_case(name) {
        return None;
    }
    let rest = &rest[name.len()..];
    rest.strip_prefix(":**").or_else(|| rest.strip_prefix("**:"))
}

/// Line text without its terminator.
pub(crate) fn content(line: &str) -> &str {
    line.trim_end_matches(['\n', '\r'])
}
