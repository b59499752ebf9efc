//! Turns raw model text into typed values.
//!
//! Parsing runs in two phases. The strict phase targets the exact shape requested by
//! [`prompt_builder`](super::prompt_builder); when that fails, a permissive scan looks for
//! known labels and keywords anywhere in the text. Anything still unrecoverable becomes a
//! [`ParseFailure`] carrying an excerpt of the raw text.
//!
//! Recoverability threshold:
//! - ticket: non-empty title and description; category falls back to "General" and the
//!   requester to a placeholder.
//! - hint: non-empty text once a leading heading line and code fences are removed.
//! - evaluation: a VERDICT label, or verdict keywords that all agree. No default verdict is
//!   ever assumed.

use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;

use crate::models::{
    evaluation::Verdict, Operation, TicketDraft, DEFAULT_CATEGORY, UNKNOWN_REQUESTER,
};

const EXCERPT_CHARS: usize = 200;
const NO_RATIONALE: &str = "(no rationale provided)";

lazy_static! {
    static ref QUOTED_FIELD: Regex = Regex::new(
        r#"(?i)"(title|summary|description|issue|category|requester|user)"\s*:\s*"((?:[^"\\]|\\.)*)""#
    )
    .unwrap();
    static ref VERDICT_MENTION: Regex =
        Regex::new(r"(?i)\b(?:verdict|answer|assessment|evaluation|result)\b(?:\s+is)?\W{0,8}([a-z]+)")
            .unwrap();
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("could not parse {operation} response: {excerpt:?}")]
pub struct ParseFailure {
    pub operation: Operation,
    pub excerpt: String,
}

impl ParseFailure {
    fn new(operation: Operation, text: &str) -> Self {
        Self {
            operation,
            excerpt: text.trim().chars().take(EXCERPT_CHARS).collect(),
        }
    }
}

/// Which phase produced a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParsePhase {
    Strict,
    Permissive,
}

impl ParsePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParsePhase::Strict => "strict",
            ParsePhase::Permissive => "permissive",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parsed<T> {
    pub value: T,
    pub phase: ParsePhase,
}

impl<T> Parsed<T> {
    fn strict(value: T) -> Self {
        Self {
            value,
            phase: ParsePhase::Strict,
        }
    }

    fn permissive(value: T) -> Self {
        Self {
            value,
            phase: ParsePhase::Permissive,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerdictDraft {
    pub verdict: Verdict,
    pub rationale: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedResponse {
    Ticket(TicketDraft),
    Hint(String),
    Evaluation(VerdictDraft),
}

pub fn parse(operation: Operation, text: &str) -> Result<ParsedResponse, ParseFailure> {
    match operation {
        Operation::Generate => parse_ticket(text).map(|p| ParsedResponse::Ticket(p.value)),
        Operation::Hint => parse_hint(text).map(|p| ParsedResponse::Hint(p.value)),
        Operation::Evaluate => parse_evaluation(text).map(|p| ParsedResponse::Evaluation(p.value)),
    }
}

// ---------------------------------------------------------------------------
// Tickets
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawTicket {
    #[serde(alias = "summary")]
    title: Option<String>,
    #[serde(alias = "issue")]
    description: Option<String>,
    category: Option<String>,
    #[serde(alias = "user")]
    requester: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TicketField {
    Title,
    Description,
    Category,
    Requester,
}

impl TicketField {
    fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "title" | "summary" | "subject" => Some(TicketField::Title),
            "description" | "issue" | "problem" | "details" => Some(TicketField::Description),
            "category" | "type" => Some(TicketField::Category),
            "requester" | "user" | "from" | "reported by" => Some(TicketField::Requester),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct TicketFields {
    title: Option<String>,
    description: Option<String>,
    category: Option<String>,
    requester: Option<String>,
}

impl TicketFields {
    fn slot(&mut self, field: TicketField) -> &mut Option<String> {
        match field {
            TicketField::Title => &mut self.title,
            TicketField::Description => &mut self.description,
            TicketField::Category => &mut self.category,
            TicketField::Requester => &mut self.requester,
        }
    }

    /// First non-empty value wins.
    fn offer(&mut self, field: TicketField, value: &str) {
        let value = value.trim();
        let slot = self.slot(field);
        if slot.is_none() && !value.is_empty() {
            *slot = Some(value.to_string());
        }
    }

    fn into_draft(self) -> Option<TicketDraft> {
        Some(TicketDraft {
            title: self.title?,
            description: self.description?,
            category: self.category.unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
            requester: self
                .requester
                .unwrap_or_else(|| UNKNOWN_REQUESTER.to_string()),
        })
    }
}

pub fn parse_ticket(text: &str) -> Result<Parsed<TicketDraft>, ParseFailure> {
    if let Some(draft) = strict_ticket(text) {
        return Ok(Parsed::strict(draft));
    }
    permissive_ticket(text)
        .map(Parsed::permissive)
        .ok_or_else(|| ParseFailure::new(Operation::Generate, text))
}

/// The documented shape: one JSON object with title, description and category all present.
fn strict_ticket(text: &str) -> Option<TicketDraft> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    let raw: RawTicket = serde_json::from_str(&text[start..=end]).ok()?;
    let non_empty = |value: Option<String>| {
        value
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };
    Some(TicketDraft {
        title: non_empty(raw.title)?,
        description: non_empty(raw.description)?,
        category: non_empty(raw.category)?,
        requester: non_empty(raw.requester).unwrap_or_else(|| UNKNOWN_REQUESTER.to_string()),
    })
}

fn permissive_ticket(text: &str) -> Option<TicketDraft> {
    let mut fields = TicketFields::default();

    for capture in QUOTED_FIELD.captures_iter(text) {
        if let Some(field) = TicketField::from_label(&capture[1]) {
            fields.offer(field, &unescape_json_string(&capture[2]));
        }
    }

    // `Label: value` lines. A description keeps collecting following lines until a blank
    // line or the next label.
    let mut open_description: Option<String> = None;
    for line in text.lines() {
        if let Some((field, value)) = label_line(line) {
            if let Some(description) = open_description.take() {
                fields.offer(TicketField::Description, &description);
            }
            if field == TicketField::Description {
                open_description = Some(value.to_string());
            } else {
                fields.offer(field, value);
            }
        } else if open_description.is_some() {
            let line = line.trim();
            if line.is_empty() {
                if let Some(finished) = open_description.take() {
                    fields.offer(TicketField::Description, &finished);
                }
            } else if let Some(description) = open_description.as_mut() {
                if !description.is_empty() {
                    description.push(' ');
                }
                description.push_str(line);
            }
        }
    }
    if let Some(description) = open_description {
        fields.offer(TicketField::Description, &description);
    }

    fields.into_draft()
}

fn label_line(line: &str) -> Option<(TicketField, &str)> {
    let stripped = strip_decoration(line);
    let (label, value) = stripped.split_once(':')?;
    let label = label.trim_matches(|c: char| c == '*' || c == '_' || c == '"' || c.is_whitespace());
    let field = TicketField::from_label(label)?;
    let value = value.trim_matches(|c: char| {
        c == '*' || c == '_' || c == '"' || c == ',' || c.is_whitespace()
    });
    Some((field, value))
}

fn unescape_json_string(raw: &str) -> String {
    serde_json::from_str::<String>(&format!("\"{}\"", raw)).unwrap_or_else(|_| raw.to_string())
}

// ---------------------------------------------------------------------------
// Hints
// ---------------------------------------------------------------------------

pub fn parse_hint(text: &str) -> Result<Parsed<String>, ParseFailure> {
    let body: Vec<&str> = text
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect();
    let body = body.join("\n");
    let trimmed = body.trim();

    let lines: Vec<&str> = trimmed.lines().filter(|l| !l.trim().is_empty()).collect();
    if !lines.is_empty() && lines.iter().all(|l| is_bullet(l)) {
        return Ok(Parsed::strict(trimmed.to_string()));
    }

    let without_heading = match lines.first() {
        Some(first) if is_heading(first) => trimmed
            .split_once('\n')
            .map(|(_, rest)| rest.trim())
            .unwrap_or(""),
        _ => trimmed,
    };
    if without_heading.is_empty() {
        return Err(ParseFailure::new(Operation::Hint, text));
    }
    Ok(Parsed::permissive(without_heading.to_string()))
}

fn is_bullet(line: &str) -> bool {
    let line = line.trim_start();
    line.starts_with("- ")
        || line.starts_with("* ")
        || line.starts_with('•')
        || line
            .split_once(". ")
            .map(|(n, _)| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()))
            .unwrap_or(false)
}

fn is_heading(line: &str) -> bool {
    let line = line.trim();
    if line.starts_with('#') {
        return true;
    }
    let bare = strip_decoration(line).trim_end_matches(|c: char| c == '*' || c == ':');
    let bare = bare.trim().to_ascii_lowercase();
    (line.ends_with(':') || line.ends_with("**"))
        && ["hint", "guidance", "insight"]
            .iter()
            .any(|word| bare.contains(word))
        && bare.split_whitespace().count() <= 4
}

// ---------------------------------------------------------------------------
// Evaluations
// ---------------------------------------------------------------------------

pub fn parse_evaluation(text: &str) -> Result<Parsed<VerdictDraft>, ParseFailure> {
    match strict_evaluation(text) {
        Some(Ok(draft)) => return Ok(Parsed::strict(draft)),
        // A VERDICT label carrying an unknown token is never reinterpreted.
        Some(Err(())) => return Err(ParseFailure::new(Operation::Evaluate, text)),
        None => {}
    }
    permissive_evaluation(text)
        .map(Parsed::permissive)
        .ok_or_else(|| ParseFailure::new(Operation::Evaluate, text))
}

/// `None` when no VERDICT label line exists, `Some(Err)` when it exists but is unusable.
fn strict_evaluation(text: &str) -> Option<Result<VerdictDraft, ()>> {
    let lines: Vec<&str> = text.lines().collect();
    let (index, rest) = lines.iter().enumerate().find_map(|(i, line)| {
        let stripped = strip_decoration(line);
        let lower = stripped.to_ascii_lowercase();
        lower
            .starts_with("verdict")
            .then(|| (i, &stripped["verdict".len()..]))
    })?;

    // A bare label line ("## Verdict") carries its value on the next non-empty line.
    let (verdict_index, verdict_text) = if strip_decoration(rest).is_empty() {
        match lines
            .iter()
            .enumerate()
            .skip(index + 1)
            .find(|(_, line)| !line.trim().is_empty())
        {
            Some((i, line)) => (i, *line),
            None => return Some(Err(())),
        }
    } else {
        (index, rest)
    };

    let (verdict, remainder) = match leading_verdict(verdict_text) {
        Some(found) => found,
        None => return Some(Err(())),
    };

    let after = &lines[verdict_index + 1..];
    let labelled = after.iter().enumerate().find_map(|(i, line)| {
        let stripped = strip_decoration(line);
        let lower = stripped.to_ascii_lowercase();
        lower.starts_with("rationale").then(|| {
            non_empty(strip_separators(&stripped["rationale".len()..]))
                .or_else(|| following_text(&after[i + 1..]))
        })
    });

    let rationale = labelled
        .flatten()
        .or_else(|| non_empty(strip_separators(remainder)))
        .or_else(|| following_text(after))
        .unwrap_or_else(|| NO_RATIONALE.to_string());

    Some(Ok(VerdictDraft { verdict, rationale }))
}

/// Without a VERDICT label every verdict candidate must agree: the leading keyword (only
/// when a separator follows it, so "No problem" is not a verdict) and each
/// "verdict/answer/assessment is X" mention.
fn permissive_evaluation(text: &str) -> Option<VerdictDraft> {
    let lines: Vec<&str> = text.lines().collect();
    let first = lines.iter().position(|l| !l.trim().is_empty())?;

    let leading = match leading_verdict(lines[first]) {
        Some(_) if !keyword_is_separated(lines[first]) => return None,
        found => found,
    };

    let mut candidates = leading.iter().map(|(verdict, _)| *verdict).chain(
        VERDICT_MENTION
            .captures_iter(text)
            .filter_map(|capture| verdict_keyword(&capture[1])),
    );
    let verdict = candidates.next()?;
    if candidates.any(|other| other != verdict) {
        return None;
    }

    let rationale = match leading {
        Some((_, remainder)) => non_empty(strip_separators(remainder))
            .or_else(|| following_text(&lines[first + 1..])),
        None => non_empty(text.trim()),
    };
    Some(VerdictDraft {
        verdict,
        rationale: rationale.unwrap_or_else(|| NO_RATIONALE.to_string()),
    })
}

/// True when the first word of `line` ends the line or is followed by punctuation.
fn keyword_is_separated(line: &str) -> bool {
    let (_, rest) = split_word(strip_decoration(line));
    match rest.trim_start().chars().next() {
        None => true,
        Some(c) => matches!(c, ':' | ',' | '.' | '!' | ';' | '-' | '—' | '–' | ')' | '*'),
    }
}

/// Reads a verdict keyword at the start of `text` (decoration allowed) and returns the rest.
/// `Yes, partially` counts as Partially.
fn leading_verdict(text: &str) -> Option<(Verdict, &str)> {
    let stripped = strip_decoration(text);
    let (word, rest) = split_word(stripped);
    let verdict = verdict_keyword(word)?;
    if verdict == Verdict::Yes {
        let (next, after_next) = split_word(strip_decoration(rest));
        if verdict_keyword(next) == Some(Verdict::Partially) {
            return Some((Verdict::Partially, after_next));
        }
    }
    Some((verdict, rest))
}

fn verdict_keyword(word: &str) -> Option<Verdict> {
    match word.to_ascii_lowercase().as_str() {
        "yes" => Some(Verdict::Yes),
        "partially" | "partial" => Some(Verdict::Partially),
        "no" => Some(Verdict::No),
        _ => None,
    }
}

fn split_word(text: &str) -> (&str, &str) {
    let end = text
        .find(|c: char| !c.is_alphanumeric())
        .unwrap_or(text.len());
    (&text[..end], &text[end..])
}

/// Drops leading emoji, markdown markers, quotes and whitespace.
fn strip_decoration(text: &str) -> &str {
    text.trim_start_matches(|c: char| !c.is_alphanumeric())
}

fn strip_separators(text: &str) -> &str {
    text.trim_start_matches(|c: char| !c.is_alphanumeric() && c != '(')
        .trim_end()
        .trim_end_matches('*')
        .trim_end()
}

fn following_text(lines: &[&str]) -> Option<String> {
    let joined = lines
        .iter()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    non_empty(&joined)
}

fn non_empty(text: &str) -> Option<String> {
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}
