//! Response normalisation: recover a JSON object from the model's raw text.
//!
//! Even with "respond with JSON only" in the prompt, VLMs regularly return
//! text that is *almost* JSON:
//!
//! - the object wrapped in ` ```json ... ``` ` fences, or preceded by
//!   "Here is the extracted data:"
//! - a trailing comma after the last field
//! - a literal newline inside a string value (an address, a line-item list)
//! - output cut off mid-string when `max_tokens` is reached
//!
//! [`normalize`] strips the wrapping, tries a strict parse, then applies an
//! ordered list of repair strategies ([`REPAIRS`]), re-parsing after each.
//! Repairs are cumulative, so a truncated answer that also has a trailing
//! comma is fixed by the two strategies together. Every strategy is a pure
//! `&str → Cow<str>` function that returns `Cow::Borrowed` when it has
//! nothing to fix.
//!
//! The function is total: any input yields either a JSON object or a
//! [`ParseError`], never a panic.

use crate::error::ParseError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use std::borrow::Cow;
use tracing::debug;

/// A parsed JSON object as returned by the model.
pub type JsonObject = Map<String, Value>;

/// Number of characters of the raw response kept in a [`ParseError`].
pub const SNIPPET_CHARS: usize = 200;

/// A single repair strategy.
pub type RepairFn = fn(&str) -> Cow<'_, str>;

/// Repair strategies in the order they are applied.
pub const REPAIRS: &[(&str, RepairFn)] = &[
    ("escape_control_chars", escape_control_chars),
    ("remove_trailing_commas", remove_trailing_commas),
    ("close_truncated", close_truncated),
];

/// Parse the model's raw answer into a JSON object.
///
/// The fenced body is tried first; when it cannot be recovered the whole
/// answer is tried again without fence stripping.
pub fn normalize(raw: &str) -> Result<JsonObject, ParseError> {
    let fenced = strip_code_fence(raw);
    let mut sources = vec![fenced];
    if fenced.len() != raw.len() {
        sources.push(raw);
    }

    let mut first_err: Option<String> = None;
    for source in sources {
        let Some(candidate) = object_text(source) else {
            continue;
        };
        match parse_with_repairs(candidate) {
            Ok(obj) => return Ok(obj),
            Err(e) => {
                first_err.get_or_insert(e);
            }
        }
    }

    let detail = first_err.unwrap_or_else(|| "no JSON object found".to_string());
    Err(parse_error(raw, &detail))
}

fn parse_with_repairs(candidate: &str) -> Result<JsonObject, String> {
    let mut last_err = match parse_object(candidate) {
        Ok(obj) => return Ok(obj),
        Err(e) => e,
    };

    let mut text: Cow<'_, str> = Cow::Borrowed(candidate);
    for (name, repair) in REPAIRS {
        let repaired = match repair(&text) {
            Cow::Borrowed(_) => continue,
            Cow::Owned(s) => s,
        };
        match parse_object(&repaired) {
            Ok(obj) => {
                debug!("Recovered model JSON after repair '{}'", name);
                return Ok(obj);
            }
            Err(e) => last_err = e,
        }
        text = Cow::Owned(repaired);
    }

    Err(last_err)
}

fn parse_error(raw: &str, detail: &str) -> ParseError {
    ParseError {
        reason: "unparseable".to_string(),
        snippet: raw.chars().take(SNIPPET_CHARS).collect(),
        detail: detail.to_string(),
    }
}

fn parse_object(text: &str) -> Result<JsonObject, String> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(format!("expected a JSON object, found {}", json_type(&other))),
        Err(e) => Err(e.to_string()),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// ── Wrapping removal ─────────────────────────────────────────────────────────

// Opening fence with optional language tag.
static RE_FENCE_OPEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"```[^\n`]*\n").unwrap());

/// Return the text between the first opening fence and the last closing
/// fence (or end of input, since truncated answers often lose the closing
/// fence). The input is returned unchanged when there is no fence or the
/// fenced text holds no object.
pub fn strip_code_fence(raw: &str) -> &str {
    let Some(open) = RE_FENCE_OPEN.find(raw) else {
        return raw;
    };
    let body = &raw[open.end()..];
    let body = body.rfind("```").map_or(body, |end| &body[..end]);
    if body.contains('{') {
        body
    } else {
        raw
    }
}

/// Slice out the first JSON object of the fenced body (see
/// [`strip_code_fence`]).
pub fn extract_object_text(raw: &str) -> Option<&str> {
    object_text(strip_code_fence(raw))
}

/// From the first `{` to its matching `}`, or to the end of the text when the
/// object is never closed.
fn object_text(body: &str) -> Option<&str> {
    let start = body.find('{')?;
    let rest = &body[start..];
    match matching_close(rest) {
        Some(end) => Some(&rest[..=end]),
        None => Some(rest.trim_end()),
    }
}

/// Byte offset of the `}` closing the object that starts at offset 0.
fn matching_close(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' | '[' => depth += 1,
            '}' | ']' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return (c == '}').then_some(i);
                }
            }
            _ => {}
        }
    }
    None
}

// ── Repair 1: escape raw control characters inside strings ───────────────────

/// Escape raw control characters (newlines, tabs) that appear inside string
/// literals. Strict JSON forbids them; models emit them for multi-line
/// addresses.
pub fn escape_control_chars(text: &str) -> Cow<'_, str> {
    let mut in_string = false;
    let mut escaped = false;
    let needs_fix = text.chars().any(|c| {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                c if (c as u32) < 0x20 => return true,
                _ => {}
            }
        } else if c == '"' {
            in_string = true;
        }
        false
    });
    if !needs_fix {
        return Cow::Borrowed(text);
    }

    let mut out = String::with_capacity(text.len() + 16);
    let mut in_string = false;
    let mut escaped = false;
    for c in text.chars() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                '\n' => {
                    out.push_str("\\n");
                    continue;
                }
                '\r' => {
                    out.push_str("\\r");
                    continue;
                }
                '\t' => {
                    out.push_str("\\t");
                    continue;
                }
                c if (c as u32) < 0x20 => {
                    out.push_str(&format!("\\u{:04x}", c as u32));
                    continue;
                }
                _ => {}
            }
        } else if c == '"' {
            in_string = true;
        }
        out.push(c);
    }
    Cow::Owned(out)
}

// ── Repair 2: remove trailing commas ─────────────────────────────────────────

/// Drop commas that are directly followed (ignoring whitespace) by `}` or `]`.
pub fn remove_trailing_commas(text: &str) -> Cow<'_, str> {
    let mut out: Option<String> = None;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        let mut skip = false;
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
        } else if c == '"' {
            in_string = true;
        } else if c == ',' {
            let next = text[i + 1..].trim_start().chars().next();
            if matches!(next, Some('}') | Some(']')) {
                skip = true;
            }
        }

        match (&mut out, skip) {
            (None, false) => {}
            (None, true) => out = Some(text[..i].to_string()),
            (Some(buf), false) => buf.push(c),
            (Some(_), true) => {}
        }
    }

    match out {
        Some(s) => Cow::Owned(s),
        None => Cow::Borrowed(text),
    }
}

// ── Repair 3: close truncated output ─────────────────────────────────────────

/// A position where the text can be cut while keeping every complete
/// key/value pair before it, with the brackets open at that point.
struct CutPoint {
    offset: usize,
    open: Vec<char>,
}

struct Structure {
    open: Vec<char>,
    in_string: bool,
    /// Just before each comma: keeps every complete pair before it.
    cuts: Vec<CutPoint>,
    /// Just after each `{` / `[`: empties a container whose first member
    /// was cut off.
    opens: Vec<CutPoint>,
}

fn scan_structure(text: &str) -> Structure {
    let mut open: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;
    let mut cuts = Vec::new();
    let mut opens = Vec::new();

    for (i, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' | '[' => {
                open.push(c);
                opens.push(CutPoint {
                    offset: i + 1,
                    open: open.clone(),
                });
            }
            '}' | ']' => {
                open.pop();
            }
            ',' if !open.is_empty() => cuts.push(CutPoint {
                offset: i,
                open: open.clone(),
            }),
            _ => {}
        }
    }

    Structure {
        open,
        in_string,
        cuts,
        opens,
    }
}

fn closers(open: &[char]) -> String {
    open.iter()
        .rev()
        .map(|c| if *c == '{' { '}' } else { ']' })
        .collect()
}

/// Close an object that was cut off mid-stream.
///
/// First tries appending the missing closers as-is (the answer stopped
/// between values). Otherwise truncates to the last complete key/value pair,
/// which also discards an unterminated string, and closes from there. When
/// not even one pair is complete, the innermost open container is emptied,
/// down to `{}` for an answer cut inside its first pair.
pub fn close_truncated(text: &str) -> Cow<'_, str> {
    let scan = scan_structure(text);
    if scan.open.is_empty() && !scan.in_string {
        return Cow::Borrowed(text);
    }

    if !scan.in_string {
        let head = text.trim_end().trim_end_matches(',');
        let candidate = format!("{}{}", head, closers(&scan.open));
        if serde_json::from_str::<Value>(&candidate).is_ok() {
            return Cow::Owned(candidate);
        }
    }

    for cut in scan.cuts.iter().rev().chain(scan.opens.iter().rev()) {
        let candidate = format!("{}{}", &text[..cut.offset], closers(&cut.open));
        if serde_json::from_str::<Value>(&candidate).is_ok() {
            return Cow::Owned(candidate);
        }
    }

    Cow::Borrowed(text)
}

// ── Tests ────────────────────────────────────────────────────────────────────
