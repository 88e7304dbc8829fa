//! Terminal event model and pure scanning over captured reviewer output.
//!
//! A streaming reviewer interleaves progress events, stderr noise and exactly
//! one final `{"type":"result", ...}` object. Only that object is
//! authoritative, and it is not guaranteed to be the last line, so the whole
//! transcript is scanned and the last match wins.

use serde_json::Value;

/// Discriminator value marking the final summary event.
pub const RESULT_EVENT_TYPE: &str = "result";
/// Subtype reported when the reviewer ran out of turns.
pub const SUBTYPE_MAX_TURNS: &str = "error_max_turns";
/// Subtype reported on a clean finish.
pub const SUBTYPE_SUCCESS: &str = "success";

/// The `result` payload: usually text, occasionally structured JSON.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultPayload {
    Text(String),
    Structured(Value),
}

impl ResultPayload {
    /// Text used for phrase matching.
    pub fn as_text(&self) -> String {
        match self {
            ResultPayload::Text(text) => text.clone(),
            ResultPayload::Structured(value) => value.to_string(),
        }
    }
}

/// The final result record of a structured reviewer run.
#[derive(Debug, Clone, PartialEq)]
pub struct TerminalEvent {
    /// Lowercased subtype; empty when absent.
    pub subtype: String,
    /// `None` when the field is missing or not a boolean.
    pub is_error: Option<bool>,
    pub result: Option<ResultPayload>,
}

impl TerminalEvent {
    pub fn result_text(&self) -> String {
        self.result
            .as_ref()
            .map(ResultPayload::as_text)
            .unwrap_or_default()
    }

    fn from_object(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        if object.get("type").and_then(Value::as_str) != Some(RESULT_EVENT_TYPE) {
            return None;
        }
        let subtype = object
            .get("subtype")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_lowercase();
        let is_error = object.get("is_error").and_then(Value::as_bool);
        let result = match object.get("result") {
            None | Some(Value::Null) => None,
            Some(Value::String(text)) => Some(ResultPayload::Text(text.clone())),
            Some(other) => Some(ResultPayload::Structured(other.clone())),
        };
        Some(Self {
            subtype,
            is_error,
            result,
        })
    }
}

/// Loose view of the first JSON object in unstructured output.
///
/// Used only when no terminal event exists, e.g. `--output-format json`
/// printing a single object that lacks the `type` tag.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LooseResult {
    pub result: Option<String>,
    pub is_error: bool,
}

/// What a reviewer transcript turned out to contain.
#[derive(Debug, Clone, PartialEq)]
pub enum Transcript {
    /// A terminal event was found.
    Structured(TerminalEvent),
    /// No terminal event; only raw text (plus any loose JSON object).
    Opaque(Option<LooseResult>),
}

/// Scan `text` line by line and return the last terminal event.
pub fn scan_terminal_event(text: &str) -> Option<TerminalEvent> {
    text.lines()
        .filter_map(parse_object_line)
        .filter_map(|value| TerminalEvent::from_object(&value))
        .last()
}

/// Parse the first line that looks like a complete JSON object.
///
/// Only the first candidate line is tried; if it fails to parse there is no
/// loose result.
pub fn first_json_object(text: &str) -> Option<LooseResult> {
    let line = text.lines().map(str::trim).find(|line| looks_like_object(line))?;
    let value: Value = serde_json::from_str(line).ok()?;
    let object = value.as_object()?;
    Some(LooseResult {
        result: object
            .get("result")
            .and_then(Value::as_str)
            .map(str::to_string),
        is_error: object.get("is_error").and_then(Value::as_bool) == Some(true),
    })
}

fn parse_object_line(line: &str) -> Option<Value> {
    let trimmed = line.trim();
    if !looks_like_object(trimmed) {
        return None;
    }
    serde_json::from_str(trimmed).ok()
}

fn looks_like_object(line: &str) -> bool {
    line.starts_with('{') && line.ends_with('}')
}
