//! Structured-output extraction from free-text model responses.
//!
//! Model output format is not guaranteed, so nothing in here raises: a
//! response that does not contain JSON yields an empty object.

use once_cell::sync::OnceCell;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::warn;

fn re_json_fence() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"(?s)```json[ \t]*\r?\n(.*?)\r?\n?```").expect("json fence regex"))
}

fn re_markdown_fence() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)```(?:markdown|md)?[ \t]*\r?\n?(.*?)```").expect("markdown fence regex")
    })
}

/// Outcome of pulling a typed value out of a model response.
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction<T> {
    Value(T),
    /// Nothing usable: no JSON, empty JSON, or a shape mismatch.
    Empty,
    /// The model explicitly asked for the item to be dropped.
    Discarded,
}

impl<T> Extraction<T> {
    pub fn into_option(self) -> Option<T> {
        match self {
            Extraction::Value(v) => Some(v),
            Extraction::Empty | Extraction::Discarded => None,
        }
    }

    pub fn is_value(&self) -> bool {
        matches!(self, Extraction::Value(_))
    }
}

/// Inner text of the first ```json fenced block, if any.
pub fn json_fence(text: &str) -> Option<&str> {
    re_json_fence()
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Parse the first ```json block, or the whole text when there is none.
/// Returns an empty object when nothing parses.
pub fn extract_json(text: &str) -> Value {
    let candidate = json_fence(text).unwrap_or(text).trim();
    match serde_json::from_str::<Value>(candidate) {
        Ok(v) => v,
        Err(e) => {
            warn!(target: "json_extract", error = %e, "model did not return valid JSON");
            Value::Object(Map::new())
        }
    }
}

/// Typed variant of [`extract_json`]; empty objects/arrays and shape
/// mismatches come back as [`Extraction::Empty`].
pub fn extract_as<T: DeserializeOwned>(text: &str) -> Extraction<T> {
    let value = extract_json(text);
    if is_empty_value(&value) {
        return Extraction::Empty;
    }
    match serde_json::from_value::<T>(value) {
        Ok(v) => Extraction::Value(v),
        Err(e) => {
            warn!(target: "json_extract", error = %e, "JSON did not match the expected shape");
            Extraction::Empty
        }
    }
}

/// Concatenated contents of every ```json block, or the raw text when there are none.
pub fn json_blocks_or_raw(text: &str) -> String {
    let joined: String = re_json_fence()
        .captures_iter(text)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str())
        .collect();
    if joined.is_empty() {
        text.to_string()
    } else {
        joined
    }
}

/// Unwrap a fenced markdown block; otherwise return the trimmed text.
pub fn unwrap_markdown(text: &str) -> String {
    match re_markdown_fence().captures(text).and_then(|c| c.get(1)) {
        Some(m) => m.as_str().trim().to_string(),
        None => text.trim().to_string(),
    }
}

/// True when the model answered with a bare "None" (optionally fenced or quoted).
pub fn is_none_literal(text: &str) -> bool {
    let inner = unwrap_markdown(text);
    let t = inner.trim().trim_matches(|c| c == '"' || c == '`' || c == '.');
    t.eq_ignore_ascii_case("none") || t.eq_ignore_ascii_case("null")
}

pub fn is_empty_value(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::Object(m) => m.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}
