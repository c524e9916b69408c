use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

// ================================================================
// Error taxonomy
// ================================================================

/// Terminal failure kinds for a single extraction run. The input is fixed,
/// so re-running any of these would produce the same result — no retries.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("failed to parse provider response: {0}")]
    EnvelopeUnreadable(serde_json::Error),
    #[error("no output text found in response (maybe only reasoning entries present)")]
    NoTextFound,
    #[error("couldn't extract valid JSON substring from assistant text")]
    NoJsonFound { fragment: String },
    #[error("failed to reformat extracted JSON: {0}")]
    MalformedValue(serde_json::Error),
}

// ================================================================
// Locating the model's text inside the response envelope
// ================================================================

/// The shape the Responses API normally returns: output items carrying
/// content parts. Everything is defaulted so a partial or unexpected
/// envelope still deserializes and simply yields no text.
#[derive(Debug, Deserialize)]
struct ResponseEnvelope {
    #[serde(default)]
    output: Vec<OutputItem>,
}

#[derive(Debug, Deserialize)]
struct OutputItem {
    #[serde(default)]
    content: Vec<ContentPart>,
}

#[derive(Debug, Deserialize)]
struct ContentPart {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    text: Option<String>,
}

/// Find the first non-empty text fragment the model produced, whatever the
/// envelope looks like. Tries the typed Responses shape first; if that
/// yields nothing, falls back to a depth-first hunt for any `"text"` key.
pub fn locate_text(envelope: &[u8]) -> Result<String, ExtractError> {
    if let Ok(parsed) = serde_json::from_slice::<ResponseEnvelope>(envelope) {
        for item in &parsed.output {
            for part in &item.content {
                match &part.text {
                    Some(text) if !text.trim().is_empty() => return Ok(text.clone()),
                    _ => debug!(
                        "skipping content part without text (type: {})",
                        part.kind.as_deref().unwrap_or("unknown")
                    ),
                }
            }
        }
    }

    let tree: Value =
        serde_json::from_slice(envelope).map_err(ExtractError::EnvelopeUnreadable)?;
    match first_text(&tree) {
        Some(text) => Ok(text.to_string()),
        None => Err(ExtractError::NoTextFound),
    }
}

/// Depth-first search for a key literally named `text` holding a non-empty
/// string. Object keys visit in insertion order, arrays in element order,
/// and the walk stops at the first hit. Callers rely on this ordering.
fn first_text(value: &Value) -> Option<&str> {
    match value {
        Value::Object(map) => {
            for (key, val) in map {
                if key == "text" {
                    if let Value::String(s) = val {
                        if !s.trim().is_empty() {
                            return Some(s);
                        }
                    }
                }
                if let Some(found) = first_text(val) {
                    return Some(found);
                }
            }
            None
        }
        Value::Array(items) => items.iter().find_map(first_text),
        _ => None,
    }
}

// ================================================================
// Extracting the JSON candidate from the text
// ================================================================

static FENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```(?:json\s*)?(.*?)```").unwrap());

/// Isolate the JSON value embedded in model output text.
///
/// Strategies in priority order, each tried only when the previous one
/// produced nothing parseable:
///   1. the whole trimmed text is JSON;
///   2. a ``` fenced block (optionally tagged `json`) contains JSON;
///   3. brute force — take the FIRST `{` or `[` and walk matching closers
///      backward from the END of the text, so the longest span is tried
///      first and a nested fragment only wins when no enclosing span
///      parses. Do not "optimize" the scan direction: longest-first is the
///      selection contract, and prose on both sides of the value depends
///      on it.
///
/// A fence whose content fails to parse does not abort: the brute-force
/// scan still covers the entire text, including anything before the fence.
pub fn extract_candidate(text: &str) -> Result<&str, ExtractError> {
    let trimmed = text.trim();

    if parses(trimmed) {
        return Ok(trimmed);
    }

    if let Some(m) = FENCE_RE.captures(trimmed).and_then(|c| c.get(1)) {
        let inner = m.as_str().trim();
        if parses(inner) {
            return Ok(inner);
        }
    }

    let bytes = trimmed.as_bytes();
    let start = trimmed
        .find(['{', '['])
        .ok_or_else(|| ExtractError::NoJsonFound { fragment: text.to_string() })?;
    let close = if bytes[start] == b'{' { b'}' } else { b']' };

    for end in (start + 1..bytes.len()).rev() {
        if bytes[end] != close {
            continue;
        }
        // both ends are ASCII brackets, so the slice is char-safe
        let candidate = trimmed[start..=end].trim();
        if parses(candidate) {
            return Ok(candidate);
        }
    }

    Err(ExtractError::NoJsonFound { fragment: text.to_string() })
}

fn parses(s: &str) -> bool {
    serde_json::from_str::<Value>(s).is_ok()
}

/// Re-serialize a candidate with stable two-space indentation, discarding
/// whatever formatting the model used. Parsing here validates the
/// candidate a second time; a failure past that point means the value
/// itself can't round-trip.
pub fn clean_json(candidate: &str) -> Result<Vec<u8>, ExtractError> {
    let value: Value =
        serde_json::from_str(candidate).map_err(ExtractError::MalformedValue)?;
    serde_json::to_vec_pretty(&value).map_err(ExtractError::MalformedValue)
}

/// Full pipeline: provider envelope bytes in, pretty-printed JSON out.
pub fn payload_from_response(envelope: &[u8]) -> Result<Vec<u8>, ExtractError> {
    let fragment = locate_text(envelope)?;
    let candidate = extract_candidate(&fragment)?;
    clean_json(candidate)
}

// ── Tests ───────────────────────────────────────────────────────────────────
