//! Extraction of reply arrays from free-form model output.
//!
//! Models asked for "only a JSON array" still wrap it in code fences, add a
//! friendly preamble, or ramble after it. Extraction is a two-stage pipeline:
//! [`extract_json_array`] cuts out the most plausible array text and never
//! fails, then [`decode_replies`] parses it, retries once on the greedy
//! `[...]` span, and degrades to zero replies.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Terminal fallback when no array can be found.
pub const EMPTY_ARRAY: &str = "[]";

/// One persona reply as claimed by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnReply {
    pub speaker: String,
    pub text: String,
}

impl TurnReply {
    pub fn new(speaker: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            speaker: speaker.into(),
            text: text.into(),
        }
    }

    /// Decode a reply from one array element.
    ///
    /// `speaker` falls back to `who`. Both fields are trimmed, and elements
    /// with an empty speaker or text are rejected.
    pub fn from_value(value: &Value) -> Option<Self> {
        let speaker = text_field(value, "speaker")
            .filter(|s| !s.is_empty())
            .or_else(|| text_field(value, "who"))?;
        let text = text_field(value, "text")?;

        if speaker.is_empty() || text.is_empty() {
            return None;
        }
        Some(Self { speaker, text })
    }
}

/// Extract JSON-array text from raw generated output.
///
/// Already array-shaped input is returned trimmed but otherwise unchanged.
/// Otherwise code fences are stripped and the greedy span from the first `[`
/// to the last `]` is returned; if there is none, `"[]"`.
pub fn extract_json_array(raw: &str) -> String {
    let text = raw.trim();
    if text.starts_with('[') && text.ends_with(']') {
        return text.to_string();
    }

    let unfenced = strip_code_fences(text);
    match greedy_array_span(&unfenced) {
        Some(span) => span.trim().to_string(),
        None => EMPTY_ARRAY.to_string(),
    }
}

/// Decode reply array text into replies, in provider order.
///
/// Parse failures are not errors: the greedy `[...]` span is tried once
/// more, and anything still unparseable yields no replies.
pub fn decode_replies(data: &str) -> Vec<TurnReply> {
    let Some(value) = parse_array_text(data) else {
        return Vec::new();
    };

    match value.as_array() {
        Some(items) => items.iter().filter_map(TurnReply::from_value).collect(),
        None => {
            debug!("reply payload is not an array");
            Vec::new()
        }
    }
}

/// Parse array text, with a single re-extraction attempt on failure.
pub fn parse_array_text(data: &str) -> Option<Value> {
    match serde_json::from_str::<Value>(data) {
        Ok(value) => Some(value),
        Err(first) => {
            debug!(error = %first, "reply payload did not parse, retrying on bracket span");
            let span = greedy_array_span(data)?;
            match serde_json::from_str::<Value>(span) {
                Ok(value) => Some(value),
                Err(second) => {
                    debug!(error = %second, "reply payload unparseable, treating as empty");
                    None
                }
            }
        }
    }
}

/// The span from the first `[` to the last `]`, if the latter follows the former.
pub fn greedy_array_span(text: &str) -> Option<&str> {
    let start = text.find('[')?;
    let end = text.rfind(']')?;
    (end > start).then(|| &text[start..=end])
}

/// Remove code-fence markers, including language-tagged openers in any case.
fn strip_code_fences(text: &str) -> String {
    // ASCII lowercasing keeps byte offsets aligned with `text`.
    let lower = text.to_ascii_lowercase();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;

    while i < text.len() {
        if lower[i..].starts_with("```json") {
            i += "```json".len();
        } else if lower[i..].starts_with("```") {
            i += "```".len();
        } else {
            let ch = text[i..].chars().next().unwrap_or_default();
            out.push(ch);
            i += ch.len_utf8().max(1);
        }
    }

    out.trim().to_string()
}

fn text_field(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
