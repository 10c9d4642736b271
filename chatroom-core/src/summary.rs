//! Periodic compression of short-term memory into long-term facts.
//!
//! Summarization is best-effort background work. It runs detached from the
//! turn that triggered it, and every failure (network, parse, empty result)
//! leaves memory exactly as it was.

use crate::backend::{ChatBackend, ChatRequest};
use crate::extract::parse_array_text;
use crate::memory::{MemoryStore, LONG_LIMIT};
use crate::persona::Character;
use crate::prompt::{build_summary_memory, SUMMARY_REQUEST};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Turn backend output into summary lines.
///
/// Only the first element's `text` is used. It is split into lines, leading
/// `-` and `•` bullets are stripped, blanks are dropped and at most
/// [`LONG_LIMIT`] lines are kept.
pub fn decode_summary_lines(data: &str) -> Vec<String> {
    let Some(value) = parse_array_text(data) else {
        return Vec::new();
    };
    let Some(text) = value
        .as_array()
        .and_then(|items| items.first())
        .and_then(|first| first.get("text"))
        .and_then(Value::as_str)
    else {
        return Vec::new();
    };

    text.lines()
        .map(|line| line.trim().trim_start_matches(['-', '•']).trim())
        .filter(|line| !line.is_empty())
        .take(LONG_LIMIT)
        .map(str::to_string)
        .collect()
}

/// Build the summarization request from the current memory contents.
pub fn summary_request(memory: &MemoryStore) -> ChatRequest {
    let state = memory.state();
    ChatRequest {
        user_text: SUMMARY_REQUEST.to_string(),
        memory: build_summary_memory(&state.long_lines, &state.short_lines),
        characters: vec![Character::summarizer()],
    }
}

/// Run one summarization pass.
///
/// Returns whether long-term memory was replaced. The memory lock is only
/// taken to snapshot and to apply; never across the backend call.
pub async fn summarize(memory: Arc<Mutex<MemoryStore>>, backend: Arc<dyn ChatBackend>) -> bool {
    let request = summary_request(&memory.lock());

    let data = match backend.fetch(&request).await {
        Ok(data) => data,
        Err(e) => {
            warn!(error = %e, "summarization failed, keeping memory as is");
            return false;
        }
    };

    let lines = decode_summary_lines(&data);
    if lines.is_empty() {
        debug!("summarization returned nothing usable");
        return false;
    }

    let count = lines.len();
    memory.lock().apply_summary(lines);
    info!(lines = count, "long-term memory refreshed");
    true
}
