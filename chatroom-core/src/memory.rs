//! Conversation memory.
//!
//! Two bounded buffers feed every prompt: short-term memory holds the most
//! recent chat lines verbatim, long-term memory holds durable facts distilled
//! by periodic summarization. Both live in [`MemoryState`] together with the
//! ambient room state, and the whole thing is written back to the store after
//! every mutation.

use crate::ambient::{Mood, TimeOfDay};
use crate::persist::{save_json, KvStore, MEMORY_KEY};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Maximum number of recent lines kept verbatim.
pub const SHORT_LIMIT: usize = 16;

/// Maximum number of summarized fact lines.
pub const LONG_LIMIT: usize = 10;

/// Bounds of the cosmetic "read by N" counter.
pub const READ_COUNT_MIN: u32 = 1;
pub const READ_COUNT_MAX: u32 = 99;
const DEFAULT_READ_COUNT: u32 = 2;

/// Everything the session remembers between runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryState {
    pub turn: u64,
    pub time_of_day: TimeOfDay,
    pub mood: Mood,
    pub read_count: u32,
    pub short_lines: Vec<String>,
    pub long_lines: Vec<String>,
}

impl Default for MemoryState {
    fn default() -> Self {
        Self {
            turn: 0,
            time_of_day: TimeOfDay::default(),
            mood: Mood::default(),
            read_count: DEFAULT_READ_COUNT,
            short_lines: Vec::new(),
            long_lines: Vec::new(),
        }
    }
}

impl MemoryState {
    /// Decode persisted state field by field.
    ///
    /// Each field that is missing or has the wrong shape takes its default;
    /// list entries that are not strings are skipped and lists are clamped
    /// to their bounds, keeping the newest entries.
    pub fn from_value(value: &Value) -> Self {
        let defaults = Self::default();

        let lines = |key: &str, limit: usize| {
            let mut lines: Vec<String> = value
                .get(key)
                .and_then(Value::as_array)
                .map(|items| {
                    items
                        .iter()
                        .filter_map(|v| v.as_str().map(str::to_string))
                        .collect()
                })
                .unwrap_or_default();
            clamp_front(&mut lines, limit);
            lines
        };

        Self {
            turn: value.get("turn").and_then(Value::as_u64).unwrap_or(defaults.turn),
            time_of_day: value
                .get("timeOfDay")
                .and_then(Value::as_str)
                .and_then(TimeOfDay::parse)
                .unwrap_or(defaults.time_of_day),
            mood: value
                .get("mood")
                .and_then(Value::as_str)
                .and_then(Mood::parse)
                .unwrap_or(defaults.mood),
            read_count: value
                .get("readCount")
                .and_then(Value::as_u64)
                .filter(|n| *n > 0)
                .map(|n| n.min(READ_COUNT_MAX as u64) as u32)
                .unwrap_or(defaults.read_count),
            short_lines: lines("shortLines", SHORT_LIMIT),
            long_lines: lines("longLines", LONG_LIMIT),
        }
    }

    /// Bump the read counter by one, staying within bounds.
    pub fn bump_read_count(&mut self) {
        self.read_count = (self.read_count + 1).clamp(READ_COUNT_MIN, READ_COUNT_MAX);
    }
}

/// Short- and long-term memory bound to a persistent store.
pub struct MemoryStore {
    state: MemoryState,
    store: Arc<dyn KvStore>,
}

impl MemoryStore {
    /// Load memory from the store. Missing or corrupt data yields defaults.
    pub fn load(store: Arc<dyn KvStore>) -> Self {
        let state = match store.get(MEMORY_KEY) {
            Ok(Some(raw)) => match serde_json::from_str::<Value>(&raw) {
                Ok(value) => MemoryState::from_value(&value),
                Err(e) => {
                    tracing::warn!(error = %e, "stored memory is corrupt, starting fresh");
                    MemoryState::default()
                }
            },
            Ok(None) => MemoryState::default(),
            Err(e) => {
                tracing::warn!(error = %e, "failed to read stored memory, starting fresh");
                MemoryState::default()
            }
        };

        Self { state, store }
    }

    /// Write the whole state back as one blob.
    pub fn persist(&self) {
        save_json(self.store.as_ref(), MEMORY_KEY, &self.state);
    }

    pub fn state(&self) -> &MemoryState {
        &self.state
    }

    /// Apply an ambient update and persist it.
    pub fn update(&mut self, f: impl FnOnce(&mut MemoryState)) {
        f(&mut self.state);
        clamp_front(&mut self.state.short_lines, SHORT_LIMIT);
        clamp_front(&mut self.state.long_lines, LONG_LIMIT);
        self.persist();
    }

    /// Append a recent line, evicting the oldest beyond [`SHORT_LIMIT`].
    pub fn append_short(&mut self, line: impl Into<String>) {
        self.state.short_lines.push(line.into());
        clamp_front(&mut self.state.short_lines, SHORT_LIMIT);
        self.persist();
    }

    /// Replace long-term memory with the first [`LONG_LIMIT`] lines.
    pub fn set_long(&mut self, lines: Vec<String>) {
        self.state.long_lines = lines.into_iter().take(LONG_LIMIT).collect();
        self.persist();
    }

    /// Forget all recent lines.
    pub fn clear_short(&mut self) {
        self.state.short_lines.clear();
        self.persist();
    }

    /// Install a summary: long-term memory is replaced and short-term memory
    /// is emptied, since the summary absorbs it.
    pub fn apply_summary(&mut self, lines: Vec<String>) {
        self.state.long_lines = lines.into_iter().take(LONG_LIMIT).collect();
        self.state.short_lines.clear();
        self.persist();
    }

    pub fn short_len(&self) -> usize {
        self.state.short_lines.len()
    }

    pub fn long_len(&self) -> usize {
        self.state.long_lines.len()
    }

    /// Render memory for a prompt.
    pub fn assemble_text(&self) -> String {
        let long_part = if self.state.long_lines.is_empty() {
            "none".to_string()
        } else {
            self.state.long_lines.join("\n")
        };
        let short_part = if self.state.short_lines.is_empty() {
            "none".to_string()
        } else {
            self.state.short_lines.join("\n")
        };
        format!("[long-term]\n{long_part}\n\n[recent]\n{short_part}")
    }
}

/// Drop entries from the front until `lines` fits in `limit`.
fn clamp_front(lines: &mut Vec<String>, limit: usize) {
    if lines.len() > limit {
        lines.drain(..lines.len() - limit);
    }
}
