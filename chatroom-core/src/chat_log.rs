//! The rendered transcript.
//!
//! Every line the user sees (their own messages, persona replies and system
//! notices) is a [`ChatLogEntry`]. The log is bounded, persisted after each
//! append and replayed verbatim on the next start.

use crate::persist::{load_json, save_json, KvStore, CHATLOG_KEY};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;

/// Maximum number of entries kept; the oldest are evicted first.
pub const CHATLOG_LIMIT: usize = 250;

/// What kind of line an entry is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryKind {
    #[serde(rename = "system")]
    System,
    #[serde(rename = "msg")]
    Message,
}

/// One rendered line of the transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatLogEntry {
    #[serde(rename = "type")]
    pub kind: EntryKind,
    /// Speaker id: `"me"` for the user, `"system"` for notices.
    #[serde(rename = "who")]
    pub speaker: String,
    pub text: String,
    /// Wall-clock time as `HH:MM`.
    #[serde(default)]
    pub at: String,
    /// Read-marker count, if the marker was shown.
    #[serde(default)]
    pub read: Option<u32>,
}

impl ChatLogEntry {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            kind: EntryKind::System,
            speaker: crate::persona::SYSTEM_ID.to_string(),
            text: text.into(),
            at: clock_now(),
            read: None,
        }
    }

    pub fn message(speaker: impl Into<String>, text: impl Into<String>, read: Option<u32>) -> Self {
        Self {
            kind: EntryKind::Message,
            speaker: speaker.into(),
            text: text.into(),
            at: clock_now(),
            read,
        }
    }

    pub fn is_system(&self) -> bool {
        self.kind == EntryKind::System
    }
}

/// Current local time formatted for display.
pub fn clock_now() -> String {
    chrono::Local::now().format("%H:%M").to_string()
}

/// A bounded, persisted transcript.
pub struct ChatLog {
    entries: VecDeque<ChatLogEntry>,
    store: Arc<dyn KvStore>,
}

impl ChatLog {
    /// Load the stored transcript; missing or corrupt data yields an empty log.
    pub fn load(store: Arc<dyn KvStore>) -> Self {
        let mut entries: VecDeque<ChatLogEntry> =
            load_json::<Vec<ChatLogEntry>>(store.as_ref(), CHATLOG_KEY)
                .unwrap_or_default()
                .into();
        while entries.len() > CHATLOG_LIMIT {
            entries.pop_front();
        }
        Self { entries, store }
    }

    /// Append an entry, evict beyond the limit and persist.
    pub fn push(&mut self, entry: ChatLogEntry) {
        self.entries.push_back(entry);
        while self.entries.len() > CHATLOG_LIMIT {
            self.entries.pop_front();
        }
        self.persist();
    }

    pub fn persist(&self) {
        save_json(self.store.as_ref(), CHATLOG_KEY, &self.entries);
    }

    pub fn entries(&self) -> impl Iterator<Item = &ChatLogEntry> {
        self.entries.iter()
    }

    /// A copy of the transcript, oldest first.
    pub fn snapshot(&self) -> Vec<ChatLogEntry> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
