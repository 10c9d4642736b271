//! Ambient room state: time of day and mood.

use serde::{Deserialize, Serialize};

/// Keywords that put the room on edge. Checked before the positive list.
const NEGATIVE_KEYWORDS: &[&str] = &[
    "annoyed", "annoying", "angry", "furious", "pissed", "anxious", "worried", "depressed",
    "stressed", "uncomfortable", "upset", "짜증", "화나", "멘붕", "불안", "우울", "빡치", "불편",
];

const POSITIVE_KEYWORDS: &[&str] = &[
    "happy", "glad", "thanks", "thank you", "excited", "awesome", "the best", "love",
    "좋아", "행복", "고마워", "신나", "최고", "설렘",
];

/// Time of day, advancing through a fixed cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeOfDay {
    #[default]
    Morning,
    Noon,
    Afternoon,
    Evening,
    Night,
}

impl TimeOfDay {
    pub const CYCLE: [TimeOfDay; 5] = [
        TimeOfDay::Morning,
        TimeOfDay::Noon,
        TimeOfDay::Afternoon,
        TimeOfDay::Evening,
        TimeOfDay::Night,
    ];

    /// The next slot in the cycle; night wraps to morning.
    pub fn next(self) -> Self {
        let idx = Self::CYCLE.iter().position(|t| *t == self).unwrap_or(0);
        Self::CYCLE[(idx + 1) % Self::CYCLE.len()]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TimeOfDay::Morning => "morning",
            TimeOfDay::Noon => "noon",
            TimeOfDay::Afternoon => "afternoon",
            TimeOfDay::Evening => "evening",
            TimeOfDay::Night => "night",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::CYCLE.into_iter().find(|t| t.as_str() == s)
    }
}

/// Mood of the room, recomputed from every user message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mood {
    #[default]
    Calm,
    Good,
    Tense,
}

impl Mood {
    /// Classify a user message by keyword.
    pub fn from_text(text: &str) -> Self {
        let lower = text.to_lowercase();
        if NEGATIVE_KEYWORDS.iter().any(|k| lower.contains(k)) {
            Mood::Tense
        } else if POSITIVE_KEYWORDS.iter().any(|k| lower.contains(k)) {
            Mood::Good
        } else {
            Mood::Calm
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Mood::Calm => "calm",
            Mood::Good => "good",
            Mood::Tense => "tense",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        [Mood::Calm, Mood::Good, Mood::Tense]
            .into_iter()
            .find(|m| m.as_str() == s)
    }
}
