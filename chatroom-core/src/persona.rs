//! Personas and the fixed roster.
//!
//! A [`Character`] is what the backend sees: id, display name and a
//! speaking-style descriptor. A [`Persona`] adds the presentation bits the
//! front end needs (emoji, blurb, greeting) and the small-talk deck used for
//! idle chatter.

use serde::{Deserialize, Serialize};

/// Speaker id used for the human user.
pub const USER_ID: &str = "me";

/// Label used for the human user in memory lines.
pub const USER_NAME: &str = "me";

/// Speaker id used for system lines.
pub const SYSTEM_ID: &str = "system";

/// Line an idle persona falls back to when it has no phrase deck.
const FALLBACK_SMALL_TALK: &str = "ok. carry on.";

/// Wire descriptor for a persona, as embedded in prompts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Character {
    pub id: String,
    pub name: String,
    pub style: String,
}

impl Character {
    pub fn new(id: impl Into<String>, name: impl Into<String>, style: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            style: style.into(),
        }
    }

    /// Decode a character from untrusted JSON.
    ///
    /// Missing or non-string fields become empty strings; every field is
    /// trimmed.
    pub fn from_value(value: &serde_json::Value) -> Self {
        let field = |key: &str| {
            value
                .get(key)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .trim()
                .to_string()
        };

        Self {
            id: field("id"),
            name: field("name"),
            style: field("style"),
        }
    }

    /// The pseudo-character used for summarization requests.
    pub fn summarizer() -> Self {
        Self::new(SYSTEM_ID, SYSTEM_ID, "summaries only")
    }
}

/// A member of the chat room.
#[derive(Debug, Clone)]
pub struct Persona {
    pub id: String,
    pub name: String,
    pub emoji: String,
    /// Speaking style, sent to the backend.
    pub style: String,
    /// One-line blurb for the member list.
    pub desc: String,
    /// What the persona says when the room is first opened.
    pub greeting: Option<String>,
    /// Lines used for unprompted idle chatter.
    pub small_talk: Vec<String>,
}

impl Persona {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        emoji: impl Into<String>,
        style: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            emoji: emoji.into(),
            style: style.into(),
            desc: String::new(),
            greeting: None,
            small_talk: Vec::new(),
        }
    }

    pub fn with_desc(mut self, desc: impl Into<String>) -> Self {
        self.desc = desc.into();
        self
    }

    pub fn with_greeting(mut self, greeting: impl Into<String>) -> Self {
        self.greeting = Some(greeting.into());
        self
    }

    pub fn with_small_talk<I, S>(mut self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.small_talk = lines.into_iter().map(Into::into).collect();
        self
    }

    /// The descriptor sent to the backend.
    pub fn character(&self) -> Character {
        Character::new(&self.id, &self.name, &self.style)
    }

    /// Short badge for the member list: the first clause of the style.
    pub fn badge(&self) -> &str {
        self.style.split(',').next().unwrap_or_default().trim()
    }

    /// Pick a small-talk line using `index` as a raw draw.
    pub fn small_talk_line(&self, index: usize) -> &str {
        if self.small_talk.is_empty() {
            FALLBACK_SMALL_TALK
        } else {
            &self.small_talk[index % self.small_talk.len()]
        }
    }
}

/// The fixed, non-empty cast of a chat room.
#[derive(Debug, Clone)]
pub struct Roster {
    personas: Vec<Persona>,
}

impl Roster {
    /// Create a roster. Returns `None` for an empty cast.
    pub fn new(personas: Vec<Persona>) -> Option<Self> {
        if personas.is_empty() {
            None
        } else {
            Some(Self { personas })
        }
    }

    /// The default three-person cast.
    pub fn default_cast() -> Self {
        Self {
            personas: vec![
                Persona::new("elliot", "Elliot", "🙂", "dry and direct, keeps it short")
                    .with_desc("Short and precise.")
                    .with_greeting("Say it if you need something. I'll listen.")
                    .with_small_talk([
                        "Drink some water. Seriously.",
                        "Don't overdo it today.",
                        "Describe your mood in one word.",
                    ]),
                Persona::new(
                    "mina",
                    "Mina",
                    "🧐",
                    "observer, sometimes sums things up with a question",
                )
                .with_desc("Steers the flow with questions.")
                .with_greeting("Welcome. So how are you feeling right now?")
                .with_small_talk([
                    "If today were a score out of ten, what would it be?",
                    "Can you sum that up in one sentence?",
                    "How's your sleep routine lately?",
                ]),
                Persona::new("juno", "Juno", "😆", "reactions and jokes, laughs a lot (lol)")
                    .with_desc("The mood maker.")
                    .with_greeting("Ooh, you're here! What were you up to today? 😆")
                    .with_small_talk([
                        "Suddenly hungry... what should we eat? 😆",
                        "Why is time flying so fast today lol",
                        "What are you watching right now? Recommend something!",
                    ]),
            ],
        }
    }

    pub fn personas(&self) -> &[Persona] {
        &self.personas
    }

    pub fn len(&self) -> usize {
        self.personas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.personas.is_empty()
    }

    /// The first persona, used when a reply names an unknown speaker.
    pub fn first(&self) -> &Persona {
        &self.personas[0]
    }

    pub fn find(&self, id: &str) -> Option<&Persona> {
        self.personas.iter().find(|p| p.id == id)
    }

    /// Resolve a claimed speaker id, substituting the first persona for
    /// anything unknown.
    pub fn resolve(&self, id: &str) -> &Persona {
        self.find(id).unwrap_or_else(|| self.first())
    }

    /// Display name for a speaker id, including the user and system.
    pub fn display_name<'a>(&'a self, id: &'a str) -> &'a str {
        match id {
            USER_ID => USER_NAME,
            SYSTEM_ID => SYSTEM_ID,
            _ => self.find(id).map(|p| p.name.as_str()).unwrap_or(id),
        }
    }

    /// Descriptors for every persona, in roster order.
    pub fn characters(&self) -> Vec<Character> {
        self.personas.iter().map(Persona::character).collect()
    }
}

impl Default for Roster {
    fn default() -> Self {
        Self::default_cast()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_cast() {
        let roster = Roster::default_cast();
        assert_eq!(roster.len(), 3);
        assert_eq!(roster.first().id, "elliot");
        assert!(roster.personas().iter().all(|p| p.greeting.is_some()));
    }

    #[test]
    fn test_empty_roster_rejected() {
        assert!(Roster::new(Vec::new()).is_none());
    }

    #[test]
    fn test_resolve_unknown_speaker() {
        let roster = Roster::default_cast();
        assert_eq!(roster.resolve("mina").name, "Mina");
        assert_eq!(roster.resolve("ghost").id, "elliot");
    }

    #[test]
    fn test_display_name() {
        let roster = Roster::default_cast();
        assert_eq!(roster.display_name("juno"), "Juno");
        assert_eq!(roster.display_name(USER_ID), USER_NAME);
        assert_eq!(roster.display_name("stranger"), "stranger");
    }

    #[test]
    fn test_character_from_value() {
        let value = serde_json::json!({"id": " mina ", "name": "Mina", "style": 42});
        let character = Character::from_value(&value);
        assert_eq!(character.id, "mina");
        assert_eq!(character.name, "Mina");
        assert_eq!(character.style, "");
    }

    #[test]
    fn test_small_talk_fallback() {
        let persona = Persona::new("x", "X", "🙂", "quiet");
        assert_eq!(persona.small_talk_line(7), FALLBACK_SMALL_TALK);

        let juno = Roster::default_cast().find("juno").cloned().unwrap();
        assert_eq!(juno.small_talk_line(4), juno.small_talk[1]);
    }

    #[test]
    fn test_badge() {
        let roster = Roster::default_cast();
        assert_eq!(roster.find("elliot").unwrap().badge(), "dry and direct");
    }
}
