//! Text rendering of transcript entries and session events.

use chatroom_core::persona::{SYSTEM_ID, USER_ID};
use chatroom_core::{ChatEvent, ChatLogEntry, Roster, SessionStatus, Theme};

const RESET: &str = "\x1b[0m";
const DIM: &str = "\x1b[2m";
const BOLD: &str = "\x1b[1m";

/// Plain output for the light theme, ANSI styling for the dark one.
#[derive(Debug, Clone, Copy)]
pub struct Palette {
    styled: bool,
}

impl Palette {
    pub fn for_theme(theme: Theme) -> Self {
        Self {
            styled: theme == Theme::Dark,
        }
    }

    fn dim(&self, text: &str) -> String {
        if self.styled {
            format!("{DIM}{text}{RESET}")
        } else {
            text.to_string()
        }
    }

    fn bold(&self, text: &str) -> String {
        if self.styled {
            format!("{BOLD}{text}{RESET}")
        } else {
            text.to_string()
        }
    }
}

/// One transcript line, e.g. `[09:41] 🧐 Mina: hey (read 3)`.
pub fn format_entry(roster: &Roster, entry: &ChatLogEntry, palette: Palette) -> String {
    let at = palette.dim(&format!("[{}]", entry.at));

    if entry.is_system() || entry.speaker == SYSTEM_ID {
        return format!("{at} {}", palette.dim(&format!("-- {} --", entry.text)));
    }

    let label = if entry.speaker == USER_ID {
        palette.bold(USER_ID)
    } else {
        match roster.find(&entry.speaker) {
            Some(persona) => format!("{} {}", persona.emoji, palette.bold(&persona.name)),
            None => palette.bold(&entry.speaker),
        }
    };

    let read = entry
        .read
        .map(|n| format!(" {}", palette.dim(&format!("(read {n})"))))
        .unwrap_or_default();

    format!("{at} {label}: {}{read}", entry.text)
}

/// Render an event for the terminal, if it has anything to show.
///
/// The user's own messages are not echoed back; they were just typed.
pub fn format_event(roster: &Roster, event: &ChatEvent, palette: Palette) -> Option<String> {
    match event {
        ChatEvent::Entry(entry) if entry.speaker == USER_ID && !entry.is_system() => None,
        ChatEvent::Entry(entry) => Some(format_entry(roster, entry, palette)),
        ChatEvent::Typing {
            speaker,
            active: true,
        } => {
            let name = roster.display_name(speaker);
            Some(palette.dim(&format!("   {name} is typing...")))
        }
        ChatEvent::Summarized { lines } => {
            Some(palette.dim(&format!("[memory] long-term memory refreshed ({lines} lines)")))
        }
        ChatEvent::Theme(theme) => Some(format!("[theme] {}", theme.as_str())),
        ChatEvent::Typing { .. } | ChatEvent::Phase(_) => None,
    }
}

pub fn format_status(status: &SessionStatus) -> Vec<String> {
    vec![
        "[STATUS]".to_string(),
        format!("  Turn: {}", status.turn),
        format!("  Time of day: {}", status.time_of_day.as_str()),
        format!("  Mood: {}", status.mood.as_str()),
        format!("  Read by: {}", status.read_count),
        format!(
            "  Memory: {} recent, {} long-term",
            status.short_lines, status.long_lines
        ),
        format!("  Theme: {}", status.theme.as_str()),
    ]
}

pub fn help_lines() -> &'static [&'static str] {
    &[
        "  #quit   - Leave the chat",
        "  #theme  - Toggle light/dark theme",
        "  #status - Show room status",
        "  #memory - Show what the room remembers",
        "  #help   - Show this help",
        "  (anything else is sent as a message)",
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatroom_core::{EntryKind, Mood, TimeOfDay, TurnPhase};

    fn entry(kind: EntryKind, who: &str, text: &str, read: Option<u32>) -> ChatLogEntry {
        ChatLogEntry {
            kind,
            speaker: who.to_string(),
            text: text.to_string(),
            at: "09:41".to_string(),
            read,
        }
    }

    #[test]
    fn test_plain_message() {
        let roster = Roster::default_cast();
        let line = format_entry(
            &roster,
            &entry(EntryKind::Message, "mina", "hey", Some(3)),
            Palette::for_theme(Theme::Light),
        );
        assert_eq!(line, "[09:41] 🧐 Mina: hey (read 3)");
    }

    #[test]
    fn test_system_and_user_lines() {
        let roster = Roster::default_cast();
        let palette = Palette::for_theme(Theme::Light);
        assert_eq!(
            format_entry(&roster, &entry(EntryKind::System, "system", "error: boom", None), palette),
            "[09:41] -- error: boom --"
        );
        assert_eq!(
            format_entry(&roster, &entry(EntryKind::Message, "me", "hi", None), palette),
            "[09:41] me: hi"
        );
    }

    #[test]
    fn test_dark_theme_is_styled() {
        let roster = Roster::default_cast();
        let line = format_entry(
            &roster,
            &entry(EntryKind::Message, "juno", "lol", None),
            Palette::for_theme(Theme::Dark),
        );
        assert!(line.contains("\x1b[1mJuno\x1b[0m"));
    }

    #[test]
    fn test_events() {
        let roster = Roster::default_cast();
        let palette = Palette::for_theme(Theme::Light);

        let own = ChatEvent::Entry(entry(EntryKind::Message, "me", "hi", None));
        assert_eq!(format_event(&roster, &own, palette), None);

        let typing = ChatEvent::Typing {
            speaker: "elliot".to_string(),
            active: true,
        };
        assert_eq!(
            format_event(&roster, &typing, palette).as_deref(),
            Some("   Elliot is typing...")
        );

        assert_eq!(
            format_event(&roster, &ChatEvent::Phase(TurnPhase::Sending), palette),
            None
        );
    }

    #[test]
    fn test_status_lines() {
        let status = SessionStatus {
            turn: 4,
            time_of_day: TimeOfDay::Evening,
            mood: Mood::Good,
            read_count: 5,
            short_lines: 7,
            long_lines: 2,
            theme: Theme::Dark,
            phase: TurnPhase::Idle,
        };
        let lines = format_status(&status);
        assert!(lines.contains(&"  Time of day: evening".to_string()));
        assert!(lines.contains(&"  Memory: 7 recent, 2 long-term".to_string()));
    }
}
