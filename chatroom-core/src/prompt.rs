//! Prompt construction for chat turns and memory summarization.

use crate::persona::Character;

/// Only this many trailing memory lines are embedded in a prompt.
pub const MEMORY_PROMPT_LINES: usize = 20;

/// Request text sent in place of a user message when compressing memory.
pub const SUMMARY_REQUEST: &str = "Based on the [recent] conversation so far, list only the facts, \
preferences, relationships and states that will stay true going forward, in 4 to 7 lines. \
Keep each line short. Do not speculate. Output a JSON array whose single element has speaker \
'system' and the summary lines, separated by newlines, in text.";

/// Build the prompt for one chat turn.
///
/// The memory text is cut down to its last [`MEMORY_PROMPT_LINES`] lines.
pub fn build_chat_prompt(user_text: &str, memory: &str, characters: &[Character]) -> String {
    let character_lines = characters
        .iter()
        .map(|c| format!("- {}: {} / style: {}", c.id.trim(), c.name.trim(), c.style.trim()))
        .collect::<Vec<_>>()
        .join("\n");
    let character_lines = if character_lines.is_empty() {
        "- (no character info)".to_string()
    } else {
        character_lines
    };

    let memory_lines = tail_lines(memory, MEMORY_PROMPT_LINES);
    let memory_lines = if memory_lines.trim().is_empty() {
        "none".to_string()
    } else {
        memory_lines
    };

    let user_text = user_text.trim();

    format!(
        r#"You are an "AI group chat simulator". The conversation has no ending; keep the everyday chat going.

# Hard rules (important)
- Only 1 to 3 characters speak this turn.
- Each message is 1 to 2 sentences. Never long.
- Keep every character's voice and personality.
- Pick up each other's lines naturally, like a real group chat.
- No barrage of questions: at most one character asks a question.
- Avoid aggressive, hateful or dangerous content; steer gently back to everyday talk.

# Output format (must follow)
Output ONLY a JSON array. No other text, explanation or code fences.
Example:
[
  {{"speaker":"mina","text":"..."}},
  {{"speaker":"juno","text":"..."}}
]

# Characters
{character_lines}

# Recent conversation (summary/log)
{memory_lines}

# User message
{user_text}"#
    )
}

/// Memory text for a summarization request: the full long-term block plus
/// every short-term line.
pub fn build_summary_memory(long_lines: &[String], short_lines: &[String]) -> String {
    let long_part = if long_lines.is_empty() {
        "none".to_string()
    } else {
        long_lines.join("\n")
    };
    format!("[long-term]\n{long_part}\n\n[recent]\n{}", short_lines.join("\n"))
}

fn tail_lines(text: &str, count: usize) -> String {
    let lines: Vec<&str> = text.split('\n').collect();
    let start = lines.len().saturating_sub(count);
    lines[start..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cast() -> Vec<Character> {
        vec![
            Character::new("mina", "Mina", "observer"),
            Character::new("juno", "Juno", "jokes"),
        ]
    }

    #[test]
    fn test_prompt_contains_roster_and_user_text() {
        let prompt = build_chat_prompt("  hello there  ", "[recent]\nme: hi", &cast());

        assert!(prompt.contains("- mina: Mina / style: observer"));
        assert!(prompt.contains("- juno: Juno / style: jokes"));
        assert!(prompt.ends_with("# User message\nhello there"));
        assert!(prompt.contains("me: hi"));
        assert!(prompt.contains("Output ONLY a JSON array"));
        assert!(prompt.contains(r#"{"speaker":"mina","text":"..."}"#));
    }

    #[test]
    fn test_empty_roster_placeholder() {
        let prompt = build_chat_prompt("hi", "x", &[]);
        assert!(prompt.contains("# Characters\n- (no character info)\n"));
    }

    #[test]
    fn test_empty_memory_placeholder() {
        let prompt = build_chat_prompt("hi", "", &cast());
        assert!(prompt.contains("# Recent conversation (summary/log)\nnone\n"));
    }

    #[test]
    fn test_memory_truncated_to_tail() {
        let memory = (0..30).map(|i| format!("line {i}")).collect::<Vec<_>>().join("\n");
        let prompt = build_chat_prompt("hi", &memory, &cast());

        assert!(!prompt.contains("line 9\n"));
        assert!(prompt.contains("line 10\n"));
        assert!(prompt.contains("line 29\n"));
    }

    #[test]
    fn test_prompt_is_deterministic() {
        let a = build_chat_prompt("hi", "m", &cast());
        let b = build_chat_prompt("hi", "m", &cast());
        assert_eq!(a, b);
    }

    #[test]
    fn test_summary_memory() {
        let short = vec!["me: hi".to_string(), "Mina: hey".to_string()];
        assert_eq!(
            build_summary_memory(&[], &short),
            "[long-term]\nnone\n\n[recent]\nme: hi\nMina: hey"
        );
    }
}
