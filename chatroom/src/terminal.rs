//! Line-oriented terminal chat.
//!
//! - Lines starting with `#` are commands (quit, theme, status, memory, help)
//! - Everything else is sent as a chat message
//! - Persona replies, typing indicators and idle chatter are printed as the
//!   session reports them

use crate::render::{format_entry, format_event, format_status, help_lines, Palette};
use chatroom_core::{spawn_idle_loop, ChatEvent, ChatSession, SendOutcome};
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Quit,
    Theme,
    Status,
    Memory,
    Help,
    Unknown,
}

fn parse_command(line: &str) -> Option<Command> {
    let name = line.strip_prefix('#')?.split_whitespace().next().unwrap_or_default();
    Some(match name {
        "quit" | "exit" => Command::Quit,
        "theme" => Command::Theme,
        "status" => Command::Status,
        "memory" => Command::Memory,
        "help" => Command::Help,
        _ => Command::Unknown,
    })
}

/// Run the chat on stdin/stdout until `#quit` or end of input.
pub async fn run_terminal(session: Arc<ChatSession>, idle: bool) -> anyhow::Result<()> {
    run_lines(session, idle, BufReader::new(tokio::io::stdin())).await
}

async fn run_lines<R>(session: Arc<ChatSession>, idle: bool, input: R) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let roster = session.roster().clone();

    println!("=== Group Chat ===");
    let members: Vec<String> = roster
        .personas()
        .iter()
        .map(|p| format!("{} {} ({})", p.emoji, p.name, p.badge()))
        .collect();
    println!("Members: {}", members.join(", "));
    println!("Type #help for commands.");
    println!();

    let palette = Palette::for_theme(session.theme());
    for entry in session.restore() {
        println!("{}", format_entry(&roster, &entry, palette));
    }

    let (stop, mut stopped) = oneshot::channel::<()>();
    let printer = {
        let session = session.clone();
        let mut events = session.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    event = events.recv() => match event {
                        Ok(event) => print_event(&session, &event),
                        Err(RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "terminal fell behind the event stream");
                        }
                        Err(RecvError::Closed) => break,
                    },
                    _ = &mut stopped => {
                        while let Ok(event) = events.try_recv() {
                            print_event(&session, &event);
                        }
                        break;
                    }
                }
            }
        })
    };

    let idle_loop = idle.then(|| spawn_idle_loop(session.clone()));
    let mut turns: Vec<JoinHandle<()>> = Vec::new();

    let mut lines = input.lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                eprintln!("Error reading input: {e}");
                break;
            }
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(command) = parse_command(line) {
            session.note_activity();
            match command {
                Command::Quit => {
                    println!("Bye!");
                    break;
                }
                Command::Theme => {
                    session.toggle_theme();
                }
                Command::Status => {
                    for line in format_status(&session.status()) {
                        println!("{line}");
                    }
                }
                Command::Memory => {
                    println!("[MEMORY]");
                    println!("{}", session.memory_text());
                }
                Command::Help => {
                    println!("[HELP]");
                    for line in help_lines() {
                        println!("{line}");
                    }
                }
                Command::Unknown => {
                    println!("[ERROR] Unknown command. Type #help for help.");
                }
            }
            std::io::stdout().flush().ok();
            continue;
        }

        // Turns run in the background so that input typed mid-turn reaches
        // the single-flight guard and is dropped there.
        turns.retain(|turn| !turn.is_finished());
        let session = session.clone();
        let text = line.to_string();
        turns.push(tokio::spawn(async move {
            match session.send(&text).await {
                Ok(SendOutcome::Busy) => println!("[busy] still replying, message dropped"),
                Ok(_) => {}
                // Already rendered inline as an error line.
                Err(e) => tracing::debug!(error = %e, "turn failed"),
            }
        }));
    }

    if let Some(handle) = idle_loop {
        handle.abort();
    }
    // Let the running turn finish so its replies are shown and stored.
    for turn in turns {
        if let Err(e) = turn.await {
            tracing::warn!(error = %e, "turn task failed");
        }
    }
    let _ = stop.send(());
    if let Err(e) = printer.await {
        tracing::warn!(error = %e, "event printer failed");
    }
    Ok(())
}

fn print_event(session: &ChatSession, event: &ChatEvent) {
    let palette = Palette::for_theme(session.theme());
    if let Some(line) = format_event(session.roster(), event, palette) {
        println!("{line}");
    }
}
