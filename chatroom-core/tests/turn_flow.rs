//! Turn scenarios against a scripted backend.
//!
//! Everything here runs on paused tokio time, so typing delays and the
//! provider timeout cost nothing.

use chatroom_core::generation::DEFAULT_TIMEOUT;
use chatroom_core::testing::{quiet_config, session_with, ScriptedGenerator};
use chatroom_core::{
    ChatSession, DirectBackend, EntryKind, MemoryKv, ProviderError, Roster, ScriptedBackend,
    SendOutcome, SessionError, TurnOutcome,
};
use std::sync::Arc;
use std::time::Duration;

fn completed(outcome: SendOutcome) -> TurnOutcome {
    match outcome {
        SendOutcome::Completed(turn) => turn,
        other => panic!("expected a completed turn, got {other:?}"),
    }
}

// =============================================================================
// Reply sequencing
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_five_replies_render_three_in_order() {
    let backend = Arc::new(ScriptedBackend::new().with_data(
        r#"[
            {"speaker":"mina","text":"one"},
            {"speaker":"juno","text":"two"},
            {"speaker":"elliot","text":"three"},
            {"speaker":"mina","text":"four"},
            {"speaker":"juno","text":"five"}
        ]"#,
    ));
    let (_, session) = session_with(backend);

    let turn = completed(session.send("what's up").await.unwrap());

    let texts: Vec<&str> = turn.replies.iter().map(|r| r.text.as_str()).collect();
    assert_eq!(texts, vec!["one", "two", "three"]);
    let speakers: Vec<&str> = turn.replies.iter().map(|r| r.speaker.as_str()).collect();
    assert_eq!(speakers, vec!["mina", "juno", "elliot"]);

    let log = session.restore();
    let tail: Vec<&str> = log[log.len() - 4..].iter().map(|e| e.text.as_str()).collect();
    assert_eq!(tail, vec!["what's up", "one", "two", "three"]);
}

#[tokio::test(start_paused = true)]
async fn test_unknown_speaker_uses_first_persona() {
    let backend = Arc::new(ScriptedBackend::new().with_data(r#"[{"speaker":"ghost","text":"boo"}]"#));
    let (_, session) = session_with(backend);

    let turn = completed(session.send("anyone there?").await.unwrap());

    assert_eq!(turn.replies.len(), 1);
    assert_eq!(turn.replies[0].speaker, "elliot");

    let memory = session.memory();
    let last = memory.lock().state().short_lines.last().cloned().unwrap();
    assert_eq!(last, "Elliot: boo");
}

#[tokio::test(start_paused = true)]
async fn test_replies_are_typed_sequentially() {
    let backend = Arc::new(ScriptedBackend::new().with_data(
        r#"[{"speaker":"mina","text":"a"},{"speaker":"juno","text":"b"},{"speaker":"elliot","text":"c"}]"#,
    ));
    let (_, session) = session_with(backend);

    let start = tokio::time::Instant::now();
    completed(session.send("go").await.unwrap());
    let elapsed = start.elapsed();

    assert!(elapsed >= Duration::from_millis(3 * 520));
    assert!(elapsed <= Duration::from_millis(3 * 1040));
}

#[tokio::test(start_paused = true)]
async fn test_garbage_output_is_zero_replies() {
    let backend = Arc::new(ScriptedBackend::new().with_data("sorry, I can't help with that"));
    let (_, session) = session_with(backend);

    let turn = completed(session.send("hi").await.unwrap());
    assert!(turn.replies.is_empty());
    assert_eq!(session.restore().last().unwrap().speaker, "me");
}

#[tokio::test(start_paused = true)]
async fn test_read_markers_follow_read_count() {
    let backend = Arc::new(ScriptedBackend::new().with_data(r#"[{"speaker":"mina","text":"seen"}]"#));
    let (_, session) = session_with(backend);

    let turn = completed(session.send("hello").await.unwrap());
    assert_eq!(turn.replies[0].read, Some(session.status().read_count));
    assert_eq!(session.restore().iter().rev().nth(1).unwrap().read, None);
}

// =============================================================================
// Single flight
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_send_during_turn_is_dropped() {
    let backend = Arc::new(
        ScriptedBackend::new().with_delayed_data(Duration::from_secs(2), r#"[{"speaker":"mina","text":"ok"}]"#),
    );
    let (_, session) = session_with(backend.clone());
    let session = Arc::new(session);

    let first = tokio::spawn({
        let session = session.clone();
        async move { session.send("first").await }
    });
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(session.is_busy());

    let second = session.send("second").await.unwrap();
    assert!(matches!(second, SendOutcome::Busy));

    completed(first.await.unwrap().unwrap());
    assert!(!session.is_busy());
    assert_eq!(backend.call_count(), 1);
    assert!(session.restore().iter().all(|e| e.text != "second"));

    // The guard is released, so the next send goes through.
    completed(session.send("third").await.unwrap());
    assert_eq!(backend.call_count(), 2);
}

// =============================================================================
// Provider failure
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_provider_timeout_fails_turn_cleanly() {
    let generator = Arc::new(
        ScriptedGenerator::new().with_delayed_text(Duration::from_secs(30), r#"[{"speaker":"mina","text":"late"}]"#),
    );
    let backend = Arc::new(DirectBackend::new(generator.clone()));
    let store = Arc::new(MemoryKv::new());
    let session = ChatSession::open(Roster::default_cast(), backend, store, quiet_config());

    let before = session.memory().lock().state().clone();
    let log_before = session.restore().len();

    let err = session.send("are you there").await.unwrap_err();
    assert!(matches!(err, SessionError::Provider(ProviderError::Timeout(t)) if t == DEFAULT_TIMEOUT));
    assert_eq!(generator.call_count(), 1);

    // The user's line and the error notice are the only new entries.
    let log = session.restore();
    assert_eq!(log.len(), log_before + 2);
    assert_eq!(log[log.len() - 2].speaker, "me");
    assert_eq!(log[log.len() - 1].kind, EntryKind::System);
    assert!(log[log.len() - 1].text.starts_with("error: "));

    // Nothing from the failed reply reached memory.
    let after = session.memory().lock().state().clone();
    let mut expected_short = before.short_lines.clone();
    expected_short.push("me: are you there".to_string());
    assert_eq!(after.short_lines, expected_short);
    assert_eq!(after.long_lines, before.long_lines);
}

// =============================================================================
// Summarization
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_summarization_skipped_below_floor() {
    let backend = Arc::new(ScriptedBackend::new());
    let (_, session) = session_with(backend.clone());
    {
        let memory = session.memory();
        let mut memory = memory.lock();
        memory.clear_short();
        memory.update(|state| state.turn = 19);
    }
    // Two short lines now, three after the user's message lands.
    session.memory().lock().append_short("Mina: earlier");
    session.memory().lock().append_short("Juno: lol");

    let turn = completed(session.send("hi").await.unwrap());
    assert_eq!(turn.turn, 20);
    assert!(turn.summarization.is_none());
    assert_eq!(backend.call_count(), 1);
    assert_eq!(session.memory().lock().short_len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_summarization_runs_detached_every_twentieth_turn() {
    let backend = Arc::new(ScriptedBackend::new());
    let (_, session) = session_with(backend.clone());
    {
        let memory = session.memory();
        let mut memory = memory.lock();
        memory.update(|state| state.turn = 19);
        for i in 0..8 {
            memory.append_short(format!("Juno: line {i}"));
        }
    }

    backend.queue_data(r#"[{"speaker":"juno","text":"twenty!"}]"#);
    backend.queue_data(r#"[{"speaker":"system","text":"- likes tea\n- works nights"}]"#);

    let turn = completed(session.send("we made it").await.unwrap());
    assert_eq!(turn.turn, 20);
    let handle = turn.summarization.expect("summarization should be scheduled");
    assert!(handle.await.unwrap());

    let requests = backend.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].characters.len(), 1);
    assert_eq!(requests[1].characters[0].id, "system");

    let memory = session.memory();
    let memory = memory.lock();
    assert_eq!(memory.state().long_lines, vec!["likes tea", "works nights"]);
    assert_eq!(memory.short_len(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_summarization_failure_is_invisible() {
    let backend = Arc::new(ScriptedBackend::new());
    let (_, session) = session_with(backend.clone());
    {
        let memory = session.memory();
        let mut memory = memory.lock();
        memory.update(|state| state.turn = 39);
        for i in 0..10 {
            memory.append_short(format!("Mina: line {i}"));
        }
    }
    // The turn gets no replies; the summary call falls through to `[]`.
    backend.queue_data("[]");

    let turn = completed(session.send("still here").await.unwrap());
    let handle = turn.summarization.expect("summarization should be scheduled");
    assert!(!handle.await.unwrap());

    let log = session.restore();
    assert!(log.iter().all(|e| !e.text.starts_with("error: ")));
    assert_eq!(session.memory().lock().short_len(), 15);
}
