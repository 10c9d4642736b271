//! Background idle chatter.
//!
//! After a random stretch of user inactivity a persona may pipe up on its
//! own. Any activity restarts the wait; a tick that lands mid-turn is skipped.

use crate::session::{ChatSession, IdleOutcome};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Run idle chatter for `session` until the task is aborted.
pub fn spawn_idle_loop(session: Arc<ChatSession>) -> JoinHandle<()> {
    let activity = session.activity();
    tokio::spawn(async move {
        loop {
            let wait = session.idle_wait();
            tokio::select! {
                _ = activity.notified() => {
                    debug!("activity, rescheduling idle chatter");
                    continue;
                }
                _ = tokio::time::sleep(wait) => {}
            }

            match session.idle_chatter().await {
                IdleOutcome::Spoke(entry) => debug!(speaker = %entry.speaker, "idle chatter"),
                IdleOutcome::Skipped => debug!("idle tick stayed quiet"),
                IdleOutcome::Busy => debug!("idle tick landed mid-turn"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::MemoryKv;
    use crate::persona::Roster;
    use crate::session::ChatEvent;
    use crate::testing::{quiet_config, ScriptedBackend};
    use std::time::Duration;

    fn session(chance: f64) -> Arc<ChatSession> {
        Arc::new(ChatSession::open(
            Roster::default_cast(),
            Arc::new(ScriptedBackend::new()),
            Arc::new(MemoryKv::new()),
            quiet_config().with_idle_chance(chance),
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn test_speaks_after_window() {
        let session = session(1.0);
        let mut events = session.subscribe();
        let start = tokio::time::Instant::now();
        let handle = spawn_idle_loop(session.clone());

        let spoke_at = loop {
            match events.recv().await {
                Ok(ChatEvent::Entry(_)) => break start.elapsed(),
                Ok(_) => continue,
                Err(e) => panic!("event stream ended: {e}"),
            }
        };
        handle.abort();

        let config = session.config();
        assert!(spoke_at >= config.idle_min + config.idle_typing);
        assert!(spoke_at <= config.idle_max + config.idle_typing);
    }

    #[tokio::test(start_paused = true)]
    async fn test_activity_reschedules() {
        let session = session(1.0);
        let before = session.restore().len();
        let mut events = session.subscribe();
        let handle = spawn_idle_loop(session.clone());

        for _ in 0..6 {
            tokio::time::sleep(Duration::from_secs(30)).await;
            session.note_activity();
        }
        assert_eq!(session.restore().len(), before);
        assert!(events.try_recv().is_err());

        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_quiet_room_stays_quiet() {
        let session = session(0.0);
        let before = session.restore().len();
        let handle = spawn_idle_loop(session.clone());

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(session.restore().len(), before);

        handle.abort();
    }
}
