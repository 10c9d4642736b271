//! The conversation engine.
//!
//! A [`ChatSession`] owns everything one chat room needs: the roster, the
//! backend, memory, the transcript and the theme preference. Turns are
//! single-flight: a send attempted while another turn is in flight is
//! dropped, not queued.

use crate::ambient::{Mood, TimeOfDay};
use crate::backend::{ChatBackend, ChatRequest};
use crate::chat_log::{ChatLog, ChatLogEntry};
use crate::extract::{decode_replies, TurnReply};
use crate::generation::{GenerationParams, ProviderError, DEFAULT_TIMEOUT};
use crate::memory::MemoryStore;
use crate::persist::{FileStore, KvStore, PersistError, Theme};
use crate::persona::{Persona, Roster, SYSTEM_ID, USER_ID, USER_NAME};
use crate::summary;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// System line rendered when a room is opened for the first time.
pub const WELCOME_TEXT: &str = "You joined the group chat.";

/// Errors from ChatSession operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("{0}")]
    Provider(#[from] ProviderError),

    #[error("Storage error: {0}")]
    Storage(#[from] PersistError),
}

/// Configuration for a chat session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Model override for the generation provider.
    pub model: Option<String>,

    /// Maximum tokens per generated turn.
    pub max_tokens: usize,

    /// Sampling temperature.
    pub temperature: f32,

    /// Upper bound on one provider call.
    pub request_timeout: Duration,

    /// Replies rendered per turn, at most.
    pub max_replies: usize,

    /// Bounds of the simulated typing delay before each reply.
    pub typing_min: Duration,
    pub typing_max: Duration,

    /// Probability that a rendered reply carries a read marker.
    pub read_marker_chance: f64,

    /// Probability that a turn bumps the read counter.
    pub read_bump_chance: f64,

    /// Time of day advances every this many turns.
    pub time_advance_every: u64,

    /// Summarization is attempted every this many turns.
    pub summary_every: u64,

    /// Summarization is skipped below this many short-term lines.
    pub summary_min_lines: usize,

    /// Bounds of the inactivity window before idle chatter.
    pub idle_min: Duration,
    pub idle_max: Duration,

    /// Probability that an idle tick produces a line.
    pub idle_chance: f64,

    /// Typing delay before an idle line.
    pub idle_typing: Duration,

    /// Seed for the session's random source. Entropy when unset.
    pub seed: Option<u64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        let params = GenerationParams::default();
        Self {
            model: None,
            max_tokens: params.max_tokens,
            temperature: params.temperature,
            request_timeout: DEFAULT_TIMEOUT,
            max_replies: 3,
            typing_min: Duration::from_millis(520),
            typing_max: Duration::from_millis(1040),
            read_marker_chance: 0.6,
            read_bump_chance: 0.65,
            time_advance_every: 6,
            summary_every: 20,
            summary_min_lines: 8,
            idle_min: Duration::from_secs(35),
            idle_max: Duration::from_secs(80),
            idle_chance: 0.4,
            idle_typing: Duration::from_millis(700),
            seed: None,
        }
    }
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the model to use.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_max_replies(mut self, max_replies: usize) -> Self {
        self.max_replies = max_replies;
        self
    }

    /// Set the typing delay bounds. Swapped if given in the wrong order.
    pub fn with_typing_delay(mut self, min: Duration, max: Duration) -> Self {
        self.typing_min = min.min(max);
        self.typing_max = max.max(min);
        self
    }

    pub fn with_read_marker_chance(mut self, chance: f64) -> Self {
        self.read_marker_chance = chance.clamp(0.0, 1.0);
        self
    }

    pub fn with_read_bump_chance(mut self, chance: f64) -> Self {
        self.read_bump_chance = chance.clamp(0.0, 1.0);
        self
    }

    pub fn with_summary_every(mut self, turns: u64) -> Self {
        self.summary_every = turns;
        self
    }

    pub fn with_summary_min_lines(mut self, lines: usize) -> Self {
        self.summary_min_lines = lines;
        self
    }

    /// Set the idle window. Swapped if given in the wrong order.
    pub fn with_idle_window(mut self, min: Duration, max: Duration) -> Self {
        self.idle_min = min.min(max);
        self.idle_max = max.max(min);
        self
    }

    pub fn with_idle_chance(mut self, chance: f64) -> Self {
        self.idle_chance = chance.clamp(0.0, 1.0);
        self
    }

    pub fn with_idle_typing(mut self, delay: Duration) -> Self {
        self.idle_typing = delay;
        self
    }

    /// Fix the random source for reproducible sessions.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Sampling parameters for the generation provider.
    pub fn generation_params(&self) -> GenerationParams {
        GenerationParams {
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        }
    }
}

/// Where the current turn is.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TurnPhase {
    #[default]
    Idle,
    /// Waiting on the backend.
    Sending,
    /// Simulating a persona typing its reply.
    Typing { speaker: String },
}

/// Notifications for front ends.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    /// The turn phase changed.
    Phase(TurnPhase),
    /// A persona started or stopped typing.
    Typing { speaker: String, active: bool },
    /// A line was appended to the transcript.
    Entry(ChatLogEntry),
    /// Long-term memory was refreshed by a summarization pass.
    Summarized { lines: usize },
    /// The theme preference changed.
    Theme(Theme),
}

/// Result of a completed turn.
#[derive(Debug)]
pub struct TurnOutcome {
    /// Turn number after this turn.
    pub turn: u64,
    /// Replies rendered by this turn, in order.
    pub replies: Vec<ChatLogEntry>,
    /// Detached summarization, if this turn triggered one.
    pub summarization: Option<JoinHandle<bool>>,
}

/// What happened to a send attempt.
#[derive(Debug)]
pub enum SendOutcome {
    Completed(TurnOutcome),
    /// Another turn was in flight; the input was dropped.
    Busy,
    /// The input was blank and ignored.
    Empty,
}

/// What happened on an idle tick.
#[derive(Debug, Clone, PartialEq)]
pub enum IdleOutcome {
    Spoke(ChatLogEntry),
    /// The dice said stay quiet.
    Skipped,
    /// A turn was in flight.
    Busy,
}

/// Snapshot of the room state, for status displays.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionStatus {
    pub turn: u64,
    pub time_of_day: TimeOfDay,
    pub mood: Mood,
    pub read_count: u32,
    pub short_lines: usize,
    pub long_lines: usize,
    pub theme: Theme,
    pub phase: TurnPhase,
}

/// One group chat room.
pub struct ChatSession {
    roster: Roster,
    backend: Arc<dyn ChatBackend>,
    store: Arc<dyn KvStore>,
    config: SessionConfig,
    memory: Arc<Mutex<MemoryStore>>,
    log: Mutex<ChatLog>,
    theme: Mutex<Theme>,
    rng: Mutex<StdRng>,
    phase: Mutex<TurnPhase>,
    in_flight: AtomicBool,
    events: broadcast::Sender<ChatEvent>,
    activity: Arc<Notify>,
}

impl ChatSession {
    /// Open a room over the given store.
    ///
    /// Memory, transcript and theme are restored from the store. A room
    /// with no transcript is seeded with a welcome line and each persona's
    /// greeting; a restored room is replayed as is, without calling the
    /// backend.
    pub fn open(
        roster: Roster,
        backend: Arc<dyn ChatBackend>,
        store: Arc<dyn KvStore>,
        config: SessionConfig,
    ) -> Self {
        let memory = MemoryStore::load(store.clone());
        let log = ChatLog::load(store.clone());
        let theme = Theme::load(store.as_ref());
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let (events, _) = broadcast::channel(64);

        let session = Self {
            roster,
            backend,
            store,
            config,
            memory: Arc::new(Mutex::new(memory)),
            log: Mutex::new(log),
            theme: Mutex::new(theme),
            rng: Mutex::new(rng),
            phase: Mutex::new(TurnPhase::Idle),
            in_flight: AtomicBool::new(false),
            events,
            activity: Arc::new(Notify::new()),
        };

        if session.log.lock().is_empty() {
            session.seed_room();
        } else {
            info!(entries = session.log.lock().len(), "restored chat log");
        }

        session
    }

    /// Open a room persisted as JSON files under `dir`.
    pub fn open_dir(
        dir: impl AsRef<Path>,
        roster: Roster,
        backend: Arc<dyn ChatBackend>,
        config: SessionConfig,
    ) -> Result<Self, SessionError> {
        let store = FileStore::open(dir)?;
        Ok(Self::open(roster, backend, Arc::new(store), config))
    }

    fn seed_room(&self) {
        self.render(ChatLogEntry::system(WELCOME_TEXT));
        self.memory.lock().append_short(format!("{SYSTEM_ID}: joined the room"));

        let read = self.memory.lock().state().read_count;
        for persona in self.roster.personas() {
            let Some(greeting) = persona.greeting.as_deref() else {
                continue;
            };
            self.render(ChatLogEntry::message(&persona.id, greeting, Some(read)));
            self.memory
                .lock()
                .append_short(format!("{}: {greeting}", persona.name));
        }
        info!(personas = self.roster.len(), "seeded new chat room");
    }

    /// Send a user message and run the turn it starts.
    ///
    /// Blank input is ignored and input arriving mid-turn is dropped. A
    /// failed turn is rendered as an inline `error: ...` line and returned.
    pub async fn send(&self, text: &str) -> Result<SendOutcome, SessionError> {
        self.note_activity();

        let text = text.trim();
        if text.is_empty() {
            return Ok(SendOutcome::Empty);
        }

        let Some(_guard) = FlightGuard::acquire(self) else {
            debug!("turn in flight, dropping input");
            return Ok(SendOutcome::Busy);
        };

        self.render(ChatLogEntry::message(USER_ID, text, None));
        self.memory.lock().append_short(format!("{USER_NAME}: {text}"));

        match self.run_turn(text).await {
            Ok(outcome) => Ok(SendOutcome::Completed(outcome)),
            Err(e) => {
                self.render(ChatLogEntry::system(format!("error: {e}")));
                Err(e)
            }
        }
    }

    async fn run_turn(&self, user_text: &str) -> Result<TurnOutcome, SessionError> {
        let bump = self.roll(self.config.read_bump_chance);
        let request = {
            let mut memory = self.memory.lock();
            let time_every = self.config.time_advance_every;
            memory.update(|state| {
                state.turn += 1;
                if bump {
                    state.bump_read_count();
                }
                if time_every > 0 && state.turn % time_every == 0 {
                    state.time_of_day = state.time_of_day.next();
                }
                state.mood = Mood::from_text(user_text);
            });

            ChatRequest {
                user_text: user_text.to_string(),
                memory: memory.assemble_text(),
                characters: self.roster.characters(),
            }
        };
        let turn = self.memory.lock().state().turn;

        self.set_phase(TurnPhase::Sending);
        let data = self.backend.fetch(&request).await?;

        let replies: Vec<TurnReply> = decode_replies(&data)
            .into_iter()
            .take(self.config.max_replies)
            .collect();
        debug!(turn, replies = replies.len(), "decoded replies");

        let mut rendered = Vec::with_capacity(replies.len());
        for reply in replies {
            let persona = self.roster.resolve(&reply.speaker);
            self.set_phase(TurnPhase::Typing {
                speaker: persona.id.clone(),
            });
            let delay = self.typing_delay();
            self.typing(persona, delay).await;

            rendered.push(self.speak(persona, &reply.text));
        }

        let summarization = self.maybe_summarize(turn);

        Ok(TurnOutcome {
            turn,
            replies: rendered,
            summarization,
        })
    }

    fn maybe_summarize(&self, turn: u64) -> Option<JoinHandle<bool>> {
        let every = self.config.summary_every;
        if every == 0 || turn % every != 0 {
            return None;
        }

        let short = self.memory.lock().short_len();
        if short < self.config.summary_min_lines {
            debug!(turn, short, "skipping summarization, not enough recent lines");
            return None;
        }

        let memory = self.memory.clone();
        let backend = self.backend.clone();
        let events = self.events.clone();
        Some(tokio::spawn(async move {
            let before = memory.lock().long_len();
            let refreshed = summary::summarize(memory.clone(), backend).await;
            if refreshed {
                let lines = memory.lock().long_len();
                debug!(before, lines, "summarization applied");
                let _ = events.send(ChatEvent::Summarized { lines });
            }
            refreshed
        }))
    }

    /// One idle tick: maybe let a random persona say something.
    pub async fn idle_chatter(&self) -> IdleOutcome {
        if self.is_busy() {
            return IdleOutcome::Busy;
        }
        if !self.roll(self.config.idle_chance) {
            return IdleOutcome::Skipped;
        }

        let (persona, draw) = {
            let mut rng = self.rng.lock();
            let index = rng.gen_range(0..self.roster.len());
            (&self.roster.personas()[index], rng.gen::<usize>())
        };

        self.typing(persona, self.config.idle_typing).await;
        // A turn may have started while the persona was typing.
        if self.is_busy() {
            return IdleOutcome::Busy;
        }
        let text = persona.small_talk_line(draw).to_string();
        IdleOutcome::Spoke(self.speak(persona, &text))
    }

    /// Draw the next inactivity window.
    pub fn idle_wait(&self) -> Duration {
        self.draw_between(self.config.idle_min, self.config.idle_max)
    }

    /// Record user activity, rescheduling idle chatter.
    pub fn note_activity(&self) {
        self.activity.notify_one();
    }

    /// Signalled on every bit of user activity.
    pub fn activity(&self) -> Arc<Notify> {
        self.activity.clone()
    }

    async fn typing(&self, persona: &Persona, delay: Duration) {
        self.emit(ChatEvent::Typing {
            speaker: persona.id.clone(),
            active: true,
        });
        tokio::time::sleep(delay).await;
        self.emit(ChatEvent::Typing {
            speaker: persona.id.clone(),
            active: false,
        });
    }

    /// Render a persona line and remember it.
    fn speak(&self, persona: &Persona, text: &str) -> ChatLogEntry {
        let read = self
            .roll(self.config.read_marker_chance)
            .then(|| self.memory.lock().state().read_count);
        let entry = ChatLogEntry::message(&persona.id, text, read);
        self.render(entry.clone());
        self.memory
            .lock()
            .append_short(format!("{}: {text}", persona.name));
        entry
    }

    fn render(&self, entry: ChatLogEntry) {
        self.log.lock().push(entry.clone());
        self.emit(ChatEvent::Entry(entry));
    }

    fn typing_delay(&self) -> Duration {
        self.draw_between(self.config.typing_min, self.config.typing_max)
    }

    /// Uniform draw in `min..=max`, at millisecond resolution.
    fn draw_between(&self, min: Duration, max: Duration) -> Duration {
        if min >= max {
            return min;
        }
        let ms = self
            .rng
            .lock()
            .gen_range(min.as_millis() as u64..=max.as_millis() as u64);
        Duration::from_millis(ms)
    }

    fn roll(&self, chance: f64) -> bool {
        self.rng.lock().gen::<f64>() < chance
    }

    fn set_phase(&self, phase: TurnPhase) {
        let mut current = self.phase.lock();
        if *current != phase {
            *current = phase.clone();
            drop(current);
            self.emit(ChatEvent::Phase(phase));
        }
    }

    fn emit(&self, event: ChatEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Subscribe to session events.
    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.events.subscribe()
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn phase(&self) -> TurnPhase {
        self.phase.lock().clone()
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The stored transcript, oldest first.
    pub fn restore(&self) -> Vec<ChatLogEntry> {
        self.log.lock().snapshot()
    }

    /// Memory as it would be sent with the next turn.
    pub fn memory_text(&self) -> String {
        self.memory.lock().assemble_text()
    }

    /// Shared handle to memory, for inspection.
    pub fn memory(&self) -> Arc<Mutex<MemoryStore>> {
        self.memory.clone()
    }

    pub fn theme(&self) -> Theme {
        *self.theme.lock()
    }

    /// Flip and persist the theme preference.
    pub fn toggle_theme(&self) -> Theme {
        let theme = {
            let mut theme = self.theme.lock();
            *theme = theme.toggled();
            *theme
        };
        theme.persist(self.store.as_ref());
        self.emit(ChatEvent::Theme(theme));
        theme
    }

    pub fn status(&self) -> SessionStatus {
        let memory = self.memory.lock();
        let state = memory.state();
        SessionStatus {
            turn: state.turn,
            time_of_day: state.time_of_day,
            mood: state.mood,
            read_count: state.read_count,
            short_lines: state.short_lines.len(),
            long_lines: state.long_lines.len(),
            theme: self.theme(),
            phase: self.phase(),
        }
    }
}

/// Holds the single-flight flag for one turn; releasing it returns the
/// session to idle.
struct FlightGuard<'a> {
    session: &'a ChatSession,
}

impl<'a> FlightGuard<'a> {
    fn acquire(session: &'a ChatSession) -> Option<Self> {
        session
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { session })
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.session.in_flight.store(false, Ordering::Release);
        self.session.set_phase(TurnPhase::Idle);
    }
}
