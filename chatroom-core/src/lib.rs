//! Group chat simulator engine with AI personas.
//!
//! This crate provides:
//! - Prompt construction and tolerant reply extraction
//! - A generation seam with a Gemini implementation and hard timeouts
//! - Bounded short/long-term memory with periodic summarization
//! - A single-flight conversation engine with typing simulation and idle chatter
//! - Local persistence of memory, transcript and theme
//!
//! # Quick Start
//!
//! ```ignore
//! use chatroom_core::{ChatSession, DirectBackend, Roster, SessionConfig, SendOutcome};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let backend = Arc::new(DirectBackend::gemini_from_env()?);
//!     let session = ChatSession::open_dir(
//!         ".chatroom",
//!         Roster::default_cast(),
//!         backend,
//!         SessionConfig::default(),
//!     )?;
//!
//!     if let SendOutcome::Completed(turn) = session.send("hey everyone").await? {
//!         for reply in turn.replies {
//!             println!("{}: {}", reply.speaker, reply.text);
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod ambient;
pub mod backend;
pub mod chat_log;
pub mod extract;
pub mod generation;
pub mod idle;
pub mod memory;
pub mod persist;
pub mod persona;
pub mod prompt;
pub mod session;
pub mod summary;
pub mod testing;

// Primary public API
pub use ambient::{Mood, TimeOfDay};
pub use backend::{ChatBackend, ChatEnvelope, ChatRequest, DirectBackend, RemoteBackend};
pub use chat_log::{ChatLog, ChatLogEntry, EntryKind};
pub use extract::{decode_replies, extract_json_array, TurnReply};
pub use generation::{GenerationClient, GenerationParams, ProviderError};
pub use idle::spawn_idle_loop;
pub use memory::{MemoryState, MemoryStore};
pub use persist::{FileStore, KvStore, MemoryKv, PersistError, Theme};
pub use persona::{Character, Persona, Roster};
pub use prompt::build_chat_prompt;
pub use session::{
    ChatEvent, ChatSession, IdleOutcome, SendOutcome, SessionConfig, SessionError, SessionStatus,
    TurnOutcome, TurnPhase,
};
pub use testing::{ScriptedBackend, ScriptedGenerator};
