//! Test doubles for the generation and backend seams.
//!
//! This module provides:
//! - `ScriptedGenerator`, a [`GenerationClient`] returning queued outputs
//! - `ScriptedBackend`, a [`ChatBackend`] returning queued reply arrays
//! - `quiet_config` and `session_with` for building deterministic sessions
//!
//! Both doubles record what they were asked, so tests can assert on prompts
//! and requests. Once the script runs out they answer with `[]`.

use crate::backend::{ChatBackend, ChatRequest};
use crate::generation::{GenerationClient, GenerationParams, ProviderError};
use crate::persist::{KvStore, MemoryKv};
use crate::persona::Roster;
use crate::session::{ChatSession, SessionConfig};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

/// A scripted answer.
#[derive(Debug, Clone)]
enum Scripted {
    Text(String),
    Delayed(Duration, String),
    Error(ProviderError),
}

impl Scripted {
    async fn play(self) -> Result<String, ProviderError> {
        match self {
            Scripted::Text(text) => Ok(text),
            Scripted::Delayed(delay, text) => {
                tokio::time::sleep(delay).await;
                Ok(text)
            }
            Scripted::Error(e) => Err(e),
        }
    }
}

#[derive(Debug, Default)]
struct Script {
    queue: Mutex<VecDeque<Scripted>>,
}

impl Script {
    fn push(&self, item: Scripted) {
        self.queue.lock().push_back(item);
    }

    fn next(&self) -> Scripted {
        self.queue
            .lock()
            .pop_front()
            .unwrap_or_else(|| Scripted::Text("[]".to_string()))
    }
}

/// A generation client that returns scripted raw text.
#[derive(Debug, Default)]
pub struct ScriptedGenerator {
    script: Script,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue raw output returned immediately.
    pub fn with_text(self, text: impl Into<String>) -> Self {
        self.script.push(Scripted::Text(text.into()));
        self
    }

    /// Queue raw output returned after `delay`.
    pub fn with_delayed_text(self, delay: Duration, text: impl Into<String>) -> Self {
        self.script.push(Scripted::Delayed(delay, text.into()));
        self
    }

    /// Queue a provider failure.
    pub fn with_error(self, error: ProviderError) -> Self {
        self.script.push(Scripted::Error(error));
        self
    }

    /// Every prompt received so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().len()
    }
}

#[async_trait]
impl GenerationClient for ScriptedGenerator {
    async fn generate(
        &self,
        prompt: &str,
        _params: GenerationParams,
    ) -> Result<String, ProviderError> {
        self.prompts.lock().push(prompt.to_string());
        let next = self.script.next();
        next.play().await
    }
}

/// A chat backend that returns scripted reply-array text.
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    script: Script,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue reply-array text returned immediately.
    pub fn with_data(self, data: impl Into<String>) -> Self {
        self.script.push(Scripted::Text(data.into()));
        self
    }

    /// Queue reply-array text returned after `delay`.
    pub fn with_delayed_data(self, delay: Duration, data: impl Into<String>) -> Self {
        self.script.push(Scripted::Delayed(delay, data.into()));
        self
    }

    /// Queue a failure.
    pub fn with_error(self, error: ProviderError) -> Self {
        self.script.push(Scripted::Error(error));
        self
    }

    /// Queue more data after construction.
    pub fn queue_data(&self, data: impl Into<String>) {
        self.script.push(Scripted::Text(data.into()));
    }

    /// Every request received so far, in call order.
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    async fn fetch(&self, request: &ChatRequest) -> Result<String, ProviderError> {
        self.requests.lock().push(request.clone());
        let next = self.script.next();
        next.play().await
    }
}

/// Session config with a fixed seed and certain read markers, for
/// reproducible tests.
pub fn quiet_config() -> SessionConfig {
    SessionConfig::default()
        .with_seed(7)
        .with_read_marker_chance(1.0)
        .with_read_bump_chance(0.0)
}

/// Open a session over the default cast, the given backend and a fresh
/// in-memory store.
pub fn session_with(backend: Arc<dyn ChatBackend>) -> (Arc<MemoryKv>, ChatSession) {
    let store = Arc::new(MemoryKv::new());
    let kv: Arc<dyn KvStore> = store.clone();
    let session = ChatSession::open(Roster::default_cast(), backend, kv, quiet_config());
    (store, session)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_generator_plays_script_then_empty() {
        let generator = ScriptedGenerator::new()
            .with_text("one")
            .with_error(ProviderError::Network("x".into()));

        let params = GenerationParams::default();
        assert_eq!(generator.generate("a", params).await.unwrap(), "one");
        assert!(generator.generate("b", params).await.is_err());
        assert_eq!(generator.generate("c", params).await.unwrap(), "[]");
        assert_eq!(generator.prompts(), vec!["a", "b", "c"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backend_delay_uses_virtual_time() {
        let backend = ScriptedBackend::new().with_delayed_data(Duration::from_secs(60), "[]");
        let request = ChatRequest {
            user_text: "hi".into(),
            memory: String::new(),
            characters: Vec::new(),
        };

        let start = tokio::time::Instant::now();
        assert_eq!(backend.fetch(&request).await.unwrap(), "[]");
        assert!(start.elapsed() >= Duration::from_secs(60));
        assert_eq!(backend.call_count(), 1);
    }
}
