//! The text-generation seam.
//!
//! [`GenerationClient`] is the one place the engine reaches a model
//! provider. Every call is bounded by [`generate`], which enforces the
//! request timeout by dropping the in-flight provider future at the
//! deadline.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Default upper bound on one provider call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(25_000);

/// Errors from the generation provider.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("Missing provider credentials")]
    MissingCredentials,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Provider returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Provider timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("Malformed provider response: {0}")]
    Malformed(String),
}

impl From<gemini::Error> for ProviderError {
    fn from(e: gemini::Error) -> Self {
        match e {
            gemini::Error::NoApiKey => ProviderError::MissingCredentials,
            gemini::Error::Network(msg) => ProviderError::Network(msg),
            gemini::Error::Timeout => ProviderError::Timeout(gemini::REQUEST_TIMEOUT),
            gemini::Error::Api { status, message } => ProviderError::Status { status, message },
            gemini::Error::Parse(msg) => ProviderError::Malformed(msg),
            gemini::Error::Config(msg) => ProviderError::Network(msg),
        }
    }
}

/// Sampling parameters sent with every request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    pub max_tokens: usize,
    pub temperature: f32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_tokens: 220,
            temperature: 0.8,
        }
    }
}

/// A provider that turns a prompt into free-form text.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    /// Perform exactly one generation call. No retries.
    async fn generate(&self, prompt: &str, params: GenerationParams)
        -> Result<String, ProviderError>;
}

#[async_trait]
impl GenerationClient for gemini::Gemini {
    async fn generate(
        &self,
        prompt: &str,
        params: GenerationParams,
    ) -> Result<String, ProviderError> {
        let request = gemini::Request::new(prompt)
            .with_max_tokens(params.max_tokens)
            .with_temperature(params.temperature);

        let response = gemini::Gemini::generate(self, request).await?;
        Ok(response.text)
    }
}

/// Run one generation call under a hard deadline.
///
/// When the deadline passes the provider future is dropped, which aborts
/// its outbound request, and the call fails with [`ProviderError::Timeout`].
pub async fn generate(
    client: &dyn GenerationClient,
    prompt: &str,
    params: GenerationParams,
    timeout: Duration,
) -> Result<String, ProviderError> {
    match tokio::time::timeout(timeout, client.generate(prompt, params)).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(timeout_ms = timeout.as_millis() as u64, "generation call timed out");
            Err(ProviderError::Timeout(timeout))
        }
    }
}
