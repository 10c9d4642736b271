//! Where a turn's replies come from.
//!
//! The engine hands a [`ChatRequest`] to a [`ChatBackend`] and gets back
//! reply-array text. [`DirectBackend`] talks to a generation provider itself
//! (this is also what the HTTP endpoint runs); [`RemoteBackend`] posts the
//! request to a running `/api/chat` endpoint.

use crate::extract::extract_json_array;
use crate::generation::{self, GenerationClient, GenerationParams, ProviderError, DEFAULT_TIMEOUT};
use crate::persona::Character;
use crate::prompt::build_chat_prompt;
use crate::session::SessionConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Everything a backend needs to produce one turn of replies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub user_text: String,
    pub memory: String,
    pub characters: Vec<Character>,
}

/// Produces reply-array text for a chat request.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn fetch(&self, request: &ChatRequest) -> Result<String, ProviderError>;
}

/// Builds the prompt locally and calls a generation provider.
pub struct DirectBackend {
    client: Arc<dyn GenerationClient>,
    params: GenerationParams,
    timeout: Duration,
}

impl DirectBackend {
    pub fn new(client: Arc<dyn GenerationClient>) -> Self {
        Self {
            client,
            params: GenerationParams::default(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Create a backend for Gemini using the GEMINI_API_KEY environment variable.
    pub fn gemini_from_env() -> Result<Self, ProviderError> {
        let client = gemini::Gemini::from_env()?;
        Ok(Self::new(Arc::new(client)))
    }

    /// Create a Gemini backend with the model, sampling parameters and
    /// timeout taken from `config`.
    pub fn gemini(config: &SessionConfig) -> Result<Self, ProviderError> {
        let mut client = gemini::Gemini::from_env()?;
        if let Some(model) = &config.model {
            client = client.with_model(model);
        }
        Ok(Self::new(Arc::new(client))
            .with_params(config.generation_params())
            .with_timeout(config.request_timeout))
    }

    pub fn with_params(mut self, params: GenerationParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn params(&self) -> GenerationParams {
        self.params
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl ChatBackend for DirectBackend {
    async fn fetch(&self, request: &ChatRequest) -> Result<String, ProviderError> {
        let prompt = build_chat_prompt(&request.user_text, &request.memory, &request.characters);
        let raw = generation::generate(self.client.as_ref(), &prompt, self.params, self.timeout).await?;
        Ok(extract_json_array(&raw))
    }
}

/// Response envelope of the `/api/chat` endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatEnvelope {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ChatEnvelope {
    pub fn success(data: impl Into<String>) -> Self {
        Self {
            ok: true,
            data: Some(data.into()),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(error.into()),
        }
    }
}

/// Posts chat requests to a remote `/api/chat` endpoint.
#[derive(Clone)]
pub struct RemoteBackend {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl RemoteBackend {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            // Leave the endpoint room to report its own provider timeout.
            timeout: DEFAULT_TIMEOUT + Duration::from_secs(5),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn post(&self, request: &ChatRequest) -> Result<String, ProviderError> {
        let response = self
            .client
            .post(&self.url)
            .json(request)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        interpret_envelope(status, &body)
    }
}

#[async_trait]
impl ChatBackend for RemoteBackend {
    async fn fetch(&self, request: &ChatRequest) -> Result<String, ProviderError> {
        match tokio::time::timeout(self.timeout, self.post(request)).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout(self.timeout)),
        }
    }
}

/// Turn an endpoint response into reply-array text or a provider error.
fn interpret_envelope(status: u16, body: &str) -> Result<String, ProviderError> {
    let envelope: ChatEnvelope = serde_json::from_str(body).map_err(|e| {
        if (200..300).contains(&status) {
            ProviderError::Malformed(e.to_string())
        } else {
            ProviderError::Status {
                status,
                message: body.to_string(),
            }
        }
    })?;

    match envelope {
        ChatEnvelope {
            ok: true,
            data: Some(data),
            ..
        } => Ok(data),
        ChatEnvelope { error, .. } => Err(ProviderError::Status {
            status,
            message: error.unwrap_or_else(|| "API error".to_string()),
        }),
    }
}
