//! Server configuration.

use chatroom_core::SessionConfig;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_ADDR: &str = "127.0.0.1:3000";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid listen address {addr}: {reason}")]
    InvalidAddr { addr: String, reason: String },

    #[error("Request timeout must be greater than zero")]
    ZeroTimeout,
}

/// Configuration for the chat endpoint.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the HTTP listener binds to.
    pub listen_addr: SocketAddr,

    /// Generation model override.
    pub model: Option<String>,

    /// Upper bound on one provider call.
    pub request_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let session = SessionConfig::default();
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            model: None,
            request_timeout: session.request_timeout,
        }
    }
}

impl ServerConfig {
    /// Set the listen address from its textual form.
    pub fn with_listen_addr(mut self, addr: &str) -> Result<Self, ConfigError> {
        self.listen_addr = addr.parse().map_err(|e: std::net::AddrParseError| {
            ConfigError::InvalidAddr {
                addr: addr.to_string(),
                reason: e.to_string(),
            }
        })?;
        Ok(self)
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.request_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(())
    }

    /// Generation settings for the backend this server runs.
    pub fn session_config(&self) -> SessionConfig {
        let config = SessionConfig::default().with_request_timeout(self.request_timeout);
        match &self.model {
            Some(model) => config.with_model(model),
            None => config,
        }
    }
}
