//! The `/api/chat` endpoint.
//!
//! Accepts `{userText, memory, characters}`, runs one generation through a
//! [`ChatBackend`] and answers `{ok: true, data}` where `data` is the reply
//! array as JSON text. Failures answer `{ok: false, error}`.

use crate::config::ServerConfig;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{header, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use chatroom_core::{ChatBackend, ChatEnvelope, ChatRequest, Character, DirectBackend, ProviderError};
use serde_json::Value;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Route the endpoint is served on.
pub const CHAT_PATH: &str = "/api/chat";

/// API error type
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("Method not allowed")]
    MethodNotAllowed,

    #[error("Missing GEMINI_API_KEY")]
    MissingCredentials,

    #[error("{0}")]
    Provider(ProviderError),
}

impl From<ProviderError> for ApiError {
    fn from(e: ProviderError) -> Self {
        match e {
            ProviderError::MissingCredentials => ApiError::MissingCredentials,
            other => ApiError::Provider(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::MissingCredentials | ApiError::Provider(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        if status.is_server_error() {
            tracing::warn!(error = %self, "chat request failed");
        }

        (status, Json(ChatEnvelope::failure(self.to_string()))).into_response()
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// `None` when no provider credentials are configured.
    backend: Option<Arc<dyn ChatBackend>>,
}

impl AppState {
    pub fn new(backend: Arc<dyn ChatBackend>) -> Self {
        Self {
            backend: Some(backend),
        }
    }

    /// State for a server started without credentials. Every request
    /// answers 500.
    pub fn without_credentials() -> Self {
        Self { backend: None }
    }

    /// Build the Gemini backend from the environment.
    pub fn from_config(config: &ServerConfig) -> Self {
        match DirectBackend::gemini(&config.session_config()) {
            Ok(backend) => Self::new(Arc::new(backend)),
            Err(e) => {
                tracing::warn!(error = %e, "no generation backend, requests will fail");
                Self::without_credentials()
            }
        }
    }

    pub fn has_backend(&self) -> bool {
        self.backend.is_some()
    }
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route(
            CHAT_PATH,
            post(chat).options(preflight).fallback(method_not_allowed),
        )
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

async fn chat(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<ChatEnvelope>, ApiError> {
    // Credentials are checked before the body is looked at.
    let backend = state.backend.clone().ok_or(ApiError::MissingCredentials)?;

    let Json(payload) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let request = decode_request(&payload)?;

    tracing::debug!(
        user_chars = request.user_text.len(),
        characters = request.characters.len(),
        "chat request"
    );
    let data = backend.fetch(&request).await?;
    Ok(Json(ChatEnvelope::success(data)))
}

async fn preflight() -> StatusCode {
    StatusCode::OK
}

async fn method_not_allowed() -> ApiError {
    ApiError::MethodNotAllowed
}

/// Decode a request body, tolerating missing or mistyped optional fields.
fn decode_request(payload: &Value) -> Result<ChatRequest, ApiError> {
    let user_text = payload
        .get("userText")
        .and_then(Value::as_str)
        .filter(|text| !text.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("userText is required".to_string()))?;

    let memory = payload
        .get("memory")
        .and_then(Value::as_str)
        .unwrap_or_default();

    let characters = payload
        .get("characters")
        .and_then(Value::as_array)
        .map(|items| items.iter().map(Character::from_value).collect())
        .unwrap_or_default();

    Ok(ChatRequest {
        user_text: user_text.to_string(),
        memory: memory.to_string(),
        characters,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use chatroom_core::ScriptedGenerator;
    use std::time::Duration;
    use tower::ServiceExt;

    fn scripted(generator: ScriptedGenerator) -> (Arc<ScriptedGenerator>, Router) {
        let generator = Arc::new(generator);
        let backend = DirectBackend::new(generator.clone());
        (generator, router(AppState::new(Arc::new(backend))))
    }

    fn post_json(body: impl Into<Body>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(CHAT_PATH)
            .header("Content-Type", "application/json")
            .body(body.into())
            .unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_chat_returns_extracted_array() {
        let (generator, app) = scripted(
            ScriptedGenerator::new()
                .with_text("Here you go:\n```json\n[{\"speaker\":\"mina\",\"text\":\"hi\"}]\n```"),
        );

        let body = serde_json::json!({
            "userText": "hello",
            "memory": "[recent]\nme: hello",
            "characters": [{"id": " mina ", "name": "Mina", "style": "observer"}],
        });
        let response = app.oneshot(post_json(body.to_string())).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["ok"], true);
        assert_eq!(json["data"], r#"[{"speaker":"mina","text":"hi"}]"#);

        let prompt = &generator.prompts()[0];
        assert!(prompt.contains("- mina: Mina / style: observer"));
        assert!(prompt.ends_with("# User message\nhello"));
    }

    #[tokio::test]
    async fn test_missing_user_text_is_400() {
        let (generator, app) = scripted(ScriptedGenerator::new());

        for body in [r#"{"memory":"x"}"#, r#"{"userText":42}"#, r#"{"userText":"  "}"#] {
            let response = app.clone().oneshot(post_json(body)).await.unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            let json = body_json(response).await;
            assert_eq!(json["ok"], false);
            assert_eq!(json["error"], "userText is required");
        }
        assert_eq!(generator.call_count(), 0);
    }

    #[tokio::test]
    async fn test_malformed_json_is_400() {
        let (_, app) = scripted(ScriptedGenerator::new());
        let response = app.oneshot(post_json("{not json")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["ok"], false);
    }

    #[tokio::test]
    async fn test_missing_credentials_checked_first() {
        let app = router(AppState::without_credentials());

        let response = app.oneshot(post_json("{not json")).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = body_json(response).await;
        assert_eq!(json["error"], "Missing GEMINI_API_KEY");
    }

    #[tokio::test]
    async fn test_other_methods_are_405() {
        let (_, app) = scripted(ScriptedGenerator::new());
        let response = app
            .oneshot(Request::builder().uri(CHAT_PATH).body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        let json = body_json(response).await;
        assert_eq!(json["error"], "Method not allowed");
    }

    #[tokio::test]
    async fn test_options_is_200_with_cors() {
        let (_, app) = scripted(ScriptedGenerator::new());

        let plain = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("OPTIONS")
                    .uri(CHAT_PATH)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(plain.status(), StatusCode::OK);

        let preflight = app
            .oneshot(
                Request::builder()
                    .method("OPTIONS")
                    .uri(CHAT_PATH)
                    .header("Origin", "http://example.com")
                    .header("Access-Control-Request-Method", "POST")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(preflight.status(), StatusCode::OK);
        assert_eq!(
            preflight.headers().get("access-control-allow-origin").unwrap(),
            "*"
        );
    }

    #[tokio::test]
    async fn test_provider_failure_is_500() {
        let (_, app) = scripted(ScriptedGenerator::new().with_error(ProviderError::Status {
            status: 503,
            message: "overloaded".to_string(),
        }));

        let response = app
            .oneshot(post_json(r#"{"userText":"hi"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = body_json(response).await;
        assert_eq!(json["ok"], false);
        assert_eq!(json["error"], "Provider returned status 503: overloaded");
    }

    #[tokio::test(start_paused = true)]
    async fn test_provider_timeout_is_500() {
        let (_, app) = scripted(
            ScriptedGenerator::new().with_delayed_text(Duration::from_secs(40), "[]"),
        );

        let response = app
            .oneshot(post_json(r#"{"userText":"hi"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body_json(response).await["error"],
            "Provider timed out after 25000ms"
        );
    }

    #[test]
    fn test_decode_request_tolerates_shapes() {
        let payload = serde_json::json!({
            "userText": "yo",
            "memory": 17,
            "characters": [{"id": "juno"}, "not an object"],
        });
        let request = decode_request(&payload).unwrap();
        assert_eq!(request.memory, "");
        assert_eq!(request.characters.len(), 2);
        assert_eq!(request.characters[0].id, "juno");
        assert_eq!(request.characters[0].name, "");
    }
}
