use axum::{
    Json,
    body::Body,
    extract::{State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use futures::stream::StreamExt;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;

use crate::error::{ErrorBody, RelayError};
use crate::relay::{GenerationRequest, Identity};

use super::AppState;

/// Header carrying the caller's user id
pub const USER_ID_HEADER: &str = "x-user-id";
/// Header carrying the caller's email address
pub const USER_EMAIL_HEADER: &str = "x-user-email";

/// Request body of `POST /api/chat`
#[derive(Debug, Deserialize)]
pub struct ChatBody {
    pub model: String,
    pub prompt: String,
    #[serde(default)]
    pub system: Option<String>,
    #[serde(default)]
    pub options: Option<ChatOptions>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ChatOptions {
    #[serde(default)]
    pub temperature: Option<f32>,
}

impl ChatBody {
    fn into_request(self, identity: Identity) -> GenerationRequest {
        let mut request = GenerationRequest::new(self.model, self.prompt).with_identity(identity);
        if let Some(system) = self.system {
            request = request.with_system_prompt(system);
        }
        if let Some(temperature) = self.options.and_then(|o| o.temperature) {
            request = request.with_temperature(temperature);
        }
        request
    }
}

/// JSON error returned by `/api/chat`
#[derive(Debug, Serialize)]
pub struct ChatError {
    pub error: &'static str,
    #[serde(flatten)]
    pub body: ErrorBody,
}

/// Health check endpoint - returns JSON status
pub async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

/// Open a relay and stream its text back as the response body
pub async fn chat_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Result<Json<ChatBody>, JsonRejection>,
) -> Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => {
            tracing::warn!(error_type = "invalid_request", "Rejected chat request: {rejection}");
            return create_error_response(
                StatusCode::BAD_REQUEST,
                ChatError {
                    error: "Bad Request",
                    body: ErrorBody {
                        kind: "invalid_request".to_string(),
                        message: rejection.body_text(),
                        suggestion: None,
                    },
                },
            );
        }
    };

    let request = body.into_request(identity_from_headers(&headers));

    match state.relay.open(request).await {
        Ok(stream) => Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
            .header(header::CACHE_CONTROL, "no-cache")
            .body(Body::from_stream(stream.map(Ok::<_, Infallible>)))
            .unwrap_or_else(|e| internal_error_response(&e.to_string())),
        Err(e) => relay_error_response(&e),
    }
}

fn identity_from_headers(headers: &HeaderMap) -> Identity {
    let value = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };

    Identity {
        id: value(USER_ID_HEADER),
        email: value(USER_EMAIL_HEADER),
    }
}

/// Status code for a classified relay failure
pub fn status_for(error: &RelayError) -> StatusCode {
    match error {
        RelayError::Connection { .. } | RelayError::Upstream(_) => StatusCode::BAD_GATEWAY,
        RelayError::Timeout => StatusCode::GATEWAY_TIMEOUT,
        RelayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn relay_error_response(error: &RelayError) -> Response {
    let label = if error.is_upstream_side() {
        "Ollama Error"
    } else {
        "Internal Server Error"
    };

    create_error_response(
        status_for(error),
        ChatError {
            error: label,
            body: error.to_body(),
        },
    )
}

fn internal_error_response(message: &str) -> Response {
    relay_error_response(&RelayError::Internal(message.to_string()))
}

fn create_error_response(status: StatusCode, error: ChatError) -> Response {
    (status, Json(error)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::error::CONNECTION_HINT;
    use crate::server::create_router;
    use axum::http::Request;
    use tower::ServiceExt;

    fn test_state(base_url: &str) -> Arc<AppState> {
        let mut config = Config::default();
        config.upstream.base_url = base_url.to_string();
        config.upstream.timeout_ms = 5_000;
        Arc::new(AppState::new(&config).unwrap())
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn chat_request(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/chat")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_check() {
        let app = create_router(test_state("http://127.0.0.1:11434"));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn test_invalid_body_is_bad_request() {
        let app = create_router(test_state("http://127.0.0.1:11434"));

        let response = app.oneshot(chat_request("{\"model\":")).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["error"], "Bad Request");
        assert_eq!(json["kind"], "invalid_request");
    }

    #[tokio::test]
    async fn test_missing_prompt_is_bad_request() {
        let app = create_router(test_state("http://127.0.0.1:11434"));

        let response = app
            .oneshot(chat_request(r#"{"model":"llama3"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unreachable_upstream_maps_to_bad_gateway() {
        // Nothing listens on port 1
        let app = create_router(test_state("http://127.0.0.1:1"));

        let response = app
            .oneshot(chat_request(r#"{"model":"llama3","prompt":"hi"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let json = body_json(response).await;
        assert_eq!(json["error"], "Ollama Error");
        assert_eq!(json["kind"], "connection");
        assert_eq!(json["suggestion"], CONNECTION_HINT);
        assert!(json["message"].as_str().unwrap().contains("127.0.0.1:1"));
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_for(&RelayError::Upstream("x".into())),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_for(&RelayError::Connection { host: "h".into() }),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(status_for(&RelayError::Timeout), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(
            status_for(&RelayError::Internal("x".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_internal_error_label() {
        let response = relay_error_response(&RelayError::Internal("boom".into()));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let json = body_json(response).await;
        assert_eq!(json["error"], "Internal Server Error");
        assert_eq!(json["message"], "Internal error: boom");
        assert!(json.get("suggestion").is_none());
    }

    #[test]
    fn test_identity_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(USER_ID_HEADER, "u-42".parse().unwrap());
        headers.insert(USER_EMAIL_HEADER, "  ".parse().unwrap());

        let identity = identity_from_headers(&headers);
        assert_eq!(identity.id.as_deref(), Some("u-42"));
        assert!(identity.email.is_none());

        assert!(identity_from_headers(&HeaderMap::new()).is_empty());
    }

    #[test]
    fn test_chat_body_into_request() {
        let body: ChatBody = serde_json::from_str(
            r#"{"model":"llama3","prompt":"hi","system":"Be brief.","options":{"temperature":0.3}}"#,
        )
        .unwrap();
        let request = body.into_request(Identity::default());

        assert_eq!(request.model, "llama3");
        assert_eq!(request.system_prompt.as_deref(), Some("Be brief."));
        assert_eq!(request.temperature, Some(0.3));
        assert!(request.identity.is_none());
    }
}
