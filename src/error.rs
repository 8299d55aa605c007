use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use serde_json::json;
use thiserror::Error;

/// Error type for the request pipeline.
///
/// Size and shape errors surface directly without any payment attempt.
/// Upstream errors are recovered by the fallback chain and only reach the
/// client once the chain is exhausted.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// JSON parse failure, missing/invalid `messages`, invalid `max_tokens`.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Pre- or post-compression body exceeds the configured limit.
    #[error("request body exceeds {limit_kb} KB")]
    RequestTooLarge { limit_kb: usize },

    /// A dedup waiter was woken by origin failure.
    #[error("original request failed, please retry")]
    DedupOriginFailed,

    /// Every fallback and the emergency model failed. Carries the last
    /// upstream error so the client sees what the provider said.
    #[error("all upstream models failed")]
    Exhausted { status: u16, body: Bytes },

    /// Signer failure or invariant violation.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ProxyError {
    /// Wire-level `error.type` string.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "bad_request",
            Self::RequestTooLarge { .. } => "request_too_large",
            Self::DedupOriginFailed => "dedup_origin_failed",
            Self::Exhausted { .. } => "exhausted",
            Self::Internal(_) => "internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::RequestTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::DedupOriginFailed => StatusCode::SERVICE_UNAVAILABLE,
            Self::Exhausted { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// OpenAI-style error body: `{"error":{"message":...,"type":...}}`.
pub fn error_body(message: &str, kind: &str) -> serde_json::Value {
    json!({
        "error": {
            "message": message,
            "type": kind,
        }
    })
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            // Pass the last upstream error body through untouched when it
            // looks like JSON; otherwise wrap it.
            Self::Exhausted { body, .. } => {
                if serde_json::from_slice::<serde_json::Value>(&body).is_ok() {
                    (
                        status,
                        [(axum::http::header::CONTENT_TYPE, "application/json")],
                        body,
                    )
                        .into_response()
                } else {
                    (
                        status,
                        axum::Json(error_body("all upstream models failed", "exhausted")),
                    )
                        .into_response()
                }
            }
            other => {
                let body = error_body(&other.to_string(), other.kind());
                (status, axum::Json(body)).into_response()
            }
        }
    }
}
