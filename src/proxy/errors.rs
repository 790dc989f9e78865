//! Request-level failures and their HTTP rendering.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use crate::inference::InferenceError;

/// Errors that end a `/v1/chat/completions` request.
///
/// Everything a single provider or tool call can get wrong is absorbed into
/// tool-result text before it gets here.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// The inbound body is not valid JSON. Nothing was forwarded.
    #[error("Invalid JSON in request body")]
    MalformedRequest(#[source] serde_json::Error),

    /// The upstream could not be reached or its body could not be read.
    #[error("upstream request failed: {0}")]
    Upstream(#[from] InferenceError),

    /// The model kept calling tools for `max` follow-up rounds.
    #[error("Reached max iteration of {max} without a final response")]
    IterationBudgetExceeded {
        max: u32,
        /// The last upstream response, whose tool calls were left unresolved.
        last_response: serde_json::Value,
    },

    /// A message could not be encoded back into the conversation.
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::MalformedRequest(_) => StatusCode::BAD_REQUEST,
            ProxyError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ProxyError::IterationBudgetExceeded { .. } | ProxyError::Encode(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            ProxyError::MalformedRequest(_) => serde_json::json!({ "error": self.to_string() }),
            ProxyError::Upstream(e) => serde_json::json!({
                "error": if e.is_unreachable() {
                    "Upstream unavailable"
                } else {
                    "Upstream request failed"
                },
                "detail": self.to_string(),
            }),
            ProxyError::IterationBudgetExceeded { max, last_response } => serde_json::json!({
                "error": self.to_string(),
                "max_iteration": max,
                "last_response": last_response,
            }),
            ProxyError::Encode(_) => serde_json::json!({ "error": "Internal server error" }),
        };

        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self, "request failed");
        } else {
            tracing::warn!(status = status.as_u16(), error = %self, "request rejected");
        }

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn malformed() -> ProxyError {
        let err = serde_json::from_str::<serde_json::Value>("{oops").unwrap_err();
        ProxyError::MalformedRequest(err)
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(malformed().status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ProxyError::Upstream(InferenceError::Timeout { duration_secs: 60 }).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ProxyError::IterationBudgetExceeded {
                max: 3,
                last_response: serde_json::json!({}),
            }
            .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_malformed_message_matches_wire_contract() {
        assert_eq!(malformed().to_string(), "Invalid JSON in request body");
    }
}
