//! Route configuration.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::HeaderMap;
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;

use super::errors::ProxyError;
use super::forwarder::forward_chat_completion;
use super::ProxyState;

/// Conversations carry whole tool outputs, so the default 2 MB limit is too low.
const MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

/// Creates the proxy router.
///
/// Routes:
/// - `POST /v1/chat/completions` - Forward with tool orchestration
/// - `GET /health` - Liveness, independent of provider state
pub fn router(state: Arc<ProxyState>) -> Router {
    Router::new()
        .route("/v1/chat/completions", post(chat_completions))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn chat_completions(
    State(state): State<Arc<ProxyState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ProxyError> {
    forward_chat_completion(&state, &headers, body).await
}

async fn health() -> Json<Value> {
    Json(json!({"status": "healthy", "service": "mcp-proxy"}))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::testing::{
        completion, registry_of, tool_call_completion, FakeToolClient, ScriptedUpstream,
    };
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn app(upstream: ScriptedUpstream) -> Router {
        router(Arc::new(ProxyState {
            registry: Arc::new(registry_of(vec![FakeToolClient::files()])),
            upstream: Arc::new(upstream),
            enable_mcp: true,
            max_iterations: 3,
        }))
    }

    async fn json_body(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let response = app(ScriptedUpstream::new(vec![]))
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            json_body(response).await,
            json!({"status": "healthy", "service": "mcp-proxy"})
        );
    }

    #[tokio::test]
    async fn test_malformed_body_is_400_and_not_forwarded() {
        let upstream = Arc::new(ScriptedUpstream::new(vec![(200, completion("x"))]));
        let app = router(Arc::new(ProxyState {
            registry: Arc::new(registry_of(vec![])),
            upstream: upstream.clone(),
            enable_mcp: true,
            max_iterations: 3,
        }));

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/v1/chat/completions")
                    .header("content-type", "application/json")
                    .body(Body::from("{not json"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            json_body(response).await,
            json!({"error": "Invalid JSON in request body"})
        );
        assert!(upstream.requests().is_empty());
    }

    #[tokio::test]
    async fn test_chat_completion_round_trip() {
        let response = app(ScriptedUpstream::new(vec![(200, completion("hi there"))]))
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/v1/chat/completions")
                    .header("authorization", "Bearer sk-test")
                    .body(Body::from(r#"{"messages":[{"role":"user","content":"hi"}]}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            json_body(response).await["choices"][0]["message"]["content"],
            "hi there"
        );
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let response = app(ScriptedUpstream::new(vec![]))
            .oneshot(Request::builder().uri("/v1/models").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_exhausted_budget_is_500_with_last_response() {
        let looping = tool_call_completion(&[("c1", "files.read", "{}")]);
        let upstream = Arc::new(ScriptedUpstream::new(vec![(200, looping.clone()); 3]));
        let app = router(Arc::new(ProxyState {
            registry: Arc::new(registry_of(vec![FakeToolClient::files()])),
            upstream: upstream.clone(),
            enable_mcp: true,
            max_iterations: 2,
        }));

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/v1/chat/completions")
                    .body(Body::from(r#"{"messages":[{"role":"user","content":"loop"}]}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = json_body(response).await;
        assert!(body["error"]
            .as_str()
            .unwrap()
            .starts_with("Reached max iteration of 2"));
        assert_eq!(body["max_iteration"], 2);
        assert_eq!(body["last_response"], looping);
        assert_eq!(upstream.requests().len(), 3);
    }
}
