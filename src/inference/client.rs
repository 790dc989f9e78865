//! Upstream chat-completion client.
//!
//! Posts request bodies to `{base}/v1/chat/completions` on an
//! OpenAI-compatible server and hands back status, headers and the body as a
//! byte stream. Buffered and streaming requests use separate HTTP clients so
//! a long token stream is not cut off by the buffered-request timeout.

use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use reqwest::header::HeaderMap;
use reqwest::{Client as HttpClient, StatusCode};
use serde_json::Value;

use super::errors::InferenceError;

// ─── Constants ───────────────────────────────────────────────────────────────

/// TCP connection timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Minimum total timeout for streaming calls.
///
/// The model may spend a long time on a large context before the first token.
const STREAM_REQUEST_TIMEOUT: Duration = Duration::from_secs(180);

/// Path appended to the configured base URL.
pub const CHAT_COMPLETIONS_PATH: &str = "/v1/chat/completions";

// ─── Response ────────────────────────────────────────────────────────────────

/// Response body as it arrives from upstream.
pub type ByteStream = BoxStream<'static, Result<Bytes, InferenceError>>;

/// An upstream response whose body has not been read yet.
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    body: ByteStream,
}

impl UpstreamResponse {
    pub fn new(status: StatusCode, headers: HeaderMap, body: ByteStream) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// A response with a body that is already in memory.
    pub fn from_bytes(status: StatusCode, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        let body: Bytes = body.into();
        Self::new(status, headers, stream::once(async move { Ok::<_, InferenceError>(body) }).boxed())
    }

    /// Read the whole body.
    pub async fn bytes(self) -> Result<Bytes, InferenceError> {
        let mut body = self.body;
        let mut buf = BytesMut::new();
        while let Some(chunk) = body.next().await {
            buf.extend_from_slice(&chunk?);
        }
        Ok(buf.freeze())
    }

    /// Split into status, headers and the unread body.
    pub fn into_parts(self) -> (StatusCode, HeaderMap, ByteStream) {
        (self.status, self.headers, self.body)
    }
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Something that answers chat completion requests.
#[async_trait]
pub trait ChatUpstream: Send + Sync {
    /// POST `body` with the given (already filtered) headers.
    ///
    /// `stream` selects the long-lived client for token streams. A non-2xx
    /// status is a normal response, not an error.
    async fn post_chat_completion(
        &self,
        headers: &HeaderMap,
        body: &Value,
        stream: bool,
    ) -> Result<UpstreamResponse, InferenceError>;
}

// ─── UpstreamClient ──────────────────────────────────────────────────────────

/// HTTP implementation of [`ChatUpstream`].
pub struct UpstreamClient {
    /// HTTP client for buffered requests.
    http: HttpClient,
    /// HTTP client for streaming requests.
    http_stream: HttpClient,
    endpoint: String,
    request_timeout: Duration,
}

impl UpstreamClient {
    /// Create a client for the API rooted at `base_url`.
    ///
    /// Does NOT check connectivity; that happens on the first request.
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self, InferenceError> {
        let endpoint = format!("{}{CHAT_COMPLETIONS_PATH}", base_url.trim_end_matches('/'));

        let http = HttpClient::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(request_timeout)
            .build()
            .map_err(|e| InferenceError::ConfigError {
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        let http_stream = HttpClient::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(STREAM_REQUEST_TIMEOUT.max(request_timeout))
            .build()
            .map_err(|e| InferenceError::ConfigError {
                reason: format!("failed to build streaming HTTP client: {e}"),
            })?;

        Ok(Self {
            http,
            http_stream,
            endpoint,
            request_timeout,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn map_send_error(&self, e: reqwest::Error, stream: bool) -> InferenceError {
        if e.is_timeout() {
            let limit = if stream {
                STREAM_REQUEST_TIMEOUT.max(self.request_timeout)
            } else {
                self.request_timeout
            };
            InferenceError::Timeout {
                duration_secs: limit.as_secs(),
            }
        } else {
            InferenceError::ConnectionFailed {
                endpoint: self.endpoint.clone(),
                reason: e.to_string(),
            }
        }
    }
}

#[async_trait]
impl ChatUpstream for UpstreamClient {
    async fn post_chat_completion(
        &self,
        headers: &HeaderMap,
        body: &Value,
        stream: bool,
    ) -> Result<UpstreamResponse, InferenceError> {
        // Log the request metadata (not the full body, it can be huge)
        let model = body.get("model").and_then(|m| m.as_str()).unwrap_or("-");
        let count = |key: &str| body.get(key).and_then(|v| v.as_array()).map_or(0, Vec::len);
        tracing::debug!(
            url = %self.endpoint,
            model,
            message_count = count("messages"),
            tool_count = count("tools"),
            stream,
            "upstream request"
        );

        let client = if stream { &self.http_stream } else { &self.http };
        let response = client
            .post(&self.endpoint)
            .headers(headers.clone())
            .json(body)
            .send()
            .await
            .map_err(|e| self.map_send_error(e, stream))?;

        let status = response.status();
        let headers = response.headers().clone();
        tracing::debug!(status = status.as_u16(), "upstream response");

        let body = response
            .bytes_stream()
            .map(|chunk| {
                chunk.map_err(|e| InferenceError::StreamError {
                    reason: e.to_string(),
                })
            })
            .boxed();

        Ok(UpstreamResponse::new(status, headers, body))
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
