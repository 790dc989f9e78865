//! The `/v1/chat/completions` entry point.
//!
//! Injects the tool catalog, forwards to upstream and decides what the caller
//! gets back: the raw token stream, the upstream response unchanged, or the
//! final answer of the tool-call loop.

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use serde_json::Value;

use crate::inference::types::first_choice_tool_calls;

use super::errors::ProxyError;
use super::resolver::{Resolution, ToolCallResolver};
use super::ProxyState;

// ─── Header Filtering ────────────────────────────────────────────────────────

/// Dropped from the inbound request before forwarding. Hop-by-hop headers,
/// framing that no longer matches the re-encoded body, and `accept-encoding`
/// so the upstream answers uncompressed.
const REQUEST_EXCLUDED_HEADERS: &[&str] = &[
    "host",
    "content-length",
    "content-encoding",
    "transfer-encoding",
    "connection",
    "keep-alive",
    "upgrade",
    "proxy-connection",
    "te",
    "trailer",
    "accept-encoding",
];

/// Dropped from an upstream response before relaying it.
const RESPONSE_EXCLUDED_HEADERS: &[&str] = &[
    "content-length",
    "transfer-encoding",
    "connection",
    "keep-alive",
    "upgrade",
    "proxy-connection",
    "te",
    "trailer",
];

fn filter_headers(headers: &HeaderMap, excluded: &[&str]) -> HeaderMap {
    headers
        .iter()
        .filter(|(name, _)| !excluded.contains(&name.as_str()))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

// ─── Forwarding ──────────────────────────────────────────────────────────────

/// Handle one chat completion request end to end.
pub async fn forward_chat_completion(
    state: &ProxyState,
    headers: &HeaderMap,
    raw_body: Bytes,
) -> Result<Response, ProxyError> {
    let mut body = parse_body(&raw_body)?;
    let headers = filter_headers(headers, REQUEST_EXCLUDED_HEADERS);

    if state.enable_mcp {
        inject_tools(state, &mut body);
    }
    let stream = body.get("stream").and_then(Value::as_bool).unwrap_or(false);

    let upstream = state
        .upstream
        .post_chat_completion(&headers, &body, stream)
        .await?;
    tracing::info!(status = upstream.status.as_u16(), stream, "upstream responded");

    if stream && upstream.status == StatusCode::OK {
        return Ok(stream_response(upstream.into_parts().2));
    }

    let status = upstream.status;
    let upstream_headers = upstream.headers.clone();
    let bytes = upstream.bytes().await?;

    if status != StatusCode::OK || !state.enable_mcp {
        return Ok(relay_response(status, &upstream_headers, bytes));
    }

    let response: Value = match serde_json::from_slice(&bytes) {
        Ok(parsed) => parsed,
        Err(e) => {
            tracing::warn!(error = %e, "could not parse upstream response as JSON");
            return Ok(relay_response(status, &upstream_headers, bytes));
        }
    };

    let Value::Object(body) = body else {
        return Ok(relay_response(status, &upstream_headers, bytes));
    };
    if first_choice_tool_calls(&response).is_none() {
        return Ok(relay_response(status, &upstream_headers, bytes));
    }

    let resolver = ToolCallResolver::new(
        &state.registry,
        state.upstream.as_ref(),
        state.max_iterations,
    );
    match resolver.resolve(body, &headers, response).await? {
        Resolution::Final(value) => Ok((StatusCode::OK, Json(value)).into_response()),
        Resolution::Relay {
            status,
            headers,
            body,
        } => Ok(relay_response(status, &headers, body)),
    }
}

/// An empty body is an empty object.
fn parse_body(raw: &[u8]) -> Result<Value, ProxyError> {
    if raw.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Object(Default::default()));
    }
    serde_json::from_slice(raw).map_err(ProxyError::MalformedRequest)
}

/// Add the catalog unless the caller brought its own `tools`.
fn inject_tools(state: &ProxyState, body: &mut Value) {
    let Value::Object(map) = body else {
        return;
    };
    if map.contains_key("tools") {
        tracing::debug!("request carries its own tools, leaving them");
        return;
    }
    let tools = state.registry.to_openai_tools();
    if tools.is_empty() {
        return;
    }
    tracing::debug!(count = tools.len(), "injecting MCP tools");
    map.insert("tools".into(), Value::Array(tools));
}

fn stream_response(body: crate::inference::client::ByteStream) -> Response {
    let mut response = Response::new(Body::from_stream(body));
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/event-stream"),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    response
}

fn relay_response(status: StatusCode, headers: &HeaderMap, body: Bytes) -> Response {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    *response.headers_mut() = filter_headers(headers, RESPONSE_EXCLUDED_HEADERS);
    response
}

// ─── Tests ───────────────────────────────────────────────────────────────────
