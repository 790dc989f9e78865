//! Tool-call resolution loop.
//!
//! Given a request body and an upstream response that asks for tools, run
//! every call against its provider, fold the results into `messages` and ask
//! upstream again. Repeats until a response carries no tool calls or the
//! round budget runs out.

use axum::http::{HeaderMap, StatusCode};
use bytes::Bytes;
use serde_json::{Map, Value};

use crate::inference::types::first_choice_tool_calls;
use crate::inference::{ChatMessage, ChatUpstream, ToolCall};
use crate::mcp_client::schema::split_qualified;
use crate::mcp_client::ClientRegistry;

use super::errors::ProxyError;

/// How a resolution ended without error.
#[derive(Debug)]
pub enum Resolution {
    /// A parsed response with no tool calls left.
    Final(Value),
    /// A follow-up the proxy could not continue from (non-200 or not JSON),
    /// to be relayed to the caller unchanged.
    Relay {
        status: StatusCode,
        headers: HeaderMap,
        body: Bytes,
    },
}

/// Runs the tool-call loop for one inbound request.
pub struct ToolCallResolver<'a> {
    registry: &'a ClientRegistry,
    upstream: &'a dyn ChatUpstream,
    max_iterations: u32,
}

impl<'a> ToolCallResolver<'a> {
    pub fn new(
        registry: &'a ClientRegistry,
        upstream: &'a dyn ChatUpstream,
        max_iterations: u32,
    ) -> Self {
        Self {
            registry,
            upstream,
            max_iterations,
        }
    }

    /// Resolve `response`'s tool calls against the conversation in `body`.
    ///
    /// Each round appends one assistant message (empty content, the full call
    /// list) and one tool message per call, then re-submits the whole body.
    /// `tool_choice` is dropped before the first follow-up so a forced tool
    /// cannot loop forever.
    pub async fn resolve(
        &self,
        mut body: Map<String, Value>,
        headers: &HeaderMap,
        mut response: Value,
    ) -> Result<Resolution, ProxyError> {
        body.remove("tool_choice");
        let mut request = Value::Object(body);

        for round in 1..=self.max_iterations {
            let Some(calls) = first_choice_tool_calls(&response) else {
                return Ok(Resolution::Final(response));
            };
            let mut calls = calls.clone();
            tracing::info!(round, calls = calls.len(), "resolving tool calls");

            let appended = self.execute_round(&mut calls).await?;
            if let Value::Object(map) = &mut request {
                append_messages(map, appended);
            }

            let follow_up = self
                .upstream
                .post_chat_completion(headers, &request, false)
                .await?;

            let status = follow_up.status;
            let follow_headers = follow_up.headers.clone();
            let bytes = follow_up.bytes().await?;

            if status != StatusCode::OK {
                tracing::warn!(round, status = status.as_u16(), "follow-up request failed");
                return Ok(Resolution::Relay {
                    status,
                    headers: follow_headers,
                    body: bytes,
                });
            }

            response = match serde_json::from_slice(&bytes) {
                Ok(parsed) => parsed,
                Err(e) => {
                    tracing::warn!(round, error = %e, "follow-up response is not JSON");
                    return Ok(Resolution::Relay {
                        status,
                        headers: follow_headers,
                        body: bytes,
                    });
                }
            };
        }

        if first_choice_tool_calls(&response).is_some() {
            return Err(ProxyError::IterationBudgetExceeded {
                max: self.max_iterations,
                last_response: response,
            });
        }
        Ok(Resolution::Final(response))
    }

    /// Run every call of one batch, strictly in order.
    ///
    /// Returns the assistant message followed by exactly one tool message per
    /// call. Calls without an `id` get one, written back into `calls`.
    async fn execute_round(&self, calls: &mut [Value]) -> Result<Vec<Value>, ProxyError> {
        let parsed: Vec<ToolCall> = calls.iter_mut().map(ToolCall::from_raw).collect();

        let mut messages = Vec::with_capacity(parsed.len() + 1);
        messages.push(serde_json::to_value(ChatMessage::assistant_tool_calls(
            calls.to_vec(),
        ))?);

        for call in &parsed {
            let content = self.execute_one(call).await;
            messages.push(serde_json::to_value(ChatMessage::tool_result(
                &call.id, content,
            ))?);
        }
        Ok(messages)
    }

    /// Execute a single call, turning every failure into result text.
    async fn execute_one(&self, call: &ToolCall) -> String {
        let Some((provider, tool)) = split_qualified(&call.name) else {
            tracing::warn!(tool = %call.name, "model called a tool without a provider prefix");
            return missing_tool(&call.name);
        };
        let Some(client) = self.registry.get(provider) else {
            tracing::warn!(tool = %call.name, "model called a tool which does not exist");
            return missing_tool(&call.name);
        };

        let arguments = match call.parse_arguments() {
            Ok(arguments) => arguments,
            Err(reason) => {
                tracing::warn!(tool = %call.name, error = %reason, "tool call arguments rejected");
                return format!("Error executing tool: {reason}");
            }
        };

        tracing::info!(server = provider, tool, id = %call.id, "executing MCP tool");
        match client.call_tool(tool, arguments).await {
            Ok(Value::String(text)) => text,
            Ok(other) => other.to_string(),
            Err(e) => {
                tracing::error!(server = provider, tool, error = %e, "error executing MCP tool");
                format!("Error executing tool: {e}")
            }
        }
    }
}

fn missing_tool(name: &str) -> String {
    format!("Error executing tool: tool '{name}' does not exist")
}

/// Append to the body's `messages`, creating the array if absent or replacing
/// it if it is not an array.
fn append_messages(body: &mut Map<String, Value>, appended: Vec<Value>) {
    match body.get_mut("messages") {
        Some(Value::Array(messages)) => {
            messages.extend(appended);
            return;
        }
        Some(_) => {
            tracing::warn!("request 'messages' is not an array, starting a new conversation");
        }
        None => {}
    }
    body.insert("messages".into(), Value::Array(appended));
}

// ─── Tests ───────────────────────────────────────────────────────────────────
