//! Fakes for the proxy's seams, shared by the unit tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use serde_json::{json, Value};

use crate::inference::{ChatUpstream, InferenceError, UpstreamResponse};
use crate::mcp_client::schema::{translate, TranslatedTool};
use crate::mcp_client::types::{error_codes, ToolDescriptor};
use crate::mcp_client::{ClientRegistry, ConnectionState, McpError, ToolClient};

pub(crate) type CallLog = Arc<Mutex<Vec<(String, Value)>>>;

// ─── Tool Client ─────────────────────────────────────────────────────────────

/// A connected provider with canned tools.
///
/// `read` → `"hello"`, `stat` → `{"size": 5}`, `fail` → tool error, anything
/// else → method not found.
pub(crate) struct FakeToolClient {
    name: String,
    tools: Vec<TranslatedTool>,
    calls: CallLog,
}

impl FakeToolClient {
    pub fn new(name: &str, tools: &[&str]) -> Self {
        let tools = tools
            .iter()
            .filter_map(|t| {
                translate(
                    name,
                    &ToolDescriptor {
                        name: Some(t.to_string()),
                        ..ToolDescriptor::default()
                    },
                )
            })
            .collect();
        Self {
            name: name.to_string(),
            tools,
            calls: Arc::default(),
        }
    }

    pub fn files() -> Self {
        Self::new("files", &["read", "stat", "fail"])
    }

    pub fn call_log(&self) -> CallLog {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl ToolClient for FakeToolClient {
    fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> ConnectionState {
        ConnectionState::Connected
    }

    async fn connect(&mut self) -> Result<(), McpError> {
        Ok(())
    }

    fn list_tools(&self) -> Result<&[TranslatedTool], McpError> {
        Ok(&self.tools)
    }

    async fn call_tool(&self, tool: &str, arguments: Value) -> Result<Value, McpError> {
        self.calls
            .lock()
            .unwrap()
            .push((tool.to_string(), arguments));
        match tool {
            "read" => Ok(json!("hello")),
            "stat" => Ok(json!({"size": 5})),
            "fail" => Err(McpError::ToolFailed {
                tool: tool.to_string(),
                message: "disk full".into(),
            }),
            _ => Err(McpError::ServerError {
                code: error_codes::METHOD_NOT_FOUND,
                message: format!("unknown tool {tool}"),
                data: None,
            }),
        }
    }

    async fn disconnect(&mut self) {}
}

pub(crate) fn registry_of(clients: Vec<FakeToolClient>) -> ClientRegistry {
    ClientRegistry::from_clients(
        clients
            .into_iter()
            .map(|c| Box::new(c) as Box<dyn ToolClient>)
            .collect(),
    )
}

// ─── Upstream ────────────────────────────────────────────────────────────────

/// Plays back scripted `(status, body)` responses and records every request.
pub(crate) struct ScriptedUpstream {
    responses: Mutex<VecDeque<(u16, String)>>,
    requests: Mutex<Vec<Value>>,
    headers: Mutex<Vec<HeaderMap>>,
}

impl ScriptedUpstream {
    pub fn new(responses: Vec<(u16, Value)>) -> Self {
        Self::raw(
            responses
                .into_iter()
                .map(|(status, body)| (status, body.to_string()))
                .collect(),
        )
    }

    pub fn raw(responses: Vec<(u16, String)>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::default(),
            headers: Mutex::default(),
        }
    }

    pub fn requests(&self) -> Vec<Value> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_headers(&self) -> Vec<HeaderMap> {
        self.headers.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatUpstream for ScriptedUpstream {
    async fn post_chat_completion(
        &self,
        headers: &HeaderMap,
        body: &Value,
        _stream: bool,
    ) -> Result<UpstreamResponse, InferenceError> {
        self.requests.lock().unwrap().push(body.clone());
        self.headers.lock().unwrap().push(headers.clone());

        let (status, body) = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or((500, r#"{"error":"no scripted response"}"#.to_string()));

        let mut response_headers = HeaderMap::new();
        response_headers.insert("content-type", HeaderValue::from_static("application/json"));
        Ok(UpstreamResponse::from_bytes(
            StatusCode::from_u16(status).unwrap(),
            response_headers,
            body,
        ))
    }
}

/// An upstream that is never reachable.
pub(crate) struct DownUpstream;

#[async_trait]
impl ChatUpstream for DownUpstream {
    async fn post_chat_completion(
        &self,
        _headers: &HeaderMap,
        _body: &Value,
        _stream: bool,
    ) -> Result<UpstreamResponse, InferenceError> {
        Err(InferenceError::ConnectionFailed {
            endpoint: "http://127.0.0.1:9/v1/chat/completions".into(),
            reason: "connection refused".into(),
        })
    }
}

// ─── Completions ─────────────────────────────────────────────────────────────

/// A plain assistant answer.
pub(crate) fn completion(text: &str) -> Value {
    json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": text},
            "finish_reason": "stop"
        }]
    })
}

/// An assistant turn calling `(id, name, arguments)` tools.
pub(crate) fn tool_call_completion(calls: &[(&str, &str, &str)]) -> Value {
    let calls: Vec<Value> = calls
        .iter()
        .map(|(id, name, arguments)| {
            json!({
                "id": id,
                "type": "function",
                "function": {"name": name, "arguments": arguments}
            })
        })
        .collect();
    json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": null, "tool_calls": calls},
            "finish_reason": "tool_calls"
        }]
    })
}
