//! Shared types for the chat-completion wire format.
//!
//! Request bodies are forwarded as raw JSON so fields this proxy does not know
//! about survive untouched. These types cover only what the proxy writes into
//! a conversation or reads out of a response.

use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

// ─── Messages ────────────────────────────────────────────────────────────────

/// A message appended to the conversation by the proxy.
///
/// Serialization notes for OpenAI-compatible local models:
/// - `content` must be `""` (not `null`) for assistant messages with tool calls.
///   Many local runtimes misinterpret `null` content and fail to recognize the
///   tool call round-trip pattern.
/// - `tool_call_id` and `tool_calls` are skipped when `None`.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    #[serde(serialize_with = "serialize_content")]
    pub content: Option<String>,
    /// Tool call results are sent back as `tool` role messages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// The model's tool calls, echoed back in the form it emitted them.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<Value>>,
}

impl ChatMessage {
    /// The assistant turn that issued `calls`.
    pub fn assistant_tool_calls(calls: Vec<Value>) -> Self {
        Self {
            role: Role::Assistant,
            content: None,
            tool_call_id: None,
            tool_calls: Some(calls),
        }
    }

    /// The result of one tool call.
    pub fn tool_result(tool_call_id: &str, content: String) -> Self {
        Self {
            role: Role::Tool,
            content: Some(content),
            tool_call_id: Some(tool_call_id.to_string()),
            tool_calls: None,
        }
    }
}

/// Custom serializer for `content`: emit `""` instead of `null` when `None`.
fn serialize_content<S>(value: &Option<String>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    match value {
        Some(s) => serializer.serialize_str(s),
        None => serializer.serialize_str(""),
    }
}

/// Message role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

// ─── Tool Definitions ────────────────────────────────────────────────────────

/// Tool definition sent in the request.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    pub r#type: String,
    pub function: FunctionDefinition,
}

/// Function definition within a tool.
#[derive(Debug, Clone, Serialize)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

// ─── Tool Calls ──────────────────────────────────────────────────────────────

/// A tool call read out of a chat completion response.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    /// Unique ID for this tool call (generated if the model doesn't provide one).
    pub id: String,
    /// Qualified tool name, e.g. `"files.read"`. May be empty if the model
    /// emitted a call without one.
    pub name: String,
    /// Arguments as sent: usually a JSON-encoded string, sometimes an object.
    pub arguments: Value,
}

impl ToolCall {
    /// Read one entry of `message.tool_calls`.
    ///
    /// A missing `id` is filled in with a generated one and written back into
    /// `raw`, so the echoed assistant message and the tool result agree.
    pub fn from_raw(raw: &mut Value) -> Self {
        let id = match raw.get("id").and_then(Value::as_str) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => {
                let generated = format!("call_{}", Uuid::new_v4());
                if let Some(obj) = raw.as_object_mut() {
                    obj.insert("id".into(), Value::String(generated.clone()));
                }
                generated
            }
        };

        let function = raw.get("function");
        let name = function
            .and_then(|f| f.get("name"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let arguments = function
            .and_then(|f| f.get("arguments"))
            .cloned()
            .unwrap_or(Value::Null);

        Self {
            id,
            name,
            arguments,
        }
    }

    /// Decode the arguments into a JSON value.
    ///
    /// Empty or absent arguments mean "no arguments" (`{}`).
    pub fn parse_arguments(&self) -> Result<Value, String> {
        match &self.arguments {
            Value::Null => Ok(Value::Object(Default::default())),
            Value::String(s) if s.trim().is_empty() => Ok(Value::Object(Default::default())),
            Value::String(s) => {
                serde_json::from_str(s).map_err(|e| format!("invalid JSON arguments: {e}"))
            }
            other => Ok(other.clone()),
        }
    }
}

/// The tool calls of the first choice of a chat completion, if any.
///
/// An empty `tool_calls` array counts as none.
pub fn first_choice_tool_calls(response: &Value) -> Option<&Vec<Value>> {
    response
        .get("choices")?
        .get(0)?
        .get("message")?
        .get("tool_calls")?
        .as_array()
        .filter(|calls| !calls.is_empty())
}

// ─── Tests ───────────────────────────────────────────────────────────────────
