//! MCP tool descriptor → OpenAI function-calling definition.
//!
//! Every exposed tool name is `"{provider}.{tool}"`. The prefix is the only
//! collision guard between providers, and the proxy splits it back apart
//! when the model calls the tool, so it must survive unchanged.

use serde_json::{Map, Value};

use crate::inference::types::{FunctionDefinition, ToolDefinition};

use super::types::ToolDescriptor;

/// A provider tool in the inference API's calling convention.
#[derive(Debug, Clone, PartialEq)]
pub struct TranslatedTool {
    /// `"{provider}.{tool}"`.
    pub qualified_name: String,
    pub description: String,
    /// The input schema with `type`, `properties` and `required` guaranteed.
    pub parameters: Value,
}

impl TranslatedTool {
    /// The `{"type": "function", "function": {...}}` entry for a request's `tools`.
    pub fn to_tool_definition(&self) -> ToolDefinition {
        ToolDefinition {
            r#type: "function".to_string(),
            function: FunctionDefinition {
                name: self.qualified_name.clone(),
                description: self.description.clone(),
                parameters: self.parameters.clone(),
            },
        }
    }
}

/// Build the qualified name for a provider's tool.
pub fn qualify(provider: &str, tool: &str) -> String {
    format!("{provider}.{tool}")
}

/// Split a qualified name at the first `.` into `(provider, tool)`.
///
/// Returns `None` when there is no separator or either side is empty.
pub fn split_qualified(name: &str) -> Option<(&str, &str)> {
    let (provider, tool) = name.split_once('.')?;
    if provider.is_empty() || tool.is_empty() {
        return None;
    }
    Some((provider, tool))
}

/// Translate one descriptor. Descriptors without a name are logged and skipped.
pub fn translate(provider: &str, descriptor: &ToolDescriptor) -> Option<TranslatedTool> {
    let Some(name) = descriptor.name.as_deref().filter(|n| !n.is_empty()) else {
        tracing::warn!(server = provider, "tool missing name, skipping");
        return None;
    };

    let description = descriptor
        .description
        .clone()
        .filter(|d| !d.is_empty())
        .unwrap_or_else(|| format!("Execute {name} tool"));

    Some(TranslatedTool {
        qualified_name: qualify(provider, name),
        description,
        parameters: normalize_schema(provider, name, descriptor.input_schema.as_ref()),
    })
}

/// Translate a provider's whole catalog, dropping unusable entries.
pub fn translate_all(provider: &str, descriptors: &[ToolDescriptor]) -> Vec<TranslatedTool> {
    tracing::debug!(
        server = provider,
        count = descriptors.len(),
        "converting tools to OpenAI format"
    );
    descriptors
        .iter()
        .filter_map(|d| translate(provider, d))
        .collect()
}

/// Fill in `type`, `properties` and `required` when the schema omits them.
///
/// MCP input schemas are already JSON Schema, which the inference API accepts
/// as-is; everything else passes through untouched.
fn normalize_schema(provider: &str, tool: &str, schema: Option<&Value>) -> Value {
    let mut object = match schema {
        Some(Value::Object(map)) => map.clone(),
        None | Some(Value::Null) => Map::new(),
        Some(other) => {
            tracing::warn!(
                server = provider,
                tool,
                schema = %other,
                "input schema is not an object, using an empty one"
            );
            Map::new()
        }
    };

    object
        .entry("type")
        .or_insert_with(|| Value::String("object".into()));
    object
        .entry("properties")
        .or_insert_with(|| Value::Object(Map::new()));
    object
        .entry("required")
        .or_insert_with(|| Value::Array(Vec::new()));

    Value::Object(object)
}

// ─── Tests ───────────────────────────────────────────────────────────────────
