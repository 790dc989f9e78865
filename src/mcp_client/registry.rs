//! Client registry: every connected tool provider, keyed by provider name.
//!
//! Built once at startup from the descriptor file, then shared read-only
//! (`Arc<ClientRegistry>`) by every in-flight request. Only startup and
//! shutdown need `&mut`.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use futures::future::join_all;
use serde_json::Value;

use super::client::{McpToolClient, ToolClient};
use super::config::{self, ProviderConfig};
use super::errors::McpError;
use super::schema::TranslatedTool;
use super::session::StdioLauncher;

// ─── ClientRegistry ──────────────────────────────────────────────────────────

/// Connected tool clients, ordered by provider name.
#[derive(Default)]
pub struct ClientRegistry {
    clients: BTreeMap<String, Box<dyn ToolClient>>,
}

impl ClientRegistry {
    /// Create an empty registry (orchestration with no providers).
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from already-constructed clients. They are used as-is;
    /// nothing is connected here.
    pub fn from_clients(clients: Vec<Box<dyn ToolClient>>) -> Self {
        Self {
            clients: clients
                .into_iter()
                .map(|c| (c.name().to_string(), c))
                .collect(),
        }
    }

    /// Read the descriptor file, then construct and connect every provider.
    ///
    /// Only a missing or malformed file is an error. A provider that fails to
    /// classify, construct or connect is logged and left out.
    pub async fn load_and_connect(path: &Path) -> Result<Self, McpError> {
        let servers = read_descriptor_file(path).await?;
        tracing::info!(
            path = %path.display(),
            servers = servers.len(),
            "loaded MCP server descriptors"
        );

        let mut pending = Vec::new();
        for (name, raw) in &servers {
            match build_client(name, raw) {
                Ok(client) => pending.push(client),
                Err(e) => {
                    tracing::error!(server = %name, error = %e, "skipping MCP server");
                }
            }
        }

        let outcomes = join_all(pending.into_iter().map(|mut client| async move {
            let result = client.connect().await;
            (client, result)
        }))
        .await;

        let mut clients = BTreeMap::new();
        for (client, result) in outcomes {
            match result {
                Ok(()) => {
                    clients.insert(client.name().to_string(), client);
                }
                Err(e) => {
                    tracing::error!(server = %client.name(), error = %e, "MCP server unavailable");
                }
            }
        }

        tracing::info!(
            connected = clients.len(),
            configured = servers.len(),
            "MCP servers ready"
        );
        Ok(Self { clients })
    }

    pub fn get(&self, name: &str) -> Option<&dyn ToolClient> {
        self.clients.get(name).map(|c| c.as_ref())
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn server_names(&self) -> Vec<&str> {
        self.clients.keys().map(String::as_str).collect()
    }

    /// The aggregated translated catalog of every connected provider.
    pub fn tools(&self) -> Vec<&TranslatedTool> {
        self.clients
            .values()
            .filter_map(|client| client.list_tools().ok())
            .flatten()
            .collect()
    }

    /// Serialize the catalog into the `tools` array of a chat completion request.
    pub fn to_openai_tools(&self) -> Vec<Value> {
        self.tools()
            .into_iter()
            .filter_map(|tool| serde_json::to_value(tool.to_tool_definition()).ok())
            .collect()
    }

    /// Disconnect every client, then clear the registry.
    pub async fn disconnect_all(&mut self) {
        for (name, client) in self.clients.iter_mut() {
            tracing::debug!(server = %name, "disconnecting");
            client.disconnect().await;
        }
        self.clients.clear();
    }
}

// ─── Construction ────────────────────────────────────────────────────────────

/// Load the `mcpServers` mapping. A file without the key has no providers.
async fn read_descriptor_file(path: &Path) -> Result<serde_json::Map<String, Value>, McpError> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| McpError::ConfigError {
            reason: format!("cannot read MCP config file {}: {e}", path.display()),
        })?;

    let document: Value = serde_json::from_str(&text).map_err(|e| McpError::ConfigError {
        reason: format!("invalid JSON in MCP config file {}: {e}", path.display()),
    })?;

    let mut document = match document {
        Value::Object(map) => map,
        Value::Null => {
            return Err(McpError::ConfigError {
                reason: "MCP config file is empty; start with --enable-mcp false to run without tools"
                    .into(),
            })
        }
        other => {
            return Err(McpError::ConfigError {
                reason: format!("MCP config must be a JSON object, got {}", json_kind(&other)),
            })
        }
    };

    match document.remove("mcpServers") {
        None | Some(Value::Null) => Ok(serde_json::Map::new()),
        Some(Value::Object(servers)) => Ok(servers),
        Some(other) => Err(McpError::ConfigError {
            reason: format!("'mcpServers' must be an object, got {}", json_kind(&other)),
        }),
    }
}

/// Classify a descriptor and construct the matching client.
fn build_client(name: &str, raw: &Value) -> Result<Box<dyn ToolClient>, McpError> {
    let config = config::resolve(raw)?;
    let transport = config.transport();
    match config {
        ProviderConfig::Stdio(stdio) => {
            let timeout = stdio.timeout();
            let mut client = McpToolClient::new(name, Arc::new(StdioLauncher::new(stdio)));
            if let Some(timeout) = timeout {
                client = client.with_timeout(timeout);
            }
            Ok(Box::new(client))
        }
        ProviderConfig::Sse(_) => Err(McpError::Unsupported {
            name: name.to_string(),
            transport,
        }),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp_client::client::tests::{FakeLauncher, Script};
    use crate::mcp_client::types::{ConnectionState, ToolDescriptor};
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    async fn connected_fake(name: &str, tools: &[&str]) -> Box<dyn ToolClient> {
        let script = Script {
            tools: tools
                .iter()
                .map(|t| ToolDescriptor {
                    name: Some(t.to_string()),
                    ..ToolDescriptor::default()
                })
                .collect(),
            ..Script::default()
        };
        let mut client = McpToolClient::new(name, FakeLauncher::new(script));
        client.connect().await.unwrap();
        Box::new(client)
    }

    #[tokio::test]
    async fn test_missing_file_is_config_error() {
        let err = ClientRegistry::load_and_connect(Path::new("/nonexistent/mcp_config.json"))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, McpError::ConfigError { .. }));
    }

    #[tokio::test]
    async fn test_invalid_json_is_config_error() {
        let file = write_config("{ not json");
        let err = ClientRegistry::load_and_connect(file.path()).await.err().unwrap();
        assert!(matches!(err, McpError::ConfigError { .. }));
    }

    #[tokio::test]
    async fn test_null_document_is_config_error() {
        let file = write_config("null");
        let err = ClientRegistry::load_and_connect(file.path()).await.err().unwrap();
        assert!(err.to_string().contains("empty"));
    }

    #[tokio::test]
    async fn test_array_document_is_config_error() {
        let file = write_config("[]");
        let err = ClientRegistry::load_and_connect(file.path()).await.err().unwrap();
        assert!(matches!(err, McpError::ConfigError { .. }));
    }

    #[tokio::test]
    async fn test_no_servers_key_gives_empty_registry() {
        let file = write_config("{}");
        let registry = ClientRegistry::load_and_connect(file.path()).await.unwrap();
        assert!(registry.is_empty());
        assert!(registry.to_openai_tools().is_empty());
    }

    #[tokio::test]
    async fn test_bad_providers_are_skipped() {
        let file = write_config(
            r#"{"mcpServers": {
                "remote": {"url": "http://localhost:9000/sse"},
                "weird": {"command": "srv", "cwd": "/tmp"},
                "gone": {"command": "definitely-not-a-real-mcp-server-binary"}
            }}"#,
        );
        let registry = ClientRegistry::load_and_connect(file.path()).await.unwrap();
        assert!(registry.is_empty());
        assert!(registry.get("gone").is_none());
    }

    #[test]
    fn test_sse_construction_is_unsupported() {
        let err = build_client("remote", &serde_json::json!({"url": "http://x/sse"}))
            .err()
            .unwrap();
        assert!(matches!(
            err,
            McpError::Unsupported {
                transport: "sse",
                ..
            }
        ));
    }

    #[test]
    fn test_stdio_construction_starts_disconnected() {
        let client = build_client("files", &serde_json::json!({"command": "srv", "timeout": 5}))
            .unwrap();
        assert_eq!(client.name(), "files");
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_catalog_aggregates_in_provider_order() {
        let registry = ClientRegistry::from_clients(vec![
            connected_fake("web", &["fetch"]).await,
            connected_fake("files", &["read", "write"]).await,
        ]);
        assert_eq!(registry.server_names(), vec!["files", "web"]);

        let names: Vec<_> = registry
            .tools()
            .iter()
            .map(|t| t.qualified_name.clone())
            .collect();
        assert_eq!(names, vec!["files.read", "files.write", "web.fetch"]);

        let openai = registry.to_openai_tools();
        assert_eq!(openai.len(), 3);
        assert_eq!(openai[0]["type"], "function");
        assert_eq!(openai[0]["function"]["name"], "files.read");
    }

    #[tokio::test]
    async fn test_failed_provider_contributes_no_tools() {
        let mut broken = McpToolClient::new(
            "broken",
            FakeLauncher::new(Script {
                fail_initialize: true,
                ..Script::default()
            }),
        );
        assert!(broken.connect().await.is_err());

        let registry = ClientRegistry::from_clients(vec![
            connected_fake("files", &["read"]).await,
            Box::new(broken),
        ]);
        let names: Vec<_> = registry.tools().iter().map(|t| t.qualified_name.clone()).collect();
        assert_eq!(names, vec!["files.read"]);
    }

    #[tokio::test]
    async fn test_disconnect_all_clears() {
        let mut registry =
            ClientRegistry::from_clients(vec![connected_fake("files", &["read"]).await]);
        registry.disconnect_all().await;
        assert!(registry.is_empty());
        assert!(registry.get("files").is_none());
    }
}
