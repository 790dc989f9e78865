//! MCP Client error types.

use thiserror::Error;

use super::types::ConnectionState;

/// Errors that can occur during MCP client operations.
#[derive(Debug, Error)]
pub enum McpError {
    /// A server process failed to start.
    #[error("failed to spawn server '{name}': {reason}")]
    SpawnFailed { name: String, reason: String },

    /// The initialization handshake failed.
    #[error("server '{name}' initialization failed: {reason}")]
    InitFailed { name: String, reason: String },

    /// JSON-RPC communication error (malformed message, I/O error).
    #[error("transport error for server '{server}': {reason}")]
    TransportError { server: String, reason: String },

    /// Server returned a JSON-RPC error response.
    #[error("server error [{code}]: {message}")]
    ServerError {
        code: i32,
        message: String,
        data: Option<serde_json::Value>,
    },

    /// The tool ran but reported a failure (`isError: true`).
    #[error("tool '{tool}' reported an error: {message}")]
    ToolFailed { tool: String, message: String },

    /// A request to the server did not complete in time.
    #[error("{operation} on server '{server}' timed out after {timeout_ms}ms")]
    Timeout {
        server: String,
        operation: String,
        timeout_ms: u64,
    },

    /// Operation requires a connected client.
    #[error("server '{name}' is not connected (state: {state})")]
    NotConnected {
        name: String,
        state: ConnectionState,
    },

    /// The connect sequence failed; the client is now in the `Error` state.
    #[error("failed to connect to server '{name}': {source}")]
    ConnectionFailed {
        name: String,
        #[source]
        source: Box<McpError>,
    },

    /// The descriptor resolved to a transport this proxy does not run.
    #[error("server '{name}' uses the unsupported '{transport}' transport")]
    Unsupported {
        name: String,
        transport: &'static str,
    },

    /// A descriptor matched none of the known configuration variants.
    #[error("configuration doesn't match any known types: [{}]", attempted.join(", "))]
    Classification { attempted: Vec<&'static str> },

    /// The descriptor file is missing, unreadable, or malformed.
    #[error("config error: {reason}")]
    ConfigError { reason: String },
}
