//! Provider sessions: one live MCP conversation with one tool provider.
//!
//! [`SessionLauncher`] starts a provider and hands back an [`McpSession`].
//! The stdio implementation spawns the configured command as a child process
//! and speaks line-delimited JSON-RPC over its stdin/stdout. The traits exist
//! so the tool client's state machine can be driven without real processes.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tokio::task::JoinHandle;

use super::config::StdioConfig;
use super::errors::McpError;
use super::transport::{extract_result, StdioTransport};
use super::types::{
    CallToolResult, InitializeResult, ListToolsResult, ToolDescriptor, MCP_PROTOCOL_VERSION,
};

// ─── Constants ───────────────────────────────────────────────────────────────

/// Timeout for the initialize handshake.
///
/// Generous because `npx`/`uvx` launchers may download the server first.
const INIT_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for graceful shutdown before force-killing.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// How much recent stderr is kept for an error message.
const STDERR_CAPTURE_LIMIT: usize = 2000;

/// How long a failed handshake waits for the provider's remaining stderr.
const STDERR_SETTLE_TIMEOUT: Duration = Duration::from_millis(500);

// ─── Traits ──────────────────────────────────────────────────────────────────

/// An open MCP session with a single provider.
///
/// Methods take `&mut self`: a session carries one request at a time.
#[async_trait]
pub trait McpSession: Send {
    /// Perform the `initialize` handshake and send `notifications/initialized`.
    async fn initialize(&mut self) -> Result<InitializeResult, McpError>;

    /// Fetch the provider's full tool catalog, following pagination.
    async fn list_tools(&mut self) -> Result<Vec<ToolDescriptor>, McpError>;

    /// Invoke one tool by its provider-local name.
    async fn call_tool(&mut self, name: &str, arguments: Value)
        -> Result<CallToolResult, McpError>;

    /// End the session and release the provider. Never fails.
    async fn close(&mut self);
}

/// Starts a provider and returns an uninitialized session.
#[async_trait]
pub trait SessionLauncher: Send + Sync {
    async fn launch(&self, name: &str) -> Result<Box<dyn McpSession>, McpError>;
}

// ─── Stdio ───────────────────────────────────────────────────────────────────

/// Launches a provider as a subprocess from its [`StdioConfig`].
pub struct StdioLauncher {
    config: StdioConfig,
}

impl StdioLauncher {
    pub fn new(config: StdioConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl SessionLauncher for StdioLauncher {
    async fn launch(&self, name: &str) -> Result<Box<dyn McpSession>, McpError> {
        let mut cmd = Command::new(&self.config.command);
        cmd.args(self.config.args());
        for (key, value) in self.config.env() {
            cmd.env(key, value);
        }

        #[cfg(target_os = "windows")]
        {
            use std::os::windows::process::CommandExt;
            const CREATE_NO_WINDOW: u32 = 0x08000000;
            cmd.creation_flags(CREATE_NO_WINDOW);
        }

        cmd.stdin(std::process::Stdio::piped());
        cmd.stdout(std::process::Stdio::piped());
        cmd.stderr(std::process::Stdio::piped());
        // The proxy must never leak a provider, even if shutdown is skipped.
        cmd.kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| McpError::SpawnFailed {
            name: name.to_string(),
            reason: format!("{} ({e})", self.config.command),
        })?;

        let stdin = child.stdin.take().ok_or(McpError::SpawnFailed {
            name: name.to_string(),
            reason: "failed to capture stdin".into(),
        })?;
        let stdout = child.stdout.take().ok_or(McpError::SpawnFailed {
            name: name.to_string(),
            reason: "failed to capture stdout".into(),
        })?;
        let stderr = StderrDrain::start(name, child.stderr.take());

        tracing::debug!(
            server = name,
            command = %self.config.command,
            pid = child.id(),
            "provider process started"
        );

        Ok(Box::new(StdioSession {
            name: name.to_string(),
            transport: StdioTransport::new(name, stdin, stdout),
            child,
            stderr,
        }))
    }
}

/// A provider subprocess and the transport attached to its stdio.
pub struct StdioSession {
    name: String,
    transport: StdioTransport,
    child: Child,
    stderr: StderrDrain,
}

impl StdioSession {
    async fn handshake(&mut self) -> Result<InitializeResult, McpError> {
        let params = json!({
            "protocolVersion": MCP_PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION"),
            },
        });
        let response = self.transport.request("initialize", Some(params)).await?;
        let result = extract_result(response)?;

        let init: InitializeResult =
            serde_json::from_value(result).map_err(|e| McpError::InitFailed {
                name: self.name.clone(),
                reason: format!("failed to parse initialize response: {e}"),
            })?;

        self.transport
            .notify("notifications/initialized", None)
            .await?;
        Ok(init)
    }

    fn init_failed(&self, reason: String, stderr_ctx: &str) -> McpError {
        McpError::InitFailed {
            name: self.name.clone(),
            reason: format!("{reason}{}", format_stderr_suffix(stderr_ctx)),
        }
    }
}

#[async_trait]
impl McpSession for StdioSession {
    async fn initialize(&mut self) -> Result<InitializeResult, McpError> {
        let outcome = tokio::time::timeout(INIT_TIMEOUT, self.handshake()).await;

        let reason = match outcome {
            Ok(Ok(init)) => {
                let server_info = init.server_info.as_ref();
                tracing::debug!(
                    server = %self.name,
                    protocol = init.protocol_version.as_deref().unwrap_or("unknown"),
                    server_name = server_info.and_then(|i| i.name.as_deref()),
                    server_version = server_info.and_then(|i| i.version.as_deref()),
                    "handshake complete"
                );
                return Ok(init);
            }
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("initialization timed out after {}s", INIT_TIMEOUT.as_secs()),
        };

        let stderr_ctx = self.stderr.settle().await;
        if !stderr_ctx.is_empty() {
            tracing::warn!(
                server = %self.name,
                stderr = %stderr_ctx,
                "server stderr captured on failure"
            );
        }
        Err(self.init_failed(reason, &stderr_ctx))
    }

    async fn list_tools(&mut self) -> Result<Vec<ToolDescriptor>, McpError> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let params = cursor.as_ref().map(|c| json!({ "cursor": c }));
            let response = self.transport.request("tools/list", params).await?;
            let result = extract_result(response)?;
            let page: ListToolsResult =
                serde_json::from_value(result).map_err(|e| McpError::TransportError {
                    server: self.name.clone(),
                    reason: format!("invalid tools/list response: {e}"),
                })?;

            for raw in page.tools {
                match serde_json::from_value::<ToolDescriptor>(raw) {
                    Ok(tool) => tools.push(tool),
                    Err(e) => {
                        tracing::warn!(server = %self.name, error = %e, "skipping malformed tool");
                    }
                }
            }

            match page.next_cursor {
                Some(next) if !next.is_empty() && cursor.as_deref() != Some(next.as_str()) => {
                    cursor = Some(next);
                }
                _ => break,
            }
        }

        Ok(tools)
    }

    async fn call_tool(
        &mut self,
        name: &str,
        arguments: Value,
    ) -> Result<CallToolResult, McpError> {
        let params = json!({ "name": name, "arguments": arguments });
        let response = self.transport.request("tools/call", Some(params)).await?;
        let result = extract_result(response)?;
        serde_json::from_value(result).map_err(|e| McpError::TransportError {
            server: self.name.clone(),
            reason: format!("invalid tools/call response: {e}"),
        })
    }

    async fn close(&mut self) {
        // Closing stdin is the stdio transport's shutdown signal.
        self.transport.close().await;

        match tokio::time::timeout(SHUTDOWN_TIMEOUT, self.child.wait()).await {
            Ok(Ok(status)) => {
                tracing::debug!(server = %self.name, %status, "provider exited");
            }
            _ => {
                tracing::debug!(server = %self.name, "provider did not exit, killing");
                let _ = self.child.kill().await;
            }
        }
    }
}

// ─── Stderr Handling ─────────────────────────────────────────────────────────

/// The most recent stderr lines of a provider, bounded by [`STDERR_CAPTURE_LIMIT`].
#[derive(Debug, Default)]
struct StderrCapture {
    lines: VecDeque<String>,
    bytes: usize,
    truncated: bool,
}

impl StderrCapture {
    fn push(&mut self, line: &str) {
        let mut line = line.to_string();
        if line.len() > STDERR_CAPTURE_LIMIT {
            let mut cut = STDERR_CAPTURE_LIMIT;
            while !line.is_char_boundary(cut) {
                cut -= 1;
            }
            line.truncate(cut);
            self.truncated = true;
        }

        self.bytes += line.len();
        self.lines.push_back(line);
        while self.bytes > STDERR_CAPTURE_LIMIT {
            match self.lines.pop_front() {
                Some(old) => {
                    self.bytes -= old.len();
                    self.truncated = true;
                }
                None => break,
            }
        }
    }

    fn render(&self) -> String {
        let joined = self.lines.iter().map(String::as_str).collect::<Vec<_>>().join("\n");
        if self.truncated && !joined.is_empty() {
            format!("(truncated)...{joined}")
        } else {
            joined
        }
    }
}

/// Reads a provider's stderr from spawn onwards, so a chatty startup never
/// fills the pipe. Every line is logged; the tail is kept for error messages.
struct StderrDrain {
    capture: Arc<Mutex<StderrCapture>>,
    task: Option<JoinHandle<()>>,
}

impl StderrDrain {
    fn start(server: &str, stderr: Option<ChildStderr>) -> Self {
        let capture = Arc::new(Mutex::new(StderrCapture::default()));
        let task = stderr.map(|stderr| {
            tokio::spawn(drain_stderr(
                server.to_string(),
                stderr,
                Arc::clone(&capture),
            ))
        });
        Self { capture, task }
    }

    /// Give an exiting provider a moment to finish writing, then return the
    /// captured tail.
    async fn settle(&mut self) -> String {
        if let Some(task) = self.task.take() {
            let _ = tokio::time::timeout(STDERR_SETTLE_TIMEOUT, task).await;
        }
        self.capture
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .render()
    }
}

async fn drain_stderr(server: String, stderr: ChildStderr, capture: Arc<Mutex<StderrCapture>>) {
    let mut reader = BufReader::new(stderr);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end();
                if line.is_empty() {
                    continue;
                }
                tracing::debug!(server = %server, "stderr: {line}");
                capture
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(line);
            }
        }
    }
}

/// Format a stderr suffix for error messages (empty string if no stderr).
fn format_stderr_suffix(stderr: &str) -> String {
    if stderr.is_empty() {
        String::new()
    } else {
        format!(" | stderr: {}", stderr.trim())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
