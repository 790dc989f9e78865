//! Tool clients: one per configured provider.
//!
//! [`ToolClient`] is the capability the rest of the proxy depends on.
//! [`McpToolClient`] implements it for MCP providers: it owns the session,
//! the native and translated tool catalogs, and the connection state machine:
//!
//! ```text
//! Disconnected ──connect──▶ Connecting ──ok──▶ Connected ──disconnect──▶ Disconnected
//!                                │
//!                                └──fail──▶ Error (terminal)
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use super::errors::McpError;
use super::schema::{self, TranslatedTool};
use super::session::{McpSession, SessionLauncher};
use super::types::{ConnectionState, ToolDescriptor};

// ─── Constants ───────────────────────────────────────────────────────────────

/// Default timeout for connecting and for each tool call (ms).
pub const DEFAULT_CALL_TIMEOUT_MS: u64 = 30_000;

// ─── Trait ───────────────────────────────────────────────────────────────────

/// A connection to one tool provider.
///
/// `connect` and `disconnect` need exclusive access and only happen at
/// startup and shutdown; the serving path uses the `&self` methods.
#[async_trait]
pub trait ToolClient: Send + Sync {
    /// Provider name, the namespace of every tool it exposes.
    fn name(&self) -> &str;

    fn state(&self) -> ConnectionState;

    async fn connect(&mut self) -> Result<(), McpError>;

    /// The translated catalog. Fails unless connected.
    fn list_tools(&self) -> Result<&[TranslatedTool], McpError>;

    /// Invoke a tool by its provider-local name.
    async fn call_tool(&self, tool: &str, arguments: Value) -> Result<Value, McpError>;

    async fn disconnect(&mut self);
}

// ─── McpToolClient ───────────────────────────────────────────────────────────

/// [`ToolClient`] backed by an MCP session.
pub struct McpToolClient {
    name: String,
    state: ConnectionState,
    launcher: Arc<dyn SessionLauncher>,
    /// Present only while connected. The mutex keeps calls from different
    /// requests from interleaving on one channel.
    session: Option<Mutex<Box<dyn McpSession>>>,
    /// Native descriptors, as received.
    descriptors: Vec<ToolDescriptor>,
    translated: Vec<TranslatedTool>,
    timeout: Duration,
}

impl McpToolClient {
    pub fn new(name: &str, launcher: Arc<dyn SessionLauncher>) -> Self {
        Self {
            name: name.to_string(),
            state: ConnectionState::Disconnected,
            launcher,
            session: None,
            descriptors: Vec::new(),
            translated: Vec::new(),
            timeout: Duration::from_millis(DEFAULT_CALL_TIMEOUT_MS),
        }
    }

    /// Override the connect and per-call timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Tool descriptors exactly as the provider declared them.
    pub fn descriptors(&self) -> &[ToolDescriptor] {
        &self.descriptors
    }

    fn timeout_ms(&self) -> u64 {
        u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX)
    }

    fn not_connected(&self) -> McpError {
        McpError::NotConnected {
            name: self.name.clone(),
            state: self.state,
        }
    }

    /// Launch, handshake and fetch the catalog. The session is returned even
    /// on failure so the caller can release it.
    async fn open_session(
        &self,
    ) -> Result<(Box<dyn McpSession>, Vec<ToolDescriptor>), (Option<Box<dyn McpSession>>, McpError)>
    {
        let mut session = self
            .launcher
            .launch(&self.name)
            .await
            .map_err(|e| (None, e))?;

        let handshake = async {
            session.initialize().await?;
            session.list_tools().await
        };
        let outcome = tokio::time::timeout(self.timeout, handshake).await;

        match outcome {
            Ok(Ok(tools)) => Ok((session, tools)),
            Ok(Err(e)) => Err((Some(session), e)),
            Err(_) => Err((
                Some(session),
                McpError::Timeout {
                    server: self.name.clone(),
                    operation: "connect".into(),
                    timeout_ms: self.timeout_ms(),
                },
            )),
        }
    }
}

#[async_trait]
impl ToolClient for McpToolClient {
    fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> ConnectionState {
        self.state
    }

    async fn connect(&mut self) -> Result<(), McpError> {
        match self.state {
            ConnectionState::Connected => return Ok(()),
            ConnectionState::Error | ConnectionState::Connecting => {
                return Err(self.not_connected());
            }
            ConnectionState::Disconnected => {}
        }

        self.state = ConnectionState::Connecting;
        let start = Instant::now();

        match self.open_session().await {
            Ok((session, descriptors)) => {
                self.translated = schema::translate_all(&self.name, &descriptors);
                self.descriptors = descriptors;
                self.session = Some(Mutex::new(session));
                self.state = ConnectionState::Connected;
                tracing::info!(
                    server = %self.name,
                    tools = self.translated.len(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "connected to MCP server"
                );
                Ok(())
            }
            Err((session, cause)) => {
                if let Some(mut session) = session {
                    session.close().await;
                }
                self.state = ConnectionState::Error;
                Err(McpError::ConnectionFailed {
                    name: self.name.clone(),
                    source: Box::new(cause),
                })
            }
        }
    }

    fn list_tools(&self) -> Result<&[TranslatedTool], McpError> {
        if self.state != ConnectionState::Connected {
            return Err(self.not_connected());
        }
        Ok(&self.translated)
    }

    async fn call_tool(&self, tool: &str, arguments: Value) -> Result<Value, McpError> {
        let session = match (&self.session, self.state) {
            (Some(session), ConnectionState::Connected) => session,
            _ => return Err(self.not_connected()),
        };

        tracing::debug!(server = %self.name, tool, "calling tool");
        let start = Instant::now();

        let mut session = session.lock().await;
        let result = tokio::time::timeout(self.timeout, session.call_tool(tool, arguments))
            .await
            .map_err(|_| McpError::Timeout {
                server: self.name.clone(),
                operation: format!("tools/call '{tool}'"),
                timeout_ms: self.timeout_ms(),
            })??;
        drop(session);

        tracing::debug!(
            server = %self.name,
            tool,
            elapsed_ms = start.elapsed().as_millis() as u64,
            is_error = result.is_error,
            "tool call finished"
        );

        if result.is_error {
            return Err(McpError::ToolFailed {
                tool: tool.to_string(),
                message: result.error_text(),
            });
        }
        Ok(result.into_output())
    }

    async fn disconnect(&mut self) {
        if self.state != ConnectionState::Connected {
            return;
        }
        if let Some(session) = self.session.take() {
            session.into_inner().close().await;
        }
        self.descriptors.clear();
        self.translated.clear();
        self.state = ConnectionState::Disconnected;
        tracing::info!(server = %self.name, "disconnected from MCP server");
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
