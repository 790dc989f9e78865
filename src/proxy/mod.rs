//! The HTTP proxy in front of the upstream chat-completion API.
//!
//! - `forwarder`: catalog injection, forwarding, streaming/buffered branching
//! - `resolver`: the tool-call loop
//! - `routes`: the axum router

use std::sync::Arc;

use crate::inference::ChatUpstream;
use crate::mcp_client::ClientRegistry;

pub mod errors;
pub mod forwarder;
pub mod resolver;
pub mod routes;

#[cfg(test)]
pub(crate) mod testing;

pub use errors::ProxyError;
pub use resolver::{Resolution, ToolCallResolver};
pub use routes::router;

/// Everything a request handler needs. Immutable while serving.
pub struct ProxyState {
    pub registry: Arc<ClientRegistry>,
    pub upstream: Arc<dyn ChatUpstream>,
    /// When false, requests are forwarded untouched and tool calls relayed.
    pub enable_mcp: bool,
    /// Follow-up rounds allowed per request.
    pub max_iterations: u32,
}
