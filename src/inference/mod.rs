//! Inference Client: the OpenAI-compatible upstream this proxy fronts.
//!
//! This module handles:
//! - Posting chat completion requests, buffered or streamed
//! - The message and tool-definition types the proxy writes into a conversation
//! - Reading tool calls out of a completion response

pub mod client;
pub mod errors;
pub mod types;

// Re-exports for convenience
pub use client::{ChatUpstream, UpstreamClient, UpstreamResponse};
pub use errors::InferenceError;
pub use types::{ChatMessage, Role, ToolCall, ToolDefinition};
