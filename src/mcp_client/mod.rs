//! MCP Client: tool providers reached over JSON-RPC on process stdio.
//!
//! This module handles:
//! - Classifying provider descriptors into typed transport configurations
//! - Spawning providers and performing the MCP handshake
//! - Translating provider tool catalogs into OpenAI function definitions
//! - Routing tool calls to the owning provider
//! - Orderly shutdown of every provider

pub mod client;
pub mod config;
pub mod errors;
pub mod registry;
pub mod schema;
pub mod session;
pub mod transport;
pub mod types;

// Re-exports for convenience
pub use client::{McpToolClient, ToolClient};
pub use config::ProviderConfig;
pub use errors::McpError;
pub use registry::ClientRegistry;
pub use schema::TranslatedTool;
pub use types::ConnectionState;
