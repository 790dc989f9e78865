//! Provider descriptor classification.
//!
//! A descriptor under `mcpServers` is a loosely-typed JSON object. It is
//! resolved into exactly one [`ProviderConfig`] variant by trying each entry
//! of [`CONFIG_VARIANTS`] in order under strict field matching: a variant
//! matches only if every required field is present, every field has the
//! right type, and no unknown field appears.

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;

use super::errors::McpError;

// ─── Variants ────────────────────────────────────────────────────────────────

/// Configuration for a provider launched as a subprocess speaking MCP over stdio.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StdioConfig {
    pub command: String,
    #[serde(default)]
    pub args: Option<Vec<String>>,
    #[serde(default)]
    pub env: Option<HashMap<String, String>>,
    /// Per-request timeout in seconds.
    #[serde(default)]
    pub timeout: Option<f64>,
}

impl StdioConfig {
    pub fn args(&self) -> &[String] {
        self.args.as_deref().unwrap_or_default()
    }

    /// Extra environment for the subprocess (overlaid on the proxy's own).
    pub fn env(&self) -> impl Iterator<Item = (&String, &String)> {
        self.env.iter().flatten()
    }

    /// The configured timeout, ignoring zero, negative and non-finite values.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
            .filter(|secs| secs.is_finite() && *secs > 0.0)
            .map(Duration::from_secs_f64)
    }
}

/// Configuration for a provider reachable over SSE or websocket.
///
/// Parsed so such descriptors classify deterministically, but never run.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SseConfig {
    pub url: String,
    #[serde(default)]
    pub transport: Option<String>,
    #[serde(default)]
    pub headers: Option<HashMap<String, String>>,
}

/// A resolved provider descriptor.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderConfig {
    Stdio(StdioConfig),
    Sse(SseConfig),
}

impl ProviderConfig {
    /// Short transport label used in logs and errors.
    pub fn transport(&self) -> &'static str {
        match self {
            Self::Stdio(_) => "stdio",
            Self::Sse(_) => "sse",
        }
    }
}

// ─── Dispatch Table ──────────────────────────────────────────────────────────

/// One entry of the ordered classification table.
pub struct ConfigVariant {
    pub name: &'static str,
    parse: fn(&serde_json::Value) -> Result<ProviderConfig, serde_json::Error>,
}

fn parse_stdio(raw: &serde_json::Value) -> Result<ProviderConfig, serde_json::Error> {
    StdioConfig::deserialize(raw).map(ProviderConfig::Stdio)
}

fn parse_sse(raw: &serde_json::Value) -> Result<ProviderConfig, serde_json::Error> {
    SseConfig::deserialize(raw).map(ProviderConfig::Sse)
}

/// Classification order. Stdio is tried first; the order is the tie-break
/// for any descriptor that could satisfy more than one variant.
pub const CONFIG_VARIANTS: &[ConfigVariant] = &[
    ConfigVariant {
        name: "StdioConfig",
        parse: parse_stdio,
    },
    ConfigVariant {
        name: "SseConfig",
        parse: parse_sse,
    },
];

/// Resolve a raw descriptor into its configuration variant.
///
/// Returns the first variant in [`CONFIG_VARIANTS`] that parses strictly, or
/// [`McpError::Classification`] naming every variant tried.
pub fn resolve(raw: &serde_json::Value) -> Result<ProviderConfig, McpError> {
    for variant in CONFIG_VARIANTS {
        match (variant.parse)(raw) {
            Ok(config) => {
                tracing::debug!(variant = variant.name, "descriptor matched");
                return Ok(config);
            }
            Err(e) => {
                tracing::debug!(variant = variant.name, error = %e, "descriptor did not match");
            }
        }
    }

    Err(McpError::Classification {
        attempted: CONFIG_VARIANTS.iter().map(|v| v.name).collect(),
    })
}

// ─── Tests ───────────────────────────────────────────────────────────────────
