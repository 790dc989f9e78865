//! Process configuration from the command line.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Parser, ValueEnum};
use thiserror::Error;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines
    Text,
    /// One JSON object per event
    Json,
}

/// CLI arguments for mcp-proxy
#[derive(Parser, Debug, Clone)]
#[command(name = "mcp-proxy")]
#[command(author, version, about = "OpenAI-compatible proxy that runs MCP tools for the model")]
#[command(long_about = r#"
mcp-proxy sits in front of an OpenAI-compatible chat completion server.

Every request gets the tools of the configured MCP servers. When the model
calls one, the proxy runs it, appends the result to the conversation and asks
the model again, until it answers without calling tools.

MCP servers are read from a JSON file:
  {"mcpServers": {"files": {"command": "npx", "args": ["@modelcontextprotocol/server-filesystem", "/data"]}}}

Set LOG_LEVEL (e.g. debug) to change log verbosity.
"#)]
pub struct ProxyConfig {
    /// Base URL of the upstream OpenAI-compatible API
    #[arg(
        long,
        alias = "openai_api_base_url",
        value_name = "URL",
        default_value = "http://127.0.0.1:8080"
    )]
    pub openai_api_base_url: String,

    /// Enable MCP tool orchestration (true/false/1/0/yes/no)
    #[arg(
        long,
        alias = "enable_mcp",
        value_name = "BOOL",
        default_value = "true",
        value_parser = parse_flag,
        action = ArgAction::Set
    )]
    pub enable_mcp: bool,

    /// Maximum follow-up rounds per request before giving up
    #[arg(long, alias = "max_iteration", value_name = "N", default_value_t = 25)]
    pub max_iteration: u32,

    /// Address to listen on
    #[arg(long, value_name = "IP", default_value = "0.0.0.0")]
    pub host: IpAddr,

    /// Port to listen on
    #[arg(long, default_value_t = 8001)]
    pub port: u16,

    /// Path to the MCP server descriptor file
    #[arg(
        long,
        alias = "mcp_config_path",
        value_name = "PATH",
        default_value = "/config/mcp_config.json"
    )]
    pub mcp_config_path: PathBuf,

    /// Timeout for each buffered upstream request, in seconds
    #[arg(long, value_name = "SECS", default_value_t = 60)]
    pub request_timeout_secs: u64,

    /// Log output format
    #[arg(long, value_enum, default_value = "text")]
    pub log_format: LogFormat,

    /// Also write logs to this file (rotated on startup)
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}

/// Errors that can occur during configuration validation
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("--max-iteration must be at least 1")]
    InvalidMaxIteration,

    #[error("Invalid port number")]
    InvalidPort,

    #[error("--request-timeout-secs must be between 1 and {MAX_REQUEST_TIMEOUT_SECS}")]
    InvalidTimeout,

    #[error("upstream URL must start with http:// or https://, got '{0}'")]
    InvalidUpstreamUrl(String),
}

const MAX_REQUEST_TIMEOUT_SECS: u64 = 600;

impl ProxyConfig {
    /// Get the socket address to bind to
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_iteration == 0 {
            return Err(ValidationError::InvalidMaxIteration);
        }
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        if self.request_timeout_secs == 0 || self.request_timeout_secs > MAX_REQUEST_TIMEOUT_SECS {
            return Err(ValidationError::InvalidTimeout);
        }
        let url = self.openai_api_base_url.to_ascii_lowercase();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ValidationError::InvalidUpstreamUrl(
                self.openai_api_base_url.clone(),
            ));
        }
        Ok(())
    }
}

fn parse_flag(raw: &str) -> Result<bool, String> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => Err(format!("expected true/false/1/0/yes/no, got '{other}'")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> ProxyConfig {
        let mut argv = vec!["mcp-proxy"];
        argv.extend_from_slice(args);
        ProxyConfig::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = parse(&[]);
        assert_eq!(config.openai_api_base_url, "http://127.0.0.1:8080");
        assert!(config.enable_mcp);
        assert_eq!(config.max_iteration, 25);
        assert_eq!(config.socket_addr().to_string(), "0.0.0.0:8001");
        assert_eq!(config.mcp_config_path, PathBuf::from("/config/mcp_config.json"));
        assert_eq!(config.request_timeout(), Duration::from_secs(60));
        assert_eq!(config.log_format, LogFormat::Text);
        assert!(config.log_file.is_none());
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn test_enable_mcp_spellings() {
        for (raw, expected) in [
            ("true", true),
            ("1", true),
            ("YES", true),
            ("false", false),
            ("0", false),
            ("no", false),
        ] {
            assert_eq!(parse(&["--enable-mcp", raw]).enable_mcp, expected, "{raw}");
        }
        assert!(ProxyConfig::try_parse_from(["mcp-proxy", "--enable-mcp", "maybe"]).is_err());
    }

    #[test]
    fn test_underscore_aliases() {
        let config = parse(&[
            "--openai_api_base_url",
            "http://gpu:9091",
            "--max_iteration",
            "3",
            "--mcp_config_path",
            "/tmp/mcp.json",
        ]);
        assert_eq!(config.openai_api_base_url, "http://gpu:9091");
        assert_eq!(config.max_iteration, 3);
        assert_eq!(config.mcp_config_path, PathBuf::from("/tmp/mcp.json"));
    }

    #[test]
    fn test_validation() {
        let mut config = parse(&[]);
        config.max_iteration = 0;
        assert_eq!(config.validate(), Err(ValidationError::InvalidMaxIteration));

        let mut config = parse(&[]);
        config.request_timeout_secs = 601;
        assert_eq!(config.validate(), Err(ValidationError::InvalidTimeout));

        let mut config = parse(&[]);
        config.port = 0;
        assert_eq!(config.validate(), Err(ValidationError::InvalidPort));

        let config = parse(&["--openai-api-base-url", "gpu:9091"]);
        assert!(matches!(
            config.validate(),
            Err(ValidationError::InvalidUpstreamUrl(_))
        ));
    }
}
