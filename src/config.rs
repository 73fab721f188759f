// ABOUTME: Configuration parsing from TOML file with environment variable overrides
// ABOUTME: Validates the gateway credentials and command prefix before the client starts
use anyhow::{Context, Result};
use chatwire_commands::InvokerConfig;
use chatwire_core::GatewayConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_PATH_ENV: &str = "CHATWIRE_CONFIG_PATH";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub commands: InvokerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
    /// Filter directives used when RUST_LOG is unset, e.g. "info,chatwire_core=debug"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl Config {
    /// Find the config file, checking in order:
    /// 1. CHATWIRE_CONFIG_PATH env var (if set and present)
    /// 2. ./config.toml
    fn find_config_file() -> Option<PathBuf> {
        if let Ok(env_path) = std::env::var(CONFIG_PATH_ENV) {
            let path = PathBuf::from(&env_path);
            if path.exists() {
                return Some(path);
            }
            tracing::warn!(path = %env_path, "{} points at a missing file", CONFIG_PATH_ENV);
        }

        let local_config = PathBuf::from("config.toml");
        if local_config.exists() {
            return Some(local_config);
        }

        None
    }

    /// Load configuration with environment variable overrides.
    /// Searches: CHATWIRE_CONFIG_PATH env var, then ./config.toml
    pub fn load() -> Result<Self> {
        let config = match Self::find_config_file() {
            Some(path) => Self::read_file(&path)?,
            None => {
                tracing::info!("No config file found, using environment variables and defaults");
                Config::default()
            }
        };
        config.finish()
    }

    /// Load from an explicit path; unlike `load`, a missing file is an error
    pub fn load_from(path: &Path) -> Result<Self> {
        Self::read_file(path)?.finish()
    }

    /// Parse TOML without env overrides or validation
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str::<Config>(content).context("Failed to parse configuration")
    }

    fn read_file(path: &Path) -> Result<Self> {
        tracing::info!(path = %path.display(), "Loading configuration from file");
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str::<Config>(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))
    }

    fn finish(mut self) -> Result<Self> {
        self.apply_env_overrides();
        self.validate()?;
        Ok(self)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("CHATWIRE_TOKEN") {
            self.gateway.token = val;
            // Clear from environment to prevent exposure via /proc or ps
            std::env::remove_var("CHATWIRE_TOKEN");
        }
        if let Ok(val) = std::env::var("CHATWIRE_GATEWAY_URL") {
            self.gateway.url = val;
        }
        if let Ok(val) = std::env::var("CHATWIRE_CURSOR_HEADER") {
            self.gateway.cursor_header = val;
        }
        if let Ok(val) = std::env::var("CHATWIRE_PREFIX") {
            self.commands.prefix = val;
        }
    }

    /// Check required fields and value shapes
    pub fn validate(&self) -> Result<()> {
        if self.gateway.token.trim().is_empty() {
            anyhow::bail!("gateway.token is required (set in config.toml or CHATWIRE_TOKEN env var)");
        }
        let url = self.gateway.url.trim();
        if !(url.starts_with("wss://") || url.starts_with("ws://")) {
            anyhow::bail!("gateway.url must be a ws:// or wss:// URL, got: {}", url);
        }
        let header = &self.gateway.cursor_header;
        if header.is_empty()
            || !header
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
        {
            anyhow::bail!("gateway.cursor_header is not a valid header name: {:?}", header);
        }
        if self.gateway.heartbeat_ms == 0 {
            anyhow::bail!("gateway.heartbeat_ms must be greater than zero");
        }
        let prefix = &self.commands.prefix;
        if prefix.is_empty() || prefix.contains(char::is_whitespace) {
            anyhow::bail!("commands.prefix must be non-empty without whitespace, got: {:?}", prefix);
        }
        Ok(())
    }
}
