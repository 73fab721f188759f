// ABOUTME: Installs the global tracing subscriber for the bot binary.
// ABOUTME: RUST_LOG wins over the configured filter; output is plain text or JSON lines.

use anyhow::Result;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LogFormat, LoggingConfig};

const DEFAULT_FILTER: &str = "info";

/// Filter from RUST_LOG, else the configured directives, else `info`
pub fn env_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let directives = config.filter.as_deref().unwrap_or(DEFAULT_FILTER);
        EnvFilter::try_new(directives).unwrap_or_else(|e| {
            eprintln!("Invalid log filter {:?} ({}), falling back to {}", directives, e, DEFAULT_FILTER);
            EnvFilter::new(DEFAULT_FILTER)
        })
    })
}

pub fn init(config: &LoggingConfig) -> Result<()> {
    let (json, text) = match config.format {
        LogFormat::Json => (Some(fmt::layer().json()), None),
        LogFormat::Text => (None, Some(fmt::layer())),
    };

    tracing_subscriber::registry()
        .with(env_filter(config))
        .with(json)
        .with(text)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {}", e))
}
