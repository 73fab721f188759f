// ABOUTME: Tests for configuration loading and validation
// ABOUTME: Verifies TOML parsing, env var overrides, and required field validation

use chatwire::config::{Config, LogFormat};
use serial_test::serial;
use std::io::Write;
use tempfile::NamedTempFile;

/// Helper to clear all config-related env vars
fn clear_config_env_vars() {
    std::env::remove_var("CHATWIRE_CONFIG_PATH");
    std::env::remove_var("CHATWIRE_TOKEN");
    std::env::remove_var("CHATWIRE_GATEWAY_URL");
    std::env::remove_var("CHATWIRE_PREFIX");
    std::env::remove_var("CHATWIRE_CURSOR_HEADER");
}

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
#[serial]
fn test_config_loads_from_env_path() {
    clear_config_env_vars();

    let file = write_config(
        r#"
[gateway]
url = "wss://gateway.test/websocket/v1"
token = "file-token"
heartbeat_ms = 15000

[gateway.reconnect]
initial_delay_ms = 500
max_retries = 10

[commands]
prefix = "?"
ignore_self = false

[logging]
format = "json"
filter = "debug"
"#,
    );
    std::env::set_var("CHATWIRE_CONFIG_PATH", file.path());

    let config = Config::load().unwrap();
    assert_eq!(config.gateway.url, "wss://gateway.test/websocket/v1");
    assert_eq!(config.gateway.token, "file-token");
    assert_eq!(config.gateway.heartbeat_ms, 15000);
    assert_eq!(config.gateway.reconnect.initial_delay_ms, 500);
    assert_eq!(config.gateway.reconnect.max_retries, 10);
    assert_eq!(config.gateway.cursor_header, "guilded-last-message-id");
    assert_eq!(config.commands.prefix, "?");
    assert!(!config.commands.ignore_self);
    assert_eq!(config.logging.format, LogFormat::Json);
    assert_eq!(config.logging.filter.as_deref(), Some("debug"));

    clear_config_env_vars();
}

#[test]
#[serial]
fn test_env_vars_override_file() {
    clear_config_env_vars();

    let file = write_config(
        r#"
[gateway]
token = "file-token"

[commands]
prefix = "!"
"#,
    );
    std::env::set_var("CHATWIRE_CONFIG_PATH", file.path());
    std::env::set_var("CHATWIRE_TOKEN", "env-token");
    std::env::set_var("CHATWIRE_GATEWAY_URL", "ws://localhost:9000/ws");
    std::env::set_var("CHATWIRE_PREFIX", "$");
    std::env::set_var("CHATWIRE_CURSOR_HEADER", "x-last-message-id");

    let config = Config::load().unwrap();
    assert_eq!(config.gateway.token, "env-token");
    assert_eq!(config.gateway.url, "ws://localhost:9000/ws");
    assert_eq!(config.commands.prefix, "$");
    assert_eq!(config.gateway.cursor_header, "x-last-message-id");

    // the token is scrubbed from the environment once read
    assert!(std::env::var("CHATWIRE_TOKEN").is_err());

    clear_config_env_vars();
}

#[test]
#[serial]
fn test_missing_token_is_rejected() {
    clear_config_env_vars();

    let file = write_config("[commands]\nprefix = \"!\"\n");
    std::env::set_var("CHATWIRE_CONFIG_PATH", file.path());

    let err = Config::load().unwrap_err();
    assert!(err.to_string().contains("gateway.token"));

    clear_config_env_vars();
}

#[test]
#[serial]
fn test_token_from_env_alone_is_enough() {
    clear_config_env_vars();
    let dir = tempfile::tempdir().unwrap();
    std::env::set_var("CHATWIRE_CONFIG_PATH", dir.path().join("absent.toml"));
    std::env::set_var("CHATWIRE_TOKEN", "env-token");

    let config = Config::load().unwrap();
    assert_eq!(config.gateway.token, "env-token");
    assert_eq!(config.gateway.url, "wss://www.guilded.gg/websocket/v1");
    assert_eq!(config.commands.prefix, "!");

    clear_config_env_vars();
}

#[test]
#[serial]
fn test_invalid_toml_reports_path() {
    clear_config_env_vars();

    let file = write_config("[gateway\ntoken = ");
    let err = Config::load_from(file.path()).unwrap_err();
    assert!(format!("{:#}", err).contains("Failed to parse"));
}

#[test]
#[serial]
fn test_explicit_missing_path_is_an_error() {
    clear_config_env_vars();
    let dir = tempfile::tempdir().unwrap();

    let err = Config::load_from(&dir.path().join("nope.toml")).unwrap_err();
    assert!(err.to_string().contains("Failed to read"));
}

#[test]
#[serial]
fn test_debug_output_redacts_token() {
    clear_config_env_vars();

    let file = write_config("[gateway]\ntoken = \"super-secret-token\"\n");
    let config = Config::load_from(file.path()).unwrap();
    let rendered = format!("{:?}", config);
    assert!(!rendered.contains("super-secret-token"));
    assert!(rendered.contains("REDACTED"));
}
