// ABOUTME: Main entry point for the chat gateway bot
// ABOUTME: Loads config, initializes logging, starts the client, and runs until Ctrl+C

use anyhow::{Context, Result};
use chatwire::{builtin, logging, ChatClient, Config};
use chatwire::commands::CommandOutcome;
use clap::Parser;
use std::path::PathBuf;
use tokio::sync::broadcast::error::RecvError;

#[derive(Debug, Parser)]
#[command(name = "chatwire", version, about = "Prefix-command bot for a real-time chat gateway")]
struct Cli {
    /// Path to config.toml (overrides CHATWIRE_CONFIG_PATH and ./config.toml)
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Validate configuration and the command table, then exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    dotenvy::dotenv().ok();
    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    logging::init(&config.logging)?;

    tracing::info!(
        url = %config.gateway.url,
        prefix = %config.commands.prefix,
        reconnect = config.gateway.reconnect.enabled,
        "Configuration loaded"
    );

    let commands = builtin::standard_table([]).context("Invalid command table")?;
    if cli.check {
        println!("{}", commands.help(&config.commands.prefix));
        return Ok(());
    }

    let client = ChatClient::new(config, commands);
    spawn_observers(&client);
    client.start().await?;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl+c")?;

    tracing::info!("Shutting down");
    client.shutdown().await;
    Ok(())
}

/// Log connection changes, gateway errors, and command outcomes
fn spawn_observers(client: &ChatClient) {
    let mut notifications = client.subscribe_notifications();
    tokio::spawn(async move {
        loop {
            match notifications.recv().await {
                Ok(event) => tracing::info!(event = ?event, "Connection event"),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Connection event observer lagged")
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let mut outcomes = client.subscribe_outcomes();
    let prefix = client.invoker().prefix().to_string();
    tokio::spawn(async move {
        loop {
            match outcomes.recv().await {
                Ok(CommandOutcome::Rejected { command, event, error }) => {
                    tracing::info!(
                        channel = %event.message.channel_id,
                        error = %error,
                        usage = %command.usage(&prefix),
                        "Command rejected"
                    );
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Command outcome observer lagged")
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
}
