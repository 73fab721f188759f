// ABOUTME: Commands every bot gets: ping and help.
// ABOUTME: Replies are logged against the channel since the client speaks only the gateway.

use async_trait::async_trait;
use chatwire_commands::{
    build, Arguments, CommandDeclaration, CommandHandler, CommandTable, ConfigurationError,
    InvocationContext,
};
use chrono::Utc;
use std::sync::{Arc, OnceLock, Weak};

/// Build a table from `extra` plus the built-in `ping` and `help`
pub fn standard_table(
    extra: impl IntoIterator<Item = CommandDeclaration>,
) -> Result<Arc<CommandTable>, ConfigurationError> {
    let slot = Arc::new(OnceLock::new());
    let help = CommandDeclaration::new("HelpCommand", HelpCommand { table: slot.clone() })
        .description("List commands, or show usage for one")
        .param::<Option<String>>("command");
    let ping = CommandDeclaration::from_fn("PingCommandAsync", ping)
        .description("Check that the bot is listening");

    let table = Arc::new(build(extra.into_iter().chain([ping, help]))?);
    let _ = slot.set(Arc::downgrade(&table));
    Ok(table)
}

async fn ping(ctx: InvocationContext, _args: Arguments) -> anyhow::Result<()> {
    let lag_ms = (Utc::now() - ctx.message().created_at).num_milliseconds();
    tracing::info!(
        channel = %ctx.channel_id(),
        author = %ctx.author(),
        lag_ms,
        reply = "pong",
        "Command reply"
    );
    Ok(())
}

struct HelpCommand {
    table: Arc<OnceLock<Weak<CommandTable>>>,
}

#[async_trait]
impl CommandHandler for HelpCommand {
    async fn invoke(&self, ctx: InvocationContext, args: Arguments) -> anyhow::Result<()> {
        let table = self
            .table
            .get()
            .and_then(Weak::upgrade)
            .ok_or_else(|| anyhow::anyhow!("command table is no longer available"))?;

        let reply = match args.get::<String>(0) {
            Some(name) => match table.get(&name) {
                Some(command) => command.usage(ctx.prefix()),
                None => format!("Unknown command: {}", name),
            },
            None => table.help(ctx.prefix()),
        };
        tracing::info!(channel = %ctx.channel_id(), reply = %reply, "Command reply");
        Ok(())
    }
}
