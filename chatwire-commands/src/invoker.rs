// ABOUTME: Turns incoming chat messages into command invocations on independent tasks.
// ABOUTME: Matches prefix and name, converts arguments, isolates handler errors and panics.

use chatwire_core::{BotUser, EventSubscription, MessageEvent};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use crate::context::{Arguments, InvocationContext};
use crate::declaration::CommandHandler;
use crate::descriptor::CommandDescriptor;
use crate::error::InvocationError;
use crate::table::{CommandEntry, CommandTable};

/// Settings from the [commands] TOML table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvokerConfig {
    #[serde(default = "default_prefix")]
    pub prefix: String,
    /// Skip messages written by the connected bot
    #[serde(default = "default_true")]
    pub ignore_self: bool,
    #[serde(default = "default_outcome_capacity")]
    pub outcome_capacity: usize,
}

impl Default for InvokerConfig {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            ignore_self: true,
            outcome_capacity: default_outcome_capacity(),
        }
    }
}

fn default_prefix() -> String {
    "!".to_string()
}

fn default_true() -> bool {
    true
}

fn default_outcome_capacity() -> usize {
    64
}

/// How a matched message ended
#[derive(Debug, Clone)]
pub enum CommandOutcome {
    Completed {
        command: Arc<CommandDescriptor>,
        event: Arc<MessageEvent>,
        elapsed: Duration,
    },
    /// Argument count or conversion failed; the handler never ran
    Rejected {
        command: Arc<CommandDescriptor>,
        event: Arc<MessageEvent>,
        error: InvocationError,
    },
    /// The handler returned an error or panicked
    Failed {
        command: Arc<CommandDescriptor>,
        event: Arc<MessageEvent>,
        error: InvocationError,
    },
}

impl CommandOutcome {
    pub fn command(&self) -> &Arc<CommandDescriptor> {
        match self {
            Self::Completed { command, .. }
            | Self::Rejected { command, .. }
            | Self::Failed { command, .. } => command,
        }
    }

    pub fn event(&self) -> &Arc<MessageEvent> {
        match self {
            Self::Completed { event, .. } | Self::Rejected { event, .. } | Self::Failed { event, .. } => {
                event
            }
        }
    }

    pub fn error(&self) -> Option<&InvocationError> {
        match self {
            Self::Completed { .. } => None,
            Self::Rejected { error, .. } | Self::Failed { error, .. } => Some(error),
        }
    }
}

/// A message that names a known command
pub struct CommandMatch<'a> {
    entry: &'a CommandEntry,
    /// Name or alias as typed
    pub invoked_as: &'a str,
    /// Everything after the command token
    pub arguments: &'a str,
}

impl<'a> CommandMatch<'a> {
    pub fn command(&self) -> &'a Arc<CommandDescriptor> {
        &self.entry.descriptor
    }

    pub fn tokens(&self) -> Vec<&'a str> {
        self.arguments.split_whitespace().collect()
    }
}

pub struct CommandInvoker {
    table: Arc<CommandTable>,
    config: InvokerConfig,
    self_user: Option<watch::Receiver<Option<BotUser>>>,
    outcomes: broadcast::Sender<CommandOutcome>,
}

impl CommandInvoker {
    pub fn new(table: Arc<CommandTable>, config: InvokerConfig) -> Self {
        let (outcomes, _) = broadcast::channel(config.outcome_capacity.max(1));
        Self {
            table,
            config,
            self_user: None,
            outcomes,
        }
    }

    /// Identity used to drop the bot's own messages when `ignore_self` is set
    pub fn with_self_user(mut self, self_user: watch::Receiver<Option<BotUser>>) -> Self {
        self.self_user = Some(self_user);
        self
    }

    pub fn table(&self) -> &Arc<CommandTable> {
        &self.table
    }

    pub fn prefix(&self) -> &str {
        &self.config.prefix
    }

    pub fn subscribe_outcomes(&self) -> broadcast::Receiver<CommandOutcome> {
        self.outcomes.subscribe()
    }

    /// Prefix immediately followed by a known name or alias
    pub fn match_command<'a>(&'a self, content: &'a str) -> Option<CommandMatch<'a>> {
        let body = content.strip_prefix(self.config.prefix.as_str())?;
        let (token, arguments) = match body.find(char::is_whitespace) {
            Some(end) => body.split_at(end),
            None => (body, ""),
        };
        if token.is_empty() {
            return None;
        }
        let entry = self.table.resolve(token)?;
        Some(CommandMatch {
            entry,
            invoked_as: token,
            arguments,
        })
    }

    /// Process one message. Returns the handler task when a command started.
    ///
    /// Must be called from within a tokio runtime.
    pub fn handle_message(&self, event: Arc<MessageEvent>) -> Option<JoinHandle<()>> {
        if self.is_own_message(&event) {
            return None;
        }

        let matched = self.match_command(event.content())?;
        let command = matched.command().clone();
        let handler = matched.entry.handler.clone();
        let invoked_as = matched.invoked_as.to_string();

        let args = match command.convert(&matched.tokens()) {
            Ok(args) => args,
            Err(error) => {
                tracing::debug!(
                    command = %command.name,
                    author = %event.author(),
                    error = %error,
                    "Command rejected"
                );
                let _ = self.outcomes.send(CommandOutcome::Rejected {
                    command,
                    event: event.clone(),
                    error,
                });
                return None;
            }
        };

        tracing::debug!(
            command = %command.name,
            invoked_as = %invoked_as,
            author = %event.author(),
            "Invoking command"
        );
        let ctx = InvocationContext::new(event, command, invoked_as, self.config.prefix.clone());
        Some(self.spawn_invocation(handler, ctx, args))
    }

    /// Feed every decoded message from `subscription` through the invoker
    /// until the stream closes.
    pub fn listen(self: Arc<Self>, mut subscription: EventSubscription<MessageEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(item) = subscription.recv().await {
                match item {
                    Ok(event) => {
                        self.handle_message(event);
                    }
                    Err(error) => {
                        tracing::debug!(error = %error, "Skipping undecodable message");
                    }
                }
            }
            tracing::debug!(event = subscription.event_name(), "Command listener stopped");
        })
    }

    fn is_own_message(&self, event: &MessageEvent) -> bool {
        if !self.config.ignore_self {
            return false;
        }
        self.self_user.as_ref().is_some_and(|user| {
            user.borrow()
                .as_ref()
                .is_some_and(|bot| &bot.id == event.author())
        })
    }

    fn spawn_invocation(
        &self,
        handler: Arc<dyn CommandHandler>,
        ctx: InvocationContext,
        args: Arguments,
    ) -> JoinHandle<()> {
        let outcomes = self.outcomes.clone();
        let command = ctx.command().clone();
        let event = ctx.event().clone();

        tokio::spawn(async move {
            let started = Instant::now();
            let result = AssertUnwindSafe(handler.invoke(ctx, args)).catch_unwind().await;
            let elapsed = started.elapsed();

            let outcome = match result {
                Ok(Ok(())) => {
                    tracing::debug!(
                        command = %command.name,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "Command completed"
                    );
                    CommandOutcome::Completed {
                        command,
                        event,
                        elapsed,
                    }
                }
                Ok(Err(e)) => {
                    tracing::warn!(command = %command.name, error = %e, "Command handler failed");
                    let error = InvocationError::HandlerFailed {
                        command: command.name.clone(),
                        message: format!("{:#}", e),
                    };
                    CommandOutcome::Failed {
                        command,
                        event,
                        error,
                    }
                }
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    tracing::error!(command = %command.name, panic = %message, "Command handler panicked");
                    let error = InvocationError::HandlerPanicked {
                        command: command.name.clone(),
                        message,
                    };
                    CommandOutcome::Failed {
                        command,
                        event,
                        error,
                    }
                }
            };
            // no receivers is fine
            let _ = outcomes.send(outcome);
        })
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
