// ABOUTME: What a command handler receives: the triggering message and its converted arguments.

use chatwire_core::model::ChatMessage;
use chatwire_core::{HashId, MessageEvent};
use std::sync::Arc;
use uuid::Uuid;

use crate::descriptor::CommandDescriptor;
use crate::kind::{ArgValue, FromArgValue};

/// Converted positional arguments, indexed like the declared parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Arguments {
    values: Vec<Option<ArgValue>>,
    rest: Option<Vec<String>>,
}

impl Arguments {
    pub(crate) fn new(values: Vec<Option<ArgValue>>, rest: Option<Vec<String>>) -> Self {
        Self { values, rest }
    }

    /// Typed value at `index`; `None` if absent or declared with another type
    pub fn get<T: FromArgValue>(&self, index: usize) -> Option<T> {
        self.value(index).and_then(T::from_arg)
    }

    pub fn value(&self, index: usize) -> Option<&ArgValue> {
        self.values.get(index).and_then(Option::as_ref)
    }

    pub fn is_present(&self, index: usize) -> bool {
        self.value(index).is_some()
    }

    /// Tokens captured by the rest parameter, empty when there is none
    pub fn rest(&self) -> &[String] {
        self.rest.as_deref().unwrap_or_default()
    }

    /// Number of declared positional (non-rest) parameters
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Per-invocation context handed to a command handler.
#[derive(Debug, Clone)]
pub struct InvocationContext {
    event: Arc<MessageEvent>,
    command: Arc<CommandDescriptor>,
    invoked_as: String,
    prefix: String,
}

impl InvocationContext {
    pub fn new(
        event: Arc<MessageEvent>,
        command: Arc<CommandDescriptor>,
        invoked_as: impl Into<String>,
        prefix: impl Into<String>,
    ) -> Self {
        Self {
            event,
            command,
            invoked_as: invoked_as.into(),
            prefix: prefix.into(),
        }
    }

    pub fn event(&self) -> &Arc<MessageEvent> {
        &self.event
    }

    pub fn message(&self) -> &ChatMessage {
        &self.event.message
    }

    pub fn content(&self) -> &str {
        self.event.content()
    }

    pub fn author(&self) -> &HashId {
        self.event.author()
    }

    pub fn channel_id(&self) -> Uuid {
        self.event.message.channel_id
    }

    pub fn server_id(&self) -> Option<&HashId> {
        self.event.server_id.as_ref()
    }

    pub fn command(&self) -> &Arc<CommandDescriptor> {
        &self.command
    }

    /// The name or alias the user typed
    pub fn invoked_as(&self) -> &str {
        &self.invoked_as
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Usage line for the matched command under the active prefix
    pub fn usage(&self) -> String {
        self.command.usage(&self.prefix)
    }
}
