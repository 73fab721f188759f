// ABOUTME: Event registry mapping event names to typed descriptors and broadcast streams.
// ABOUTME: Dispatch decodes each payload once and fans it out on that event's own stream.

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};

use crate::error::{EventError, SharedEventError};
use crate::model::{event_names, MessageDeletedEvent, MessageEvent};

/// Default per-event broadcast buffer
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// One item on a typed event stream: the decoded value, or the decode failure
pub type EventItem<T> = Result<Arc<T>, SharedEventError>;

/// Payload transform for a registered event kind
pub type Transform<T> = Arc<dyn Fn(&Value) -> anyhow::Result<T> + Send + Sync>;

/// Type-erased stream so descriptors of different payload types share one table
trait ErasedStream: Send + Sync {
    fn publish(&self, event: &str, payload: &Value);
    fn receiver_count(&self) -> usize;
    fn as_any(&self) -> &dyn Any;
}

struct TypedStream<T> {
    transform: Transform<T>,
    sender: broadcast::Sender<EventItem<T>>,
}

impl<T: Send + Sync + 'static> ErasedStream for TypedStream<T> {
    fn publish(&self, event: &str, payload: &Value) {
        let item = match (self.transform)(payload) {
            Ok(value) => Ok(Arc::new(value)),
            Err(e) => {
                tracing::warn!(event = %event, error = %e, "Event payload transform failed");
                Err(Arc::new(EventError::Decode {
                    event: event.to_string(),
                    message: e.to_string(),
                }))
            }
        };
        // No subscribers is fine; the item is simply discarded
        let _ = self.sender.send(item);
    }

    fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Immutable description of one event kind
pub struct EventDescriptor {
    name: String,
    type_name: &'static str,
    stream: Box<dyn ErasedStream>,
}

impl EventDescriptor {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rust type the payload is decoded into
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Number of live subscriptions on this event's stream
    pub fn subscriber_count(&self) -> usize {
        self.stream.receiver_count()
    }
}

impl std::fmt::Debug for EventDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDescriptor")
            .field("name", &self.name)
            .field("type_name", &self.type_name)
            .finish()
    }
}

/// Table of event kinds known to this build.
///
/// Populate it with `register` during startup, then hand it to the connection
/// inside an `Arc`; from then on it is only read.
pub struct EventRegistry {
    descriptors: HashMap<String, EventDescriptor>,
    capacity: usize,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_EVENT_CAPACITY)
    }

    /// Create an empty registry whose streams buffer `capacity` items each
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            descriptors: HashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Registry preloaded with the chat message events
    pub fn with_default_events() -> Self {
        let mut registry = Self::new();
        registry.register_defaults();
        registry
    }

    /// Register the chat message events on an existing registry
    pub fn register_defaults(&mut self) -> &mut Self {
        self.register::<MessageEvent>(event_names::CHAT_MESSAGE_CREATED)
            .register::<MessageEvent>(event_names::CHAT_MESSAGE_UPDATED)
            .register::<MessageDeletedEvent>(event_names::CHAT_MESSAGE_DELETED)
    }

    /// Register an event kind whose payload deserializes directly into `T`
    pub fn register<T>(&mut self, name: impl Into<String>) -> &mut Self
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        self.register_with::<T, _>(name, |payload| {
            Ok(serde_json::from_value::<T>(payload.clone())?)
        })
    }

    /// Register an event kind with a custom payload transform.
    /// Registering an existing name replaces its descriptor.
    pub fn register_with<T, F>(&mut self, name: impl Into<String>, transform: F) -> &mut Self
    where
        T: Send + Sync + 'static,
        F: Fn(&Value) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        let name = name.into();
        let (sender, _) = broadcast::channel(self.capacity);
        let descriptor = EventDescriptor {
            name: name.clone(),
            type_name: std::any::type_name::<T>(),
            stream: Box::new(TypedStream {
                transform: Arc::new(transform),
                sender,
            }),
        };
        if self.descriptors.insert(name.clone(), descriptor).is_some() {
            tracing::debug!(event = %name, "Replaced event descriptor");
        }
        self
    }

    /// Publish an event payload to its stream.
    ///
    /// Returns false when the name is not registered; such events are dropped
    /// so newer service-side event kinds never disturb this build.
    pub fn dispatch(&self, name: &str, payload: &Value) -> bool {
        match self.descriptors.get(name) {
            Some(descriptor) => {
                descriptor.stream.publish(name, payload);
                true
            }
            None => {
                tracing::trace!(event = %name, "Dropping unregistered event");
                false
            }
        }
    }

    /// Subscribe to an event kind, receiving payloads decoded as `T`
    pub fn subscribe<T>(&self, name: &str) -> Result<EventSubscription<T>, EventError>
    where
        T: Send + Sync + 'static,
    {
        let descriptor = self
            .descriptors
            .get(name)
            .ok_or_else(|| EventError::NotRegistered {
                event: name.to_string(),
            })?;
        let stream = descriptor
            .stream
            .as_any()
            .downcast_ref::<TypedStream<T>>()
            .ok_or_else(|| EventError::TypeMismatch {
                event: name.to_string(),
                registered: descriptor.type_name,
                requested: std::any::type_name::<T>(),
            })?;
        Ok(EventSubscription {
            event: name.to_string(),
            rx: stream.sender.subscribe(),
        })
    }

    pub fn descriptor(&self, name: &str) -> Option<&EventDescriptor> {
        self.descriptors.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.descriptors.contains_key(name)
    }

    /// Registered event names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.descriptors.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

impl Default for EventRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// A live subscription to one event kind. Dropping it unsubscribes.
pub struct EventSubscription<T> {
    event: String,
    rx: broadcast::Receiver<EventItem<T>>,
}

impl<T: Send + Sync + 'static> EventSubscription<T> {
    pub fn event_name(&self) -> &str {
        &self.event
    }

    /// Receive the next item, or None once the registry is gone.
    ///
    /// A subscriber that falls behind skips the overwritten items and keeps
    /// going; the gap is logged.
    pub async fn recv(&mut self) -> Option<EventItem<T>> {
        loop {
            match self.rx.recv().await {
                Ok(item) => return Some(item),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(event = %self.event, skipped, "Event subscriber lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Convert into a `Stream`, skipping over lag gaps
    pub fn into_stream(self) -> impl Stream<Item = EventItem<T>> + Send + 'static {
        let event = self.event;
        BroadcastStream::new(self.rx).filter_map(move |item| match item {
            Ok(item) => Some(item),
            Err(e) => {
                tracing::warn!(event = %event, error = %e, "Event stream lagged");
                None
            }
        })
    }
}
