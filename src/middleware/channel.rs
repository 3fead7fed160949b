//! Cross-context broadcast of invalidation messages
//!
//! Independent execution contexts (each with its own query cache) converge
//! by exchanging the raw `affects` declaration of every successful mutation.
//! The channel is passed to the middleware explicitly; any context that
//! subscribes to the same event name on the same channel participates.

use crate::error::{InvalidationError, Result};
use crate::subscription::Subscription;
use crate::types::EntityMutationConfig;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};
use uuid::Uuid;

/// Well-known event name for invalidation broadcasts
pub const QUERY_INVALIDATION_EVENT: &str = "QUERY_INVALIDATION_EVENT";

/// Payload exchanged between contexts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvalidationMessage {
    /// Event name the message is published under
    pub event: String,

    /// Middleware instance that published the message
    pub origin: Uuid,

    /// Declared affected entities, as declared by the mutation
    pub affects: Vec<EntityMutationConfig>,

    /// When the message was published
    pub sent_at: DateTime<Utc>,
}

impl InvalidationMessage {
    pub fn new(event: impl Into<String>, origin: Uuid, affects: Vec<EntityMutationConfig>) -> Self {
        Self {
            event: event.into(),
            origin,
            affects,
            sent_at: Utc::now(),
        }
    }

    /// Serialize for transport across a process boundary
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| InvalidationError::SerializationError(e.to_string()))
    }

    /// Deserialize a message received from another process
    pub fn from_json(input: &str) -> Result<Self> {
        serde_json::from_str(input).map_err(|e| InvalidationError::SerializationError(e.to_string()))
    }
}

/// Callback invoked for every message on a subscribed event
pub type MessageHandler = Arc<dyn Fn(&InvalidationMessage) + Send + Sync>;

/// Publish/subscribe transport between execution contexts
pub trait BroadcastChannel: Send + Sync {
    /// Publish a message under its `event` name
    fn publish(&self, message: InvalidationMessage) -> Result<()>;

    /// Receive every message published under `event`
    fn subscribe(&self, event: &str, handler: MessageHandler) -> Result<Subscription>;
}

type HandlerRegistry = Arc<RwLock<HashMap<String, Vec<(u64, MessageHandler)>>>>;

/// Synchronous in-process event bus
///
/// `publish` runs every handler registered for the event, in registration
/// order, before returning. Handlers are snapshotted before dispatch, so a
/// handler may subscribe or unsubscribe without deadlocking.
#[derive(Default)]
pub struct LocalEventBus {
    handlers: HandlerRegistry,
    next_id: AtomicU64,
}

impl LocalEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of handlers registered for an event
    pub fn handler_count(&self, event: &str) -> usize {
        self.handlers.read().get(event).map_or(0, Vec::len)
    }
}

impl BroadcastChannel for LocalEventBus {
    fn publish(&self, message: InvalidationMessage) -> Result<()> {
        let handlers: Vec<MessageHandler> = self
            .handlers
            .read()
            .get(&message.event)
            .map(|registered| registered.iter().map(|(_, h)| Arc::clone(h)).collect())
            .unwrap_or_default();

        trace!(
            "Dispatching {} to {} handlers from {}",
            message.event,
            handlers.len(),
            message.origin
        );

        for handler in &handlers {
            handler(&message);
        }

        Ok(())
    }

    fn subscribe(&self, event: &str, handler: MessageHandler) -> Result<Subscription> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.handlers
            .write()
            .entry(event.to_string())
            .or_default()
            .push((id, handler));
        debug!("Registered handler {} for {}", id, event);

        let handlers = Arc::clone(&self.handlers);
        let event = event.to_string();
        Ok(Subscription::new(move || {
            let mut handlers = handlers.write();
            if let Some(registered) = handlers.get_mut(&event) {
                registered.retain(|(handler_id, _)| *handler_id != id);
                if registered.is_empty() {
                    handlers.remove(&event);
                }
            }
            debug!("Removed handler {} for {}", id, event);
        }))
    }
}
