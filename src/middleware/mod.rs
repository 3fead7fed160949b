//! # Mutation Middleware
//!
//! Bridges a query cache's mutation-completion feed into the invalidation
//! engine and keeps independent caches consistent through a broadcast
//! channel.
//!
//! On every successful mutation that declares affected entities, the
//! middleware applies them to its local cache and then publishes the raw
//! declaration. Every other middleware listening on the same channel and
//! event name applies the identical sequence to its own cache. Receivers
//! never re-publish, so propagation is exactly one hop.
//!
//! ## Example
//!
//! ```rust
//! use ouroboros_invalidation::cache::{MemoryQueryCache, MutationEvent};
//! use ouroboros_invalidation::graph::{EntityConfig, EntityConfigMap};
//! use ouroboros_invalidation::middleware::{create_mutation_middleware, LocalEventBus};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # fn main() -> ouroboros_invalidation::Result<()> {
//! let mut entities = EntityConfigMap::new();
//! entities.insert("user".to_string(), EntityConfig::new("user").invalidates(["post"]));
//!
//! let bus = Arc::new(LocalEventBus::new());
//! let cache = Arc::new(MemoryQueryCache::new());
//! cache.set_query_data(vec![json!("post"), json!(1)], json!("hello"));
//!
//! let mut middleware = create_mutation_middleware(cache.clone(), bus, &entities)?;
//!
//! cache.notify_mutation(&MutationEvent::success(1, ["user"]));
//! assert!(cache.get_query_state(&[json!("post"), json!(1)]).unwrap().is_invalidated);
//!
//! middleware.cleanup();
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod tokio_channel;

pub use channel::{
    BroadcastChannel, InvalidationMessage, LocalEventBus, MessageHandler, QUERY_INVALIDATION_EVENT,
};
pub use tokio_channel::TokioBroadcastChannel;

use crate::cache::{MutationEvent, MutationListener, QueryClient};
use crate::config::MiddlewareConfig;
use crate::engine::apply_affects;
use crate::error::Result;
use crate::graph::{build_graph, EntityConfigMap, EntityGraph};
use crate::subscription::Subscription;
use parking_lot::Mutex;
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

/// Lifecycle state of a middleware instance
///
/// `Active -> TornDown` is one way; build a new instance to resume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MiddlewareState {
    Active,
    TornDown,
}

impl fmt::Display for MiddlewareState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MiddlewareState::Active => write!(f, "active"),
            MiddlewareState::TornDown => write!(f, "torn-down"),
        }
    }
}

/// A live subscription of the invalidation engine to one query cache
///
/// Dropping the middleware tears it down, so a middleware owned by a scope
/// releases its subscriptions when the scope ends.
pub struct MutationMiddleware {
    id: Uuid,
    graph: Arc<EntityGraph>,
    config: MiddlewareConfig,
    mutation_subscription: Subscription,
    channel_subscription: Option<Subscription>,
    state: MiddlewareState,
}

/// Create a middleware with the default configuration
pub fn create_mutation_middleware(
    client: Arc<dyn QueryClient>,
    channel: Arc<dyn BroadcastChannel>,
    entities: &EntityConfigMap,
) -> Result<MutationMiddleware> {
    MutationMiddleware::new(client, channel, entities, MiddlewareConfig::default())
}

impl MutationMiddleware {
    /// Build the graph and subscribe to the mutation feed and the channel
    ///
    /// The client is held weakly by both callbacks, so the middleware never
    /// keeps a cache alive on its own.
    pub fn new(
        client: Arc<dyn QueryClient>,
        channel: Arc<dyn BroadcastChannel>,
        entities: &EntityConfigMap,
        config: MiddlewareConfig,
    ) -> Result<Self> {
        config.validate()?;

        let id = Uuid::new_v4();
        let graph = Arc::new(build_graph(entities));
        // Local and remote sequences on one cache never interleave
        let apply_lock = Arc::new(Mutex::new(()));

        let channel_subscription = if config.listen {
            let handler = receive_handler(
                id,
                Arc::clone(&graph),
                Arc::downgrade(&client),
                Arc::clone(&apply_lock),
            );
            Some(channel.subscribe(&config.event_name, handler)?)
        } else {
            None
        };

        let listener = mutation_listener(
            id,
            Arc::clone(&graph),
            Arc::downgrade(&client),
            apply_lock,
            config.broadcast.then_some(channel),
            config.event_name.clone(),
        );
        let mutation_subscription = client.subscribe_mutations(listener);

        info!(
            "Mutation middleware {} active ({} entities, event {}, broadcast: {}, listen: {})",
            id,
            graph.len(),
            config.event_name,
            config.broadcast,
            config.listen
        );

        Ok(Self {
            id,
            graph,
            config,
            mutation_subscription,
            channel_subscription,
            state: MiddlewareState::Active,
        })
    }

    /// Instance id, carried as `origin` on published messages
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The graph built at construction
    pub fn graph(&self) -> &EntityGraph {
        &self.graph
    }

    pub fn config(&self) -> &MiddlewareConfig {
        &self.config
    }

    pub fn state(&self) -> MiddlewareState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == MiddlewareState::Active
    }

    /// Release the channel receiver and the mutation subscription
    ///
    /// Safe to call more than once; later calls do nothing.
    pub fn cleanup(&mut self) {
        if self.state == MiddlewareState::TornDown {
            trace!("Mutation middleware {} already torn down", self.id);
            return;
        }

        if let Some(subscription) = self.channel_subscription.as_mut() {
            subscription.unsubscribe();
        }
        self.mutation_subscription.unsubscribe();
        self.state = MiddlewareState::TornDown;

        info!("Mutation middleware {} torn down", self.id);
    }
}

impl Drop for MutationMiddleware {
    fn drop(&mut self) {
        self.cleanup();
    }
}

impl fmt::Debug for MutationMiddleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutationMiddleware")
            .field("id", &self.id)
            .field("entities", &self.graph.len())
            .field("config", &self.config)
            .field("state", &self.state)
            .finish()
    }
}

fn mutation_listener(
    id: Uuid,
    graph: Arc<EntityGraph>,
    client: Weak<dyn QueryClient>,
    apply_lock: Arc<Mutex<()>>,
    channel: Option<Arc<dyn BroadcastChannel>>,
    event_name: String,
) -> MutationListener {
    Arc::new(move |event: &MutationEvent| {
        let Some(affects) = event.successful_affects() else {
            trace!(
                "Skipping mutation {} ({}): nothing to invalidate",
                event.mutation_id,
                event.status
            );
            return;
        };
        let Some(client) = client.upgrade() else {
            debug!("Query client for middleware {} is gone", id);
            return;
        };

        let operations = {
            let _guard = apply_lock.lock();
            apply_affects(&graph, client.as_ref(), affects)
        };
        debug!(
            "Mutation {} affected {} entities: {} cache operations",
            event.mutation_id,
            affects.len(),
            operations.len()
        );

        if let Some(channel) = &channel {
            let message = InvalidationMessage::new(event_name.clone(), id, affects.to_vec());
            if let Err(e) = channel.publish(message) {
                warn!("Failed to broadcast mutation {}: {}", event.mutation_id, e);
            }
        }
    })
}

fn receive_handler(
    id: Uuid,
    graph: Arc<EntityGraph>,
    client: Weak<dyn QueryClient>,
    apply_lock: Arc<Mutex<()>>,
) -> MessageHandler {
    Arc::new(move |message: &InvalidationMessage| {
        if message.origin == id {
            trace!("Ignoring own broadcast on {}", message.event);
            return;
        }
        if message.affects.is_empty() {
            return;
        }
        let Some(client) = client.upgrade() else {
            debug!("Query client for middleware {} is gone", id);
            return;
        };

        let operations = {
            let _guard = apply_lock.lock();
            apply_affects(&graph, client.as_ref(), &message.affects)
        };
        debug!(
            "Applied broadcast from {}: {} cache operations",
            message.origin,
            operations.len()
        );
    })
}
