//! # Ouroboros Invalidation (ouroboros-invalidation)
//!
//! Declarative, mutation-driven invalidation for client-side query caches.
//!
//! ## Features
//!
//! - Entity dependency graph with transitive, cycle-safe resolution
//! - Two relation kinds: `invalidate` (mark stale) and `reset` (drop data)
//! - Per-mutation query key overrides that suppress the graph defaults
//! - Middleware bound to a query cache's mutation lifecycle feed
//! - Cross-context propagation over a pluggable broadcast channel
//! - Entity configuration from JSON or YAML files
//!
//! ## Entity Graph
//!
//! Each entity declares which other entities go stale when it is mutated.
//! Dependencies are resolved transitively, so `user -> post -> comment`
//! makes a `user` mutation invalidate posts and comments too.
//!
//! ```
//! use ouroboros_invalidation::{build_graph, get_dependencies, EntityConfig, EntityConfigMap, RelationKind};
//!
//! let mut entities = EntityConfigMap::new();
//! entities.insert("user".to_string(), EntityConfig::new("user").invalidates(["post"]).resets(["stats"]));
//! entities.insert("post".to_string(), EntityConfig::new("post").invalidates(["comment"]));
//!
//! let graph = build_graph(&entities);
//! assert_eq!(get_dependencies(&graph, "user", RelationKind::Invalidate), vec!["post", "comment"]);
//! assert_eq!(get_dependencies(&graph, "user", RelationKind::Reset), vec!["stats"]);
//! ```
//!
//! ## Mutation Middleware
//!
//! A [`MutationMiddleware`] watches one query cache. Every successful
//! mutation that declares `affects` is applied locally and broadcast to the
//! other contexts sharing the channel.
//!
//! ```
//! use ouroboros_invalidation::{
//!     create_mutation_middleware, EntityAction, EntityConfig, EntityConfigMap, LocalEventBus,
//!     MemoryQueryCache, MutationEvent,
//! };
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # fn main() -> ouroboros_invalidation::Result<()> {
//! let mut entities = EntityConfigMap::new();
//! entities.insert("user".to_string(), EntityConfig::new("user").invalidates(["post"]));
//!
//! let bus = Arc::new(LocalEventBus::new());
//! let tab_a = Arc::new(MemoryQueryCache::new());
//! let tab_b = Arc::new(MemoryQueryCache::new());
//! tab_b.set_query_data(vec![json!("post")], json!([]));
//!
//! let _a = create_mutation_middleware(tab_a.clone(), bus.clone(), &entities)?;
//! let _b = create_mutation_middleware(tab_b.clone(), bus.clone(), &entities)?;
//!
//! tab_a.notify_mutation(&MutationEvent::success(1, [EntityAction::invalidate("user")]));
//! assert!(tab_b.get_query_state(&[json!("post")]).unwrap().is_invalidated);
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod graph;
pub mod middleware;
pub mod subscription;
pub mod types;

// Re-export main types for convenience
pub use cache::{
    MemoryQueryCache, MutationEvent, MutationListener, MutationStatus, QueryCacheStats, QueryClient,
    QueryState,
};
pub use config::{
    load_entity_config_file, load_entity_config_json, load_entity_config_yaml, MiddlewareConfig,
    MiddlewareConfigBuilder,
};
pub use engine::{apply_affects, parse_affects, plan_operations, process_entity_config, update_queries};
pub use error::{InvalidationError, Result};
pub use graph::{build_graph, get_dependencies, EntityConfig, EntityConfigMap, EntityGraph, EntityNode};
pub use middleware::{
    create_mutation_middleware, BroadcastChannel, InvalidationMessage, LocalEventBus, MessageHandler,
    MiddlewareState, MutationMiddleware, TokioBroadcastChannel, QUERY_INVALIDATION_EVENT,
};
pub use subscription::Subscription;
pub use types::{
    default_query_key, CacheOperation, EntityAction, EntityMutationConfig, QueryKey, QueryKeyConfig,
    RelationKind,
};
