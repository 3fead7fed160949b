//! # Query Cache Boundary
//!
//! The invalidation engine does not store data. It issues operations against
//! a query cache through the [`QueryClient`] trait and listens to that
//! cache's mutation lifecycle feed.
//!
//! [`MemoryQueryCache`] is an in-process implementation of the boundary,
//! with prefix key matching and synchronous mutation notifications.
//!
//! ## Example
//!
//! ```rust
//! use ouroboros_invalidation::cache::{MemoryQueryCache, QueryClient};
//! use serde_json::json;
//!
//! let cache = MemoryQueryCache::new();
//! cache.set_query_data(vec![json!("post"), json!(1)], json!({ "title": "hello" }));
//!
//! cache.invalidate_queries(&vec![json!("post")]);
//!
//! let state = cache.get_query_state(&vec![json!("post"), json!(1)]).unwrap();
//! assert!(state.is_invalidated);
//! ```

pub mod memory;

pub use memory::{partial_match_key, MemoryQueryCache, QueryCacheStats, QueryState};

use crate::subscription::Subscription;
use crate::types::{EntityMutationConfig, QueryKey};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Lifecycle status of a mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationStatus {
    Idle,
    Pending,
    Success,
    Error,
}

impl fmt::Display for MutationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MutationStatus::Idle => write!(f, "idle"),
            MutationStatus::Pending => write!(f, "pending"),
            MutationStatus::Success => write!(f, "success"),
            MutationStatus::Error => write!(f, "error"),
        }
    }
}

/// A mutation lifecycle notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationEvent {
    /// Identifier assigned by the cache
    pub mutation_id: u64,

    /// Current status of the mutation
    pub status: MutationStatus,

    /// Declared affected entities, if the mutation declares any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affects: Option<Vec<EntityMutationConfig>>,
}

impl MutationEvent {
    pub fn new(mutation_id: u64, status: MutationStatus) -> Self {
        Self {
            mutation_id,
            status,
            affects: None,
        }
    }

    /// A successful mutation declaring affected entities
    pub fn success<I, C>(mutation_id: u64, affects: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<EntityMutationConfig>,
    {
        Self::new(mutation_id, MutationStatus::Success)
            .with_affects(affects.into_iter().map(Into::into).collect())
    }

    pub fn with_affects(mut self, affects: Vec<EntityMutationConfig>) -> Self {
        self.affects = Some(affects);
        self
    }

    /// Declared entities when the mutation succeeded and declares any
    pub fn successful_affects(&self) -> Option<&[EntityMutationConfig]> {
        if self.status != MutationStatus::Success {
            return None;
        }
        self.affects
            .as_deref()
            .filter(|affects| !affects.is_empty())
    }
}

/// Callback invoked for every mutation lifecycle notification
pub type MutationListener = Arc<dyn Fn(&MutationEvent) + Send + Sync>;

/// Operations the invalidation engine needs from a query cache
///
/// Key matching semantics belong to the implementation. Operations are
/// fire-and-forget: failures are the cache's own concern.
pub trait QueryClient: Send + Sync {
    /// Mark every query matching `query_key` as stale
    fn invalidate_queries(&self, query_key: &QueryKey);

    /// Return every query matching `query_key` to its initial state
    fn reset_queries(&self, query_key: &QueryKey);

    /// Register a listener on the mutation lifecycle feed
    fn subscribe_mutations(&self, listener: MutationListener) -> Subscription;
}
