//! In-process query cache with prefix key matching

use crate::cache::{MutationEvent, MutationListener, QueryClient};
use crate::subscription::Subscription;
use crate::types::QueryKey;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, trace};

/// Observable state of one cached query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryState {
    /// The cached data, `None` when the query is in its initial state
    pub data: Option<Value>,

    /// Whether the query was marked stale since its data was last set
    pub is_invalidated: bool,

    /// When data was last written
    pub data_updated_at: Option<DateTime<Utc>>,

    /// When the query was last invalidated
    pub invalidated_at: Option<DateTime<Utc>>,
}

impl QueryState {
    fn initial() -> Self {
        Self {
            data: None,
            is_invalidated: false,
            data_updated_at: None,
            invalidated_at: None,
        }
    }
}

/// Counters for cache activity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryCacheStats {
    /// Number of queries currently cached
    pub queries: usize,

    /// Invalidate operations received
    pub invalidate_calls: u64,

    /// Reset operations received
    pub reset_calls: u64,

    /// Queries marked stale across all invalidate operations
    pub queries_invalidated: u64,

    /// Queries returned to initial state across all reset operations
    pub queries_reset: u64,

    /// Mutation notifications delivered to listeners
    pub mutations_notified: u64,
}

impl fmt::Display for QueryCacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "QueryCacheStats {{ queries: {}, invalidate_calls: {}, reset_calls: {}, invalidated: {}, reset: {}, mutations: {} }}",
            self.queries,
            self.invalidate_calls,
            self.reset_calls,
            self.queries_invalidated,
            self.queries_reset,
            self.mutations_notified
        )
    }
}

/// Check if `query_key` matches `filter`
///
/// The filter matches when each of its segments partially matches the
/// segment at the same position: objects match when every field of the
/// filter object matches, arrays match element-wise on the filter's length,
/// anything else must be equal. An empty filter matches every key.
pub fn partial_match_key(query_key: &[Value], filter: &[Value]) -> bool {
    filter.len() <= query_key.len()
        && filter
            .iter()
            .zip(query_key)
            .all(|(expected, actual)| partial_deep_equal(actual, expected))
}

fn partial_deep_equal(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::Object(actual), Value::Object(expected)) => expected.iter().all(|(field, value)| {
            actual
                .get(field)
                .map_or(false, |a| partial_deep_equal(a, value))
        }),
        (Value::Array(actual), Value::Array(expected)) => partial_match_key(actual, expected),
        _ => actual == expected,
    }
}

struct CachedQuery {
    query_key: QueryKey,
    state: QueryState,
}

/// Internal cache storage
#[derive(Default)]
struct QueryStore {
    /// Serialized key -> query
    queries: HashMap<String, CachedQuery>,

    stats: QueryCacheStats,
}

type ListenerRegistry = Arc<RwLock<Vec<(u64, MutationListener)>>>;

/// In-memory query cache implementing [`QueryClient`]
///
/// - Thread-safe via `parking_lot::RwLock`
/// - Invalidate and reset apply to every query whose key starts with the
///   given key (see [`partial_match_key`])
/// - Mutation notifications are delivered synchronously, in subscription
///   order, before [`MemoryQueryCache::notify_mutation`] returns
#[derive(Default)]
pub struct MemoryQueryCache {
    store: RwLock<QueryStore>,
    listeners: ListenerRegistry,
    next_listener_id: AtomicU64,
}

impl MemoryQueryCache {
    /// Create an empty cache
    pub fn new() -> Self {
        info!("Initializing in-memory query cache");
        Self::default()
    }

    /// Write data for a query, clearing its invalidated flag
    pub fn set_query_data(&self, query_key: QueryKey, data: Value) {
        let id = key_id(&query_key);
        let mut store = self.store.write();

        let query = store.queries.entry(id).or_insert_with(|| CachedQuery {
            query_key,
            state: QueryState::initial(),
        });
        query.state.data = Some(data);
        query.state.is_invalidated = false;
        query.state.data_updated_at = Some(Utc::now());

        store.stats.queries = store.queries.len();
    }

    /// Get the data of an exact key
    pub fn get_query_data(&self, query_key: &[Value]) -> Option<Value> {
        self.get_query_state(query_key).and_then(|state| state.data)
    }

    /// Get the state of an exact key
    pub fn get_query_state(&self, query_key: &[Value]) -> Option<QueryState> {
        let store = self.store.read();
        store
            .queries
            .get(&key_id(query_key))
            .map(|query| query.state.clone())
    }

    /// Keys of every cached query, sorted by their serialized form
    pub fn query_keys(&self) -> Vec<QueryKey> {
        let store = self.store.read();
        let mut ids: Vec<&String> = store.queries.keys().collect();
        ids.sort();
        ids.into_iter()
            .filter_map(|id| store.queries.get(id).map(|q| q.query_key.clone()))
            .collect()
    }

    /// Remove every query
    pub fn clear(&self) {
        let mut store = self.store.write();
        let count = store.queries.len();
        store.queries.clear();
        store.stats.queries = 0;
        info!("Cleared {} queries from cache", count);
    }

    /// Get cache statistics
    pub fn stats(&self) -> QueryCacheStats {
        self.store.read().stats.clone()
    }

    /// Number of cached queries
    pub fn len(&self) -> usize {
        self.store.read().queries.len()
    }

    /// Check if the cache holds no queries
    pub fn is_empty(&self) -> bool {
        self.store.read().queries.is_empty()
    }

    /// Number of registered mutation listeners
    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Deliver a mutation notification to every listener
    ///
    /// Listeners are snapshotted first, so a listener may issue cache
    /// operations or (un)subscribe without deadlocking.
    pub fn notify_mutation(&self, event: &MutationEvent) {
        let listeners: Vec<MutationListener> = self
            .listeners
            .read()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        trace!(
            "Notifying {} listeners of mutation {} ({})",
            listeners.len(),
            event.mutation_id,
            event.status
        );

        for listener in &listeners {
            listener(event);
        }

        self.store.write().stats.mutations_notified += 1;
    }
}

impl QueryClient for MemoryQueryCache {
    fn invalidate_queries(&self, query_key: &QueryKey) {
        let now = Utc::now();
        let mut store = self.store.write();
        let mut matched = 0;

        for query in store.queries.values_mut() {
            if partial_match_key(&query.query_key, query_key) {
                query.state.is_invalidated = true;
                query.state.invalidated_at = Some(now);
                matched += 1;
            }
        }

        store.stats.invalidate_calls += 1;
        store.stats.queries_invalidated += matched;
        debug!("Invalidated {} queries matching {:?}", matched, query_key);
    }

    fn reset_queries(&self, query_key: &QueryKey) {
        let mut store = self.store.write();
        let mut matched = 0;

        for query in store.queries.values_mut() {
            if partial_match_key(&query.query_key, query_key) {
                query.state = QueryState::initial();
                matched += 1;
            }
        }

        store.stats.reset_calls += 1;
        store.stats.queries_reset += matched;
        debug!("Reset {} queries matching {:?}", matched, query_key);
    }

    fn subscribe_mutations(&self, listener: MutationListener) -> Subscription {
        let id = self.next_listener_id.fetch_add(1, Ordering::SeqCst);
        self.listeners.write().push((id, listener));
        debug!("Registered mutation listener {}", id);

        let listeners = Arc::clone(&self.listeners);
        Subscription::new(move || {
            listeners.write().retain(|(listener_id, _)| *listener_id != id);
            debug!("Removed mutation listener {}", id);
        })
    }
}

/// Stable identity of a key; serializing a JSON array cannot fail
fn key_id(query_key: &[Value]) -> String {
    Value::Array(query_key.to_vec()).to_string()
}
