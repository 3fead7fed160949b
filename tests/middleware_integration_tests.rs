//! Integration tests for the mutation middleware
//!
//! These tests verify the complete propagation path:
//! - Local application of successful mutations
//! - Cross-context propagation over the in-process bus
//! - One-hop propagation without relay loops
//! - Teardown of both subscriptions
//! - Delivery over the Tokio broadcast channel

use ouroboros_invalidation::{
    create_mutation_middleware, BroadcastChannel, EntityAction, EntityConfig, EntityConfigMap,
    InvalidationMessage, LocalEventBus, MemoryQueryCache, MiddlewareConfig, MiddlewareState,
    MutationEvent, MutationListener, MutationMiddleware, MutationStatus, QueryClient, QueryKey,
    Subscription, TokioBroadcastChannel, QUERY_INVALIDATION_EVENT,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio_test::assert_ok;
use uuid::Uuid;

fn blog_entities() -> EntityConfigMap {
    let mut entities = EntityConfigMap::new();
    entities.insert(
        "user".to_string(),
        EntityConfig::new("user").invalidates(["post"]).resets(["session"]),
    );
    entities.insert(
        "post".to_string(),
        EntityConfig::new("post").invalidates(["comment"]),
    );
    entities
}

fn seeded_cache() -> Arc<MemoryQueryCache> {
    let cache = Arc::new(MemoryQueryCache::new());
    cache.set_query_data(vec![json!("user"), json!(1)], json!({ "name": "ana" }));
    cache.set_query_data(vec![json!("post"), json!({ "userId": 1 })], json!(["p1"]));
    cache.set_query_data(vec![json!("comment"), json!(10)], json!(["c1"]));
    cache.set_query_data(vec![json!("session")], json!({ "token": "abc" }));
    cache
}

fn is_invalidated(cache: &MemoryQueryCache, key: &[Value]) -> bool {
    cache
        .get_query_state(key)
        .map(|state| state.is_invalidated)
        .unwrap_or(false)
}

#[test]
fn test_successful_mutation_invalidates_transitively() {
    let bus = Arc::new(LocalEventBus::new());
    let cache = seeded_cache();
    let _middleware = assert_ok!(create_mutation_middleware(cache.clone(), bus, &blog_entities()));

    cache.notify_mutation(&MutationEvent::success(1, ["user"]));

    assert!(is_invalidated(&cache, &[json!("user"), json!(1)]));
    assert!(is_invalidated(&cache, &[json!("post"), json!({ "userId": 1 })]));
    assert!(is_invalidated(&cache, &[json!("comment"), json!(10)]));
    // Invalidate expansion never crosses into reset relations
    assert_eq!(cache.get_query_data(&[json!("session")]), Some(json!({ "token": "abc" })));
}

#[test]
fn test_reset_declaration_clears_related_data() {
    let bus = Arc::new(LocalEventBus::new());
    let cache = seeded_cache();
    let _middleware = assert_ok!(create_mutation_middleware(cache.clone(), bus, &blog_entities()));

    cache.notify_mutation(&MutationEvent::success(1, [EntityAction::reset("user")]));

    assert_eq!(cache.get_query_data(&[json!("user"), json!(1)]), None);
    assert_eq!(cache.get_query_data(&[json!("session")]), None);
    assert!(!is_invalidated(&cache, &[json!("post"), json!({ "userId": 1 })]));
}

#[test]
fn test_failed_and_empty_mutations_are_noops() {
    let bus = Arc::new(LocalEventBus::new());
    let cache = seeded_cache();
    let _middleware = assert_ok!(create_mutation_middleware(cache.clone(), bus, &blog_entities()));

    cache.notify_mutation(
        &MutationEvent::new(1, MutationStatus::Error).with_affects(vec!["user".into()]),
    );
    cache.notify_mutation(&MutationEvent::new(2, MutationStatus::Success));
    cache.notify_mutation(&MutationEvent::new(3, MutationStatus::Success).with_affects(vec![]));

    let stats = cache.stats();
    assert_eq!(stats.invalidate_calls, 0);
    assert_eq!(stats.reset_calls, 0);
    assert_eq!(stats.mutations_notified, 3);
}

#[test]
fn test_cross_context_propagation() {
    let bus = Arc::new(LocalEventBus::new());
    let tab_a = seeded_cache();
    let tab_b = seeded_cache();

    let _a = assert_ok!(create_mutation_middleware(tab_a.clone(), bus.clone(), &blog_entities()));
    let _b = assert_ok!(create_mutation_middleware(tab_b.clone(), bus.clone(), &blog_entities()));
    assert_eq!(bus.handler_count(QUERY_INVALIDATION_EVENT), 2);

    let declared = EntityAction::invalidate("user")
        .with_invalidate("post", vec![json!("post"), json!({ "userId": 1 })]);
    tab_a.notify_mutation(&MutationEvent::success(1, [declared]));

    for tab in [&tab_a, &tab_b] {
        assert!(is_invalidated(tab, &[json!("user"), json!(1)]));
        assert!(is_invalidated(tab, &[json!("post"), json!({ "userId": 1 })]));
    }

    // One application per context: no self-delivery and no relay back
    assert_eq!(tab_a.stats().invalidate_calls, tab_b.stats().invalidate_calls);
    assert_eq!(tab_a.stats().invalidate_calls, 3);
}

#[test]
fn test_receiver_never_republishes() {
    let bus = Arc::new(LocalEventBus::new());
    let tab_a = seeded_cache();
    let tab_b = seeded_cache();
    let tab_c = seeded_cache();

    let _a = assert_ok!(create_mutation_middleware(tab_a.clone(), bus.clone(), &blog_entities()));
    let _b = assert_ok!(create_mutation_middleware(tab_b.clone(), bus.clone(), &blog_entities()));
    let _c = assert_ok!(create_mutation_middleware(tab_c.clone(), bus.clone(), &blog_entities()));

    tab_b.notify_mutation(&MutationEvent::success(1, ["post"]));

    // post + comment, exactly once everywhere
    for tab in [&tab_a, &tab_b, &tab_c] {
        assert_eq!(tab.stats().invalidate_calls, 2);
    }
}

#[test]
fn test_message_from_unknown_context_is_applied() {
    let bus = Arc::new(LocalEventBus::new());
    let cache = seeded_cache();
    let _middleware = assert_ok!(create_mutation_middleware(cache.clone(), bus.clone(), &blog_entities()));

    assert_ok!(bus.publish(InvalidationMessage::new(
        QUERY_INVALIDATION_EVENT,
        Uuid::new_v4(),
        vec!["comment".into()],
    )));

    assert!(is_invalidated(&cache, &[json!("comment"), json!(10)]));
    assert!(!is_invalidated(&cache, &[json!("post"), json!({ "userId": 1 })]));
}

#[test]
fn test_cleanup_unsubscribes_everything() {
    let bus = Arc::new(LocalEventBus::new());
    let cache = seeded_cache();
    let mut middleware = assert_ok!(create_mutation_middleware(cache.clone(), bus.clone(), &blog_entities()));
    assert_eq!(cache.listener_count(), 1);

    middleware.cleanup();
    middleware.cleanup();

    assert_eq!(middleware.state(), MiddlewareState::TornDown);
    assert_eq!(cache.listener_count(), 0);
    assert_eq!(bus.handler_count(QUERY_INVALIDATION_EVENT), 0);

    cache.notify_mutation(&MutationEvent::success(1, ["user"]));
    assert!(!is_invalidated(&cache, &[json!("user"), json!(1)]));
}

#[test]
fn test_torn_down_context_stops_receiving() {
    let bus = Arc::new(LocalEventBus::new());
    let tab_a = seeded_cache();
    let tab_b = seeded_cache();

    let _a = assert_ok!(create_mutation_middleware(tab_a.clone(), bus.clone(), &blog_entities()));
    let b = assert_ok!(create_mutation_middleware(tab_b.clone(), bus.clone(), &blog_entities()));
    drop(b);

    tab_a.notify_mutation(&MutationEvent::success(1, ["user"]));

    assert!(is_invalidated(&tab_a, &[json!("user"), json!(1)]));
    assert!(!is_invalidated(&tab_b, &[json!("user"), json!(1)]));
}

#[test]
fn test_listen_only_context() {
    let bus = Arc::new(LocalEventBus::new());
    let writer = seeded_cache();
    let reader = seeded_cache();

    let quiet = MiddlewareConfig::builder().broadcast(false).build();
    let _writer = assert_ok!(MutationMiddleware::new(writer.clone(), bus.clone(), &blog_entities(), quiet));
    let _reader = assert_ok!(create_mutation_middleware(reader.clone(), bus.clone(), &blog_entities()));

    writer.notify_mutation(&MutationEvent::success(1, ["user"]));
    assert!(is_invalidated(&writer, &[json!("user"), json!(1)]));
    assert!(!is_invalidated(&reader, &[json!("user"), json!(1)]));

    reader.notify_mutation(&MutationEvent::success(2, ["comment"]));
    assert!(is_invalidated(&writer, &[json!("comment"), json!(10)]));
}

#[test]
fn test_separate_event_names_are_isolated() {
    let bus = Arc::new(LocalEventBus::new());
    let tab_a = seeded_cache();
    let tab_b = seeded_cache();

    let config = MiddlewareConfig::builder().event_name("ADMIN_SYNC").build();
    let _a = assert_ok!(MutationMiddleware::new(tab_a.clone(), bus.clone(), &blog_entities(), config));
    let _b = assert_ok!(create_mutation_middleware(tab_b.clone(), bus.clone(), &blog_entities()));

    tab_a.notify_mutation(&MutationEvent::success(1, ["user"]));

    assert!(!is_invalidated(&tab_b, &[json!("user"), json!(1)]));
}

#[test]
fn test_shared_custom_config_connects_contexts() {
    let bus = Arc::new(LocalEventBus::new());
    let tab_a = seeded_cache();
    let tab_b = seeded_cache();

    let config = MiddlewareConfig::from_lookup(|name| {
        (name == "INVALIDATION_EVENT_NAME").then(|| "TAB_SYNC".to_string())
    })
    .unwrap();
    let _a = assert_ok!(MutationMiddleware::new(tab_a.clone(), bus.clone(), &blog_entities(), config.clone()));
    let _b = assert_ok!(MutationMiddleware::new(tab_b.clone(), bus.clone(), &blog_entities(), config));
    assert_eq!(bus.handler_count("TAB_SYNC"), 2);

    tab_a.notify_mutation(&MutationEvent::success(1, ["user"]));

    assert!(is_invalidated(&tab_b, &[json!("user"), json!(1)]));
}

#[tokio::test]
async fn test_tokio_channel_propagation() {
    let channel = Arc::new(TokioBroadcastChannel::new());
    let tab_a = seeded_cache();
    let tab_b = seeded_cache();

    let _a = assert_ok!(create_mutation_middleware(tab_a.clone(), channel.clone(), &blog_entities()));
    let _b = assert_ok!(create_mutation_middleware(tab_b.clone(), channel.clone(), &blog_entities()));
    assert_eq!(channel.receiver_count(), 2);

    tab_a.notify_mutation(&MutationEvent::success(1, ["user"]));
    assert!(is_invalidated(&tab_a, &[json!("user"), json!(1)]));

    // Delivery to the other context happens on its receiver task
    let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
    while !is_invalidated(&tab_b, &[json!("comment"), json!(10)])
        && tokio::time::Instant::now() < deadline
    {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    assert!(is_invalidated(&tab_b, &[json!("user"), json!(1)]));
    assert!(is_invalidated(&tab_b, &[json!("comment"), json!(10)]));

    // The publisher's own receiver ignores the echo
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(tab_a.stats().invalidate_calls, 3);
}

#[tokio::test]
async fn test_tokio_channel_burst_reaches_every_context() {
    let mut entities = EntityConfigMap::new();
    for i in 0..64 {
        let name = format!("item{}", i);
        entities.insert(name.clone(), EntityConfig::new(name));
    }

    let channel = Arc::new(TokioBroadcastChannel::new());
    let tab_a = Arc::new(MemoryQueryCache::new());
    let tab_b = Arc::new(MemoryQueryCache::new());
    for i in 0..64 {
        tab_b.set_query_data(vec![json!(format!("item{}", i))], json!(i));
    }

    let _a = assert_ok!(create_mutation_middleware(tab_a.clone(), channel.clone(), &entities));
    let _b = assert_ok!(create_mutation_middleware(tab_b.clone(), channel.clone(), &entities));

    // The whole burst is published before any receiver task runs
    for i in 0..64 {
        tab_a.notify_mutation(&MutationEvent::success(i, [format!("item{}", i)]));
    }

    let all_invalidated = |cache: &MemoryQueryCache| {
        (0..64).all(|i| is_invalidated(cache, &[json!(format!("item{}", i))]))
    };
    let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
    while !all_invalidated(tab_b.as_ref()) && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    assert!(all_invalidated(tab_b.as_ref()));
    assert_eq!(tab_b.stats().invalidate_calls, 64);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_remote_and_local_sequences_do_not_interleave() {
    let mut entities = EntityConfigMap::new();
    entities.insert("user".to_string(), EntityConfig::new("user").invalidates(["post"]));
    entities.insert("tag".to_string(), EntityConfig::new("tag").invalidates(["label"]));

    let channel = Arc::new(TokioBroadcastChannel::new());
    let remote = Arc::new(MemoryQueryCache::new());
    let local = Arc::new(SlowRecordingCache::default());

    let _remote = assert_ok!(create_mutation_middleware(remote.clone(), channel.clone(), &entities));
    let _local = assert_ok!(create_mutation_middleware(local.clone(), channel.clone(), &entities));

    let writer = {
        let local = local.clone();
        std::thread::spawn(move || {
            for i in 0..20 {
                local.inner.notify_mutation(&MutationEvent::success(i, ["user"]));
            }
        })
    };
    for i in 0..20 {
        remote.notify_mutation(&MutationEvent::success(i, ["tag"]));
    }
    assert!(writer.join().is_ok());

    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while local.recorded().len() < 80 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let recorded = local.recorded();
    assert_eq!(recorded.len(), 80);
    for pair in recorded.chunks(2) {
        assert!(
            pair == ["user", "post"] || pair == ["tag", "label"],
            "interleaved operations: {:?}",
            pair
        );
    }
}

/// Cache that records each invalidated entity and widens the window
/// between operations
#[derive(Default)]
struct SlowRecordingCache {
    inner: MemoryQueryCache,
    recorded: Mutex<Vec<String>>,
}

impl SlowRecordingCache {
    fn recorded(&self) -> Vec<String> {
        self.recorded.lock().clone()
    }
}

impl QueryClient for SlowRecordingCache {
    fn invalidate_queries(&self, query_key: &QueryKey) {
        if let Some(Value::String(entity)) = query_key.first() {
            self.recorded.lock().push(entity.clone());
        }
        std::thread::sleep(Duration::from_millis(1));
        self.inner.invalidate_queries(query_key);
    }

    fn reset_queries(&self, query_key: &QueryKey) {
        self.inner.reset_queries(query_key);
    }

    fn subscribe_mutations(&self, listener: MutationListener) -> Subscription {
        self.inner.subscribe_mutations(listener)
    }
}

#[tokio::test]
async fn test_tokio_channel_cleanup_releases_receiver() {
    let channel = Arc::new(TokioBroadcastChannel::default());
    let cache = seeded_cache();

    let mut middleware = assert_ok!(create_mutation_middleware(cache.clone(), channel.clone(), &blog_entities()));
    assert_eq!(channel.receiver_count(), 1);

    middleware.cleanup();

    assert_eq!(channel.receiver_count(), 0);
    assert_eq!(cache.listener_count(), 0);
}

#[test]
fn test_middleware_without_runtime_fails_on_tokio_channel() {
    let channel = Arc::new(TokioBroadcastChannel::default());
    let cache = seeded_cache();

    let result = create_mutation_middleware(cache.clone(), channel, &blog_entities());

    assert!(result.is_err());
    assert_eq!(cache.listener_count(), 0);
}
