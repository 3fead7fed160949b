//! Demonstrates cross-context invalidation
//!
//! This example shows how to:
//! - Attach a mutation middleware to two independent query caches
//! - Share a Tokio broadcast channel between them
//! - Watch a mutation in one context invalidate queries in the other

use ouroboros_invalidation::{
    load_entity_config_yaml, EntityAction, MemoryQueryCache, MiddlewareConfig, MutationEvent,
    MutationMiddleware, TokioBroadcastChannel,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const ENTITIES: &str = r#"
user:
  invalidate: [post]
  reset: [session]
post:
  invalidate: [comment]
"#;

fn seed(cache: &MemoryQueryCache) {
    cache.set_query_data(vec![json!("user"), json!(1)], json!({ "name": "ana" }));
    cache.set_query_data(vec![json!("post"), json!({ "userId": 1 })], json!(["p1", "p2"]));
    cache.set_query_data(vec![json!("post"), json!({ "userId": 2 })], json!(["p3"]));
    cache.set_query_data(vec![json!("comment"), json!(10)], json!(["nice"]));
    cache.set_query_data(vec![json!("session")], json!({ "token": "abc" }));
}

fn print_cache(label: &str, cache: &MemoryQueryCache) {
    println!("   [{}]", label);
    for key in cache.query_keys() {
        if let Some(state) = cache.get_query_state(&key) {
            let status = match (&state.data, state.is_invalidated) {
                (None, _) => "reset",
                (Some(_), true) => "stale",
                (Some(_), false) => "fresh",
            };
            println!("     {:<32} {}", Value::Array(key).to_string(), status);
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let entities = load_entity_config_yaml(ENTITIES)?;
    let config = MiddlewareConfig::from_env()?;
    println!("Using event {} across two contexts\n", config.event_name);

    let channel = Arc::new(TokioBroadcastChannel::new());
    let tab_a = Arc::new(MemoryQueryCache::new());
    let tab_b = Arc::new(MemoryQueryCache::new());
    seed(&tab_a);
    seed(&tab_b);

    let mut middleware_a =
        MutationMiddleware::new(tab_a.clone(), channel.clone(), &entities, config.clone())?;
    let mut middleware_b =
        MutationMiddleware::new(tab_b.clone(), channel.clone(), &entities, config)?;
    println!("✓ Middleware {} and {} active\n", middleware_a.id(), middleware_b.id());

    // 1. Narrow invalidation in context A
    println!("1. Context A updates the posts of user 2...");
    let update_posts = EntityAction::invalidate("user")
        .with_invalidate("post", vec![json!("post"), json!({ "userId": 2 })]);
    tab_a.notify_mutation(&MutationEvent::success(1, [update_posts]));
    tokio::time::sleep(Duration::from_millis(50)).await;
    print_cache("A", &tab_a);
    print_cache("B", &tab_b);

    // 2. Logout resets the session everywhere
    println!("\n2. Context B logs the user out...");
    tab_b.notify_mutation(&MutationEvent::success(2, [EntityAction::reset("user")]));
    tokio::time::sleep(Duration::from_millis(50)).await;
    print_cache("A", &tab_a);
    print_cache("B", &tab_b);

    // 3. Teardown
    println!("\n3. Tearing down...");
    middleware_a.cleanup();
    middleware_b.cleanup();
    println!("   A: {}", tab_a.stats());
    println!("   B: {}", tab_b.stats());

    println!("\n✓ Demo completed successfully!");
    Ok(())
}
