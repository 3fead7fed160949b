//! Turning canonical actions into cache operations

use crate::cache::QueryClient;
use crate::engine::action::process_entity_config;
use crate::graph::EntityGraph;
use crate::types::{default_query_key, CacheOperation, EntityAction, EntityMutationConfig, RelationKind};
use std::collections::HashSet;
use tracing::debug;

/// Compute the ordered operations for one action
///
/// Order: specific invalidations, specific resets, the main entity, then
/// every graph dependency of the main entity under `action.action` that was
/// not already covered by a specific override of the same kind. Invalidate
/// and reset expansion never cross over.
pub fn plan_operations(graph: &EntityGraph, action: &EntityAction) -> Vec<CacheOperation> {
    let mut operations = Vec::new();
    let mut handled_invalidate: HashSet<&str> = HashSet::new();
    let mut handled_reset: HashSet<&str> = HashSet::new();

    for specific in action.invalidate.iter().flatten() {
        operations.push(CacheOperation::invalidate(specific.query_key.clone()));
        handled_invalidate.insert(&specific.entity);
    }

    for specific in action.reset.iter().flatten() {
        operations.push(CacheOperation::reset(specific.query_key.clone()));
        handled_reset.insert(&specific.entity);
    }

    operations.push(CacheOperation {
        kind: action.action,
        query_key: action.main_query_key(),
    });

    let handled = match action.action {
        RelationKind::Invalidate => &handled_invalidate,
        RelationKind::Reset => &handled_reset,
    };

    for related in graph.dependencies(&action.name, action.action) {
        if handled.contains(related.as_str()) {
            continue;
        }
        operations.push(CacheOperation {
            kind: action.action,
            query_key: default_query_key(&related),
        });
    }

    operations
}

/// Apply one action to the cache and return the operations issued
pub fn update_queries(
    graph: &EntityGraph,
    client: &dyn QueryClient,
    action: &EntityAction,
) -> Vec<CacheOperation> {
    let operations = plan_operations(graph, action);

    for operation in &operations {
        match operation.kind {
            RelationKind::Invalidate => client.invalidate_queries(&operation.query_key),
            RelationKind::Reset => client.reset_queries(&operation.query_key),
        }
    }

    debug!(
        "Applied {} on {}: {} operations",
        action.action,
        action.name,
        operations.len()
    );

    operations
}

/// Normalize and apply a whole declaration list, in declaration order
pub fn apply_affects(
    graph: &EntityGraph,
    client: &dyn QueryClient,
    affects: &[EntityMutationConfig],
) -> Vec<CacheOperation> {
    affects
        .iter()
        .cloned()
        .map(process_entity_config)
        .flat_map(|action| update_queries(graph, client, &action))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MutationListener;
    use crate::subscription::Subscription;
    use crate::graph::{build_graph, EntityConfig, EntityConfigMap};
    use crate::types::QueryKey;
    use parking_lot::Mutex;
    use serde_json::json;

    #[derive(Default)]
    struct RecordingClient {
        calls: Mutex<Vec<CacheOperation>>,
    }

    impl RecordingClient {
        fn calls(&self) -> Vec<CacheOperation> {
            self.calls.lock().clone()
        }
    }

    impl QueryClient for RecordingClient {
        fn invalidate_queries(&self, query_key: &QueryKey) {
            self.calls.lock().push(CacheOperation::invalidate(query_key.clone()));
        }

        fn reset_queries(&self, query_key: &QueryKey) {
            self.calls.lock().push(CacheOperation::reset(query_key.clone()));
        }

        fn subscribe_mutations(&self, _listener: MutationListener) -> Subscription {
            Subscription::noop()
        }
    }

    fn graph(entities: Vec<EntityConfig>) -> EntityGraph {
        let config: EntityConfigMap = entities
            .into_iter()
            .map(|entity| (entity.name.clone(), entity))
            .collect();
        build_graph(&config)
    }

    fn key(segments: &[serde_json::Value]) -> QueryKey {
        segments.to_vec()
    }

    #[test]
    fn test_main_entity_with_default_key() {
        let client = RecordingClient::default();
        update_queries(&EntityGraph::new(), &client, &EntityAction::invalidate("User"));

        assert_eq!(client.calls(), vec![CacheOperation::invalidate(key(&[json!("user")]))]);
    }

    #[test]
    fn test_main_entity_with_custom_key() {
        let client = RecordingClient::default();
        let custom = key(&[json!("user"), json!({ "id": 123 })]);
        update_queries(
            &EntityGraph::new(),
            &client,
            &EntityAction::invalidate("user").with_query_key(custom.clone()),
        );

        assert_eq!(client.calls(), vec![CacheOperation::invalidate(custom)]);
    }

    #[test]
    fn test_invalidate_dependencies() {
        let graph = graph(vec![EntityConfig::new("user").invalidates(["post"])]);
        let client = RecordingClient::default();

        update_queries(&graph, &client, &EntityAction::invalidate("user"));

        assert_eq!(
            client.calls(),
            vec![
                CacheOperation::invalidate(key(&[json!("user")])),
                CacheOperation::invalidate(key(&[json!("post")])),
            ]
        );
    }

    #[test]
    fn test_reset_dependencies() {
        let graph = graph(vec![EntityConfig::new("user").resets(["stats"])]);
        let client = RecordingClient::default();

        update_queries(&graph, &client, &EntityAction::reset("user"));

        assert_eq!(
            client.calls(),
            vec![
                CacheOperation::reset(key(&[json!("user")])),
                CacheOperation::reset(key(&[json!("stats")])),
            ]
        );
    }

    #[test]
    fn test_specific_invalidation_suppresses_graph_default() {
        let graph = graph(vec![EntityConfig::new("user").invalidates(["post"])]);
        let client = RecordingClient::default();
        let post_key = key(&[json!("post"), json!({ "userId": 123 })]);

        update_queries(
            &graph,
            &client,
            &EntityAction::invalidate("user").with_invalidate("post", post_key.clone()),
        );

        assert_eq!(
            client.calls(),
            vec![
                CacheOperation::invalidate(post_key),
                CacheOperation::invalidate(key(&[json!("user")])),
            ]
        );
    }

    #[test]
    fn test_specific_resets() {
        let client = RecordingClient::default();
        let stats_key = key(&[json!("stats"), json!({ "userId": 123 })]);

        update_queries(
            &EntityGraph::new(),
            &client,
            &EntityAction::reset("user").with_reset("stats", stats_key.clone()),
        );

        assert_eq!(
            client.calls(),
            vec![
                CacheOperation::reset(stats_key),
                CacheOperation::reset(key(&[json!("user")])),
            ]
        );
    }

    #[test]
    fn test_specific_reset_suppresses_graph_default() {
        let graph = graph(vec![EntityConfig::new("user").resets(["stats"])]);
        let stats_key = key(&[json!("stats"), json!({ "userId": 1 })]);

        let operations = plan_operations(
            &graph,
            &EntityAction::reset("user").with_reset("stats", stats_key.clone()),
        );

        assert_eq!(
            operations,
            vec![
                CacheOperation::reset(stats_key),
                CacheOperation::reset(key(&[json!("user")])),
            ]
        );
        assert!(!operations.contains(&CacheOperation::reset(key(&[json!("stats")]))));
    }

    #[test]
    fn test_override_of_other_kind_does_not_suppress() {
        let graph = graph(vec![EntityConfig::new("user").invalidates(["post"])]);
        let post_key = key(&[json!("post"), json!(1)]);

        let operations = plan_operations(
            &graph,
            &EntityAction::invalidate("user").with_reset("post", post_key.clone()),
        );

        assert_eq!(
            operations,
            vec![
                CacheOperation::reset(post_key),
                CacheOperation::invalidate(key(&[json!("user")])),
                CacheOperation::invalidate(key(&[json!("post")])),
            ]
        );
    }

    #[test]
    fn test_reset_never_triggers_invalidate_expansion() {
        let graph = graph(vec![EntityConfig::new("user")
            .invalidates(["post"])
            .resets(["stats"])]);

        let operations = plan_operations(&graph, &EntityAction::reset("user"));

        assert!(operations.iter().all(|op| op.kind == RelationKind::Reset));
        assert_eq!(
            operations,
            vec![
                CacheOperation::reset(key(&[json!("user")])),
                CacheOperation::reset(key(&[json!("stats")])),
            ]
        );
    }

    #[test]
    fn test_transitive_dependencies_use_default_keys() {
        let graph = graph(vec![
            EntityConfig::new("user").invalidates(["Post"]),
            EntityConfig::new("Post").invalidates(["comment"]),
        ]);

        let operations = plan_operations(&graph, &EntityAction::invalidate("user"));

        assert_eq!(
            operations,
            vec![
                CacheOperation::invalidate(key(&[json!("user")])),
                CacheOperation::invalidate(key(&[json!("post")])),
                CacheOperation::invalidate(key(&[json!("comment")])),
            ]
        );
    }

    #[test]
    fn test_apply_affects_in_declaration_order() {
        let graph = graph(vec![EntityConfig::new("user").invalidates(["post"])]);
        let client = RecordingClient::default();

        let issued = apply_affects(
            &graph,
            &client,
            &["user".into(), EntityAction::reset("stats").into()],
        );

        assert_eq!(
            issued,
            vec![
                CacheOperation::invalidate(key(&[json!("user")])),
                CacheOperation::invalidate(key(&[json!("post")])),
                CacheOperation::reset(key(&[json!("stats")])),
            ]
        );
        assert_eq!(client.calls(), issued);
    }
}
