//! Transitive dependency resolution

use crate::graph::EntityGraph;
use crate::types::RelationKind;
use std::collections::HashSet;
use tracing::trace;

/// Transitive closure of `entity` under `kind`, excluding `entity` itself
///
/// Results are in first-discovery (depth-first preorder) order and contain
/// each entity once. Unknown entities resolve to an empty list.
pub fn get_dependencies(graph: &EntityGraph, entity: &str, kind: RelationKind) -> Vec<String> {
    graph.dependencies(entity, kind)
}

impl EntityGraph {
    /// Transitive closure of `entity` under `kind`, excluding `entity` itself
    pub fn dependencies(&self, entity: &str, kind: RelationKind) -> Vec<String> {
        let mut visited = HashSet::new();
        visited.insert(entity);
        self.dependencies_with_visited(entity, kind, &mut visited)
    }

    /// Expand `entity` while sharing `visited` with the caller
    ///
    /// Anything already in `visited` is neither reported nor expanded again,
    /// which is what makes cycles and diamonds terminate. Traversal uses an
    /// explicit stack, so chain depth is bounded by memory rather than the
    /// call stack.
    pub fn dependencies_with_visited<'a>(
        &'a self,
        entity: &str,
        kind: RelationKind,
        visited: &mut HashSet<&'a str>,
    ) -> Vec<String> {
        let mut resolved = Vec::new();

        // Reversed so the first relation is popped first
        let mut stack: Vec<&'a str> = self.direct(entity, kind).collect();
        stack.reverse();

        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            resolved.push(current.to_string());

            let start = stack.len();
            stack.extend(self.direct(current, kind));
            stack[start..].reverse();
        }

        trace!(
            "Resolved {} {} dependencies for {}: {:?}",
            resolved.len(),
            kind,
            entity,
            resolved
        );

        resolved
    }
}
