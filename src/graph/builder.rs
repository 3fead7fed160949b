//! Graph construction and configuration diagnostics

use crate::graph::{EntityConfigMap, EntityGraph};
use crate::types::RelationKind;
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info, warn};

/// Build the entity graph from a configuration map
///
/// Every configured entity gets a node; declared lists are unioned into the
/// node's relation sets. Forward references, duplicates and self-relations
/// are accepted as-is.
pub fn build_graph(config: &EntityConfigMap) -> EntityGraph {
    let mut graph = EntityGraph::new();

    for entity in config.values() {
        graph.ensure_node(&entity.name);

        for related in &entity.invalidate {
            graph.add_relation(&entity.name, related, RelationKind::Invalidate);
        }

        for related in &entity.reset {
            graph.add_relation(&entity.name, related, RelationKind::Reset);
        }
    }

    info!("Built entity graph with {} nodes", graph.len());

    for kind in [RelationKind::Invalidate, RelationKind::Reset] {
        for cycle in graph.cycles(kind) {
            warn!("Entity graph has a {} cycle: {}", kind, cycle.join(" -> "));
        }
    }

    let unresolved = graph.unresolved_references();
    if !unresolved.is_empty() {
        debug!("Entities referenced without configuration: {:?}", unresolved);
    }

    graph
}

impl EntityGraph {
    /// Build a graph from a configuration map
    pub fn from_config(config: &EntityConfigMap) -> Self {
        build_graph(config)
    }

    /// Cycles under one relation kind
    ///
    /// Returns each strongly connected component with more than one member,
    /// plus entities relating to themselves. Names inside a cycle and the
    /// cycles themselves are sorted. Cycles are legal (the resolver
    /// terminates on them); this is for diagnostics.
    pub fn cycles(&self, kind: RelationKind) -> Vec<Vec<String>> {
        let mut digraph: DiGraph<&str, ()> = DiGraph::new();
        let mut indices: HashMap<&str, NodeIndex> = HashMap::new();

        let mut self_loops = BTreeSet::new();
        for (name, node) in self.nodes() {
            let from = index_of(&mut digraph, &mut indices, name.as_str());
            for related in node.relations(kind) {
                if related == name {
                    self_loops.insert(name.clone());
                    continue;
                }
                let to = index_of(&mut digraph, &mut indices, related.as_str());
                digraph.add_edge(from, to, ());
            }
        }

        let mut cycles: Vec<Vec<String>> = tarjan_scc(&digraph)
            .into_iter()
            .filter(|component| component.len() > 1)
            .map(|component| {
                let mut names: Vec<String> = component
                    .into_iter()
                    .filter_map(|idx| digraph.node_weight(idx).map(|n| n.to_string()))
                    .collect();
                names.sort();
                names
            })
            .collect();

        cycles.extend(self_loops.into_iter().map(|name| vec![name]));
        cycles.sort();
        cycles
    }

    /// Relation targets that have no node of their own, sorted
    pub fn unresolved_references(&self) -> Vec<String> {
        let targets: BTreeSet<&String> = self
            .nodes()
            .flat_map(|(_, node)| node.invalidate.iter().chain(node.reset.iter()))
            .filter(|target| !self.contains(target))
            .collect();

        targets.into_iter().cloned().collect()
    }
}

fn index_of<'a>(
    digraph: &mut DiGraph<&'a str, ()>,
    indices: &mut HashMap<&'a str, NodeIndex>,
    name: &'a str,
) -> NodeIndex {
    *indices.entry(name).or_insert_with(|| digraph.add_node(name))
}
