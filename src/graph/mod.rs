//! # Entity Dependency Graph
//!
//! Declares, once, how entities relate: which other entities must be
//! invalidated or reset when an entity changes. The graph is built from a
//! map of [`EntityConfig`] and is read-only afterwards, so it can be shared
//! between callbacks behind an `Arc` without locking.
//!
//! ## Example
//!
//! ```rust
//! use ouroboros_invalidation::graph::{build_graph, get_dependencies, EntityConfig};
//! use ouroboros_invalidation::RelationKind;
//! use std::collections::HashMap;
//!
//! let mut config = HashMap::new();
//! config.insert(
//!     "user".to_string(),
//!     EntityConfig::new("user").invalidates(["post"]).resets(["stats"]),
//! );
//! config.insert("post".to_string(), EntityConfig::new("post").invalidates(["comment"]));
//!
//! let graph = build_graph(&config);
//! assert_eq!(
//!     get_dependencies(&graph, "user", RelationKind::Invalidate),
//!     vec!["post".to_string(), "comment".to_string()]
//! );
//! ```

pub mod builder;
pub mod resolver;

pub use builder::build_graph;
pub use resolver::get_dependencies;

use crate::types::RelationKind;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Declared relationships for one entity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityConfig {
    /// Entity name; when loaded from a keyed map an empty name is filled
    /// from the map key
    #[serde(default)]
    pub name: String,

    /// Entities to invalidate when this entity changes
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub invalidate: Vec<String>,

    /// Entities to reset when this entity changes
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reset: Vec<String>,
}

impl EntityConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            invalidate: Vec::new(),
            reset: Vec::new(),
        }
    }

    /// Add invalidate relations
    pub fn invalidates<I, S>(mut self, entities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.invalidate.extend(entities.into_iter().map(Into::into));
        self
    }

    /// Add reset relations
    pub fn resets<I, S>(mut self, entities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.reset.extend(entities.into_iter().map(Into::into));
        self
    }
}

/// Entity configuration keyed by entity name
pub type EntityConfigMap = HashMap<String, EntityConfig>;

/// Relation sets of one graph node
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityNode {
    pub invalidate: BTreeSet<String>,
    pub reset: BTreeSet<String>,
}

impl EntityNode {
    /// Relation set for a kind
    pub fn relations(&self, kind: RelationKind) -> &BTreeSet<String> {
        match kind {
            RelationKind::Invalidate => &self.invalidate,
            RelationKind::Reset => &self.reset,
        }
    }

    fn relations_mut(&mut self, kind: RelationKind) -> &mut BTreeSet<String> {
        match kind {
            RelationKind::Invalidate => &mut self.invalidate,
            RelationKind::Reset => &mut self.reset,
        }
    }
}

/// Adjacency structure keyed by entity name
///
/// Relation targets without a node of their own (forward references) are
/// treated as having no relations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityGraph {
    nodes: HashMap<String, EntityNode>,
}

impl EntityGraph {
    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check if the graph has no nodes
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Check if an entity has a node
    pub fn contains(&self, entity: &str) -> bool {
        self.nodes.contains_key(entity)
    }

    /// Get the node of an entity
    pub fn node(&self, entity: &str) -> Option<&EntityNode> {
        self.nodes.get(entity)
    }

    /// Names of all entities with a node, sorted
    pub fn entities(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.nodes.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Direct relations of an entity for a kind (empty for unknown entities)
    pub fn direct(&self, entity: &str, kind: RelationKind) -> impl Iterator<Item = &str> {
        self.nodes
            .get(entity)
            .into_iter()
            .flat_map(move |node| node.relations(kind).iter().map(String::as_str))
    }

    /// Ensure a node exists for an entity
    pub(crate) fn ensure_node(&mut self, entity: &str) -> &mut EntityNode {
        self.nodes.entry(entity.to_string()).or_default()
    }

    /// Add a relation from `entity` to `related`, creating the source node
    pub(crate) fn add_relation(&mut self, entity: &str, related: &str, kind: RelationKind) {
        self.ensure_node(entity)
            .relations_mut(kind)
            .insert(related.to_string());
    }

    pub(crate) fn nodes(&self) -> impl Iterator<Item = (&String, &EntityNode)> {
        self.nodes.iter()
    }
}
