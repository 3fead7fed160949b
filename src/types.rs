//! Core type definitions shared by the graph, engine and middleware

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// A query key: an ordered sequence of opaque segments
///
/// The cache owns the matching semantics (typically prefix matching); this
/// crate only builds keys and hands them over.
pub type QueryKey = Vec<Value>;

/// Build the default query key for an entity: its lower-cased name as the
/// single key segment
pub fn default_query_key(entity: &str) -> QueryKey {
    vec![Value::String(entity.to_lowercase())]
}

/// The two independent relation kinds between entities
///
/// Also used as the action kind of an [`EntityAction`]: invalidating an
/// entity follows its `invalidate` relations, resetting follows `reset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationKind {
    /// Mark matching queries stale so they refetch
    Invalidate,

    /// Return matching queries to their initial state (destructive)
    Reset,
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelationKind::Invalidate => write!(f, "invalidate"),
            RelationKind::Reset => write!(f, "reset"),
        }
    }
}

/// An explicit key override for one related entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryKeyConfig {
    /// Entity the override applies to
    pub entity: String,

    /// Exact key to act on instead of the entity's default key
    pub query_key: QueryKey,
}

impl QueryKeyConfig {
    pub fn new(entity: impl Into<String>, query_key: QueryKey) -> Self {
        Self {
            entity: entity.into(),
            query_key,
        }
    }
}

/// Canonical description of one effect to apply after a mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityAction {
    /// Main entity acted upon
    pub name: String,

    /// What to do to the main entity and its related entities
    pub action: RelationKind,

    /// Explicit key for the main entity; defaults to [`default_query_key`]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_key: Option<QueryKey>,

    /// Specific invalidations with exact keys
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invalidate: Option<Vec<QueryKeyConfig>>,

    /// Specific resets with exact keys
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reset: Option<Vec<QueryKeyConfig>>,
}

impl EntityAction {
    /// Create an action of the given kind on an entity, without overrides
    pub fn new(name: impl Into<String>, action: RelationKind) -> Self {
        Self {
            name: name.into(),
            action,
            query_key: None,
            invalidate: None,
            reset: None,
        }
    }

    /// Invalidate an entity (and its invalidate dependencies)
    pub fn invalidate(name: impl Into<String>) -> Self {
        Self::new(name, RelationKind::Invalidate)
    }

    /// Reset an entity (and its reset dependencies)
    pub fn reset(name: impl Into<String>) -> Self {
        Self::new(name, RelationKind::Reset)
    }

    /// Act on an explicit key for the main entity
    pub fn with_query_key(mut self, query_key: QueryKey) -> Self {
        self.query_key = Some(query_key);
        self
    }

    /// Add a specific invalidation with an exact key
    pub fn with_invalidate(mut self, entity: impl Into<String>, query_key: QueryKey) -> Self {
        self.invalidate
            .get_or_insert_with(Vec::new)
            .push(QueryKeyConfig::new(entity, query_key));
        self
    }

    /// Add a specific reset with an exact key
    pub fn with_reset(mut self, entity: impl Into<String>, query_key: QueryKey) -> Self {
        self.reset
            .get_or_insert_with(Vec::new)
            .push(QueryKeyConfig::new(entity, query_key));
        self
    }

    /// Key used for the main entity
    pub fn main_query_key(&self) -> QueryKey {
        self.query_key
            .clone()
            .unwrap_or_else(|| default_query_key(&self.name))
    }
}

/// What a mutation declares as affected: a bare entity name or a full action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityMutationConfig {
    /// Shorthand: invalidate this entity
    Name(String),

    /// Fully specified action
    Action(EntityAction),
}

impl EntityMutationConfig {
    /// Name of the main entity, whichever shape was declared
    pub fn entity_name(&self) -> &str {
        match self {
            EntityMutationConfig::Name(name) => name,
            EntityMutationConfig::Action(action) => &action.name,
        }
    }
}

impl From<&str> for EntityMutationConfig {
    fn from(name: &str) -> Self {
        EntityMutationConfig::Name(name.to_string())
    }
}

impl From<String> for EntityMutationConfig {
    fn from(name: String) -> Self {
        EntityMutationConfig::Name(name)
    }
}

impl From<EntityAction> for EntityMutationConfig {
    fn from(action: EntityAction) -> Self {
        EntityMutationConfig::Action(action)
    }
}

/// One concrete operation issued against the query cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheOperation {
    pub kind: RelationKind,
    pub query_key: QueryKey,
}

impl CacheOperation {
    pub fn invalidate(query_key: QueryKey) -> Self {
        Self {
            kind: RelationKind::Invalidate,
            query_key,
        }
    }

    pub fn reset(query_key: QueryKey) -> Self {
        Self {
            kind: RelationKind::Reset,
            query_key,
        }
    }
}

impl fmt::Display for CacheOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, Value::Array(self.query_key.clone()))
    }
}
