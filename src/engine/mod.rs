//! # Invalidation Engine
//!
//! Normalizes mutation-affect declarations into canonical
//! [`EntityAction`](crate::types::EntityAction)s and turns each one into a
//! deterministic, deduplicated sequence of cache operations.

pub mod action;
pub mod update;

pub use action::{parse_affects, process_entity_config};
pub use update::{apply_affects, plan_operations, update_queries};
