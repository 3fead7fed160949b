//! Normalization of mutation-affect declarations

use crate::error::{InvalidationError, Result};
use crate::types::{EntityAction, EntityMutationConfig};
use serde_json::Value;

/// Reduce a declaration to its canonical action
///
/// A bare name becomes an invalidation of that entity. Resets are
/// destructive and never inferred from shorthand. Full actions pass through
/// unchanged.
pub fn process_entity_config(config: EntityMutationConfig) -> EntityAction {
    match config {
        EntityMutationConfig::Name(name) => EntityAction::invalidate(name),
        EntityMutationConfig::Action(action) => action,
    }
}

impl From<EntityMutationConfig> for EntityAction {
    fn from(config: EntityMutationConfig) -> Self {
        process_entity_config(config)
    }
}

/// Validate a raw `affects` value into declarations
///
/// Accepts an array whose items are entity names or action objects.
/// Anything else is rejected rather than guessed at.
pub fn parse_affects(value: Value) -> Result<Vec<EntityMutationConfig>> {
    let items = match value {
        Value::Array(items) => items,
        other => {
            return Err(InvalidationError::InvalidDeclaration(format!(
                "expected an array of entities, got {}",
                other
            )))
        }
    };

    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| parse_affect(index, item))
        .collect()
}

fn parse_affect(index: usize, item: Value) -> Result<EntityMutationConfig> {
    let config = match item {
        Value::String(name) => EntityMutationConfig::Name(name),
        Value::Object(_) => {
            let action: EntityAction = serde_json::from_value(item).map_err(|e| {
                InvalidationError::InvalidDeclaration(format!("item {}: {}", index, e))
            })?;
            EntityMutationConfig::Action(action)
        }
        other => {
            return Err(InvalidationError::InvalidDeclaration(format!(
                "item {}: expected an entity name or action, got {}",
                index, other
            )))
        }
    };

    if config.entity_name().is_empty() {
        return Err(InvalidationError::InvalidDeclaration(format!(
            "item {}: entity name is empty",
            index
        )));
    }

    if let EntityMutationConfig::Action(action) = &config {
        let mut overrides = action.invalidate.iter().chain(action.reset.iter()).flatten();
        if overrides.any(|o| o.entity.is_empty()) {
            return Err(InvalidationError::InvalidDeclaration(format!(
                "item {}: override entity name is empty",
                index
            )));
        }
    }

    Ok(config)
}
