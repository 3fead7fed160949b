//! Configuration for the middleware and the entity graph

use crate::error::{InvalidationError, Result};
use crate::graph::EntityConfigMap;
use crate::middleware::channel::QUERY_INVALIDATION_EVENT;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

/// Environment variable overriding the broadcast event name
pub const ENV_EVENT_NAME: &str = "INVALIDATION_EVENT_NAME";
/// Environment variable toggling outgoing broadcasts
pub const ENV_BROADCAST: &str = "INVALIDATION_BROADCAST";
/// Environment variable toggling the cross-context receiver
pub const ENV_LISTEN: &str = "INVALIDATION_LISTEN";

/// Configuration for a mutation middleware instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MiddlewareConfig {
    /// Event name used on the broadcast channel
    pub event_name: String,

    /// Publish successful local mutations to other contexts
    pub broadcast: bool,

    /// Apply mutations published by other contexts
    pub listen: bool,
}

impl Default for MiddlewareConfig {
    fn default() -> Self {
        Self {
            event_name: QUERY_INVALIDATION_EVENT.to_string(),
            broadcast: true,
            listen: true,
        }
    }
}

impl MiddlewareConfig {
    /// Create a new builder for middleware configuration
    pub fn builder() -> MiddlewareConfigBuilder {
        MiddlewareConfigBuilder::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.event_name.trim().is_empty() {
            return Err(InvalidationError::ConfigError(
                "event_name must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Load from the environment, reading a `.env` file first if present
    pub fn from_env() -> Result<Self> {
        if let Ok(path) = dotenv::dotenv() {
            debug!("Loaded environment from {}", path.display());
        }
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from a variable lookup; unset variables keep their defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = Self::builder();

        if let Some(event_name) = lookup(ENV_EVENT_NAME) {
            builder = builder.event_name(event_name);
        }
        if let Some(value) = lookup(ENV_BROADCAST) {
            builder = builder.broadcast(parse_flag(ENV_BROADCAST, &value)?);
        }
        if let Some(value) = lookup(ENV_LISTEN) {
            builder = builder.listen(parse_flag(ENV_LISTEN, &value)?);
        }

        let config = builder.build();
        config.validate()?;
        Ok(config)
    }
}

fn parse_flag(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(InvalidationError::ConfigError(format!(
            "{} must be a boolean, got {:?}",
            name, other
        ))),
    }
}

/// Builder for middleware configuration
#[derive(Debug, Default)]
pub struct MiddlewareConfigBuilder {
    event_name: Option<String>,
    broadcast: Option<bool>,
    listen: Option<bool>,
}

impl MiddlewareConfigBuilder {
    /// Set the broadcast event name
    pub fn event_name(mut self, event_name: impl Into<String>) -> Self {
        self.event_name = Some(event_name.into());
        self
    }

    /// Enable or disable outgoing broadcasts
    pub fn broadcast(mut self, enable: bool) -> Self {
        self.broadcast = Some(enable);
        self
    }

    /// Enable or disable the cross-context receiver
    pub fn listen(mut self, enable: bool) -> Self {
        self.listen = Some(enable);
        self
    }

    /// Build the middleware configuration
    pub fn build(self) -> MiddlewareConfig {
        let defaults = MiddlewareConfig::default();

        MiddlewareConfig {
            event_name: self.event_name.unwrap_or(defaults.event_name),
            broadcast: self.broadcast.unwrap_or(defaults.broadcast),
            listen: self.listen.unwrap_or(defaults.listen),
        }
    }
}

/// Parse an entity configuration map from JSON
pub fn load_entity_config_json(input: &str) -> Result<EntityConfigMap> {
    let config: EntityConfigMap = serde_json::from_str(input)
        .map_err(|e| InvalidationError::SerializationError(e.to_string()))?;
    normalize_entity_config(config)
}

/// Parse an entity configuration map from YAML
pub fn load_entity_config_yaml(input: &str) -> Result<EntityConfigMap> {
    let config: EntityConfigMap = serde_yaml::from_str(input)
        .map_err(|e| InvalidationError::SerializationError(e.to_string()))?;
    normalize_entity_config(config)
}

/// Load an entity configuration file (`.json`, `.yaml` or `.yml`)
pub fn load_entity_config_file(path: impl AsRef<Path>) -> Result<EntityConfigMap> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)?;

    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);

    let config = match extension.as_deref() {
        Some("json") => load_entity_config_json(&content)?,
        Some("yaml") | Some("yml") => load_entity_config_yaml(&content)?,
        _ => {
            return Err(InvalidationError::ConfigError(format!(
                "unsupported entity config format: {}",
                path.display()
            )))
        }
    };

    info!("Loaded {} entities from {}", config.len(), path.display());
    Ok(config)
}

/// Check that every entry has a non-empty name matching its key
pub fn validate_entity_config(config: &EntityConfigMap) -> Result<()> {
    for (key, entity) in config {
        if entity.name.is_empty() {
            return Err(InvalidationError::ConfigError(format!(
                "entity {:?} has an empty name",
                key
            )));
        }
        if &entity.name != key {
            return Err(InvalidationError::ConfigError(format!(
                "entity key {:?} does not match its name {:?}",
                key, entity.name
            )));
        }
        if entity.invalidate.iter().chain(&entity.reset).any(String::is_empty) {
            return Err(InvalidationError::ConfigError(format!(
                "entity {:?} declares a relation to an empty name",
                key
            )));
        }
    }
    Ok(())
}

/// Fill missing names from map keys, then validate
fn normalize_entity_config(mut config: EntityConfigMap) -> Result<EntityConfigMap> {
    for (key, entity) in config.iter_mut() {
        if entity.name.is_empty() {
            entity.name = key.clone();
        }
    }
    validate_entity_config(&config)?;
    Ok(config)
}
