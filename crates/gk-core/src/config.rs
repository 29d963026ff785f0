//! Configuration management for gatekeep
//!
//! This module provides the engine configuration: traversal bounds for the
//! blocked cache, propagation depth for priority/complexity, and the element
//! types that act as collections.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::types::ElementType;
use crate::{Error, Result};

/// Engine configuration
///
/// Loaded from `.gatekeep/config.toml` in the workspace root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Bounds for cache rebuild and invalidation cascades
    #[serde(default)]
    pub traversal: TraversalConfig,

    /// Priority/complexity propagation defaults
    #[serde(default)]
    pub propagation: PropagationConfig,

    /// Element types whose children are never blocked through parent-child
    #[serde(default = "default_collection_types")]
    pub collection_types: Vec<ElementType>,
}

/// Bounds for graph walks done by the blocked cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraversalConfig {
    /// Maximum cascade depth for dependent invalidation
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    /// Maximum evaluation passes during a rebuild
    #[serde(default = "default_max_rebuild_passes")]
    pub max_rebuild_passes: usize,
}

/// Options for priority and complexity propagation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropagationConfig {
    /// How many dependency hops to follow
    #[serde(default = "default_propagation_depth")]
    pub max_depth: usize,
}

// Default value providers
fn default_collection_types() -> Vec<ElementType> {
    vec![
        ElementType::Plan,
        ElementType::Workflow,
        ElementType::Library,
        ElementType::Team,
        ElementType::Channel,
    ]
}

fn default_max_depth() -> usize {
    100
}

fn default_max_rebuild_passes() -> usize {
    10
}

fn default_propagation_depth() -> usize {
    10
}

impl EngineConfig {
    /// Load configuration from `.gatekeep/config.toml` or use defaults
    pub fn load_or_default(root: &Path) -> Result<Self> {
        let config_path = root.join(".gatekeep/config.toml");

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str(&content)
                .map_err(|e| Error::Config(format!("Failed to parse config file: {}", e)))
        } else {
            Ok(Self::default())
        }
    }

    /// Write default configuration to `.gatekeep/config.toml`
    pub fn write_default(root: &Path) -> Result<()> {
        let config_dir = root.join(".gatekeep");
        std::fs::create_dir_all(&config_dir)?;

        let config_path = config_dir.join("config.toml");
        let content = toml::to_string_pretty(&Self::default())
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn is_collection(&self, element_type: ElementType) -> bool {
        self.collection_types.contains(&element_type)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            traversal: TraversalConfig::default(),
            propagation: PropagationConfig::default(),
            collection_types: default_collection_types(),
        }
    }
}

impl Default for TraversalConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            max_rebuild_passes: default_max_rebuild_passes(),
        }
    }
}

impl Default for PropagationConfig {
    fn default() -> Self {
        Self {
            max_depth: default_propagation_depth(),
        }
    }
}

impl PropagationConfig {
    pub fn with_max_depth(max_depth: usize) -> Self {
        Self { max_depth }
    }
}
