//! Custom layer registry
//!
//! A persisted architecture lists its custom layers as tagged blocks
//! (`{"type": "AttentionGate", "name": ..., "config": {...}}`). While loading,
//! every tag is looked up here and its constructor turns the JSON config back
//! into a typed layer configuration. Unknown tags, and tags reserved without a
//! constructor, fail the load instead of producing a placeholder layer.

use std::collections::HashMap;

use serde_json::Value;

use super::artifact::LayerBlock;
use crate::model::{AttentionGateConfig, BranchConfig};
use crate::utils::error::{HssanError, Result};

/// Type tag of [`crate::model::MultiBranchBlock`]
pub const MULTI_BRANCH_TAG: &str = "MultiBranchBlock";

/// Type tag of [`crate::model::AttentionGate`]
pub const ATTENTION_GATE_TAG: &str = "AttentionGate";

/// A custom layer reconstructed from its tagged block
#[derive(Debug, Clone, PartialEq)]
pub enum CustomLayer {
    MultiBranch(BranchConfig),
    Attention(AttentionGateConfig),
}

/// Constructor for one layer type: JSON config -> typed layer
pub type LayerFactory = fn(&Value) -> Result<CustomLayer>;

/// Explicit type tag -> constructor table
#[derive(Clone, Default)]
pub struct LayerRegistry {
    factories: HashMap<String, Option<LayerFactory>>,
}

impl std::fmt::Debug for LayerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayerRegistry")
            .field("tags", &self.tags())
            .finish()
    }
}

impl LayerRegistry {
    /// Empty registry; every tag is unknown
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry that knows the two HSSAN building blocks
    pub fn with_builtin_layers() -> Self {
        let mut registry = Self::new();
        registry.register(MULTI_BRANCH_TAG, multi_branch_layer);
        registry.register(ATTENTION_GATE_TAG, attention_gate_layer);
        registry
    }

    /// Register (or replace) the constructor for `tag`
    pub fn register(&mut self, tag: impl Into<String>, factory: LayerFactory) -> &mut Self {
        self.factories.insert(tag.into(), Some(factory));
        self
    }

    /// Declare `tag` without a constructor; resolving it fails
    pub fn reserve(&mut self, tag: impl Into<String>) -> &mut Self {
        self.factories.insert(tag.into(), None);
        self
    }

    /// All known tags, sorted
    pub fn tags(&self) -> Vec<&str> {
        let mut tags: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        tags.sort_unstable();
        tags
    }

    /// Reconstruct the layer described by `block`
    pub fn resolve(&self, block: &LayerBlock) -> Result<CustomLayer> {
        match self.factories.get(&block.kind) {
            Some(Some(factory)) => factory(&block.config).map_err(|err| {
                HssanError::Serialization(format!(
                    "layer '{}' ({}): {}",
                    block.name, block.kind, err
                ))
            }),
            Some(None) => Err(HssanError::Serialization(format!(
                "layer type '{}' is registered without a constructor",
                block.kind
            ))),
            None => Err(HssanError::Serialization(format!(
                "unknown layer type '{}' for layer '{}'",
                block.kind, block.name
            ))),
        }
    }
}

fn multi_branch_layer(config: &Value) -> Result<CustomLayer> {
    let branches: BranchConfig = serde_json::from_value(config.clone())?;
    branches.validate()?;
    Ok(CustomLayer::MultiBranch(branches))
}

fn attention_gate_layer(config: &Value) -> Result<CustomLayer> {
    let attention: AttentionGateConfig = serde_json::from_value(config.clone())?;
    attention.validate()?;
    Ok(CustomLayer::Attention(attention))
}
