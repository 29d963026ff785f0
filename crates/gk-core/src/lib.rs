//! Core types and configuration for the gatekeep blocking engine.
//!
//! This crate provides the data model shared by the store layer and the
//! engine: elements, dependency edges, gates, and cache entries.

pub mod config;
pub mod error;
pub mod gate;
pub mod types;

pub use config::{EngineConfig, PropagationConfig, TraversalConfig};
pub use error::{Error, Result};
pub use gate::{Gate, GateContext, GateKind};

// Re-export main types for convenience
pub use types::{
    BlockedEntry, BlockedInfo, Complexity, Dependency, DependencyKind, Element, ElementStatus,
    ElementType, Priority, RebuildStats,
};
