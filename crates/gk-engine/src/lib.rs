//! GK Engine - dependency blocking for the gatekeep element graph
//!
//! Decides which elements are blocked by unfinished work, unfinished parents
//! or unsatisfied gates, and keeps that answer in a cache that mutation hooks
//! update incrementally:
//!
//! ```text
//!   store write ──► MutationObserver hook ──► invalidate_element / dependents
//!                                                      │
//!   is_blocked / get_all_blocked ◄── BlockedCache ◄────┘
//! ```
//!
//! The gate manager (`satisfy_gate`, `record_approval`, `remove_approval`)
//! lives on the same [`BlockingEngine`], and [`PropagationEngine`] derives
//! effective priority and aggregate complexity on demand.
//!
//! # Example Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use gk_core::{Dependency, DependencyKind, Element, EngineConfig};
//! use gk_engine::{BlockingEngine, MutationObserver};
//! use gk_storage::{ElementStore, MemoryStore};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(MemoryStore::new());
//! store.upsert_element(&Element::task("a")).await?;
//! store.upsert_element(&Element::task("b")).await?;
//!
//! let mut engine = BlockingEngine::new(Arc::clone(&store), EngineConfig::default());
//! store
//!     .upsert_dependency(&Dependency::new("a", "b", DependencyKind::Blocks))
//!     .await?;
//! engine.on_dependency_added("a", "b", DependencyKind::Blocks).await?;
//!
//! assert!(engine.is_blocked("a").is_some());
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod engine;
pub mod evaluator;
pub mod gates;
pub mod hooks;
pub mod propagation;

pub use cache::BlockedCache;
pub use engine::BlockingEngine;
pub use evaluator::{is_gate_satisfied, Evaluator};
pub use gates::{ApprovalOutcome, ApprovalRemoval};
pub use hooks::MutationObserver;
pub use propagation::{
    sort_by_effective_priority, AggregateComplexity, BlockerComplexity, EffectivePriority,
    PrioritizedTask, PropagationEngine,
};
