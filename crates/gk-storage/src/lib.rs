//! GK Storage - store accessor layer for the gatekeep blocking engine
//!
//! The engine reads elements and dependency edges, and writes gate metadata
//! and its cache mirror, only through the [`ElementStore`] trait. Two
//! implementations ship here:
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │         gk-engine                           │
//! │  (evaluator, blocked cache, gates)          │
//! └─────────────────┬───────────────────────────┘
//!                   │ ElementStore
//! ┌─────────────────▼───────────────────────────┐
//! │  MemoryStore          │  Database (Turso)   │
//! │  • maps + edge list   │  • .gatekeep/*.db   │
//! │  • tests, embedding   │  • elements, deps,  │
//! │                       │    blocked_cache    │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! # Example Usage
//!
//! ```no_run
//! use gk_core::{Dependency, DependencyKind, Element};
//! use gk_storage::{Database, ElementStore};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::open(".gatekeep/gatekeep.db").await?;
//! db.init_schema().await?;
//!
//! db.upsert_element(&Element::task("task-1")).await?;
//! db.upsert_element(&Element::task("task-2")).await?;
//! db.upsert_dependency(&Dependency::new("task-1", "task-2", DependencyKind::Blocks))
//!     .await?;
//!
//! let candidates = db.blocking_candidates().await?;
//! println!("{} elements may be blocked", candidates.len());
//! # Ok(())
//! # }
//! ```

pub mod db;
pub mod memory;
pub mod store;

// Re-export commonly used types
pub use db::Database;
pub use memory::MemoryStore;
pub use store::{ElementStore, Result, StoreError};
