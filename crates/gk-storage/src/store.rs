//! The store accessor consumed by the blocking engine.
//!
//! The engine never talks to a database directly. It reads elements and
//! dependency edges through [`ElementStore`], writes gate metadata back
//! through it, and optionally mirrors its cache into it.

use async_trait::async_trait;
use gk_core::{BlockedEntry, Dependency, DependencyKind, Element, ElementStatus, Gate};

/// Store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("turso error: {0}")]
    Turso(#[from] turso::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("element not found: {0}")]
    ElementNotFound(String),

    #[error("dependency not found: {0}")]
    DependencyNotFound(String),

    #[error("malformed row: {0}")]
    MalformedRow(String),

    #[error("core error: {0}")]
    Core(#[from] gk_core::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Read/write access to elements, dependency edges and the persisted cache.
///
/// Calls are awaited one at a time from a single task, so implementations
/// are not required to be `Send`.
#[async_trait(?Send)]
pub trait ElementStore {
    /// Fetch one element. Missing elements are `Ok(None)`, not an error.
    async fn get_element(&self, id: &str) -> Result<Option<Element>>;

    /// Outgoing edges of `source_id`, in store order.
    async fn dependencies_from(&self, source_id: &str) -> Result<Vec<Dependency>>;

    /// Incoming edges of `target_id` restricted to `kinds`, in store order.
    async fn dependents_of(
        &self,
        target_id: &str,
        kinds: &[DependencyKind],
    ) -> Result<Vec<Dependency>>;

    async fn get_dependency(
        &self,
        source_id: &str,
        target_id: &str,
        kind: DependencyKind,
    ) -> Result<Option<Dependency>>;

    /// Ids of live (not deleted, not tombstoned) elements with at least one
    /// blocking-capable outgoing edge, sorted.
    async fn blocking_candidates(&self) -> Result<Vec<String>>;

    async fn list_elements(&self) -> Result<Vec<Element>>;

    async fn list_dependencies(&self) -> Result<Vec<Dependency>>;

    async fn upsert_element(&self, element: &Element) -> Result<()>;

    /// Change an element's status. Returns the previous status, or `None`
    /// if the element does not exist.
    async fn set_status(&self, id: &str, status: ElementStatus) -> Result<Option<ElementStatus>>;

    /// Mark an element soft-deleted. Returns false if it was missing or
    /// already deleted.
    async fn soft_delete(&self, id: &str) -> Result<bool>;

    async fn upsert_dependency(&self, dep: &Dependency) -> Result<()>;

    /// Returns false if no such edge existed.
    async fn remove_dependency(
        &self,
        source_id: &str,
        target_id: &str,
        kind: DependencyKind,
    ) -> Result<bool>;

    /// Replace the gate metadata of the `awaits` edge `source_id -> target_id`.
    async fn update_gate(&self, source_id: &str, target_id: &str, gate: &Gate) -> Result<()>;

    // ===== Persisted cache mirror (optional) =====

    async fn save_blocked(&self, _entry: &BlockedEntry) -> Result<()> {
        Ok(())
    }

    async fn delete_blocked(&self, _element_id: &str) -> Result<()> {
        Ok(())
    }

    async fn clear_blocked(&self) -> Result<()> {
        Ok(())
    }

    async fn load_blocked(&self) -> Result<Vec<BlockedEntry>> {
        Ok(Vec::new())
    }
}
