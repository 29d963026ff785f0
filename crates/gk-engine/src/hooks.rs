//! Mutation event hooks
//!
//! The write path owns elements and edges. After each write it reports what
//! changed through [`MutationObserver`], and the engine re-evaluates only the
//! affected part of the graph instead of rebuilding.

use async_trait::async_trait;
use gk_core::{DependencyKind, ElementStatus};
use gk_storage::{ElementStore, Result};
use tracing::debug;

use crate::engine::BlockingEngine;

/// Notifications the write path sends after a successful store write.
#[async_trait(?Send)]
pub trait MutationObserver {
    async fn on_dependency_added(
        &mut self,
        source_id: &str,
        target_id: &str,
        kind: DependencyKind,
    ) -> Result<()>;

    async fn on_dependency_removed(
        &mut self,
        source_id: &str,
        target_id: &str,
        kind: DependencyKind,
    ) -> Result<()>;

    async fn on_status_changed(
        &mut self,
        element_id: &str,
        old_status: ElementStatus,
        new_status: ElementStatus,
    ) -> Result<()>;

    async fn on_element_deleted(&mut self, element_id: &str) -> Result<()>;

    /// Gate metadata on `source_id -> target_id` was rewritten outside the
    /// gate manager.
    async fn on_gate_updated(&mut self, source_id: &str, target_id: &str) -> Result<()>;
}

impl<S: ElementStore> BlockingEngine<S> {
    async fn on_dependency_changed(&mut self, source_id: &str, kind: DependencyKind) -> Result<()> {
        if !kind.is_blocking() {
            return Ok(());
        }

        let changed = self.invalidate_element(source_id).await?;
        if kind == DependencyKind::ParentChild || changed {
            self.invalidate_dependents(source_id).await?;
        }
        Ok(())
    }
}

#[async_trait(?Send)]
impl<S: ElementStore> MutationObserver for BlockingEngine<S> {
    async fn on_dependency_added(
        &mut self,
        source_id: &str,
        target_id: &str,
        kind: DependencyKind,
    ) -> Result<()> {
        debug!(source = source_id, target = target_id, %kind, "dependency added");
        self.on_dependency_changed(source_id, kind).await
    }

    async fn on_dependency_removed(
        &mut self,
        source_id: &str,
        target_id: &str,
        kind: DependencyKind,
    ) -> Result<()> {
        debug!(source = source_id, target = target_id, %kind, "dependency removed");
        self.on_dependency_changed(source_id, kind).await
    }

    async fn on_status_changed(
        &mut self,
        element_id: &str,
        old_status: ElementStatus,
        new_status: ElementStatus,
    ) -> Result<()> {
        debug!(element = element_id, %old_status, %new_status, "status changed");

        // Tombstoned elements drop out of the cache entirely.
        if (old_status == ElementStatus::Tombstone) != (new_status == ElementStatus::Tombstone) {
            self.refresh(element_id).await?;
        }

        if old_status.is_completed() != new_status.is_completed() {
            self.invalidate_dependents(element_id).await?;
        }
        Ok(())
    }

    async fn on_element_deleted(&mut self, element_id: &str) -> Result<()> {
        debug!(element = element_id, "element deleted");
        self.remove_blocked(element_id).await?;
        self.invalidate_dependents(element_id).await
    }

    async fn on_gate_updated(&mut self, source_id: &str, target_id: &str) -> Result<()> {
        debug!(source = source_id, target = target_id, "gate updated");
        self.refresh(source_id).await
    }
}
