//! Blocking evaluation for a single element.
//!
//! The evaluator walks an element's outgoing edges in store order and
//! returns the first blocking verdict. It reads the store and at most one
//! cache entry per parent-child edge; it never writes anything.

use gk_core::{BlockedInfo, Dependency, DependencyKind, EngineConfig, Gate, GateContext};
use gk_storage::{ElementStore, Result};
use tracing::warn;

use crate::cache::BlockedCache;

/// Pure gate check.
pub fn is_gate_satisfied(gate: &Gate, ctx: &GateContext) -> bool {
    gate.is_satisfied(ctx)
}

/// Borrowed view over the store and cache used to evaluate elements.
pub struct Evaluator<'a, S: ElementStore + ?Sized> {
    store: &'a S,
    cache: &'a BlockedCache,
    config: &'a EngineConfig,
    ctx: GateContext,
}

impl<'a, S: ElementStore + ?Sized> Evaluator<'a, S> {
    pub fn new(
        store: &'a S,
        cache: &'a BlockedCache,
        config: &'a EngineConfig,
        ctx: GateContext,
    ) -> Self {
        Self {
            store,
            cache,
            config,
            ctx,
        }
    }

    /// Decide whether `element_id` is blocked right now, and by what.
    pub async fn compute_blocking_state(&self, element_id: &str) -> Result<Option<BlockedInfo>> {
        for dep in self.store.dependencies_from(element_id).await? {
            if let Some(info) = self.evaluate_edge(&dep).await? {
                return Ok(Some(info));
            }
        }
        Ok(None)
    }

    /// Missing, soft-deleted, closed, completed and tombstoned targets
    /// count as completed. Unknown ids are external references and never
    /// block.
    pub async fn is_target_completed(&self, id: &str) -> Result<bool> {
        Ok(match self.store.get_element(id).await? {
            Some(element) => element.is_completed_for_blocking(),
            None => true,
        })
    }

    async fn evaluate_edge(&self, dep: &Dependency) -> Result<Option<BlockedInfo>> {
        let target = &dep.target_id;

        match dep.kind {
            DependencyKind::Blocks => {
                if self.is_target_completed(target).await? {
                    return Ok(None);
                }
                Ok(Some(BlockedInfo {
                    blocked_by: target.clone(),
                    reason: format!("Blocked by {}", target),
                }))
            }
            DependencyKind::ParentChild => {
                let Some(parent) = self.store.get_element(target).await? else {
                    return Ok(None);
                };
                if self.config.is_collection(parent.element_type) {
                    return Ok(None);
                }
                if self.cache.contains(target) {
                    return Ok(Some(BlockedInfo {
                        blocked_by: target.clone(),
                        reason: format!("Parent {} is blocked", target),
                    }));
                }
                if !parent.is_completed_for_blocking() {
                    return Ok(Some(BlockedInfo {
                        blocked_by: target.clone(),
                        reason: format!("Parent {} is not completed", target),
                    }));
                }
                Ok(None)
            }
            DependencyKind::Awaits => {
                let Some(gate) = &dep.gate else {
                    warn!(
                        source = %dep.source_id,
                        target = %target,
                        "awaits dependency has no gate metadata, ignoring"
                    );
                    return Ok(None);
                };
                if is_gate_satisfied(gate, &self.ctx) {
                    return Ok(None);
                }
                Ok(Some(BlockedInfo {
                    blocked_by: target.clone(),
                    reason: format!("Awaiting {} gate", gate.kind()),
                }))
            }
            DependencyKind::RelatesTo | DependencyKind::References => Ok(None),
        }
    }
}
