//! The blocking engine: blocked cache maintenance and invalidation.
//!
//! [`BlockingEngine`] owns the in-memory [`BlockedCache`] and keeps it equal
//! to what [`BlockingEngine::rebuild`] would produce from the current graph.
//! Every change to the index is mirrored into the store's persisted cache.

use gk_core::{
    BlockedEntry, BlockedInfo, DependencyKind, EngineConfig, Gate, GateContext, RebuildStats,
};
use gk_storage::{ElementStore, Result};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::cache::BlockedCache;
use crate::evaluator::{is_gate_satisfied, Evaluator};
use crate::propagation::PropagationEngine;

/// Materialized view of which elements are blocked and why.
pub struct BlockingEngine<S: ElementStore> {
    store: Arc<S>,
    cache: BlockedCache,
    config: EngineConfig,
}

impl<S: ElementStore> BlockingEngine<S> {
    /// Create an engine with an empty cache. Call [`Self::rebuild`] to
    /// populate it.
    pub fn new(store: Arc<S>, config: EngineConfig) -> Self {
        Self {
            store,
            cache: BlockedCache::new(),
            config,
        }
    }

    /// Create an engine warm-started from the store's persisted cache.
    pub async fn open(store: Arc<S>, config: EngineConfig) -> Result<Self> {
        let cache: BlockedCache = store.load_blocked().await?.into_iter().collect();
        debug!(entries = cache.len(), "loaded persisted blocked cache");
        Ok(Self {
            store,
            cache,
            config,
        })
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cache(&self) -> &BlockedCache {
        &self.cache
    }

    /// Read-only priority/complexity propagation over the same store.
    pub fn propagation(&self) -> PropagationEngine<S> {
        PropagationEngine::new(Arc::clone(&self.store))
    }

    fn evaluator(&self) -> Evaluator<'_, S> {
        Evaluator::new(
            self.store.as_ref(),
            &self.cache,
            &self.config,
            GateContext::default(),
        )
    }

    // ===== Evaluation =====

    pub async fn compute_blocking_state(&self, element_id: &str) -> Result<Option<BlockedInfo>> {
        self.evaluator().compute_blocking_state(element_id).await
    }

    pub async fn is_target_completed(&self, id: &str) -> Result<bool> {
        self.evaluator().is_target_completed(id).await
    }

    pub fn is_gate_satisfied(&self, gate: &Gate, ctx: &GateContext) -> bool {
        is_gate_satisfied(gate, ctx)
    }

    // ===== Cache reads =====

    pub fn is_blocked(&self, element_id: &str) -> Option<&BlockedEntry> {
        self.cache.get(element_id)
    }

    pub fn get_all_blocked(&self) -> Vec<BlockedEntry> {
        self.cache.all()
    }

    pub fn get_blocked_by(&self, blocker_id: &str) -> Vec<String> {
        self.cache.blocked_by(blocker_id)
    }

    pub fn count(&self) -> usize {
        self.cache.len()
    }

    // ===== Cache writes =====

    /// Upsert an entry, replacing any previous one for `element_id`.
    pub async fn add_blocked(
        &mut self,
        element_id: &str,
        blocked_by: &str,
        reason: &str,
    ) -> Result<()> {
        let entry = BlockedEntry::new(element_id, blocked_by, reason);
        self.store.save_blocked(&entry).await?;
        self.cache.insert(entry);
        Ok(())
    }

    /// Drop the entry for `element_id`. No-op if there is none.
    pub async fn remove_blocked(&mut self, element_id: &str) -> Result<()> {
        if self.cache.remove(element_id).is_some() {
            self.store.delete_blocked(element_id).await?;
        }
        Ok(())
    }

    pub async fn clear(&mut self) -> Result<()> {
        self.cache.clear();
        self.store.clear_blocked().await
    }

    /// Recompute the whole cache from the graph.
    ///
    /// Candidates are evaluated parents-first along parent-child edges so a
    /// child sees its parent's final state. Elements on parent-child cycles
    /// are evaluated after everything else, in id order, and further passes
    /// run until nothing changes. On parent-child cycles later passes can
    /// keep rewriting reasons, so `max_rebuild_passes` caps the loop.
    #[instrument(skip(self))]
    pub async fn rebuild(&mut self) -> Result<RebuildStats> {
        let started = Instant::now();

        self.cache.clear();
        self.store.clear_blocked().await?;

        let candidates = self.store.blocking_candidates().await?;
        let order = self.parent_first_order(&candidates).await?;
        let max_passes = self.config.traversal.max_rebuild_passes.max(1);

        let mut passes = 0;
        loop {
            passes += 1;
            let mut changed = false;

            for id in &order {
                let verdict = self.compute_blocking_state(id).await?;
                if self.apply_verdict(id, verdict) {
                    changed = true;
                }
            }

            if !changed {
                break;
            }
            if passes >= max_passes {
                warn!(passes, "rebuild stopped at pass limit before converging");
                break;
            }
        }

        for entry in self.cache.all() {
            self.store.save_blocked(&entry).await?;
        }

        let stats = RebuildStats {
            elements_checked: candidates.len(),
            elements_blocked: self.cache.len(),
            duration_ms: started.elapsed().as_millis() as u64,
        };

        info!(
            checked = stats.elements_checked,
            blocked = stats.elements_blocked,
            passes,
            duration_ms = stats.duration_ms,
            "rebuilt blocked cache"
        );

        Ok(stats)
    }

    /// Order candidates so parents come before their children (Kahn's
    /// algorithm over parent-child edges between candidates). Whatever is
    /// left on cycles is appended in id order.
    async fn parent_first_order(&self, candidates: &[String]) -> Result<Vec<String>> {
        let candidate_set: BTreeSet<&str> = candidates.iter().map(String::as_str).collect();
        let mut children: HashMap<String, Vec<String>> = HashMap::new();
        let mut pending_parents: HashMap<String, usize> =
            candidates.iter().map(|id| (id.clone(), 0)).collect();

        for id in candidates {
            for dep in self.store.dependencies_from(id).await? {
                if dep.kind != DependencyKind::ParentChild
                    || !candidate_set.contains(dep.target_id.as_str())
                {
                    continue;
                }
                children.entry(dep.target_id).or_default().push(id.clone());
                if let Some(count) = pending_parents.get_mut(id) {
                    *count += 1;
                }
            }
        }

        let mut ready: BTreeSet<String> = pending_parents
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(id, _)| id.clone())
            .collect();
        let mut order = Vec::with_capacity(candidates.len());

        while let Some(id) = ready.pop_first() {
            if let Some(kids) = children.get(&id) {
                for kid in kids {
                    if let Some(count) = pending_parents.get_mut(kid) {
                        *count -= 1;
                        if *count == 0 {
                            ready.insert(kid.clone());
                        }
                    }
                }
            }
            pending_parents.remove(&id);
            order.push(id);
        }

        if !pending_parents.is_empty() {
            let mut cyclic: Vec<String> = pending_parents.into_keys().collect();
            cyclic.sort();
            debug!(count = cyclic.len(), "parent-child cycle members appended to rebuild order");
            order.extend(cyclic);
        }

        Ok(order)
    }

    /// Write a verdict into the in-memory index. Returns true if the entry
    /// for `id` changed.
    fn apply_verdict(&mut self, id: &str, verdict: Option<BlockedInfo>) -> bool {
        match verdict {
            Some(info) => {
                let entry = BlockedEntry::from_info(id, info);
                if self.cache.get(id) == Some(&entry) {
                    return false;
                }
                self.cache.insert(entry);
                true
            }
            None => self.cache.remove(id).is_some(),
        }
    }

    // ===== Invalidation =====

    /// Re-evaluate one element and make its entry match. Returns true if
    /// the entry changed.
    pub async fn invalidate_element(&mut self, element_id: &str) -> Result<bool> {
        let is_candidate = self
            .store
            .get_element(element_id)
            .await?
            .is_some_and(|element| element.is_cache_candidate());

        let verdict = if is_candidate {
            self.compute_blocking_state(element_id).await?
        } else {
            None
        };

        let changed = self.apply_verdict(element_id, verdict);
        if changed {
            match self.cache.get(element_id) {
                Some(entry) => {
                    debug!(element = element_id, blocked_by = %entry.blocked_by, "element blocked");
                    self.store.save_blocked(entry).await?;
                }
                None => {
                    debug!(element = element_id, "element unblocked");
                    self.store.delete_blocked(element_id).await?;
                }
            }
        }

        Ok(changed)
    }

    /// Re-evaluate everything that depends on `target_id`: its `blocks`
    /// dependents and its parent-child children, then the children of any
    /// element whose entry changed, down to `traversal.max_depth`.
    #[instrument(skip(self))]
    pub async fn invalidate_dependents(&mut self, target_id: &str) -> Result<()> {
        let direct = self
            .store
            .dependents_of(
                target_id,
                &[DependencyKind::Blocks, DependencyKind::ParentChild],
            )
            .await?;

        let evaluated = self
            .cascade(direct.into_iter().map(|dep| dep.source_id))
            .await?;
        debug!(target = target_id, evaluated, "invalidated dependents");
        Ok(())
    }

    /// Invalidate an element and, if its entry changed, its children.
    pub(crate) async fn refresh(&mut self, element_id: &str) -> Result<()> {
        if self.invalidate_element(element_id).await? {
            self.invalidate_children(element_id).await?;
        }
        Ok(())
    }

    /// Cascade below `parent_id` only; its `blocks` dependents are not
    /// affected by its blocked state.
    pub(crate) async fn invalidate_children(&mut self, parent_id: &str) -> Result<()> {
        let children = self
            .store
            .dependents_of(parent_id, &[DependencyKind::ParentChild])
            .await?;
        self.cascade(children.into_iter().map(|dep| dep.source_id))
            .await?;
        Ok(())
    }

    /// Worklist over parent-child edges starting from `seeds` at depth 1.
    ///
    /// An element is queued at most once at a time: a parent change while it
    /// is still pending is picked up when it is evaluated. Elements are
    /// queued again after they have been evaluated, so a child with many
    /// changing parents ends up matching all of them. Only
    /// `traversal.max_depth` bounds the walk, which keeps cycles finite.
    /// Returns the number of evaluations.
    async fn cascade(&mut self, seeds: impl IntoIterator<Item = String>) -> Result<usize> {
        let max_depth = self.config.traversal.max_depth;

        let mut pending: HashSet<String> = HashSet::new();
        let mut queue: VecDeque<(String, usize)> = VecDeque::new();
        for id in seeds {
            if pending.insert(id.clone()) {
                queue.push_back((id, 1));
            }
        }

        let mut evaluated = 0;
        while let Some((id, depth)) = queue.pop_front() {
            pending.remove(&id);
            evaluated += 1;

            if !self.invalidate_element(&id).await? || depth >= max_depth {
                continue;
            }

            for child in self
                .store
                .dependents_of(&id, &[DependencyKind::ParentChild])
                .await?
            {
                if pending.insert(child.source_id.clone()) {
                    queue.push_back((child.source_id, depth + 1));
                }
            }
        }

        Ok(evaluated)
    }
}
