//! In-memory store.
//!
//! Keeps elements in a map and edges in insertion order, which is the order
//! the evaluator sees them in. Used for embedding and for tests.

use async_trait::async_trait;
use chrono::Utc;
use gk_core::{BlockedEntry, Dependency, DependencyKind, Element, ElementStatus, Gate};
use std::collections::{BTreeSet, HashMap};
use tokio::sync::RwLock;

use crate::store::{ElementStore, Result, StoreError};

#[derive(Debug, Default)]
struct MemoryState {
    elements: HashMap<String, Element>,
    dependencies: Vec<Dependency>,
    blocked: HashMap<String, BlockedEntry>,
}

/// Store backed by plain collections behind an async lock.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from a fixed graph.
    pub fn from_parts(elements: Vec<Element>, dependencies: Vec<Dependency>) -> Self {
        let state = MemoryState {
            elements: elements.into_iter().map(|e| (e.id.clone(), e)).collect(),
            dependencies,
            blocked: HashMap::new(),
        };
        Self {
            state: RwLock::new(state),
        }
    }

    /// Remove an element outright, leaving its edges dangling.
    pub async fn purge_element(&self, id: &str) -> bool {
        self.state.write().await.elements.remove(id).is_some()
    }
}

fn same_edge(dep: &Dependency, source_id: &str, target_id: &str, kind: DependencyKind) -> bool {
    dep.source_id == source_id && dep.target_id == target_id && dep.kind == kind
}

#[async_trait(?Send)]
impl ElementStore for MemoryStore {
    async fn get_element(&self, id: &str) -> Result<Option<Element>> {
        Ok(self.state.read().await.elements.get(id).cloned())
    }

    async fn dependencies_from(&self, source_id: &str) -> Result<Vec<Dependency>> {
        let state = self.state.read().await;
        Ok(state
            .dependencies
            .iter()
            .filter(|d| d.source_id == source_id)
            .cloned()
            .collect())
    }

    async fn dependents_of(
        &self,
        target_id: &str,
        kinds: &[DependencyKind],
    ) -> Result<Vec<Dependency>> {
        let state = self.state.read().await;
        Ok(state
            .dependencies
            .iter()
            .filter(|d| d.target_id == target_id && kinds.contains(&d.kind))
            .cloned()
            .collect())
    }

    async fn get_dependency(
        &self,
        source_id: &str,
        target_id: &str,
        kind: DependencyKind,
    ) -> Result<Option<Dependency>> {
        let state = self.state.read().await;
        Ok(state
            .dependencies
            .iter()
            .find(|d| same_edge(d, source_id, target_id, kind))
            .cloned())
    }

    async fn blocking_candidates(&self) -> Result<Vec<String>> {
        let state = self.state.read().await;
        let ids: BTreeSet<String> = state
            .dependencies
            .iter()
            .filter(|d| d.kind.is_blocking())
            .filter(|d| {
                state
                    .elements
                    .get(&d.source_id)
                    .is_some_and(|e| e.is_cache_candidate())
            })
            .map(|d| d.source_id.clone())
            .collect();
        Ok(ids.into_iter().collect())
    }

    async fn list_elements(&self) -> Result<Vec<Element>> {
        let state = self.state.read().await;
        let mut elements: Vec<Element> = state.elements.values().cloned().collect();
        elements.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(elements)
    }

    async fn list_dependencies(&self) -> Result<Vec<Dependency>> {
        Ok(self.state.read().await.dependencies.clone())
    }

    async fn upsert_element(&self, element: &Element) -> Result<()> {
        element.validate()?;
        self.state
            .write()
            .await
            .elements
            .insert(element.id.clone(), element.clone());
        Ok(())
    }

    async fn set_status(&self, id: &str, status: ElementStatus) -> Result<Option<ElementStatus>> {
        let mut state = self.state.write().await;
        Ok(state.elements.get_mut(id).map(|element| {
            let old = element.status;
            element.status = status;
            element.updated_at = Utc::now();
            old
        }))
    }

    async fn soft_delete(&self, id: &str) -> Result<bool> {
        let mut state = self.state.write().await;
        match state.elements.get_mut(id) {
            Some(element) if element.deleted_at.is_none() => {
                let now = Utc::now();
                element.deleted_at = Some(now);
                element.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn upsert_dependency(&self, dep: &Dependency) -> Result<()> {
        dep.validate()?;
        let mut state = self.state.write().await;
        match state
            .dependencies
            .iter_mut()
            .find(|d| same_edge(d, &dep.source_id, &dep.target_id, dep.kind))
        {
            Some(existing) => *existing = dep.clone(),
            None => state.dependencies.push(dep.clone()),
        }
        Ok(())
    }

    async fn remove_dependency(
        &self,
        source_id: &str,
        target_id: &str,
        kind: DependencyKind,
    ) -> Result<bool> {
        let mut state = self.state.write().await;
        let before = state.dependencies.len();
        state
            .dependencies
            .retain(|d| !same_edge(d, source_id, target_id, kind));
        Ok(state.dependencies.len() != before)
    }

    async fn update_gate(&self, source_id: &str, target_id: &str, gate: &Gate) -> Result<()> {
        let mut state = self.state.write().await;
        let dep = state
            .dependencies
            .iter_mut()
            .find(|d| same_edge(d, source_id, target_id, DependencyKind::Awaits))
            .ok_or_else(|| {
                StoreError::DependencyNotFound(format!("{} awaits {}", source_id, target_id))
            })?;
        dep.gate = Some(gate.clone());
        Ok(())
    }

    async fn save_blocked(&self, entry: &BlockedEntry) -> Result<()> {
        self.state
            .write()
            .await
            .blocked
            .insert(entry.element_id.clone(), entry.clone());
        Ok(())
    }

    async fn delete_blocked(&self, element_id: &str) -> Result<()> {
        self.state.write().await.blocked.remove(element_id);
        Ok(())
    }

    async fn clear_blocked(&self) -> Result<()> {
        self.state.write().await.blocked.clear();
        Ok(())
    }

    async fn load_blocked(&self) -> Result<Vec<BlockedEntry>> {
        let state = self.state.read().await;
        let mut entries: Vec<BlockedEntry> = state.blocked.values().cloned().collect();
        entries.sort_by(|a, b| a.element_id.cmp(&b.element_id));
        Ok(entries)
    }
}
