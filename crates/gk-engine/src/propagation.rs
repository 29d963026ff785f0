//! Priority and complexity propagation
//!
//! Derived scheduling values computed on demand from `blocks` edges:
//!
//! - effective priority: a task inherits the urgency of anything waiting on
//!   it, transitively
//! - aggregate complexity: a task's own effort plus the effort of everything
//!   it is waiting on
//!
//! Both walks are breadth-first with a visited set and a depth bound, so
//! cycles terminate. Nothing here writes to the store.

use gk_core::{Complexity, DependencyKind, Element, Priority, PropagationConfig};
use gk_storage::{ElementStore, Result};
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, instrument};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EffectivePriority {
    pub task_id: String,
    pub base_priority: Priority,
    pub effective_priority: Priority,
    /// Dependents whose priority set the effective value. Empty when the
    /// task is not influenced.
    pub dependent_influencers: Vec<String>,
    pub is_influenced: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockerComplexity {
    pub id: String,
    pub complexity: Complexity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AggregateComplexity {
    pub task_id: String,
    pub base_complexity: Complexity,
    pub aggregate_complexity: u32,
    pub blockers: Vec<BlockerComplexity>,
    pub blocker_count: usize,
}

/// A task annotated with its effective priority, ready for sorting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrioritizedTask {
    #[serde(flatten)]
    pub task: Element,
    pub effective_priority: Priority,
    pub priority_influenced: bool,
}

pub struct PropagationEngine<S: ElementStore> {
    store: Arc<S>,
}

impl<S: ElementStore> PropagationEngine<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Walk reverse `blocks` edges from `task_id` and take the most urgent
    /// priority found. Unknown tasks get the default priority.
    #[instrument(skip(self))]
    pub async fn calculate_effective_priority(
        &self,
        task_id: &str,
        config: PropagationConfig,
    ) -> Result<EffectivePriority> {
        let base = self
            .store
            .get_element(task_id)
            .await?
            .map(|task| task.priority_or_default())
            .unwrap_or_default();

        let mut effective = base;
        let mut influencers: Vec<String> = Vec::new();

        let mut visited: HashSet<String> = HashSet::from([task_id.to_string()]);
        let mut queue: VecDeque<(String, usize)> = VecDeque::from([(task_id.to_string(), 0)]);

        while let Some((current, depth)) = queue.pop_front() {
            if depth >= config.max_depth {
                continue;
            }

            for dep in self
                .store
                .dependents_of(&current, &[DependencyKind::Blocks])
                .await?
            {
                let dependent_id = dep.source_id;
                if !visited.insert(dependent_id.clone()) {
                    continue;
                }
                let Some(dependent) = self.store.get_element(&dependent_id).await? else {
                    continue;
                };

                let priority = dependent.priority_or_default();
                if priority < effective {
                    effective = priority;
                    influencers = vec![dependent_id.clone()];
                } else if priority == effective && priority < base {
                    influencers.push(dependent_id.clone());
                }

                queue.push_back((dependent_id, depth + 1));
            }
        }

        debug!(
            base = base.as_i64(),
            effective = effective.as_i64(),
            visited = visited.len() - 1,
            "effective priority computed"
        );

        Ok(EffectivePriority {
            task_id: task_id.to_string(),
            base_priority: base,
            effective_priority: effective,
            dependent_influencers: influencers,
            is_influenced: effective != base,
        })
    }

    pub async fn calculate_effective_priorities(
        &self,
        task_ids: &[String],
        config: PropagationConfig,
    ) -> Result<HashMap<String, EffectivePriority>> {
        let mut results = HashMap::with_capacity(task_ids.len());
        for id in task_ids {
            let result = self.calculate_effective_priority(id, config).await?;
            results.insert(id.clone(), result);
        }
        Ok(results)
    }

    /// Walk forward `blocks` edges from `task_id` and sum the complexity of
    /// every blocker reached, each counted once. Unknown blockers are
    /// external references and contribute nothing.
    #[instrument(skip(self))]
    pub async fn calculate_aggregate_complexity(
        &self,
        task_id: &str,
        config: PropagationConfig,
    ) -> Result<AggregateComplexity> {
        let base = self
            .store
            .get_element(task_id)
            .await?
            .map(|task| task.complexity_or_default())
            .unwrap_or_default();

        let mut blockers: Vec<BlockerComplexity> = Vec::new();
        let mut visited: HashSet<String> = HashSet::from([task_id.to_string()]);
        let mut queue: VecDeque<(String, usize)> = VecDeque::from([(task_id.to_string(), 0)]);

        while let Some((current, depth)) = queue.pop_front() {
            if depth >= config.max_depth {
                continue;
            }

            for dep in self.store.dependencies_from(&current).await? {
                if dep.kind != DependencyKind::Blocks || !visited.insert(dep.target_id.clone()) {
                    continue;
                }
                let Some(blocker) = self.store.get_element(&dep.target_id).await? else {
                    continue;
                };

                blockers.push(BlockerComplexity {
                    id: dep.target_id.clone(),
                    complexity: blocker.complexity_or_default(),
                });
                queue.push_back((dep.target_id, depth + 1));
            }
        }

        let aggregate = base.points() + blockers.iter().map(|b| b.complexity.points()).sum::<u32>();

        Ok(AggregateComplexity {
            task_id: task_id.to_string(),
            base_complexity: base,
            aggregate_complexity: aggregate,
            blocker_count: blockers.len(),
            blockers,
        })
    }

    /// Annotate each task with its effective priority, preserving order.
    pub async fn enhance_tasks_with_effective_priority(
        &self,
        tasks: Vec<Element>,
        config: PropagationConfig,
    ) -> Result<Vec<PrioritizedTask>> {
        let mut enhanced = Vec::with_capacity(tasks.len());
        for task in tasks {
            let result = self.calculate_effective_priority(&task.id, config).await?;
            enhanced.push(PrioritizedTask {
                task,
                effective_priority: result.effective_priority,
                priority_influenced: result.is_influenced,
            });
        }
        Ok(enhanced)
    }
}

/// Stable sort, most urgent first. Ties on effective priority fall back to
/// the task's own priority.
pub fn sort_by_effective_priority(tasks: &mut [PrioritizedTask]) {
    tasks.sort_by_key(|t| (t.effective_priority, t.task.priority_or_default()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use gk_core::Dependency;
    use gk_storage::MemoryStore;

    fn task(id: &str, priority: Priority, complexity: Complexity) -> Element {
        let mut task = Element::task(id);
        task.priority = Some(priority);
        task.complexity = Some(complexity);
        task
    }

    fn blocks(source: &str, target: &str) -> Dependency {
        Dependency::new(source, target, DependencyKind::Blocks)
    }

    fn engine(elements: Vec<Element>, deps: Vec<Dependency>) -> PropagationEngine<MemoryStore> {
        PropagationEngine::new(Arc::new(MemoryStore::from_parts(elements, deps)))
    }

    #[tokio::test]
    async fn test_priority_inherited_from_transitive_dependent() {
        // urgent waits on mid, mid waits on base
        let engine = engine(
            vec![
                task("base", Priority::Low, Complexity::Medium),
                task("mid", Priority::Medium, Complexity::Medium),
                task("urgent", Priority::Critical, Complexity::Medium),
            ],
            vec![blocks("mid", "base"), blocks("urgent", "mid")],
        );

        let result = engine
            .calculate_effective_priority("base", PropagationConfig::default())
            .await
            .unwrap();
        assert_eq!(result.base_priority, Priority::Low);
        assert_eq!(result.effective_priority, Priority::Critical);
        assert_eq!(result.dependent_influencers, vec!["urgent".to_string()]);
        assert!(result.is_influenced);
    }

    #[tokio::test]
    async fn test_priority_depth_bound() {
        let engine = engine(
            vec![
                task("base", Priority::Low, Complexity::Medium),
                task("mid", Priority::Medium, Complexity::Medium),
                task("urgent", Priority::Critical, Complexity::Medium),
            ],
            vec![blocks("mid", "base"), blocks("urgent", "mid")],
        );

        let result = engine
            .calculate_effective_priority("base", PropagationConfig::with_max_depth(1))
            .await
            .unwrap();
        assert_eq!(result.effective_priority, Priority::Medium);
        assert_eq!(result.dependent_influencers, vec!["mid".to_string()]);
    }

    #[tokio::test]
    async fn test_priority_ties_accumulate_influencers() {
        let engine = engine(
            vec![
                task("base", Priority::Minimal, Complexity::Medium),
                task("a", Priority::High, Complexity::Medium),
                task("b", Priority::High, Complexity::Medium),
                task("c", Priority::Minimal, Complexity::Medium),
            ],
            vec![blocks("a", "base"), blocks("b", "base"), blocks("c", "base")],
        );

        let mut result = engine
            .calculate_effective_priority("base", PropagationConfig::default())
            .await
            .unwrap();
        result.dependent_influencers.sort();
        assert_eq!(result.effective_priority, Priority::High);
        assert_eq!(
            result.dependent_influencers,
            vec!["a".to_string(), "b".to_string()]
        );
    }

    #[tokio::test]
    async fn test_equal_priority_dependent_does_not_influence() {
        let engine = engine(
            vec![
                task("base", Priority::High, Complexity::Medium),
                task("peer", Priority::High, Complexity::Medium),
            ],
            vec![blocks("peer", "base")],
        );

        let result = engine
            .calculate_effective_priority("base", PropagationConfig::default())
            .await
            .unwrap();
        assert!(!result.is_influenced);
        assert!(result.dependent_influencers.is_empty());
    }

    #[tokio::test]
    async fn test_cycles_terminate() {
        let engine = engine(
            vec![
                task("a", Priority::Low, Complexity::Simple),
                task("b", Priority::High, Complexity::Complex),
            ],
            vec![blocks("a", "b"), blocks("b", "a")],
        );
        let config = PropagationConfig::default();

        let priority = engine.calculate_effective_priority("a", config).await.unwrap();
        assert_eq!(priority.effective_priority, Priority::High);

        let complexity = engine.calculate_aggregate_complexity("a", config).await.unwrap();
        assert_eq!(complexity.blocker_count, 1);
        assert_eq!(complexity.aggregate_complexity, 2 + 4);
    }

    #[tokio::test]
    async fn test_aggregate_complexity_counts_each_blocker_once() {
        // diamond: top waits on left and right, both wait on bottom
        let engine = engine(
            vec![
                task("top", Priority::Medium, Complexity::Simple),
                task("left", Priority::Medium, Complexity::Trivial),
                task("right", Priority::Medium, Complexity::Complex),
                task("bottom", Priority::Medium, Complexity::VeryComplex),
            ],
            vec![
                blocks("top", "left"),
                blocks("top", "right"),
                blocks("left", "bottom"),
                blocks("right", "bottom"),
                blocks("top", "external-7"),
            ],
        );

        let result = engine
            .calculate_aggregate_complexity("top", PropagationConfig::default())
            .await
            .unwrap();
        assert_eq!(result.base_complexity, Complexity::Simple);
        assert_eq!(result.blocker_count, 3);
        assert_eq!(result.aggregate_complexity, 2 + 1 + 4 + 5);
        assert!(result.blockers.iter().all(|b| b.id != "external-7"));
    }

    #[tokio::test]
    async fn test_batch_priorities_keyed_by_id() {
        let engine = engine(
            vec![
                task("base", Priority::Low, Complexity::Medium),
                task("urgent", Priority::Critical, Complexity::Medium),
                task("alone", Priority::High, Complexity::Medium),
            ],
            vec![blocks("urgent", "base")],
        );
        let ids = vec!["base".to_string(), "alone".to_string(), "ghost".to_string()];

        let results = engine
            .calculate_effective_priorities(&ids, PropagationConfig::default())
            .await
            .unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results["base"].effective_priority, Priority::Critical);
        assert!(results["base"].is_influenced);
        assert_eq!(results["alone"].effective_priority, Priority::High);
        assert!(!results["alone"].is_influenced);
        assert_eq!(results["ghost"].base_priority, Priority::Medium);
    }

    #[tokio::test]
    async fn test_enhance_and_sort() {
        let engine = engine(
            vec![
                task("quiet", Priority::Low, Complexity::Medium),
                task("plain", Priority::High, Complexity::Medium),
                task("boosted", Priority::Minimal, Complexity::Medium),
                task("waiter", Priority::Critical, Complexity::Medium),
            ],
            vec![blocks("waiter", "boosted")],
        );
        let tasks = vec![
            task("quiet", Priority::Low, Complexity::Medium),
            task("plain", Priority::High, Complexity::Medium),
            task("boosted", Priority::Minimal, Complexity::Medium),
        ];

        let mut enhanced = engine
            .enhance_tasks_with_effective_priority(tasks, PropagationConfig::default())
            .await
            .unwrap();
        assert!(enhanced[2].priority_influenced);
        assert!(!enhanced[0].priority_influenced);

        sort_by_effective_priority(&mut enhanced);
        let order: Vec<&str> = enhanced.iter().map(|t| t.task.id.as_str()).collect();
        assert_eq!(order, vec!["boosted", "plain", "quiet"]);
    }

    #[test]
    fn test_sort_ties_fall_back_to_base() {
        let mut tasks = vec![
            PrioritizedTask {
                task: task("low-base", Priority::Low, Complexity::Medium),
                effective_priority: Priority::High,
                priority_influenced: true,
            },
            PrioritizedTask {
                task: task("high-base", Priority::High, Complexity::Medium),
                effective_priority: Priority::High,
                priority_influenced: false,
            },
        ];

        sort_by_effective_priority(&mut tasks);
        assert_eq!(tasks[0].task.id, "high-base");
    }
}
