//! Integration tests for the blocking engine
//!
//! Covers:
//! - The end-to-end blocking scenarios (blocks, parent-child, timers)
//! - Rebuild idempotence and termination on cyclic graphs
//! - Hook-driven updates matching a from-scratch rebuild
//! - The persisted cache mirror and warm start

use chrono::{Duration, Utc};
use gk_core::{
    Dependency, DependencyKind, Element, ElementStatus, ElementType, EngineConfig, Gate,
    TraversalConfig,
};
use gk_engine::{BlockingEngine, MutationObserver};
use gk_storage::{Database, ElementStore, MemoryStore};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

fn setup(
    elements: Vec<Element>,
    deps: Vec<Dependency>,
) -> (Arc<MemoryStore>, BlockingEngine<MemoryStore>) {
    let store = Arc::new(MemoryStore::from_parts(elements, deps));
    let engine = BlockingEngine::new(Arc::clone(&store), EngineConfig::default());
    (store, engine)
}

/// Rebuild a fresh engine over the same store and compare entry sets.
async fn assert_matches_rebuild(engine: &BlockingEngine<MemoryStore>, store: &Arc<MemoryStore>) {
    let mut fresh = BlockingEngine::new(Arc::clone(store), EngineConfig::default());
    fresh.rebuild().await.unwrap();
    assert_eq!(engine.get_all_blocked(), fresh.get_all_blocked());
}

/// Write path as an embedding application would drive it: store first,
/// then notify whatever observer is attached.
async fn add_dep(store: &MemoryStore, observer: &mut dyn MutationObserver, dep: Dependency) {
    let (source, target, kind) = (dep.source_id.clone(), dep.target_id.clone(), dep.kind);
    store.upsert_dependency(&dep).await.unwrap();
    observer.on_dependency_added(&source, &target, kind).await.unwrap();
}

async fn set_status(
    store: &MemoryStore,
    engine: &mut BlockingEngine<MemoryStore>,
    id: &str,
    status: ElementStatus,
) {
    let old = store.set_status(id, status).await.unwrap().unwrap();
    engine.on_status_changed(id, old, status).await.unwrap();
}

#[tokio::test]
async fn test_blocks_then_target_closed() {
    let (store, mut engine) = setup(
        vec![Element::task("task1"), Element::task("task2")],
        vec![Dependency::new("task1", "task2", DependencyKind::Blocks)],
    );
    engine.rebuild().await.unwrap();

    let entry = engine.is_blocked("task1").expect("task1 should be blocked");
    assert_eq!(entry.blocked_by, "task2");
    assert!(engine.is_blocked("task2").is_none());

    set_status(&store, &mut engine, "task2", ElementStatus::Closed).await;
    assert!(engine.is_blocked("task1").is_none());
    assert_eq!(engine.count(), 0);
}

#[tokio::test]
async fn test_parent_blockage_reaches_grandchildren() {
    let (_store, mut engine) = setup(
        vec![
            Element::task("plan1"),
            Element::task("task1"),
            Element::task("task2"),
            Element::task("task3"),
        ],
        vec![
            Dependency::new("plan1", "task3", DependencyKind::Blocks),
            Dependency::new("task1", "plan1", DependencyKind::ParentChild),
            Dependency::new("task2", "task1", DependencyKind::ParentChild),
        ],
    );

    let stats = engine.rebuild().await.unwrap();
    assert_eq!(stats.elements_checked, 3);
    assert_eq!(stats.elements_blocked, 3);

    assert_eq!(engine.is_blocked("plan1").unwrap().blocked_by, "task3");
    assert_eq!(engine.is_blocked("task1").unwrap().reason, "Parent plan1 is blocked");
    assert_eq!(engine.is_blocked("task2").unwrap().reason, "Parent task1 is blocked");
    assert!(engine.is_blocked("task3").is_none());
}

#[tokio::test]
async fn test_collection_parent_does_not_gate_children() {
    let (_store, mut engine) = setup(
        vec![
            Element::new("plan1", ElementType::Plan),
            Element::task("task1"),
            Element::task("task3"),
        ],
        vec![
            Dependency::new("plan1", "task3", DependencyKind::Blocks),
            Dependency::new("task1", "plan1", DependencyKind::ParentChild),
        ],
    );

    engine.rebuild().await.unwrap();
    assert!(engine.is_blocked("plan1").is_some());
    assert!(engine.is_blocked("task1").is_none());
}

#[tokio::test]
async fn test_timer_gates() {
    let (store, mut engine) = setup(
        vec![Element::task("early"), Element::task("late")],
        vec![],
    );

    add_dep(
        &store,
        &mut engine,
        Dependency::awaits("early", "window-1", Gate::timer(Utc::now() - Duration::hours(1))),
    )
    .await;
    add_dep(
        &store,
        &mut engine,
        Dependency::awaits("late", "window-2", Gate::timer(Utc::now() + Duration::hours(1))),
    )
    .await;

    assert!(engine.is_blocked("early").is_none());
    let entry = engine.is_blocked("late").expect("future timer should block");
    assert_eq!(entry.blocked_by, "window-2");
    assert_eq!(entry.reason, "Awaiting timer gate");
}

#[tokio::test]
async fn test_rebuild_is_idempotent() {
    let (_store, mut engine) = setup(
        vec![
            Element::task("a"),
            Element::task("b"),
            Element::task("c"),
            Element::task("d"),
        ],
        vec![
            Dependency::new("a", "b", DependencyKind::Blocks),
            Dependency::new("c", "a", DependencyKind::ParentChild),
            Dependency::new("d", "c", DependencyKind::ParentChild),
        ],
    );

    let first = engine.rebuild().await.unwrap();
    let first_entries = engine.get_all_blocked();
    let second = engine.rebuild().await.unwrap();

    assert_eq!(first.elements_blocked, second.elements_blocked);
    assert_eq!(first_entries, engine.get_all_blocked());
}

#[tokio::test]
async fn test_parent_child_cycle_terminates() {
    let (store, mut engine) = setup(
        vec![Element::task("a"), Element::task("b")],
        vec![
            Dependency::new("a", "b", DependencyKind::ParentChild),
            Dependency::new("b", "a", DependencyKind::ParentChild),
        ],
    );

    let stats = engine.rebuild().await.unwrap();
    assert_eq!(stats.elements_blocked, 2);
    let entries = engine.get_all_blocked();

    engine.rebuild().await.unwrap();
    assert_eq!(entries, engine.get_all_blocked());

    // A status change inside the cycle must not loop either.
    set_status(&store, &mut engine, "a", ElementStatus::Closed).await;
    assert_matches_rebuild(&engine, &store).await;
}

#[tokio::test]
async fn test_blocks_cycle_terminates() {
    let (store, mut engine) = setup(
        vec![Element::task("a"), Element::task("b")],
        vec![
            Dependency::new("a", "b", DependencyKind::Blocks),
            Dependency::new("b", "a", DependencyKind::Blocks),
        ],
    );

    engine.rebuild().await.unwrap();
    assert_eq!(engine.count(), 2);

    set_status(&store, &mut engine, "b", ElementStatus::Completed).await;
    assert!(engine.is_blocked("a").is_none());
    assert!(engine.is_blocked("b").is_some());
    assert_matches_rebuild(&engine, &store).await;
}

#[tokio::test]
async fn test_hook_sequence_matches_rebuild() {
    let (store, mut engine) = setup(
        vec![
            Element::task("a"),
            Element::task("b"),
            Element::task("c"),
            Element::task("d"),
            Element::task("e"),
            Element::task("p"),
            Element::new("q", ElementType::Plan),
        ],
        vec![],
    );

    add_dep(&store, &mut engine, Dependency::new("a", "b", DependencyKind::Blocks)).await;
    assert_matches_rebuild(&engine, &store).await;

    add_dep(&store, &mut engine, Dependency::new("c", "p", DependencyKind::ParentChild)).await;
    assert_eq!(engine.is_blocked("c").unwrap().reason, "Parent p is not completed");
    assert_matches_rebuild(&engine, &store).await;

    add_dep(&store, &mut engine, Dependency::new("p", "d", DependencyKind::Blocks)).await;
    assert_eq!(engine.is_blocked("c").unwrap().reason, "Parent p is blocked");
    assert_matches_rebuild(&engine, &store).await;

    add_dep(&store, &mut engine, Dependency::new("d", "q", DependencyKind::ParentChild)).await;
    assert!(engine.is_blocked("d").is_none());
    assert_matches_rebuild(&engine, &store).await;

    set_status(&store, &mut engine, "d", ElementStatus::Closed).await;
    assert!(engine.is_blocked("p").is_none());
    assert_eq!(engine.is_blocked("c").unwrap().reason, "Parent p is not completed");
    assert_matches_rebuild(&engine, &store).await;

    add_dep(
        &store,
        &mut engine,
        Dependency::awaits("e", "release", Gate::timer(Utc::now() + Duration::days(2))),
    )
    .await;
    assert_matches_rebuild(&engine, &store).await;

    assert!(store.soft_delete("b").await.unwrap());
    engine.on_element_deleted("b").await.unwrap();
    assert!(engine.is_blocked("a").is_none());
    assert_matches_rebuild(&engine, &store).await;

    assert!(store
        .remove_dependency("c", "p", DependencyKind::ParentChild)
        .await
        .unwrap());
    engine
        .on_dependency_removed("c", "p", DependencyKind::ParentChild)
        .await
        .unwrap();
    assert!(engine.is_blocked("c").is_none());
    assert_matches_rebuild(&engine, &store).await;

    set_status(&store, &mut engine, "e", ElementStatus::Tombstone).await;
    assert!(engine.is_blocked("e").is_none());
    assert_matches_rebuild(&engine, &store).await;
}

#[tokio::test]
async fn test_child_with_many_parents_tracks_every_parent() {
    // p1 waits on t; p2..p11 hang below p1 in a chain; k sits under all of
    // them, first under p11. All parents are closed, so only the chain of
    // "Parent X is blocked" entries holds k up.
    let mut elements = vec![Element::task("t"), Element::task("k")];
    for i in 1..=11 {
        let mut parent = Element::task(format!("p{}", i));
        parent.status = ElementStatus::Closed;
        elements.push(parent);
    }

    let mut deps = vec![Dependency::new("p1", "t", DependencyKind::Blocks)];
    for i in 2..=11 {
        deps.push(Dependency::new(
            format!("p{}", i),
            format!("p{}", i - 1),
            DependencyKind::ParentChild,
        ));
    }
    deps.push(Dependency::new("k", "p11", DependencyKind::ParentChild));
    for i in 1..=10 {
        deps.push(Dependency::new("k", format!("p{}", i), DependencyKind::ParentChild));
    }

    let (store, mut engine) = setup(elements, deps);
    engine.rebuild().await.unwrap();
    assert_eq!(engine.is_blocked("k").unwrap().reason, "Parent p11 is blocked");
    assert_eq!(engine.count(), 12);

    set_status(&store, &mut engine, "t", ElementStatus::Closed).await;
    assert!(engine.is_blocked("k").is_none());
    assert_eq!(engine.count(), 0);
    assert_matches_rebuild(&engine, &store).await;
}

#[tokio::test]
async fn test_cascade_stops_at_max_depth() {
    let store = Arc::new(MemoryStore::from_parts(
        vec![
            Element::task("x"),
            Element::task("a"),
            Element::task("b"),
            Element::task("c"),
        ],
        vec![
            Dependency::new("a", "x", DependencyKind::Blocks),
            Dependency::new("b", "a", DependencyKind::ParentChild),
            Dependency::new("c", "b", DependencyKind::ParentChild),
        ],
    ));
    let config = EngineConfig {
        traversal: TraversalConfig {
            max_depth: 1,
            ..TraversalConfig::default()
        },
        ..EngineConfig::default()
    };
    let mut engine = BlockingEngine::new(Arc::clone(&store), config);
    engine.rebuild().await.unwrap();
    assert_eq!(engine.count(), 3);

    set_status(&store, &mut engine, "x", ElementStatus::Closed).await;

    // Only the direct dependent is re-evaluated; its children keep their
    // entries until the next rebuild.
    assert!(engine.is_blocked("a").is_none());
    assert_eq!(engine.is_blocked("b").unwrap().reason, "Parent a is blocked");
    assert_eq!(engine.is_blocked("c").unwrap().reason, "Parent b is blocked");

    engine.rebuild().await.unwrap();
    assert_eq!(engine.is_blocked("b").unwrap().reason, "Parent a is not completed");
}

#[tokio::test]
async fn test_element_created_after_edges_blocks_dependents() {
    let (store, mut engine) = setup(
        vec![Element::task("a"), Element::task("child")],
        vec![
            Dependency::new("a", "later", DependencyKind::Blocks),
            Dependency::new("child", "later", DependencyKind::ParentChild),
        ],
    );
    engine.rebuild().await.unwrap();
    assert_eq!(engine.count(), 0);

    store.upsert_element(&Element::task("later")).await.unwrap();
    engine.invalidate_dependents("later").await.unwrap();

    assert_eq!(engine.is_blocked("a").unwrap().blocked_by, "later");
    assert_eq!(
        engine.is_blocked("child").unwrap().reason,
        "Parent later is not completed"
    );
    assert_matches_rebuild(&engine, &store).await;
}

#[tokio::test]
async fn test_gate_rewritten_by_store_writer() {
    let (store, mut engine) = setup(
        vec![Element::task("deploy")],
        vec![Dependency::awaits(
            "deploy",
            "ci-9",
            Gate::external("buildkite", "9"),
        )],
    );
    engine.rebuild().await.unwrap();
    assert!(engine.is_blocked("deploy").is_some());

    let satisfied = Gate::External {
        external_system: "buildkite".to_string(),
        external_id: "9".to_string(),
        satisfied: true,
        satisfied_at: Some(Utc::now()),
        satisfied_by: Some("sync-job".to_string()),
    };
    store.update_gate("deploy", "ci-9", &satisfied).await.unwrap();
    engine.on_gate_updated("deploy", "ci-9").await.unwrap();

    assert!(engine.is_blocked("deploy").is_none());
    assert_matches_rebuild(&engine, &store).await;
}

#[tokio::test]
async fn test_reopened_parent_reblocks_children() {
    let mut parent = Element::task("parent");
    parent.status = ElementStatus::Closed;
    let (store, mut engine) = setup(
        vec![parent, Element::task("child"), Element::task("grandchild")],
        vec![
            Dependency::new("child", "parent", DependencyKind::ParentChild),
            Dependency::new("grandchild", "child", DependencyKind::ParentChild),
        ],
    );

    engine.rebuild().await.unwrap();
    assert!(engine.is_blocked("child").is_none());
    assert!(engine.is_blocked("grandchild").is_some());

    set_status(&store, &mut engine, "parent", ElementStatus::Open).await;
    assert!(engine.is_blocked("child").is_some());
    assert_eq!(
        engine.is_blocked("grandchild").unwrap().reason,
        "Parent child is blocked"
    );
    assert_matches_rebuild(&engine, &store).await;
}

#[tokio::test]
async fn test_informational_edges_do_not_touch_cache() {
    let (store, mut engine) = setup(vec![Element::task("a"), Element::task("b")], vec![]);

    add_dep(&store, &mut engine, Dependency::new("a", "b", DependencyKind::RelatesTo)).await;
    add_dep(&store, &mut engine, Dependency::new("a", "b", DependencyKind::References)).await;
    assert_eq!(engine.count(), 0);
}

#[tokio::test]
async fn test_get_blocked_by_reverse_lookup() {
    let (_store, mut engine) = setup(
        vec![
            Element::task("a"),
            Element::task("b"),
            Element::task("c"),
            Element::task("blocker"),
        ],
        vec![
            Dependency::new("a", "blocker", DependencyKind::Blocks),
            Dependency::new("b", "blocker", DependencyKind::Blocks),
            Dependency::new("c", "a", DependencyKind::Blocks),
        ],
    );

    engine.rebuild().await.unwrap();
    assert_eq!(
        engine.get_blocked_by("blocker"),
        vec!["a".to_string(), "b".to_string()]
    );
    assert_eq!(engine.get_blocked_by("a"), vec!["c".to_string()]);
    assert!(engine.get_blocked_by("c").is_empty());
}

#[tokio::test]
async fn test_manual_cache_writes() {
    let (_store, mut engine) = setup(vec![], vec![]);

    engine.add_blocked("x", "y", "Blocked by y").await.unwrap();
    engine.add_blocked("x", "z", "Blocked by z").await.unwrap();
    assert_eq!(engine.count(), 1);
    assert_eq!(engine.is_blocked("x").unwrap().blocked_by, "z");
    assert!(engine.get_blocked_by("y").is_empty());

    engine.remove_blocked("x").await.unwrap();
    engine.remove_blocked("x").await.unwrap();
    assert_eq!(engine.count(), 0);

    engine.add_blocked("x", "y", "Blocked by y").await.unwrap();
    engine.clear().await.unwrap();
    assert_eq!(engine.count(), 0);
}

#[tokio::test]
async fn test_cache_is_mirrored_and_warm_started() {
    let (store, mut engine) = setup(
        vec![Element::task("a"), Element::task("b")],
        vec![Dependency::new("a", "b", DependencyKind::Blocks)],
    );
    engine.rebuild().await.unwrap();

    let persisted = store.load_blocked().await.unwrap();
    assert_eq!(persisted.len(), 1);
    assert_eq!(persisted[0].element_id, "a");

    let reopened = BlockingEngine::open(Arc::clone(&store), EngineConfig::default())
        .await
        .unwrap();
    assert_eq!(reopened.get_all_blocked(), engine.get_all_blocked());

    set_status(&store, &mut engine, "b", ElementStatus::Closed).await;
    assert!(store.load_blocked().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_engine_over_turso_store() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db_path: PathBuf = temp_dir
        .path()
        .join(format!("test_engine_{}.db", uuid::Uuid::new_v4()));
    let db = Database::open(&db_path).await.expect("Failed to open database");
    db.init_schema().await.expect("Failed to init schema");
    let store = Arc::new(db);

    for id in ["parent", "child", "blocker"] {
        store.upsert_element(&Element::task(id)).await.unwrap();
    }
    store
        .upsert_dependency(&Dependency::new("parent", "blocker", DependencyKind::Blocks))
        .await
        .unwrap();
    store
        .upsert_dependency(&Dependency::new("child", "parent", DependencyKind::ParentChild))
        .await
        .unwrap();

    let mut engine = BlockingEngine::new(Arc::clone(&store), EngineConfig::default());
    let stats = engine.rebuild().await.unwrap();
    assert_eq!(stats.elements_blocked, 2);

    let reopened = BlockingEngine::open(Arc::clone(&store), EngineConfig::default())
        .await
        .unwrap();
    assert_eq!(reopened.get_all_blocked(), engine.get_all_blocked());

    let old = store
        .set_status("blocker", ElementStatus::Completed)
        .await
        .unwrap()
        .unwrap();
    engine
        .on_status_changed("blocker", old, ElementStatus::Completed)
        .await
        .unwrap();
    assert!(engine.is_blocked("parent").is_none());
    assert_eq!(
        engine.is_blocked("child").unwrap().reason,
        "Parent parent is not completed"
    );
    assert_eq!(store.load_blocked().await.unwrap().len(), 1);
}
