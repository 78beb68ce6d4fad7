//! Concurrency properties of the shared registries.
//!
//! Plain threads rather than a runtime: the registry and stats APIs are
//! synchronous and must hold up under raw parallel callers.

use std::sync::Arc;
use std::thread;

use fanout_search::cluster::registry::NodeRegistry;
use fanout_search::coordinator::StatsRegistry;
use fanout_search::error::CoordinatorError;

#[test]
fn concurrent_add_and_remove_serialize() {
    // Repeat to give the race a chance to land both ways.
    for _ in 0..50 {
        let registry = Arc::new(NodeRegistry::new());

        let adder = {
            let registry = Arc::clone(&registry);
            thread::spawn(move || registry.add("x", "loc-x", 1.0))
        };
        let remover = {
            let registry = Arc::clone(&registry);
            thread::spawn(move || registry.remove("x"))
        };

        let added = adder.join().unwrap();
        let removed = remover.join().unwrap();

        // The add always succeeds (the id is fresh); the remove either saw it
        // or did not. Final state must match some serialization of the two.
        assert!(added.is_ok());
        match removed {
            Ok(()) => {
                assert!(matches!(
                    registry.get("x"),
                    Err(CoordinatorError::NodeNotFound { .. })
                ));
                assert_eq!(registry.counts(), (0, 0));
            }
            Err(CoordinatorError::NodeNotFound { .. }) => {
                assert!(registry.get("x").is_ok());
                assert_eq!(registry.counts(), (1, 1));
            }
            Err(other) => panic!("unexpected remove error: {other:?}"),
        }
    }
}

#[test]
fn parallel_distinct_adds_all_land() {
    let registry = Arc::new(NodeRegistry::new());
    let handles: Vec<_> = (0..8)
        .map(|t| {
            let registry = Arc::clone(&registry);
            thread::spawn(move || {
                for i in 0..50 {
                    registry
                        .add(format!("n{t}-{i}"), format!("loc{t}-{i}"), 1.0)
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(registry.counts(), (400, 400));
}

#[test]
fn snapshots_never_observe_torn_nodes() {
    let registry = Arc::new(NodeRegistry::new());
    for i in 0..100 {
        registry.add(format!("n{i:03}"), format!("loc{i:03}"), 1.0).unwrap();
    }

    let churner = {
        let registry = Arc::clone(&registry);
        thread::spawn(move || {
            for i in 0..100 {
                registry.remove(&format!("n{i:03}")).unwrap();
                registry.add(format!("n{i:03}"), format!("loc{i:03}"), 1.0).unwrap();
            }
        })
    };

    for _ in 0..200 {
        for node in registry.snapshot_active() {
            // Every snapshotted handle is a complete copy.
            assert!(node.id.starts_with('n'));
            assert_eq!(node.locator, format!("loc{}", &node.id[1..]));
        }
    }
    churner.join().unwrap();
    assert_eq!(registry.counts(), (100, 100));
}

#[test]
fn stats_survive_contended_recording() {
    let stats = Arc::new(StatsRegistry::new());
    let handles: Vec<_> = (0..8)
        .map(|t| {
            let stats = Arc::clone(&stats);
            thread::spawn(move || {
                for _ in 0..1_000 {
                    stats.record(t % 2 == 0, 20);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let snapshot = stats.snapshot();
    assert_eq!(snapshot.total_searches, 8_000);
    assert_eq!(snapshot.successful_searches, 4_000);
    assert_eq!(snapshot.failed_searches, 4_000);
    // Every sample was 20ms, so the running mean is exact.
    assert!((snapshot.average_response_time_ms - 20.0).abs() < 1e-9);
}
