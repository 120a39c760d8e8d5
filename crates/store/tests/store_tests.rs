//! Integration tests for the document store layer
//!
//! These tests exercise the store as the mapping layer uses it:
//! - Version preconditions under concurrent writers
//! - Near-real-time search visibility
//! - Fault injection and call recording

use std::sync::{Arc, Barrier};
use std::thread;

use proptest::prelude::*;
use verso_core::{DocId, Document, StoreError, Value, Version};
use verso_store::testing::{Fault, FaultyStore, OpKind};
use verso_store::{DocumentStore, InMemoryStore, Query, SearchRequest, SortField};

// ============================================================================
// Helper Functions
// ============================================================================

fn body(value: &str) -> Document {
    let mut doc = Document::new();
    doc.insert("value".to_string(), Value::from(value));
    doc
}

fn store() -> InMemoryStore {
    let store = InMemoryStore::new();
    store.create_index("item", &Value::Null).unwrap();
    store
}

// ============================================================================
// Concurrency
// ============================================================================

mod concurrency {
    use super::*;

    #[test]
    fn test_racing_updates_single_winner() {
        const WRITERS: usize = 8;

        let store = Arc::new(store());
        let id = store.create("item", None, body("start")).unwrap().id;
        let barrier = Arc::new(Barrier::new(WRITERS));

        let handles: Vec<_> = (0..WRITERS)
            .map(|i| {
                let store = Arc::clone(&store);
                let barrier = Arc::clone(&barrier);
                let id = id.clone();
                thread::spawn(move || {
                    barrier.wait();
                    store.update(
                        "item",
                        &id,
                        body(&format!("writer-{}", i)),
                        Some(Version::INITIAL),
                    )
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let winners = results.iter().filter(|r| r.is_ok()).count();
        let conflicts = results
            .iter()
            .filter(|r| matches!(r, Err(StoreError::Conflict { .. })))
            .count();

        assert_eq!(winners, 1);
        assert_eq!(conflicts, WRITERS - 1);
        assert_eq!(
            store.get("item", &id).unwrap().unwrap().version(),
            Version::new(2)
        );
    }

    #[test]
    fn test_racing_creates_with_same_id() {
        const WRITERS: usize = 6;

        let store = Arc::new(store());
        let barrier = Arc::new(Barrier::new(WRITERS));

        let handles: Vec<_> = (0..WRITERS)
            .map(|_| {
                let store = Arc::clone(&store);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    store.create("item", Some(&DocId::new("natural-key")), body("x"))
                })
            })
            .collect();

        let created = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|r| r.is_ok())
            .count();
        assert_eq!(created, 1);
    }

    #[test]
    fn test_writers_on_different_documents_never_conflict() {
        let store = Arc::new(store());
        let ids: Vec<_> = (0..4)
            .map(|_| store.create("item", None, body("a")).unwrap().id)
            .collect();

        let handles: Vec<_> = ids
            .iter()
            .cloned()
            .map(|id| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    let mut version = Version::INITIAL;
                    for n in 0..50 {
                        version = store
                            .update("item", &id, body(&n.to_string()), Some(version))
                            .unwrap()
                            .version;
                    }
                    version
                })
            })
            .collect();

        for h in handles {
            assert_eq!(h.join().unwrap(), Version::new(51));
        }
    }
}

// ============================================================================
// Visibility
// ============================================================================

mod visibility {
    use super::*;

    #[test]
    fn test_get_is_real_time_search_is_not() {
        let store = store();
        let id = store.create("item", None, body("a")).unwrap().id;

        assert!(store.get("item", &id).unwrap().is_some());
        assert_eq!(store.count("item", &Query::MatchAll).unwrap(), 0);

        store.refresh("item").unwrap();
        assert_eq!(store.count("item", &Query::MatchAll).unwrap(), 1);

        store.update("item", &id, body("b"), None).unwrap();
        let hits = store
            .search("item", &SearchRequest::new(Query::term("value", "b")))
            .unwrap();
        assert!(hits.is_empty(), "stale view until refresh");

        store.refresh("item").unwrap();
        let hits = store
            .search("item", &SearchRequest::new(Query::term("value", "b")))
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].version(), Version::new(2));
    }

    #[test]
    fn test_search_default_size() {
        let store = InMemoryStore::with_auto_refresh();
        store.create_index("item", &Value::Null).unwrap();
        for _ in 0..25 {
            store.create("item", None, body("a")).unwrap();
        }
        let hits = store
            .search("item", &SearchRequest::new(Query::MatchAll))
            .unwrap();
        assert_eq!(hits.len(), 10);

        let all = store
            .scan("item", &Query::MatchAll, &[SortField::desc("value")], 4)
            .unwrap();
        assert_eq!(all.len(), 25);
    }
}

// ============================================================================
// Fault injection
// ============================================================================

mod faults {
    use super::*;

    fn faulty() -> FaultyStore<InMemoryStore> {
        FaultyStore::new(store())
    }

    #[test]
    fn test_concurrent_write_breaks_precondition() {
        let store = faulty();
        let id = store.create("item", None, body("a")).unwrap().id;
        store.inject(Fault::ConcurrentWrite {
            index: "item".into(),
        });

        let err = store
            .update("item", &id, body("b"), Some(Version::INITIAL))
            .unwrap_err();
        assert!(err.is_conflict());

        let doc = store.get("item", &id).unwrap().unwrap();
        assert_eq!(doc.version(), Version::new(2));
        assert_eq!(doc.field("value"), Some(&Value::from("a")));
        assert_eq!(store.pending_faults(), 0);
    }

    #[test]
    fn test_fault_fires_once() {
        let store = faulty();
        let id = store.create("item", None, body("a")).unwrap().id;
        store.inject(Fault::FailUpdate {
            index: "item".into(),
            error: StoreError::Backend("boom".into()),
        });

        assert!(store.update("item", &id, body("b"), None).is_err());
        assert!(store.update("item", &id, body("b"), None).is_ok());
    }

    #[test]
    fn test_fault_scoped_to_index() {
        let store = faulty();
        store.create_index("other", &Value::Null).unwrap();
        let id = store.create("item", None, body("a")).unwrap().id;
        store.inject(Fault::FailDelete {
            index: "other".into(),
        });

        assert!(store.delete("item", &id).unwrap());
        assert_eq!(store.pending_faults(), 1);
    }

    #[test]
    fn test_lost_ack_applies_write() {
        let store = faulty();
        let id = store.create("item", None, body("a")).unwrap().id;
        store.inject(Fault::LostAck {
            index: "item".into(),
        });

        let err = store
            .update("item", &id, body("b"), Some(Version::INITIAL))
            .unwrap_err();
        assert!(err.is_ambiguous());

        let doc = store.get("item", &id).unwrap().unwrap();
        assert_eq!(doc.version(), Version::new(2));
        assert_eq!(doc.field("value"), Some(&Value::from("b")));
    }

    #[test]
    fn test_op_log() {
        let store = faulty();
        let id = store.create("item", None, body("a")).unwrap().id;
        store.get("item", &id).unwrap();
        store.refresh("item").unwrap();
        store.update("item", &id, body("b"), None).unwrap();

        let kinds: Vec<_> = store.ops().iter().map(|op| op.kind).collect();
        assert_eq!(
            kinds,
            vec![OpKind::Create, OpKind::Get, OpKind::Refresh, OpKind::Update]
        );
        assert_eq!(store.round_trips(), 3);

        store.clear_ops();
        assert!(store.ops().is_empty());
    }
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn prop_versions_advance_by_one(writes in 1usize..40) {
        let store = store();
        let id = store.create("item", None, body("0")).unwrap().id;
        let mut version = Version::INITIAL;

        for n in 0..writes {
            let ack = store.update("item", &id, body(&n.to_string()), Some(version)).unwrap();
            prop_assert_eq!(ack.version.as_u64(), version.as_u64() + 1);
            version = ack.version;
        }
        prop_assert_eq!(version.as_u64(), writes as u64 + 1);
    }

    #[test]
    fn prop_stale_precondition_always_conflicts(writes in 1u64..20, stale in 0u64..20) {
        let store = store();
        let id = store.create("item", None, body("0")).unwrap().id;
        for _ in 0..writes {
            store.update("item", &id, body("x"), None).unwrap();
        }
        let current = writes + 1;
        prop_assume!(stale != current);

        let result = store.update("item", &id, body("y"), Some(Version::new(stale)));
        prop_assert!(result.unwrap_err().is_conflict());
    }
}
