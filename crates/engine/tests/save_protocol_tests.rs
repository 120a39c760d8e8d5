//! Save/commit protocol tests
//!
//! Drives the protocol through a recording, fault-injecting store:
//! - Round trips per save on every path
//! - Rollback on a lost race, including a rollback that itself fails
//! - Commits and promotions that fail for reasons other than a conflict
//! - History completeness

mod common;

use std::time::Duration;

use common::{item_repo, TestStore};
use verso_core::{DocId, StoreError, Value, Version, VersoError};
use verso_engine::{Entity, Repository, SnapshotStatus};
use verso_store::testing::{Fault, OpKind, StoreOp};
use verso_store::DocumentStore;

// ============================================================================
// Helper Functions
// ============================================================================

fn created(repo: &Repository, value: &str) -> Entity {
    repo.insert([("value", Value::from(value))]).unwrap()
}

fn history_index(repo: &Repository) -> String {
    repo.version_history().unwrap().index().to_string()
}

fn op(kind: OpKind, index: &str) -> StoreOp {
    StoreOp {
        kind,
        index: index.to_string(),
    }
}

fn proposals(repo: &Repository, id: &DocId) -> usize {
    repo.history_including_proposals(id)
        .unwrap()
        .iter()
        .filter(|s| s.status() == SnapshotStatus::Proposal)
        .count()
}

fn race(store: &TestStore, repo: &Repository) {
    store.inject(Fault::ConcurrentWrite {
        index: repo.index().to_string(),
    });
}

// ============================================================================
// Round trips
// ============================================================================

mod round_trips {
    use super::*;

    #[test]
    fn test_successful_save_makes_four_calls() {
        let (store, repo) = item_repo();
        let mut e = created(&repo, "a");
        store.clear_ops();

        e.set("value", "b").unwrap();
        repo.save(&mut e).unwrap();

        let live = repo.index().to_string();
        let history = history_index(&repo);
        assert_eq!(
            store.ops(),
            vec![
                op(OpKind::Get, &live),
                op(OpKind::Create, &history),
                op(OpKind::Update, &live),
                op(OpKind::Update, &history),
            ]
        );
    }

    #[test]
    fn test_race_lost_at_commit_makes_four_calls() {
        let (store, repo) = item_repo();
        let mut e = created(&repo, "a");
        store.clear_ops();
        race(&store, &repo);

        e.set("value", "b").unwrap();
        assert!(repo.save(&mut e).unwrap_err().is_conflict());

        let live = repo.index().to_string();
        let history = history_index(&repo);
        assert_eq!(
            store.ops(),
            vec![
                op(OpKind::Get, &live),
                op(OpKind::Create, &history),
                op(OpKind::Update, &live),
                op(OpKind::Delete, &history),
            ]
        );
    }

    #[test]
    fn test_stale_copy_fails_before_any_write() {
        let (store, repo) = item_repo();
        let mut first = created(&repo, "a");
        let mut second = first.clone();
        first.set("value", "b").unwrap();
        repo.save(&mut first).unwrap();
        store.clear_ops();

        second.set("value", "c").unwrap();
        let err = repo.save(&mut second).unwrap_err();
        match err {
            VersoError::Conflict { held, stored, .. } => {
                assert_eq!(held, Version::new(1));
                assert_eq!(stored, Version::new(2));
            }
            other => panic!("expected conflict, got {other:?}"),
        }
        assert_eq!(store.round_trips(), 1);
        assert_eq!(store.count_ops(OpKind::Create), 0);
    }
}

// ============================================================================
// Rollback
// ============================================================================

mod rollback {
    use super::*;

    #[test]
    fn test_lost_race_leaves_no_snapshot() {
        let (store, repo) = item_repo();
        let mut e = created(&repo, "a");
        let id = e.id().unwrap().clone();
        race(&store, &repo);

        e.set("value", "b").unwrap();
        let err = repo.save(&mut e).unwrap_err();
        assert!(err.is_conflict());

        // caller keeps its edit and its stale version
        assert_eq!(e.version(), Some(Version::new(1)));
        assert_eq!(e.get_str("value"), Some("b"));

        assert!(repo.history_including_proposals(&id).unwrap().is_empty());
        let live = repo.get(&id).unwrap();
        assert_eq!(live.version(), Some(Version::new(2)));
        assert_eq!(live.get_str("value"), Some("a"));
    }

    #[test]
    fn test_failed_rollback_does_not_mask_conflict() {
        let (store, repo) = item_repo();
        let mut e = created(&repo, "a");
        let id = e.id().unwrap().clone();
        race(&store, &repo);
        store.inject(Fault::FailDelete {
            index: history_index(&repo),
        });

        e.set("value", "b").unwrap();
        let err = repo.save(&mut e).unwrap_err();
        assert!(err.is_conflict(), "got {err:?}");

        // the orphan is detectable by its status and absent from history
        assert_eq!(proposals(&repo, &id), 1);
        assert!(repo.history(&id).unwrap().is_empty());
    }

    #[test]
    fn test_document_removed_before_commit() {
        let (store, repo) = item_repo();
        let mut e = created(&repo, "a");
        let id = e.id().unwrap().clone();
        store.inject(Fault::FailUpdate {
            index: repo.index().to_string(),
            error: StoreError::DocumentMissing {
                index: repo.index().to_string(),
                id: id.clone(),
            },
        });

        e.set("value", "b").unwrap();
        let err = repo.save(&mut e).unwrap_err();
        assert!(matches!(err, VersoError::MissingPreviousVersion { .. }));
        assert_eq!(proposals(&repo, &id), 0);
    }

    #[test]
    fn test_document_removed_before_validate() {
        let (_, repo) = item_repo();
        let mut e = created(&repo, "a");
        let id = e.id().unwrap().clone();
        let mut copy = e.clone();
        repo.delete(&mut e, true).unwrap();

        copy.set("value", "b").unwrap();
        let err = repo.save(&mut copy).unwrap_err();
        assert!(matches!(err, VersoError::MissingPreviousVersion { .. }));
        assert!(!err.is_conflict());
        assert_eq!(proposals(&repo, &id), 0);
    }
}

// ============================================================================
// Unknown outcomes
// ============================================================================

mod unknown_outcomes {
    use super::*;

    #[test]
    fn test_backend_failure_at_commit_keeps_proposal() {
        let (store, repo) = item_repo();
        let mut e = created(&repo, "a");
        let id = e.id().unwrap().clone();
        store.inject(Fault::FailUpdate {
            index: repo.index().to_string(),
            error: StoreError::Backend("disk full".to_string()),
        });

        e.set("value", "b").unwrap();
        let err = repo.save(&mut e).unwrap_err();
        assert!(matches!(err, VersoError::Store(StoreError::Backend(_))));
        assert_eq!(e.version(), Some(Version::new(1)));
        assert_eq!(proposals(&repo, &id), 1);

        // the commit never landed, so the sweep drops the proposal
        let report = repo.reconcile_with_grace(Duration::ZERO).unwrap();
        assert_eq!(report.discarded, 1);
        assert_eq!(proposals(&repo, &id), 0);

        // and the caller can retry from where it stood
        repo.save(&mut e).unwrap();
        assert_eq!(e.version(), Some(Version::new(2)));
    }

    #[test]
    fn test_failed_promote_reported_after_commit() {
        let (store, repo) = item_repo();
        let mut e = created(&repo, "a");
        let id = e.id().unwrap().clone();
        store.inject(Fault::FailUpdate {
            index: history_index(&repo),
            error: StoreError::Unavailable("timeout".to_string()),
        });

        e.set("value", "b").unwrap();
        let err = repo.save(&mut e).unwrap_err();
        assert!(err.is_store());

        // the live write went through and the caller sees it
        assert_eq!(e.version(), Some(Version::new(2)));
        assert_eq!(repo.get(&id).unwrap().get_str("value"), Some("b"));
        assert!(repo.history(&id).unwrap().is_empty());

        let report = repo.reconcile_with_grace(Duration::ZERO).unwrap();
        assert_eq!(report.promoted, 1);
        let history = repo.history(&id).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].get_str("value"), Some("a"));
        assert_eq!(history[0].updated_at(), e.updated_at());
    }

    #[test]
    fn test_lost_ack_promoted_by_sweep() {
        let (store, repo) = item_repo();
        let mut e = created(&repo, "a");
        let id = e.id().unwrap().clone();
        store.inject(Fault::LostAck {
            index: repo.index().to_string(),
        });

        e.set("value", "b").unwrap();
        let err = repo.save(&mut e).unwrap_err();
        assert!(matches!(err, VersoError::Store(ref s) if s.is_ambiguous()));

        // refetch instead of blindly retrying
        let current = repo.get(&id).unwrap();
        assert_eq!(current.version(), Some(Version::new(2)));

        let report = repo.reconcile_with_grace(Duration::ZERO).unwrap();
        assert_eq!(report.promoted, 1);
        assert_eq!(repo.history(&id).unwrap().len(), 1);
    }

    #[test]
    fn test_sweep_during_save_leaves_its_proposal() {
        let (store, repo) = item_repo();
        let mut e = created(&repo, "a");
        let id = e.id().unwrap().clone();
        let history = repo.version_history().unwrap();
        let before = store.inner().get(repo.index(), &id).unwrap().unwrap();

        // a crashed earlier attempt, then a save paused between commit and promote
        history.write_proposal(&before).unwrap();
        let mut in_flight = history.write_proposal(&before).unwrap();
        e.set("value", "b").unwrap();
        store
            .inner()
            .update(repo.index(), &id, e.to_body(), Some(Version::new(1)))
            .unwrap();

        let report = repo.reconcile_with_grace(Duration::from_secs(3600)).unwrap();
        assert_eq!(report.left_pending, 2);
        assert_eq!(proposals(&repo, &id), 2);

        // the paused save finishes normally
        history.promote(&mut in_flight, None).unwrap();
        let report = repo.reconcile_with_grace(Duration::ZERO).unwrap();
        assert_eq!(report.discarded, 1);
        assert_eq!(proposals(&repo, &id), 0);
        assert_eq!(repo.history(&id).unwrap().len(), 1);
    }
}

// ============================================================================
// History
// ============================================================================

mod history {
    use super::*;

    #[test]
    fn test_history_complete_after_saves() {
        let (_, repo) = item_repo();
        let mut e = created(&repo, "v0");
        let id = e.id().unwrap().clone();

        for i in 1..=5 {
            e.set("value", format!("v{i}")).unwrap();
            repo.save(&mut e).unwrap();
        }
        assert_eq!(e.version(), Some(Version::new(6)));

        let history = repo.history(&id).unwrap();
        let versions: Vec<u64> = history.iter().map(|s| s.document_version().as_u64()).collect();
        assert_eq!(versions, vec![1, 2, 3, 4, 5]);
        for (i, snapshot) in history.iter().enumerate() {
            assert!(snapshot.is_entry());
            assert_eq!(snapshot.document_id(), &id);
            assert_eq!(snapshot.get_str("value"), Some(format!("v{i}").as_str()));
        }
        assert_eq!(proposals(&repo, &id), 0);
    }

    #[test]
    fn test_entry_timestamps_follow_live_writes() {
        let (_, repo) = item_repo();
        let mut e = created(&repo, "a");
        let id = e.id().unwrap().clone();

        let mut stamps = Vec::new();
        for value in ["b", "c", "d"] {
            e.set("value", value).unwrap();
            repo.save(&mut e).unwrap();
            stamps.push(e.updated_at().unwrap());
        }

        let recorded: Vec<_> = repo
            .history(&id)
            .unwrap()
            .iter()
            .map(|s| s.updated_at().unwrap())
            .collect();
        assert_eq!(recorded, stamps);
        assert!(stamps.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_history_at_version() {
        let (_, repo) = item_repo();
        let mut e = created(&repo, "a");
        let id = e.id().unwrap().clone();
        e.set("value", "b").unwrap();
        repo.save(&mut e).unwrap();

        let v1 = repo.history_at(&id, Version::new(1)).unwrap().unwrap();
        assert_eq!(v1.get_str("value"), Some("a"));
        assert!(repo.history_at(&id, Version::new(2)).unwrap().is_none());
    }

    #[test]
    fn test_duplicate_entries_are_an_integrity_error() {
        let (store, repo) = item_repo();
        let mut e = created(&repo, "a");
        let id = e.id().unwrap().clone();
        let before = store.inner().get(repo.index(), &id).unwrap().unwrap();
        e.set("value", "b").unwrap();
        repo.save(&mut e).unwrap();

        // a second entry for v1, as a buggy writer would leave it
        let history = repo.version_history().unwrap();
        let mut extra = history.write_proposal(&before).unwrap();
        history.promote(&mut extra, None).unwrap();

        let err = repo.history_at(&id, Version::new(1)).unwrap_err();
        assert!(err.is_integrity());
    }
}
