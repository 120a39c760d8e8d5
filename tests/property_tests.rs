//! Property tests over arbitrary save sequences

mod common;

use common::repo;
use proptest::prelude::*;
use verso::{Value, Version};

#[derive(Debug, Clone)]
enum Step {
    Edit(String),
    Count(i64),
    Thrash,
    Restore,
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        "[a-z]{1,8}".prop_map(Step::Edit),
        any::<i64>().prop_map(Step::Count),
        Just(Step::Thrash),
        Just(Step::Restore),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Every committed write advances the version by exactly one and leaves
    /// exactly one entry recording the state it replaced.
    #[test]
    fn prop_versions_and_history_track_writes(steps in prop::collection::vec(step(), 1..12)) {
        let repo = repo();
        let mut entity = repo.insert([("value", Value::from("start"))]).unwrap();
        let id = entity.id().unwrap().clone();
        let mut expected = vec![entity.to_body()];

        for step in steps {
            let before = entity.version().unwrap();
            let wrote = match step {
                Step::Edit(value) => {
                    entity.set("value", value).unwrap();
                    repo.save(&mut entity).unwrap();
                    true
                }
                Step::Count(n) => {
                    entity.set("count", n).unwrap();
                    repo.save(&mut entity).unwrap();
                    true
                }
                Step::Thrash => {
                    repo.delete(&mut entity, false).unwrap();
                    true
                }
                Step::Restore => {
                    let was_deleted = entity.is_deleted();
                    entity = repo.restore(&id).unwrap();
                    was_deleted
                }
            };

            let after = entity.version().unwrap();
            if wrote {
                prop_assert_eq!(after, before.next());
                expected.push(entity.to_body());
            } else {
                prop_assert_eq!(after, before);
            }
        }

        let history = repo.history_including_proposals(&id).unwrap();
        prop_assert_eq!(history.len(), expected.len() - 1);
        for (i, snapshot) in history.iter().enumerate() {
            prop_assert!(snapshot.is_entry());
            prop_assert_eq!(snapshot.document_version(), Version::new(i as u64 + 1));
            prop_assert_eq!(snapshot.get("value"), expected[i].get("value"));
            prop_assert_eq!(
                snapshot.get("deleted").cloned(),
                expected[i].get("deleted").cloned()
            );
        }
    }

    /// `updated_at` strictly increases across the writes of one document.
    #[test]
    fn prop_stamps_increase(n in 1usize..8) {
        let repo = repo();
        let mut entity = repo.insert([("count", Value::from(0i64))]).unwrap();
        let mut last = entity.updated_at().unwrap();

        for i in 0..n {
            entity.set("count", i as i64).unwrap();
            repo.save(&mut entity).unwrap();
            let stamp = entity.updated_at().unwrap();
            prop_assert!(stamp > last);
            last = stamp;
        }
        prop_assert!(entity.created_at().unwrap() < last);
    }
}
