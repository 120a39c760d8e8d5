//! `created_at` / `updated_at` stamping
//!
//! Stamps are taken on the client when a write is prepared. A history entry
//! is stamped with the `updated_at` of the live write that superseded it, so
//! `updated_at` must strictly increase across the writes of one document even
//! if the wall clock steps backwards; [`next_stamp`] enforces that.

use verso_core::schema::{CREATED_AT_FIELD, UPDATED_AT_FIELD};
use verso_core::{Timestamp, Value, VersoResult};

use crate::entity::Entity;

/// Smallest timestamp at or after `now` that is strictly after `previous`
pub fn next_stamp(previous: Option<Timestamp>, now: Timestamp) -> Timestamp {
    match previous {
        Some(prev) if !prev.is_before(now) => prev.succ(),
        _ => now,
    }
}

/// Stamp a document about to be created. No-op on unstamped models.
pub fn stamp_created(entity: &mut Entity, now: Timestamp) -> VersoResult<()> {
    if !entity.model().is_stamped() {
        return Ok(());
    }
    entity.assign(CREATED_AT_FIELD, Value::Timestamp(now))?;
    entity.assign(UPDATED_AT_FIELD, Value::Timestamp(now))
}

/// Stamp a document about to be saved; returns the new `updated_at`.
/// No-op on unstamped models.
pub fn stamp_updated(entity: &mut Entity, now: Timestamp) -> VersoResult<Option<Timestamp>> {
    if !entity.model().is_stamped() {
        return Ok(None);
    }
    let stamp = next_stamp(entity.updated_at(), now);
    if entity.created_at().is_none() {
        entity.assign(CREATED_AT_FIELD, Value::Timestamp(stamp))?;
    }
    entity.assign(UPDATED_AT_FIELD, Value::Timestamp(stamp))?;
    Ok(Some(stamp))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Model;
    use verso_core::FieldDef;

    #[test]
    fn test_next_stamp() {
        let t = Timestamp::from_secs(100);
        assert_eq!(next_stamp(None, t), t);
        assert_eq!(next_stamp(Some(Timestamp::from_secs(99)), t), t);
        assert_eq!(
            next_stamp(Some(t), t),
            Timestamp::from_micros(t.as_micros() + 1)
        );
        assert_eq!(
            next_stamp(Some(Timestamp::from_secs(200)), t),
            Timestamp::from_micros(200_000_001)
        );
    }

    #[test]
    fn test_stamp_created_sets_both() {
        let model = Model::builder("item").stamped().build().unwrap();
        let mut e = Entity::new(&model);
        let t = Timestamp::from_secs(10);

        stamp_created(&mut e, t).unwrap();
        assert_eq!(e.created_at(), Some(t));
        assert_eq!(e.updated_at(), Some(t));
    }

    #[test]
    fn test_stamp_updated_keeps_created() {
        let model = Model::builder("item").stamped().build().unwrap();
        let mut e = Entity::new(&model);
        stamp_created(&mut e, Timestamp::from_secs(10)).unwrap();

        let stamp = stamp_updated(&mut e, Timestamp::from_secs(20)).unwrap();
        assert_eq!(stamp, Some(Timestamp::from_secs(20)));
        assert_eq!(e.created_at(), Some(Timestamp::from_secs(10)));
        assert_eq!(e.updated_at(), Some(Timestamp::from_secs(20)));
    }

    #[test]
    fn test_stamp_updated_survives_clock_step_back() {
        let model = Model::builder("item").stamped().build().unwrap();
        let mut e = Entity::new(&model);
        stamp_created(&mut e, Timestamp::from_secs(50)).unwrap();

        let stamp = stamp_updated(&mut e, Timestamp::from_secs(40)).unwrap().unwrap();
        assert!(stamp > Timestamp::from_secs(50));
    }

    #[test]
    fn test_unstamped_model_untouched() {
        let model = Model::builder("item")
            .field(FieldDef::keyword("value"))
            .build()
            .unwrap();
        let mut e = Entity::new(&model);
        stamp_created(&mut e, Timestamp::from_secs(1)).unwrap();
        assert_eq!(stamp_updated(&mut e, Timestamp::from_secs(2)).unwrap(), None);
        assert!(e.created_at().is_none());
        assert!(e.fields().get("updated_at").is_none());
    }
}
