//! Join resolution and back-references
//!
//! Joins are stored as ids only. Resolving loads the referenced entities on
//! demand from the target model's repository; nothing resolved is ever held
//! by the entity or written back, so cyclic references cannot leak into a
//! stored body or a snapshot.
//!
//! A join declared `with_back_reference("field")` can mirror itself onto the
//! targets: [`Repository::backfill_reference`] points `field` of every target
//! back at the source and saves each target through its own repository, so a
//! versioned target gets a history entry like for any other save.

use tracing::debug;
use verso_core::{Cardinality, JoinDef, VersoError, VersoResult};

use crate::entity::Entity;
use crate::repository::Repository;

impl Repository {
    fn join_def(&self, join: &str, target: &Repository) -> VersoResult<JoinDef> {
        let def = self
            .model()
            .schema()
            .require_field(join)?
            .join()
            .cloned()
            .ok_or_else(|| VersoError::invalid_input(format!("'{}' is not a join", join)))?;
        if def.target != target.model().doc_type() {
            return Err(VersoError::invalid_input(format!(
                "join '{}' points at {}, not {}",
                join,
                def.target,
                target.model().doc_type()
            )));
        }
        Ok(def)
    }

    /// Load every entity a join points at, in stored order
    ///
    /// Uses `target`'s current query mode, so a thrashed target surfaces as
    /// `NotFound` under the default mode.
    pub fn resolve(
        &self,
        entity: &Entity,
        join: &str,
        target: &Repository,
    ) -> VersoResult<Vec<Entity>> {
        self.join_def(join, target)?;
        target.get_many(&entity.join_ids(join)?)
    }

    /// Load the entity a single join points at, `None` if unset
    pub fn resolve_one(
        &self,
        entity: &Entity,
        join: &str,
        target: &Repository,
    ) -> VersoResult<Option<Entity>> {
        let def = self.join_def(join, target)?;
        if def.cardinality != Cardinality::Single {
            return Err(VersoError::invalid_input(format!(
                "'{}' holds many references; use resolve",
                join
            )));
        }
        let ids = entity.join_ids(join)?;
        ids.first().map(|id| target.get(id)).transpose()
    }

    /// Point the back-reference of every target of `join` at `entity`
    ///
    /// Targets already pointing back are left alone. Returns the targets
    /// that were saved.
    ///
    /// # Errors
    ///
    /// `InvalidInput` if the join declares no back-reference; otherwise the
    /// first failing target save (earlier targets stay saved).
    pub fn backfill_reference(
        &self,
        entity: &Entity,
        join: &str,
        target: &Repository,
    ) -> VersoResult<Vec<Entity>> {
        let def = self.join_def(join, target)?;
        let back = def.back_reference.as_deref().ok_or_else(|| {
            VersoError::invalid_input(format!("join '{}' declares no back-reference", join))
        })?;
        let source = entity.require_id()?;

        let mut saved = Vec::new();
        for mut other in self.resolve(entity, join, target)? {
            if other.join_ids(back)?.contains(source) {
                continue;
            }
            other.set_reference(back, source)?;
            target.save(&mut other)?;
            debug!(
                target: "verso::save",
                doc_type = target.model().doc_type(),
                id = ?other.id(),
                back_reference = back,
                source = %source,
                "back-filled reference"
            );
            saved.push(other);
        }
        Ok(saved)
    }
}
