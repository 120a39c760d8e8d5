//! Repository: CRUD for one model over a document store
//!
//! A repository binds a [`Model`] to its live collection and, for versioned
//! models, to its [`VersionHistory`]. All reads honor the model's soft-delete
//! query mode unless an explicit mode is passed.
//!
//! | Model          | `save`                          | `delete`                  |
//! |----------------|---------------------------------|---------------------------|
//! | plain          | unconditional update            | physical                  |
//! | versioned      | save/commit protocol            | physical                  |
//! | soft-delete    | as above                        | flag + save, or `force`   |

use std::sync::Arc;
use tracing::{debug, info};
use verso_core::{DocId, StoreError, Timestamp, Value, Version, VersoError, VersoResult};
use verso_store::{DocumentStore, Query, StoredDocument};

use crate::config::VersoConfig;
use crate::entity::Entity;
use crate::history::{Snapshot, VersionHistory};
use crate::model::Model;
use crate::protocol::SaveProtocol;
use crate::stamp::{stamp_created, stamp_updated};
use crate::thrash::QueryMode;

/// CRUD entry point for one model
#[derive(Clone)]
pub struct Repository {
    store: Arc<dyn DocumentStore>,
    model: Arc<Model>,
    config: VersoConfig,
    index: String,
    history: Option<VersionHistory>,
}

impl Repository {
    /// Repository for `model` in `store`
    ///
    /// # Errors
    ///
    /// `Config` if `config` does not validate.
    pub fn new(
        store: Arc<dyn DocumentStore>,
        model: Arc<Model>,
        config: VersoConfig,
    ) -> VersoResult<Self> {
        config.validate()?;
        let index = config.index_name(model.doc_type());
        let history = model
            .is_versioned()
            .then(|| VersionHistory::new(Arc::clone(&store), Arc::clone(&model), &config));
        Ok(Repository {
            store,
            model,
            config,
            index,
            history,
        })
    }

    /// Model served by this repository
    pub fn model(&self) -> &Arc<Model> {
        &self.model
    }

    /// Live collection name
    pub fn index(&self) -> &str {
        &self.index
    }

    /// Active configuration
    pub fn config(&self) -> &VersoConfig {
        &self.config
    }

    /// History collection, for versioned models
    pub fn version_history(&self) -> Option<&VersionHistory> {
        self.history.as_ref()
    }

    pub(crate) fn store(&self) -> &dyn DocumentStore {
        self.store.as_ref()
    }

    fn require_history(&self) -> VersoResult<&VersionHistory> {
        self.history.as_ref().ok_or_else(|| {
            VersoError::invalid_input(format!(
                "{} is not versioned and has no history",
                self.model.doc_type()
            ))
        })
    }

    // ========================================================================
    // Collections
    // ========================================================================

    /// Create the live collection and, if versioned, the history collection
    ///
    /// Returns the names of the collections actually created; existing ones
    /// are left alone.
    pub fn ensure_indices(&self) -> VersoResult<Vec<String>> {
        let mut created = Vec::new();
        let mut wanted = vec![(self.index.clone(), self.model.schema().mapping())];
        if let Some(history) = &self.history {
            wanted.push((history.index().to_string(), history.schema().mapping()));
        }

        for (index, mapping) in wanted {
            match self.store.create_index(&index, &mapping) {
                Ok(()) => {
                    info!(target: "verso::store", index = %index, "created collection");
                    created.push(index);
                }
                Err(StoreError::IndexExists(_)) => {
                    debug!(target: "verso::store", index = %index, "collection exists");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(created)
    }

    /// Remove the live and history collections; returns the names removed
    pub fn drop_indices(&self) -> VersoResult<Vec<String>> {
        let mut names = vec![self.index.clone()];
        if let Some(history) = &self.history {
            names.push(history.index().to_string());
        }
        let mut dropped = Vec::new();
        for index in names {
            if self.store.delete_index(&index)? {
                info!(target: "verso::store", index = %index, "dropped collection");
                dropped.push(index);
            }
        }
        Ok(dropped)
    }

    /// Make every acknowledged write searchable, history included
    pub fn refresh(&self) -> VersoResult<()> {
        self.store.refresh(&self.index)?;
        if let Some(history) = &self.history {
            history.refresh()?;
        }
        Ok(())
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Unsaved entity of this model
    pub fn new_entity(&self) -> Entity {
        Entity::new(&self.model)
    }

    /// Persist a new entity
    ///
    /// The id comes from the model's `compute_id` hook when it has one, and
    /// from the store otherwise. A computed id that is already taken fails
    /// with the store's `AlreadyExists`; nothing is overwritten.
    pub fn create(&self, entity: &mut Entity) -> VersoResult<()> {
        self.check_model(entity)?;
        if let Some(id) = entity.id() {
            return Err(VersoError::invalid_input(format!(
                "{} {} is already created",
                self.model.doc_type(),
                id
            )));
        }

        let mut pending = entity.clone();
        stamp_created(&mut pending, Timestamp::now())?;
        let computed = if self.model.has_computed_id() {
            let id = self.model.compute_id(&pending).ok_or_else(|| {
                VersoError::invalid_input(format!(
                    "cannot compute an id for {} from its fields",
                    self.model.doc_type()
                ))
            })?;
            self.check_id_unused_in_history(&id)?;
            Some(id)
        } else {
            None
        };

        let ack = self
            .store
            .create(&self.index, computed.as_ref(), pending.to_body())?;
        pending.set_id(ack.id);
        pending.set_version(Some(ack.version));
        info!(
            target: "verso::save",
            doc_type = self.model.doc_type(),
            id = ?pending.id(),
            version = %ack.version,
            "created"
        );
        entity.adopt(pending);
        Ok(())
    }

    /// A removed document's history stays keyed by its id, and a new document
    /// under that id would restart at version 1 beside it.
    fn check_id_unused_in_history(&self, id: &DocId) -> VersoResult<()> {
        let Some(history) = &self.history else {
            return Ok(());
        };
        if history.find_including_proposals(id)?.is_empty() {
            return Ok(());
        }
        Err(VersoError::integrity(format!(
            "{} {} was removed and its history is kept; the id cannot be reused",
            self.model.doc_type(),
            id
        )))
    }

    /// Build and persist an entity from field values
    pub fn insert<'a, I>(&self, fields: I) -> VersoResult<Entity>
    where
        I: IntoIterator<Item = (&'a str, Value)>,
    {
        let mut entity = self.new_entity();
        for (name, value) in fields {
            entity.set(name, value)?;
        }
        self.create(&mut entity)?;
        Ok(entity)
    }

    /// Persist changes to an existing entity
    ///
    /// Versioned models run the save/commit protocol; others update
    /// unconditionally. On failure the entity is left unchanged.
    ///
    /// # Errors
    ///
    /// - `Integrity` if the computed id no longer matches the stored id
    /// - `Conflict` / `MissingPreviousVersion` from the protocol
    /// - `NotFound` if a plain model's document is gone
    pub fn save(&self, entity: &mut Entity) -> VersoResult<()> {
        self.check_model(entity)?;
        let id = entity.require_id()?.clone();
        if self.model.has_computed_id() {
            let computed = self.model.compute_id(entity);
            if computed.as_ref() != Some(&id) {
                return Err(VersoError::integrity(format!(
                    "{} {} would change identity to {:?}; create a new document instead",
                    self.model.doc_type(),
                    id,
                    computed.map(DocId::into_string)
                )));
            }
        }

        match &self.history {
            Some(history) => SaveProtocol {
                store: self.store.as_ref(),
                model: &self.model,
                index: &self.index,
                history,
            }
            .run(entity, Timestamp::now()),
            None => self.save_unversioned(entity, id),
        }
    }

    fn save_unversioned(&self, entity: &mut Entity, id: DocId) -> VersoResult<()> {
        let mut pending = entity.clone();
        stamp_updated(&mut pending, Timestamp::now())?;
        let ack = self
            .store
            .update(&self.index, &id, pending.to_body(), None)
            .map_err(|e| match e {
                StoreError::DocumentMissing { .. } => {
                    VersoError::not_found(self.model.doc_type(), id.clone())
                }
                other => other.into(),
            })?;
        pending.set_version(Some(ack.version));
        debug!(
            target: "verso::save",
            doc_type = self.model.doc_type(),
            id = %id,
            version = %ack.version,
            "saved"
        );
        entity.adopt(pending);
        Ok(())
    }

    /// Delete an entity
    ///
    /// On a soft-delete model, without `force`, this sets `deleted` and saves
    /// (a versioned write like any other). Otherwise the document is removed;
    /// its history, if any, is kept.
    ///
    /// A forced delete is terminal for the id. The store restarts versions at
    /// 1 for a document created again under the same id, so the kept history
    /// would then hold two entries per version and `history_at` would report
    /// `Integrity`. `create` refuses such a computed id on versioned models
    /// once the history is searchable.
    pub fn delete(&self, entity: &mut Entity, force: bool) -> VersoResult<()> {
        self.check_model(entity)?;
        let id = entity.require_id()?.clone();

        if force || !self.model.is_soft_delete() {
            if !self.store.delete(&self.index, &id)? {
                return Err(VersoError::not_found(self.model.doc_type(), id));
            }
            entity.set_version(None);
            info!(target: "verso::save", doc_type = self.model.doc_type(), id = %id, "removed");
            return Ok(());
        }

        let mut pending = entity.clone();
        pending.set_deleted(true)?;
        self.save(&mut pending)?;
        entity.adopt(pending);
        info!(target: "verso::save", doc_type = self.model.doc_type(), id = %id, "thrashed");
        Ok(())
    }

    /// Bring a thrashed document back
    ///
    /// Already visible documents are returned as they are, without a write.
    pub fn restore(&self, id: &DocId) -> VersoResult<Entity> {
        // explicit mode: the model's current mode is shared with other callers
        let mut entity = self.get_in_mode(id, QueryMode::IncludeDeleted)?;
        if !entity.is_deleted() {
            return Ok(entity);
        }
        entity.set_deleted(false)?;
        self.save(&mut entity)?;
        info!(target: "verso::save", doc_type = self.model.doc_type(), id = %id, "restored");
        Ok(entity)
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Load one entity in the current query mode
    pub fn get(&self, id: &DocId) -> VersoResult<Entity> {
        self.get_in_mode(id, self.model.query_mode())
    }

    /// Load one entity in an explicit query mode
    ///
    /// # Errors
    ///
    /// `NotFound` if the document is absent or hidden by `mode`.
    pub fn get_in_mode(&self, id: &DocId, mode: QueryMode) -> VersoResult<Entity> {
        let stored = self
            .store
            .get(&self.index, id)?
            .ok_or_else(|| VersoError::not_found(self.model.doc_type(), id.clone()))?;
        let entity = self.to_entity(&stored)?;
        if !mode.admits(entity.is_deleted()) {
            debug!(
                target: "verso::thrash",
                doc_type = self.model.doc_type(),
                id = %id,
                ?mode,
                "hidden by query mode"
            );
            return Err(VersoError::not_found(self.model.doc_type(), id.clone()));
        }
        Ok(entity)
    }

    /// Load several entities by id, in the order given
    ///
    /// Fails on the first id that is absent or hidden by the query mode.
    pub fn get_many<'a>(&self, ids: impl IntoIterator<Item = &'a DocId>) -> VersoResult<Vec<Entity>> {
        ids.into_iter().map(|id| self.get(id)).collect()
    }

    /// Entities whose field equals `value`
    pub fn find_by(&self, field: &str, value: impl Into<Value>) -> VersoResult<Vec<Entity>> {
        let def = self.model.schema().require_field(field)?;
        let stored = def.serialize(&def.coerce(value.into())?);
        self.search(Query::term(def.stored_name(), stored))
    }

    /// The single entity whose field equals `value`
    ///
    /// # Errors
    ///
    /// `Integrity` if more than one entity matches.
    pub fn find_unique_by(
        &self,
        field: &str,
        value: impl Into<Value>,
    ) -> VersoResult<Option<Entity>> {
        let mut hits = self.find_by(field, value)?;
        if hits.len() > 1 {
            return Err(VersoError::integrity(format!(
                "{} {} documents match unique field '{}'",
                hits.len(),
                self.model.doc_type(),
                field
            )));
        }
        Ok(hits.pop())
    }

    /// Every entity visible in the current query mode
    pub fn all(&self) -> VersoResult<Vec<Entity>> {
        self.search(Query::MatchAll)
    }

    /// Entities matching a store query (on stored field names)
    pub fn search(&self, query: Query) -> VersoResult<Vec<Entity>> {
        self.search_in_mode(query, self.model.query_mode())
    }

    /// Entities matching a store query in an explicit query mode
    pub fn search_in_mode(&self, query: Query, mode: QueryMode) -> VersoResult<Vec<Entity>> {
        let query = mode.apply(query);
        self.store
            .scan(&self.index, &query, &[], self.config.page_size)?
            .iter()
            .map(|stored| self.to_entity(stored))
            .collect()
    }

    /// Number of entities visible in the current query mode
    pub fn count(&self) -> VersoResult<u64> {
        let query = self.model.query_mode().apply(Query::MatchAll);
        Ok(self.store.count(&self.index, &query)?)
    }

    // ========================================================================
    // History
    // ========================================================================

    /// Confirmed history of one document, oldest first
    pub fn history(&self, id: &DocId) -> VersoResult<Vec<Snapshot>> {
        self.require_history()?.find_by_document(id)
    }

    /// State of one document as of `version`, once superseded
    pub fn history_at(&self, id: &DocId, version: Version) -> VersoResult<Option<Snapshot>> {
        self.require_history()?.find_by_document_and_version(id, version)
    }

    /// History of one document including unconfirmed proposals
    pub fn history_including_proposals(&self, id: &DocId) -> VersoResult<Vec<Snapshot>> {
        self.require_history()?.find_including_proposals(id)
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    pub(crate) fn to_entity(&self, stored: &StoredDocument) -> VersoResult<Entity> {
        Entity::from_stored(&self.model, stored, self.config.load_versions)
    }

    fn check_model(&self, entity: &Entity) -> VersoResult<()> {
        if !Arc::ptr_eq(entity.model(), &self.model) {
            return Err(VersoError::invalid_input(format!(
                "{} entity passed to the {} repository",
                entity.model().doc_type(),
                self.model.doc_type()
            )));
        }
        Ok(())
    }
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("model", &self.model)
            .field("index", &self.index)
            .field("history", &self.history.as_ref().map(|h| h.index().to_string()))
            .finish()
    }
}
