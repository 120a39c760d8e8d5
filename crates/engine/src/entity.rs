//! Entities: one in-memory document of a model
//!
//! All field access goes through [`Entity::set`] / [`Entity::get`], which
//! consult the model's field table. There is no other way to assign a field,
//! so coercion rules and reserved fields are enforced in one place.
//!
//! The version is never assigned by callers: it is set from the store's
//! response to the most recent read or write.

use std::collections::BTreeMap;
use std::sync::Arc;
use verso_core::schema::{CREATED_AT_FIELD, DELETED_FIELD, UPDATED_AT_FIELD};
use verso_core::{
    Cardinality, DocId, Document, Timestamp, Value, Version, VersoError, VersoResult,
};
use verso_store::StoredDocument;

use crate::model::Model;

/// One document of a model, as held by a caller
#[derive(Debug, Clone)]
pub struct Entity {
    model: Arc<Model>,
    id: Option<DocId>,
    fields: BTreeMap<String, Value>,
    version: Option<Version>,
}

impl Entity {
    /// Unsaved entity with every field at its default
    pub fn new(model: &Arc<Model>) -> Self {
        Entity {
            model: Arc::clone(model),
            id: None,
            fields: model.schema().defaults(),
            version: None,
        }
    }

    /// Rebuild an entity from a stored document
    ///
    /// The version is kept only when `load_version` is set.
    pub fn from_stored(
        model: &Arc<Model>,
        stored: &StoredDocument,
        load_version: bool,
    ) -> VersoResult<Self> {
        let fields = model.schema().deserialize_document(stored.body())?;
        Ok(Entity {
            model: Arc::clone(model),
            id: Some(stored.id.clone()),
            fields,
            version: load_version.then(|| stored.version()),
        })
    }

    /// Model this entity belongs to
    pub fn model(&self) -> &Arc<Model> {
        &self.model
    }

    /// Identity, `None` until the entity is created
    pub fn id(&self) -> Option<&DocId> {
        self.id.as_ref()
    }

    /// Identity, failing if the entity was never persisted
    pub fn require_id(&self) -> VersoResult<&DocId> {
        self.id.as_ref().ok_or_else(|| {
            VersoError::invalid_input(format!(
                "{} has not been created yet",
                self.model.doc_type()
            ))
        })
    }

    /// Store version of the last read or write, if loaded
    pub fn version(&self) -> Option<Version> {
        self.version
    }

    /// Assign a field
    ///
    /// # Errors
    ///
    /// `InvalidInput` if the field is not declared, is the soft-delete flag
    /// (use `delete` / `restore`), is a write stamp of a stamped model, or
    /// cannot hold the value.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> VersoResult<()> {
        if name == DELETED_FIELD && self.model.is_soft_delete() {
            return Err(VersoError::invalid_input(
                "the soft-delete flag changes only through delete and restore",
            ));
        }
        if (name == CREATED_AT_FIELD || name == UPDATED_AT_FIELD) && self.model.is_stamped() {
            return Err(VersoError::invalid_input(format!(
                "'{}' is stamped on write and cannot be assigned",
                name
            )));
        }
        self.assign(name, value.into())
    }

    /// Assign a field, builder style
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> VersoResult<Self> {
        self.set(name, value)?;
        Ok(self)
    }

    pub(crate) fn assign(&mut self, name: &str, value: Value) -> VersoResult<()> {
        let coerced = self.model.schema().require_field(name)?.coerce(value)?;
        self.fields.insert(name.to_string(), coerced);
        Ok(())
    }

    /// Read a field
    pub fn get(&self, name: &str) -> VersoResult<&Value> {
        self.model.schema().require_field(name)?;
        Ok(self.fields.get(name).unwrap_or(&Value::Null))
    }

    /// Read a string field, `None` if undeclared, unset or not a string
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }

    /// All field values, by declared name
    pub fn fields(&self) -> &BTreeMap<String, Value> {
        &self.fields
    }

    /// Point a join field at `target`
    ///
    /// Single joins are overwritten; multi joins gain the id once.
    pub fn set_reference(&mut self, join: &str, target: &DocId) -> VersoResult<()> {
        let def = self.model.schema().require_field(join)?;
        let cardinality = def
            .join()
            .map(|j| j.cardinality)
            .ok_or_else(|| VersoError::invalid_input(format!("'{}' is not a join", join)))?;

        match cardinality {
            Cardinality::Single => self.assign(join, Value::from(target.as_str())),
            Cardinality::Multi => {
                let mut ids = self.join_ids(join)?;
                if !ids.contains(target) {
                    ids.push(target.clone());
                }
                let ids = ids.into_iter().map(Value::from).collect::<Vec<_>>();
                self.assign(join, Value::Array(ids))
            }
        }
    }

    /// Ids a join field points at
    pub fn join_ids(&self, join: &str) -> VersoResult<Vec<DocId>> {
        let def = self.model.schema().require_field(join)?;
        if def.join().is_none() {
            return Err(VersoError::invalid_input(format!("'{}' is not a join", join)));
        }
        let ids = match self.fields.get(join) {
            Some(Value::String(id)) => vec![DocId::new(id.as_str())],
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(DocId::from)
                .collect(),
            _ => Vec::new(),
        };
        Ok(ids)
    }

    /// Soft-delete flag, `false` on models without soft delete
    pub fn is_deleted(&self) -> bool {
        self.fields
            .get(DELETED_FIELD)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Creation stamp
    pub fn created_at(&self) -> Option<Timestamp> {
        self.fields.get(CREATED_AT_FIELD).and_then(Value::as_timestamp)
    }

    /// Last-write stamp
    pub fn updated_at(&self) -> Option<Timestamp> {
        self.fields.get(UPDATED_AT_FIELD).and_then(Value::as_timestamp)
    }

    /// Stored body of this entity
    pub fn to_body(&self) -> Document {
        self.model.schema().serialize_document(&self.fields)
    }

    pub(crate) fn set_deleted(&mut self, deleted: bool) -> VersoResult<()> {
        self.assign(DELETED_FIELD, Value::Bool(deleted))
    }

    pub(crate) fn set_id(&mut self, id: DocId) {
        self.id = Some(id);
    }

    pub(crate) fn set_version(&mut self, version: Option<Version>) {
        self.version = version;
    }

    /// Replace this entity's state with `other`'s
    pub(crate) fn adopt(&mut self, other: Entity) {
        *self = other;
    }
}
