//! Model descriptors
//!
//! A [`Model`] is the type-level description of one collection: its field
//! table, whether it is versioned, soft-deletable and stamped, and how ids
//! are assigned. Models are built once and shared as `Arc<Model>`.
//!
//! ## Behaviors
//!
//! - `versioned()`: saves run the optimistic-concurrency protocol and keep
//!   a history collection. Implies `stamped()`.
//! - `soft_delete()`: adds a `deleted` boolean (default `false`); `delete`
//!   flips it instead of removing the document.
//! - `stamped()`: adds `created_at` / `updated_at` date fields.
//! - `compute_id(f)`: natural keys. The store refuses a second document with
//!   the same computed id instead of overwriting it.

use once_cell::sync::OnceCell;
use std::fmt;
use std::sync::Arc;
use verso_core::schema::{CREATED_AT_FIELD, DELETED_FIELD, UPDATED_AT_FIELD};
use verso_core::{derive_snapshot_schema, DocId, FieldDef, Schema, VersoResult};

use crate::entity::Entity;
use crate::thrash::{ModeCell, QueryMode, QueryModeScope};

/// Natural-key hook: derives a document id from field values
pub type ComputeId = Arc<dyn Fn(&Entity) -> Option<DocId> + Send + Sync>;

/// Type-level description of one collection
pub struct Model {
    schema: Schema,
    snapshot_schema: OnceCell<Schema>,
    versioned: bool,
    soft_delete: bool,
    stamped: bool,
    compute_id: Option<ComputeId>,
    mode: ModeCell,
}

impl Model {
    /// Start describing a model for `doc_type`
    pub fn builder(doc_type: impl Into<String>) -> ModelBuilder {
        ModelBuilder {
            doc_type: doc_type.into(),
            fields: Vec::new(),
            versioned: false,
            soft_delete: false,
            stamped: false,
            compute_id: None,
        }
    }

    /// Collection doc type
    pub fn doc_type(&self) -> &str {
        self.schema.doc_type()
    }

    /// Live field table
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Field table of the history collection, derived on first use
    pub fn snapshot_schema(&self) -> &Schema {
        self.snapshot_schema
            .get_or_init(|| derive_snapshot_schema(&self.schema))
    }

    /// Check if saves are versioned
    pub fn is_versioned(&self) -> bool {
        self.versioned
    }

    /// Check if deletes are soft by default
    pub fn is_soft_delete(&self) -> bool {
        self.soft_delete
    }

    /// Check if writes are stamped with `created_at` / `updated_at`
    pub fn is_stamped(&self) -> bool {
        self.stamped
    }

    /// Check if ids come from a natural-key hook
    pub fn has_computed_id(&self) -> bool {
        self.compute_id.is_some()
    }

    /// Run the natural-key hook, if any
    pub fn compute_id(&self, entity: &Entity) -> Option<DocId> {
        self.compute_id.as_ref().and_then(|f| f(entity))
    }

    /// Current query mode
    pub fn query_mode(&self) -> QueryMode {
        if self.soft_delete {
            self.mode.get()
        } else {
            // nothing is ever thrashed
            QueryMode::IncludeDeleted
        }
    }

    /// Switch the query mode until the returned guard is dropped
    pub fn scoped_mode(&self, mode: QueryMode) -> QueryModeScope<'_> {
        QueryModeScope::enter(&self.mode, mode, self.schema.doc_type())
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("doc_type", &self.doc_type())
            .field("versioned", &self.versioned)
            .field("soft_delete", &self.soft_delete)
            .field("stamped", &self.stamped)
            .field("compute_id", &self.compute_id.is_some())
            .finish()
    }
}

/// Builder for [`Model`]
pub struct ModelBuilder {
    doc_type: String,
    fields: Vec<FieldDef>,
    versioned: bool,
    soft_delete: bool,
    stamped: bool,
    compute_id: Option<ComputeId>,
}

impl ModelBuilder {
    /// Declare a field
    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    /// Keep a version history and enforce optimistic concurrency
    pub fn versioned(mut self) -> Self {
        self.versioned = true;
        self.stamped = true;
        self
    }

    /// Make `delete` a soft delete
    pub fn soft_delete(mut self) -> Self {
        self.soft_delete = true;
        self
    }

    /// Stamp `created_at` / `updated_at` on writes
    pub fn stamped(mut self) -> Self {
        self.stamped = true;
        self
    }

    /// Derive ids from field values
    pub fn compute_id<F>(mut self, f: F) -> Self
    where
        F: Fn(&Entity) -> Option<DocId> + Send + Sync + 'static,
    {
        self.compute_id = Some(Arc::new(f));
        self
    }

    /// Validate the field table and build the model
    ///
    /// # Errors
    ///
    /// `InvalidInput` for reserved or duplicate field names, including a
    /// declared field clashing with `deleted`, `created_at` or `updated_at`.
    pub fn build(self) -> VersoResult<Arc<Model>> {
        let mut schema = Schema::new(self.doc_type);
        for field in self.fields {
            schema.add_field(field)?;
        }
        if self.soft_delete {
            schema.add_field(FieldDef::boolean(DELETED_FIELD).with_default(false))?;
        }
        if self.stamped {
            schema.add_field(FieldDef::date(CREATED_AT_FIELD))?;
            schema.add_field(FieldDef::date(UPDATED_AT_FIELD))?;
        }

        Ok(Arc::new(Model {
            schema,
            snapshot_schema: OnceCell::new(),
            versioned: self.versioned,
            soft_delete: self.soft_delete,
            stamped: self.stamped,
            compute_id: self.compute_id,
            mode: ModeCell::default(),
        }))
    }
}
