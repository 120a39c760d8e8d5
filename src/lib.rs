//! Verso - versioned document mapping over a search/storage engine
//!
//! Verso maps typed models onto documents in a remote store and layers
//! optimistic-concurrency versioning, an append-only version history and
//! soft delete on top of plain create/read/update/delete.
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use verso::{FieldDef, InMemoryStore, Model, Repository, Value, VersoConfig};
//!
//! let model = Model::builder("item")
//!     .field(FieldDef::keyword("value"))
//!     .versioned()
//!     .soft_delete()
//!     .build()?;
//! let store = Arc::new(InMemoryStore::with_auto_refresh());
//! let repo = Repository::new(store, model, VersoConfig::default())?;
//! repo.ensure_indices()?;
//!
//! let mut item = repo.insert([("value", Value::from("a"))])?;
//! item.set("value", "b")?;
//! repo.save(&mut item)?;
//!
//! let v1 = repo.history_at(item.id().unwrap(), verso::Version::new(1))?.unwrap();
//! assert_eq!(v1.get_str("value"), Some("a"));
//! # Ok::<(), verso::VersoError>(())
//! ```
//!
//! # Architecture
//!
//! - `verso-core`: contract types, field model, schemas, errors
//! - `verso-store`: the `DocumentStore` boundary and an in-memory store
//! - `verso-engine`: models, repositories, the save/commit protocol

pub use verso_core::{
    derive_snapshot_schema, Cardinality, DocId, Document, FieldDef, FieldKind, JoinDef, Schema,
    StoreError, StoreResult, Timestamp, Value, Version, Versioned, VersoError, VersoResult,
};
pub use verso_engine::{
    Entity, Model, ModelBuilder, QueryMode, QueryModeScope, ReconcileReport, Repository,
    SaveStage, Snapshot, SnapshotStatus, VersionHistory, VersoConfig, CONFIG_FILE_NAME,
};
pub use verso_store::{
    DocumentStore, InMemoryStore, Query, SearchRequest, SortField, SortOrder, StoredDocument,
};

/// Fault injection for tests of code built on verso
pub mod testing {
    pub use verso_store::testing::*;
}
