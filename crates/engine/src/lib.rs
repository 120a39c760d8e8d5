//! Document mapping engine for verso
//!
//! This crate layers model semantics over a `DocumentStore`:
//! - Models and entities: typed field tables, natural keys, stamping
//! - Repository: create, read, save and delete of one model
//! - Save/commit protocol: optimistic concurrency with a version history
//! - Soft delete: thrashed documents and scoped query modes
//! - Joins: lazy resolution and back-reference back-fill
//! - Reconciliation of proposals left behind by interrupted saves
//!
//! The engine holds no locks across store calls. Concurrency control is
//! the store's per-document version precondition.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod entity;
pub mod history;
pub mod join;
pub mod model;
pub mod protocol;
pub mod reconcile;
pub mod repository;
pub mod stamp;
pub mod thrash;

pub use config::{VersoConfig, CONFIG_FILE_NAME};
pub use entity::Entity;
pub use history::{Snapshot, SnapshotStatus, VersionHistory};
pub use model::{ComputeId, Model, ModelBuilder};
pub use protocol::SaveStage;
pub use reconcile::ReconcileReport;
pub use repository::Repository;
pub use thrash::{QueryMode, QueryModeScope};
