//! Core types for verso
//!
//! This crate defines the foundational types used throughout the system:
//! - DocId, Version, Versioned<T>, Timestamp: contract types
//! - Value / Document: field values and stored bodies
//! - Schema / FieldDef: the field-descriptor table and snapshot schema derivation
//! - StoreError / VersoError: error hierarchy

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod contract;
pub mod error;
pub mod schema;
pub mod value;

pub use contract::{DocId, Timestamp, Version, Versioned};
pub use error::{StoreError, StoreResult, VersoError, VersoResult};
pub use schema::{derive_snapshot_schema, Cardinality, FieldDef, FieldKind, JoinDef, Schema};
pub use value::{Document, Value};
