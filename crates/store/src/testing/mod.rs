//! Testing utilities for the layers above a document store
//!
//! - **FaultyStore**: wraps any store and injects scripted one-shot faults
//!   (racing writers, failed writes, lost acknowledgements, outages)
//! - **Op log**: every call through the wrapper is recorded, so tests can
//!   assert on the exact round trips an operation made
//!
//! # Example
//!
//! ```
//! use verso_store::testing::{Fault, FaultyStore, OpKind};
//! use verso_store::{DocumentStore, InMemoryStore};
//! use verso_core::{Document, Value};
//!
//! let store = FaultyStore::new(InMemoryStore::new());
//! store.create_index("item", &Value::Null).unwrap();
//! store.inject(Fault::Unavailable);
//! assert!(store.create("item", None, Document::new()).is_err());
//! assert_eq!(store.count_ops(OpKind::Create), 1);
//! ```

mod faulty;

pub use faulty::{Fault, FaultyStore, OpKind, StoreOp};
