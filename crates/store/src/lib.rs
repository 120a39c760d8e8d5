//! Document store layer for verso
//!
//! This crate implements the store-client boundary:
//! - DocumentStore: the trait every backing store implements
//! - Query / SearchRequest: filters, sorting and `search_after` paging
//! - InMemoryStore: DashMap-sharded store with near-real-time search
//! - testing: fault-injecting wrapper and call log for protocol tests

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod memory;
pub mod query;
pub mod testing;
pub mod traits;

pub use memory::InMemoryStore;
pub use query::{Query, SearchRequest, SortField, SortOrder, DEFAULT_SEARCH_SIZE, ID_SORT_FIELD};
pub use traits::{DocumentStore, StoredDocument, WriteAck, WriteOutcome};
