//! Contract types shared by every layer
//!
//! - `doc_id`: Stable document identity
//! - `version`: Store-assigned version tokens
//! - `versioned`: Value + version + timestamp wrapper returned by reads
//! - `timestamp`: Microsecond timestamps and their RFC 3339 wire form
//!
//! ## Usage
//!
//! ```
//! use verso_core::contract::{DocId, Timestamp, Version, Versioned};
//! ```

pub mod doc_id;
pub mod timestamp;
pub mod version;
pub mod versioned;

// Re-exports
pub use doc_id::DocId;
pub use timestamp::Timestamp;
pub use version::Version;
pub use versioned::Versioned;
