//! Error types for verso
//!
//! Two layers:
//! - `StoreError`: what a document store client reports
//! - `VersoError`: what mapping-layer callers see
//!
//! Store errors without a mapping-layer meaning (network, backend) pass
//! through untouched as `VersoError::Store`. We use `thiserror` for
//! automatic `Display` and `Error` trait implementations.

use crate::contract::{DocId, Version};
use thiserror::Error;

/// Result type alias for store client operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Result type alias for mapping-layer operations
pub type VersoResult<T> = std::result::Result<T, VersoError>;

/// Errors reported by a document store
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Version precondition failed
    #[error("version conflict on {index}/{id}: expected {expected}, found {actual}")]
    Conflict {
        /// Collection name
        index: String,
        /// Document id
        id: DocId,
        /// Version the writer supplied
        expected: Version,
        /// Version the store holds
        actual: Version,
    },

    /// Create with an explicit id that is already taken
    #[error("document {index}/{id} already exists")]
    AlreadyExists {
        /// Collection name
        index: String,
        /// Document id
        id: DocId,
    },

    /// Update of a document that does not exist
    #[error("document {index}/{id} is missing")]
    DocumentMissing {
        /// Collection name
        index: String,
        /// Document id
        id: DocId,
    },

    /// Operation on a collection that was never created
    #[error("index not found: {0}")]
    IndexNotFound(String),

    /// Collection creation clashed with an existing one
    #[error("index already exists: {0}")]
    IndexExists(String),

    /// Store could not be reached or timed out
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Any other backend failure
    #[error("backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Check if this is a version precondition failure
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }

    /// Check if the outcome of the failed call is unknown
    ///
    /// A write that timed out may or may not have been applied.
    pub fn is_ambiguous(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

/// Errors surfaced by the mapping layer
#[derive(Debug, Error)]
pub enum VersoError {
    /// Requested document is absent, or hidden by the active soft-delete mode
    #[error("{doc_type} {id} not found")]
    NotFound {
        /// Model doc type
        doc_type: String,
        /// Document id
        id: DocId,
    },

    /// Version precondition failed, either fail-fast or at the store
    #[error("conflict saving {doc_type} {id}: held {held}, stored {stored}")]
    Conflict {
        /// Model doc type
        doc_type: String,
        /// Document id
        id: DocId,
        /// Version the caller held
        held: Version,
        /// Version the store reported
        stored: Version,
    },

    /// Save attempted with nothing stored to compare against
    #[error("no stored previous version of {doc_type} {id}")]
    MissingPreviousVersion {
        /// Model doc type
        doc_type: String,
        /// Document id
        id: DocId,
    },

    /// Invariant violation: identity change, duplicate unique match,
    /// duplicate history entries
    #[error("integrity error: {0}")]
    Integrity(String),

    /// Caller supplied something the schema rejects
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Stored body could not be mapped back onto the schema
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Configuration could not be read or is invalid
    #[error("config error: {0}")]
    Config(String),

    /// Store or network failure, passed through
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl VersoError {
    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        VersoError::InvalidInput(msg.into())
    }

    /// Create an integrity error
    pub fn integrity(msg: impl Into<String>) -> Self {
        VersoError::Integrity(msg.into())
    }

    /// Create a serialization error
    pub fn serialization(msg: impl Into<String>) -> Self {
        VersoError::Serialization(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        VersoError::Config(msg.into())
    }

    /// Create a not-found error
    pub fn not_found(doc_type: impl Into<String>, id: impl Into<DocId>) -> Self {
        VersoError::NotFound {
            doc_type: doc_type.into(),
            id: id.into(),
        }
    }

    /// Check if this is a version conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self, VersoError::Conflict { .. })
    }

    /// Check if this is a not-found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, VersoError::NotFound { .. })
    }

    /// Check if this is an integrity violation
    pub fn is_integrity(&self) -> bool {
        matches!(self, VersoError::Integrity(_))
    }

    /// Check if this is a store or network failure
    pub fn is_store(&self) -> bool {
        matches!(self, VersoError::Store(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_conflict_display() {
        let err = StoreError::Conflict {
            index: "item".into(),
            id: DocId::new("a1"),
            expected: Version::new(2),
            actual: Version::new(3),
        };
        let msg = err.to_string();
        assert!(msg.contains("item/a1"));
        assert!(msg.contains("v2"));
        assert!(msg.contains("v3"));
        assert!(err.is_conflict());
        assert!(!err.is_ambiguous());
    }

    #[test]
    fn test_unavailable_is_ambiguous() {
        assert!(StoreError::Unavailable("timeout".into()).is_ambiguous());
    }

    #[test]
    fn test_store_error_passes_through() {
        let err: VersoError = StoreError::Backend("disk full".into()).into();
        assert!(err.is_store());
        assert_eq!(err.to_string(), "backend error: disk full");
    }

    #[test]
    fn test_verso_conflict_display() {
        let err = VersoError::Conflict {
            doc_type: "item".into(),
            id: DocId::new("a1"),
            held: Version::new(1),
            stored: Version::new(2),
        };
        assert!(err.is_conflict());
        assert!(!err.is_not_found());
        assert_eq!(err.to_string(), "conflict saving item a1: held v1, stored v2");
    }

    #[test]
    fn test_helpers() {
        assert!(matches!(
            VersoError::invalid_input("bad"),
            VersoError::InvalidInput(m) if m == "bad"
        ));
        assert!(VersoError::integrity("dup").is_integrity());
        assert!(VersoError::not_found("item", "x").is_not_found());
        assert!(matches!(VersoError::config("c"), VersoError::Config(_)));
        assert!(matches!(
            VersoError::serialization("s"),
            VersoError::Serialization(_)
        ));
    }

    #[test]
    fn test_missing_previous_is_not_conflict() {
        let err = VersoError::MissingPreviousVersion {
            doc_type: "item".into(),
            id: DocId::new("gone"),
        };
        assert!(!err.is_conflict());
        assert!(err.to_string().contains("no stored previous version"));
    }
}
