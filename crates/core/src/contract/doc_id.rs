//! Document identity
//!
//! A `DocId` is the stable identity of one document inside one collection.
//! It is either generated by the store when a document is created without
//! one, or computed by the model (natural keys). Identity never changes after
//! creation: re-keying a document means creating a new one.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use uuid::Uuid;

/// Identity of a stored document
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocId(String);

impl DocId {
    /// Wrap an existing identifier
    pub fn new(id: impl Into<String>) -> Self {
        DocId(id.into())
    }

    /// Generate a fresh random identifier (store-side auto id)
    pub fn generate() -> Self {
        DocId(Uuid::new_v4().simple().to_string())
    }

    /// Borrow as a string slice
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume and return the inner string
    pub fn into_string(self) -> String {
        self.0
    }
}

impl std::fmt::Display for DocId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocId {
    fn from(s: &str) -> Self {
        DocId(s.to_string())
    }
}

impl From<String> for DocId {
    fn from(s: String) -> Self {
        DocId(s)
    }
}

impl From<&DocId> for DocId {
    fn from(id: &DocId) -> Self {
        id.clone()
    }
}

impl Borrow<str> for DocId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for DocId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
