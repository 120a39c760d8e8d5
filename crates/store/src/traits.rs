//! Document store abstraction
//!
//! This module defines the `DocumentStore` trait: the boundary between the
//! mapping layer and whatever search/storage engine holds the documents.
//! Swapping the in-memory store for a networked client does not touch the
//! layers above.

use crate::query::{Query, SearchRequest, SortField, ID_SORT_FIELD};
use verso_core::{DocId, Document, StoreResult, Timestamp, Value, Version, Versioned};

/// A document as read from a store
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    /// Document id
    pub id: DocId,
    /// Body, version and write time
    pub doc: Versioned<Document>,
}

impl StoredDocument {
    /// Bundle a body with its store metadata
    pub fn new(id: DocId, body: Document, version: Version, timestamp: Timestamp) -> Self {
        StoredDocument {
            id,
            doc: Versioned::new(body, version, timestamp),
        }
    }

    /// Stored body
    pub fn body(&self) -> &Document {
        &self.doc.value
    }

    /// Current version
    pub fn version(&self) -> Version {
        self.doc.version
    }

    /// Time the current version was written
    pub fn written_at(&self) -> Timestamp {
        self.doc.written_at
    }

    /// Read one stored field
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.doc.value.get(name)
    }
}

/// Whether a write created or replaced a document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// New document
    Created,
    /// Existing document replaced
    Updated,
}

/// Store response to a successful write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteAck {
    /// Id of the written document (store-generated on auto-id create)
    pub id: DocId,
    /// Version the write produced
    pub version: Version,
    /// Store-side write time
    pub timestamp: Timestamp,
    /// Created or updated
    pub outcome: WriteOutcome,
}

/// Document store client
///
/// Thread safety: all methods must be safe to call concurrently from
/// multiple threads (requires Send + Sync).
///
/// ## Consistency
///
/// - `get` is real-time: it sees every acknowledged write.
/// - `search` and `count` are near-real-time: they see the state as of the
///   last `refresh` of the collection.
/// - Versions are per document, start at 1 on create and advance by one
///   per acknowledged write.
pub trait DocumentStore: Send + Sync {
    /// Create a collection with the given field mapping
    ///
    /// # Errors
    ///
    /// `IndexExists` if the collection is already there.
    fn create_index(&self, index: &str, mapping: &Value) -> StoreResult<()>;

    /// Remove a collection and all its documents
    ///
    /// Returns `false` if there was nothing to remove.
    fn delete_index(&self, index: &str) -> StoreResult<bool>;

    /// Check if a collection exists
    fn index_exists(&self, index: &str) -> StoreResult<bool>;

    /// Read the current state of one document
    fn get(&self, index: &str, id: &DocId) -> StoreResult<Option<StoredDocument>>;

    /// Create a new document at version 1
    ///
    /// With `id` set the store refuses to overwrite (`AlreadyExists`);
    /// without, it generates a fresh id.
    fn create(&self, index: &str, id: Option<&DocId>, body: Document) -> StoreResult<WriteAck>;

    /// Replace the body of an existing document
    ///
    /// With `expected` set, the write is applied only if the stored version
    /// equals it (`Conflict` otherwise).
    ///
    /// # Errors
    ///
    /// `DocumentMissing` if the document does not exist.
    fn update(
        &self,
        index: &str,
        id: &DocId,
        body: Document,
        expected: Option<Version>,
    ) -> StoreResult<WriteAck>;

    /// Physically remove a document
    ///
    /// Returns `false` if it did not exist.
    fn delete(&self, index: &str, id: &DocId) -> StoreResult<bool>;

    /// Run one search page
    fn search(&self, index: &str, request: &SearchRequest) -> StoreResult<Vec<StoredDocument>>;

    /// Count matching documents
    fn count(&self, index: &str, query: &Query) -> StoreResult<u64>;

    /// Make every acknowledged write visible to `search` and `count`
    fn refresh(&self, index: &str) -> StoreResult<()>;

    /// Fetch every match by paging with `search_after`
    ///
    /// `_id` is appended as a tiebreak so that pages never overlap.
    fn scan(
        &self,
        index: &str,
        query: &Query,
        sort: &[SortField],
        page_size: usize,
    ) -> StoreResult<Vec<StoredDocument>> {
        let mut sort = sort.to_vec();
        if !sort.iter().any(|s| s.field == ID_SORT_FIELD) {
            sort.push(SortField::asc(ID_SORT_FIELD));
        }
        let page_size = page_size.max(1);

        let mut hits = Vec::new();
        let mut after: Option<Vec<Value>> = None;
        loop {
            let mut request = SearchRequest::new(query.clone())
                .sort(sort.clone())
                .size(page_size);
            if let Some(key) = after.take() {
                request = request.search_after(key);
            }

            let page = self.search(index, &request)?;
            let full = page.len() == page_size;
            after = page.last().map(|last| request.sort_key(&last.id, last.body()));
            hits.extend(page);

            if !full {
                break;
            }
        }
        Ok(hits)
    }
}
