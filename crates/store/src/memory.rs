//! In-memory document store
//!
//! Sharded by collection: a DashMap from index name to an `IndexShard`,
//! and within a shard a DashMap from id to the current document. Writers
//! only lock the shard slot of the document they touch; different
//! collections never contend.
//!
//! # Visibility
//!
//! Like a search engine with a refresh interval, each shard keeps two views:
//!
//! - `live`: every acknowledged write, read by `get` and all writes
//! - `searchable`: the view as of the last `refresh`, read by `search`/`count`
//!
//! With `auto_refresh` enabled every write is published to the searchable
//! view immediately.
//!
//! # Version Handling
//!
//! Versions are per document, assigned on write under the document's shard
//! lock: create yields 1, every update yields the previous version + 1.
//! The version precondition is checked under the same lock as the write,
//! so two racing updates with the same expected version can never both
//! succeed.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use tracing::{debug, trace};
use verso_core::{DocId, Document, StoreError, StoreResult, Timestamp, Value, Version};

use crate::query::{Query, SearchRequest};
use crate::traits::{DocumentStore, StoredDocument, WriteAck, WriteOutcome};

/// One collection
#[derive(Debug)]
struct IndexShard {
    mapping: Value,
    live: DashMap<DocId, StoredDocument>,
    searchable: RwLock<FxHashMap<DocId, StoredDocument>>,
}

impl IndexShard {
    fn new(mapping: Value) -> Self {
        Self {
            mapping,
            live: DashMap::new(),
            searchable: RwLock::new(FxHashMap::default()),
        }
    }

    fn refresh(&self) {
        let snapshot: FxHashMap<DocId, StoredDocument> = self
            .live
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        *self.searchable.write() = snapshot;
    }

    fn publish(&self, doc: &StoredDocument) {
        self.searchable.write().insert(doc.id.clone(), doc.clone());
    }

    fn unpublish(&self, id: &DocId) {
        self.searchable.write().remove(id);
    }
}

/// Sharded in-memory `DocumentStore`
///
/// # Example
///
/// ```
/// use verso_store::{DocumentStore, InMemoryStore};
/// use verso_core::{Document, Value};
///
/// let store = InMemoryStore::new();
/// store.create_index("item", &Value::Object(Default::default())).unwrap();
/// let ack = store.create("item", None, Document::new()).unwrap();
/// assert_eq!(ack.version.as_u64(), 1);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryStore {
    indices: DashMap<String, Arc<IndexShard>>,
    auto_refresh: bool,
}

impl InMemoryStore {
    /// Create an empty store with manual refresh
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store that publishes every write to search immediately
    pub fn with_auto_refresh() -> Self {
        Self {
            indices: DashMap::new(),
            auto_refresh: true,
        }
    }

    /// Check if writes are searchable without an explicit refresh
    pub fn auto_refresh(&self) -> bool {
        self.auto_refresh
    }

    /// Number of collections
    pub fn index_count(&self) -> usize {
        self.indices.len()
    }

    /// Mapping a collection was created with
    pub fn mapping(&self, index: &str) -> Option<Value> {
        self.indices.get(index).map(|shard| shard.mapping.clone())
    }

    /// Number of documents in a collection, ignoring refresh state
    pub fn live_count(&self, index: &str) -> usize {
        self.indices
            .get(index)
            .map(|shard| shard.live.len())
            .unwrap_or(0)
    }

    fn shard(&self, index: &str) -> StoreResult<Arc<IndexShard>> {
        self.indices
            .get(index)
            .map(|shard| Arc::clone(shard.value()))
            .ok_or_else(|| StoreError::IndexNotFound(index.to_string()))
    }

    fn after_write(&self, shard: &IndexShard, doc: &StoredDocument) {
        if self.auto_refresh {
            shard.publish(doc);
        }
    }
}

impl DocumentStore for InMemoryStore {
    fn create_index(&self, index: &str, mapping: &Value) -> StoreResult<()> {
        match self.indices.entry(index.to_string()) {
            Entry::Occupied(_) => Err(StoreError::IndexExists(index.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(IndexShard::new(mapping.clone())));
                debug!(target: "verso::store", index, "created index");
                Ok(())
            }
        }
    }

    fn delete_index(&self, index: &str) -> StoreResult<bool> {
        let removed = self.indices.remove(index).is_some();
        if removed {
            debug!(target: "verso::store", index, "deleted index");
        }
        Ok(removed)
    }

    fn index_exists(&self, index: &str) -> StoreResult<bool> {
        Ok(self.indices.contains_key(index))
    }

    fn get(&self, index: &str, id: &DocId) -> StoreResult<Option<StoredDocument>> {
        let shard = self.shard(index)?;
        let doc = shard.live.get(id).map(|entry| entry.value().clone());
        Ok(doc)
    }

    fn create(&self, index: &str, id: Option<&DocId>, body: Document) -> StoreResult<WriteAck> {
        let shard = self.shard(index)?;
        let id = id.cloned().unwrap_or_else(DocId::generate);
        let timestamp = Timestamp::now();

        match shard.live.entry(id.clone()) {
            Entry::Occupied(_) => {
                return Err(StoreError::AlreadyExists {
                    index: index.to_string(),
                    id,
                })
            }
            Entry::Vacant(slot) => {
                let doc = StoredDocument::new(id.clone(), body, Version::INITIAL, timestamp);
                self.after_write(&shard, &doc);
                slot.insert(doc);
            }
        };

        trace!(target: "verso::store", index, id = %id, "created document");
        Ok(WriteAck {
            id,
            version: Version::INITIAL,
            timestamp,
            outcome: WriteOutcome::Created,
        })
    }

    fn update(
        &self,
        index: &str,
        id: &DocId,
        body: Document,
        expected: Option<Version>,
    ) -> StoreResult<WriteAck> {
        let shard = self.shard(index)?;

        let doc = {
            let mut current = shard
                .live
                .get_mut(id)
                .ok_or_else(|| StoreError::DocumentMissing {
                    index: index.to_string(),
                    id: id.clone(),
                })?;

            let actual = current.version();
            if let Some(expected) = expected {
                if expected != actual {
                    return Err(StoreError::Conflict {
                        index: index.to_string(),
                        id: id.clone(),
                        expected,
                        actual,
                    });
                }
            }

            *current = StoredDocument::new(id.clone(), body, actual.next(), Timestamp::now());
            // publish under the document lock so racing writers land in order
            self.after_write(&shard, &current);
            current.clone()
        };

        trace!(target: "verso::store", index, id = %id, version = %doc.version(), "updated document");
        Ok(WriteAck {
            id: id.clone(),
            version: doc.version(),
            timestamp: doc.written_at(),
            outcome: WriteOutcome::Updated,
        })
    }

    fn delete(&self, index: &str, id: &DocId) -> StoreResult<bool> {
        let shard = self.shard(index)?;
        let removed = shard.live.remove(id).is_some();
        if removed && self.auto_refresh {
            shard.unpublish(id);
        }
        Ok(removed)
    }

    fn search(&self, index: &str, request: &SearchRequest) -> StoreResult<Vec<StoredDocument>> {
        let shard = self.shard(index)?;
        let searchable = shard.searchable.read();

        let mut hits: Vec<(Vec<Value>, &StoredDocument)> = searchable
            .values()
            .filter(|doc| request.query.matches(&doc.id, doc.body()))
            .map(|doc| (request.sort_key(&doc.id, doc.body()), doc))
            .collect();

        if let Some(after) = &request.search_after {
            hits.retain(|(key, _)| request.compare_keys(key, after).is_gt());
        }

        hits.sort_by(|(a, x), (b, y)| {
            request
                .compare_keys(a, b)
                .then_with(|| x.id.cmp(&y.id))
        });

        Ok(hits
            .into_iter()
            .take(request.effective_size())
            .map(|(_, doc)| doc.clone())
            .collect())
    }

    fn count(&self, index: &str, query: &Query) -> StoreResult<u64> {
        let shard = self.shard(index)?;
        let searchable = shard.searchable.read();
        Ok(searchable
            .values()
            .filter(|doc| query.matches(&doc.id, doc.body()))
            .count() as u64)
    }

    fn refresh(&self, index: &str) -> StoreResult<()> {
        self.shard(index)?.refresh();
        Ok(())
    }
}
