//! Version History Store
//!
//! An append-only collection of snapshots, one collection per versioned
//! model (`<doc_type>_version`). Each snapshot is a copy of a live
//! document's stored state tagged with:
//!
//! - `_document_id`: the live document it copies
//! - `_document_version`: the live version it copies (the one superseded)
//! - `_status`: `proposal` while the superseding write is in flight,
//!   `entry` once that write is confirmed
//!
//! ## Lifecycle
//!
//! ```text
//! write_proposal ──► proposal ──promote──► entry
//!                        │
//!                        └──discard──► (removed)
//! ```
//!
//! Entries are never modified or removed by this module. History queries
//! only return entries; proposals are visible through the diagnostic
//! `find_including_proposals` and the reconciliation sweep.
//!
//! Queries are search-backed and see the collection as of its last refresh.

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};
use verso_core::schema::{
    DOCUMENT_ID_FIELD, DOCUMENT_VERSION_FIELD, STATUS_FIELD, UPDATED_AT_FIELD,
};
use verso_core::{
    DocId, Document, Schema, StoreError, Timestamp, Value, Version, VersoError, VersoResult,
};
use verso_store::{DocumentStore, Query, SortField, StoredDocument};

use crate::config::VersoConfig;
use crate::model::Model;

/// Lifecycle status of a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SnapshotStatus {
    /// Written ahead of a live write that is not confirmed yet
    Proposal,
    /// Confirmed history record
    Entry,
}

impl SnapshotStatus {
    /// Stored form
    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotStatus::Proposal => "proposal",
            SnapshotStatus::Entry => "entry",
        }
    }

    /// Parse the stored form
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "proposal" => Some(SnapshotStatus::Proposal),
            "entry" => Some(SnapshotStatus::Entry),
            _ => None,
        }
    }
}

impl std::fmt::Display for SnapshotStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One history record
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    id: DocId,
    document_id: DocId,
    document_version: Version,
    status: SnapshotStatus,
    fields: BTreeMap<String, Value>,
    store_version: Version,
    written_at: Timestamp,
}

impl Snapshot {
    /// Id of the snapshot record itself
    pub fn id(&self) -> &DocId {
        &self.id
    }

    /// Id of the live document this snapshot copies
    pub fn document_id(&self) -> &DocId {
        &self.document_id
    }

    /// Live version this snapshot copies
    pub fn document_version(&self) -> Version {
        self.document_version
    }

    /// Lifecycle status
    pub fn status(&self) -> SnapshotStatus {
        self.status
    }

    /// Check if this is a confirmed entry
    pub fn is_entry(&self) -> bool {
        self.status == SnapshotStatus::Entry
    }

    /// Mirrored field values, by declared name
    pub fn fields(&self) -> &BTreeMap<String, Value> {
        &self.fields
    }

    /// Read a mirrored field
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Read a mirrored string field
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    /// For entries: when the superseding write was committed
    pub fn updated_at(&self) -> Option<Timestamp> {
        self.get(UPDATED_AT_FIELD).and_then(Value::as_timestamp)
    }

    /// Store version of the snapshot record (not of the live document)
    pub fn store_version(&self) -> Version {
        self.store_version
    }

    /// When the snapshot record was last written
    pub fn written_at(&self) -> Timestamp {
        self.written_at
    }
}

/// History collection of one versioned model
#[derive(Clone)]
pub struct VersionHistory {
    store: Arc<dyn DocumentStore>,
    model: Arc<Model>,
    index: String,
    page_size: usize,
}

impl VersionHistory {
    /// History of `model` in `store`, named per `config`
    pub fn new(store: Arc<dyn DocumentStore>, model: Arc<Model>, config: &VersoConfig) -> Self {
        let index = config.history_index_name(model.doc_type());
        VersionHistory {
            store,
            model,
            index,
            page_size: config.page_size,
        }
    }

    /// Collection name
    pub fn index(&self) -> &str {
        &self.index
    }

    /// Field table of the collection
    pub fn schema(&self) -> &Schema {
        self.model.snapshot_schema()
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Record `previous` (the live document as last committed) as a proposal
    ///
    /// Always a new record: no precondition, store-generated id.
    pub fn write_proposal(&self, previous: &StoredDocument) -> VersoResult<Snapshot> {
        let fields = self.model.schema().deserialize_document(previous.body())?;
        let mut snapshot = Snapshot {
            id: DocId::new(""),
            document_id: previous.id.clone(),
            document_version: previous.version(),
            status: SnapshotStatus::Proposal,
            fields,
            store_version: Version::INITIAL,
            written_at: Timestamp::EPOCH,
        };

        let ack = self
            .store
            .create(&self.index, None, self.to_body(&snapshot))?;
        snapshot.id = ack.id;
        snapshot.store_version = ack.version;
        snapshot.written_at = ack.timestamp;

        debug!(
            target: "verso::history",
            index = %self.index,
            snapshot = %snapshot.id,
            document = %snapshot.document_id,
            version = %snapshot.document_version,
            "wrote proposal"
        );
        Ok(snapshot)
    }

    /// Confirm a proposal, stamping it with the commit time of the live write
    ///
    /// Idempotent: promoting an entry does nothing, and a concurrent promote
    /// that got there first is adopted rather than reported.
    pub fn promote(&self, snapshot: &mut Snapshot, committed_at: Option<Timestamp>) -> VersoResult<()> {
        if snapshot.is_entry() {
            return Ok(());
        }

        let mut promoted = snapshot.clone();
        promoted.status = SnapshotStatus::Entry;
        if let Some(ts) = committed_at {
            if self.schema().has_field(UPDATED_AT_FIELD) {
                promoted
                    .fields
                    .insert(UPDATED_AT_FIELD.to_string(), Value::Timestamp(ts));
            }
        }

        match self.store.update(
            &self.index,
            &promoted.id,
            self.to_body(&promoted),
            Some(snapshot.store_version),
        ) {
            Ok(ack) => {
                promoted.store_version = ack.version;
                promoted.written_at = ack.timestamp;
                *snapshot = promoted;
                debug!(
                    target: "verso::history",
                    index = %self.index,
                    snapshot = %snapshot.id,
                    document = %snapshot.document_id,
                    version = %snapshot.document_version,
                    "promoted proposal"
                );
                Ok(())
            }
            Err(err @ StoreError::Conflict { .. }) => {
                // someone else wrote the record; fine if they promoted it
                match self.store.get(&self.index, &snapshot.id)? {
                    Some(stored) => {
                        let current = self.from_stored(&stored)?;
                        if current.is_entry() {
                            debug!(
                                target: "verso::history",
                                snapshot = %current.id,
                                "proposal already promoted"
                            );
                            *snapshot = current;
                            Ok(())
                        } else {
                            Err(err.into())
                        }
                    }
                    None => Err(err.into()),
                }
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Remove a proposal. Entries are refused.
    pub fn discard(&self, snapshot: &Snapshot) -> VersoResult<()> {
        if snapshot.is_entry() {
            return Err(VersoError::integrity(format!(
                "refusing to discard history entry {} of {} {}",
                snapshot.id, snapshot.document_id, snapshot.document_version
            )));
        }
        let removed = self.store.delete(&self.index, &snapshot.id)?;
        if !removed {
            warn!(
                target: "verso::history",
                snapshot = %snapshot.id,
                "proposal already gone"
            );
        }
        debug!(
            target: "verso::history",
            index = %self.index,
            snapshot = %snapshot.id,
            document = %snapshot.document_id,
            version = %snapshot.document_version,
            "discarded proposal"
        );
        Ok(())
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Entries of one document, oldest version first
    pub fn find_by_document(&self, document_id: &DocId) -> VersoResult<Vec<Snapshot>> {
        let query = Self::document_query(document_id).and(Self::status_query(SnapshotStatus::Entry));
        self.scan(query)
    }

    /// The entry recording `version` of one document
    ///
    /// # Errors
    ///
    /// `Integrity` if more than one entry records the same version.
    pub fn find_by_document_and_version(
        &self,
        document_id: &DocId,
        version: Version,
    ) -> VersoResult<Option<Snapshot>> {
        let query = Self::document_query(document_id)
            .and(Self::version_query(version))
            .and(Self::status_query(SnapshotStatus::Entry));
        let mut hits = self.scan(query)?;
        if hits.len() > 1 {
            return Err(VersoError::integrity(format!(
                "{} history entries for {} {} {}",
                hits.len(),
                self.model.doc_type(),
                document_id,
                version
            )));
        }
        Ok(hits.pop())
    }

    /// Every snapshot of one document, proposals included
    pub fn find_including_proposals(&self, document_id: &DocId) -> VersoResult<Vec<Snapshot>> {
        self.scan(Self::document_query(document_id))
    }

    /// Every proposal in the collection
    pub fn find_proposals(&self) -> VersoResult<Vec<Snapshot>> {
        self.scan(Self::status_query(SnapshotStatus::Proposal))
    }

    /// Make recent snapshot writes visible to queries
    pub fn refresh(&self) -> VersoResult<()> {
        self.store.refresh(&self.index)?;
        Ok(())
    }

    fn document_query(document_id: &DocId) -> Query {
        Query::term(DOCUMENT_ID_FIELD, document_id.as_str())
    }

    fn version_query(version: Version) -> Query {
        Query::term(DOCUMENT_VERSION_FIELD, version_value(version))
    }

    fn status_query(status: SnapshotStatus) -> Query {
        Query::term(STATUS_FIELD, status.as_str())
    }

    fn scan(&self, query: Query) -> VersoResult<Vec<Snapshot>> {
        let sort = [
            SortField::asc(DOCUMENT_ID_FIELD),
            SortField::asc(DOCUMENT_VERSION_FIELD),
        ];
        self.store
            .scan(&self.index, &query, &sort, self.page_size)?
            .iter()
            .map(|stored| self.from_stored(stored))
            .collect()
    }

    // ========================================================================
    // Mapping
    // ========================================================================

    fn to_body(&self, snapshot: &Snapshot) -> Document {
        let mut values = snapshot.fields.clone();
        values.insert(
            DOCUMENT_ID_FIELD.to_string(),
            Value::from(snapshot.document_id.as_str()),
        );
        values.insert(
            DOCUMENT_VERSION_FIELD.to_string(),
            version_value(snapshot.document_version),
        );
        values.insert(
            STATUS_FIELD.to_string(),
            Value::from(snapshot.status.as_str()),
        );
        self.schema().serialize_document(&values)
    }

    fn from_stored(&self, stored: &StoredDocument) -> VersoResult<Snapshot> {
        let mut fields = self.schema().deserialize_document(stored.body())?;

        let document_id = match fields.remove(DOCUMENT_ID_FIELD) {
            Some(Value::String(id)) => DocId::new(id),
            other => return Err(self.malformed(stored, DOCUMENT_ID_FIELD, other)),
        };
        let document_version = match fields.remove(DOCUMENT_VERSION_FIELD) {
            Some(Value::Int(v)) if v > 0 => Version::new(v as u64),
            other => return Err(self.malformed(stored, DOCUMENT_VERSION_FIELD, other)),
        };
        let status = match fields.remove(STATUS_FIELD) {
            Some(Value::String(s)) => match SnapshotStatus::parse(&s) {
                Some(status) => status,
                None => return Err(self.malformed(stored, STATUS_FIELD, Some(Value::String(s)))),
            },
            other => return Err(self.malformed(stored, STATUS_FIELD, other)),
        };

        Ok(Snapshot {
            id: stored.id.clone(),
            document_id,
            document_version,
            status,
            fields,
            store_version: stored.version(),
            written_at: stored.written_at(),
        })
    }

    fn malformed(&self, stored: &StoredDocument, field: &str, found: Option<Value>) -> VersoError {
        VersoError::serialization(format!(
            "snapshot {}/{} has malformed {}: {:?}",
            self.index, stored.id, field, found
        ))
    }
}

fn version_value(version: Version) -> Value {
    Value::from(version.as_u64())
}
