//! Fault-injecting store wrapper

use parking_lot::Mutex;
use tracing::debug;
use verso_core::{DocId, Document, StoreError, StoreResult, Value, Version};

use crate::query::{Query, SearchRequest};
use crate::traits::{DocumentStore, StoredDocument, WriteAck};

/// Kind of store call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    /// `create_index`
    CreateIndex,
    /// `delete_index`
    DeleteIndex,
    /// `index_exists`
    IndexExists,
    /// `get`
    Get,
    /// `create`
    Create,
    /// `update`
    Update,
    /// `delete`
    Delete,
    /// `search`
    Search,
    /// `count`
    Count,
    /// `refresh`
    Refresh,
}

/// One recorded call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreOp {
    /// What was called
    pub kind: OpKind,
    /// Collection it was called on
    pub index: String,
}

/// A scripted fault. Each fault fires once, on the first matching call.
#[derive(Debug, Clone, PartialEq)]
pub enum Fault {
    /// Before the next update on `index`, another writer updates the same
    /// document (same body, version + 1), so a version precondition taken
    /// before that point no longer holds.
    ConcurrentWrite {
        /// Collection to race on
        index: String,
    },
    /// The next update on `index` fails with `error` and is not applied
    FailUpdate {
        /// Collection to fail on
        index: String,
        /// Error to report
        error: StoreError,
    },
    /// The next update on `index` is applied, then reported as timed out
    LostAck {
        /// Collection to fail on
        index: String,
    },
    /// The next create on `index` fails with `error` and is not applied
    FailCreate {
        /// Collection to fail on
        index: String,
        /// Error to report
        error: StoreError,
    },
    /// The next delete on `index` fails and is not applied
    FailDelete {
        /// Collection to fail on
        index: String,
    },
    /// The next call of any kind fails with `Unavailable`
    Unavailable,
}

impl Fault {
    fn matches(&self, kind: OpKind, on: &str) -> bool {
        match self {
            Fault::ConcurrentWrite { index }
            | Fault::FailUpdate { index, .. }
            | Fault::LostAck { index } => kind == OpKind::Update && index == on,
            Fault::FailCreate { index, .. } => kind == OpKind::Create && index == on,
            Fault::FailDelete { index } => kind == OpKind::Delete && index == on,
            Fault::Unavailable => true,
        }
    }
}

/// Store wrapper that records every call and fires scripted faults
pub struct FaultyStore<S> {
    inner: S,
    faults: Mutex<Vec<Fault>>,
    ops: Mutex<Vec<StoreOp>>,
}

impl<S: DocumentStore> FaultyStore<S> {
    /// Wrap `inner` with no faults scheduled
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            faults: Mutex::new(Vec::new()),
            ops: Mutex::new(Vec::new()),
        }
    }

    /// The wrapped store, bypassing faults and the op log
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Schedule a fault
    pub fn inject(&self, fault: Fault) {
        self.faults.lock().push(fault);
    }

    /// Faults scheduled but not yet fired
    pub fn pending_faults(&self) -> usize {
        self.faults.lock().len()
    }

    /// Every call so far, in order
    pub fn ops(&self) -> Vec<StoreOp> {
        self.ops.lock().clone()
    }

    /// Number of calls of `kind`
    pub fn count_ops(&self, kind: OpKind) -> usize {
        self.ops.lock().iter().filter(|op| op.kind == kind).count()
    }

    /// Number of calls, excluding `refresh`
    pub fn round_trips(&self) -> usize {
        self.ops
            .lock()
            .iter()
            .filter(|op| op.kind != OpKind::Refresh)
            .count()
    }

    /// Forget recorded calls
    pub fn clear_ops(&self) {
        self.ops.lock().clear();
    }

    fn record(&self, kind: OpKind, index: &str) -> Option<Fault> {
        self.ops.lock().push(StoreOp {
            kind,
            index: index.to_string(),
        });
        let mut faults = self.faults.lock();
        let pos = faults.iter().position(|f| f.matches(kind, index))?;
        let fault = faults.remove(pos);
        debug!(target: "verso::store", ?kind, index, ?fault, "injecting fault");
        Some(fault)
    }
}

fn unavailable() -> StoreError {
    StoreError::Unavailable("injected outage".to_string())
}

impl<S: DocumentStore> DocumentStore for FaultyStore<S> {
    fn create_index(&self, index: &str, mapping: &Value) -> StoreResult<()> {
        if self.record(OpKind::CreateIndex, index).is_some() {
            return Err(unavailable());
        }
        self.inner.create_index(index, mapping)
    }

    fn delete_index(&self, index: &str) -> StoreResult<bool> {
        if self.record(OpKind::DeleteIndex, index).is_some() {
            return Err(unavailable());
        }
        self.inner.delete_index(index)
    }

    fn index_exists(&self, index: &str) -> StoreResult<bool> {
        if self.record(OpKind::IndexExists, index).is_some() {
            return Err(unavailable());
        }
        self.inner.index_exists(index)
    }

    fn get(&self, index: &str, id: &DocId) -> StoreResult<Option<StoredDocument>> {
        if self.record(OpKind::Get, index).is_some() {
            return Err(unavailable());
        }
        self.inner.get(index, id)
    }

    fn create(&self, index: &str, id: Option<&DocId>, body: Document) -> StoreResult<WriteAck> {
        match self.record(OpKind::Create, index) {
            Some(Fault::FailCreate { error, .. }) => Err(error),
            Some(_) => Err(unavailable()),
            None => self.inner.create(index, id, body),
        }
    }

    fn update(
        &self,
        index: &str,
        id: &DocId,
        body: Document,
        expected: Option<Version>,
    ) -> StoreResult<WriteAck> {
        match self.record(OpKind::Update, index) {
            None => self.inner.update(index, id, body, expected),
            Some(Fault::ConcurrentWrite { .. }) => {
                if let Some(current) = self.inner.get(index, id)? {
                    self.inner
                        .update(index, id, current.body().clone(), Some(current.version()))?;
                }
                self.inner.update(index, id, body, expected)
            }
            Some(Fault::FailUpdate { error, .. }) => Err(error),
            Some(Fault::LostAck { .. }) => {
                self.inner.update(index, id, body, expected)?;
                Err(StoreError::Unavailable("acknowledgement lost".to_string()))
            }
            Some(_) => Err(unavailable()),
        }
    }

    fn delete(&self, index: &str, id: &DocId) -> StoreResult<bool> {
        match self.record(OpKind::Delete, index) {
            Some(Fault::FailDelete { .. }) => {
                Err(StoreError::Backend("injected delete failure".to_string()))
            }
            Some(_) => Err(unavailable()),
            None => self.inner.delete(index, id),
        }
    }

    fn search(&self, index: &str, request: &SearchRequest) -> StoreResult<Vec<StoredDocument>> {
        if self.record(OpKind::Search, index).is_some() {
            return Err(unavailable());
        }
        self.inner.search(index, request)
    }

    fn count(&self, index: &str, query: &Query) -> StoreResult<u64> {
        if self.record(OpKind::Count, index).is_some() {
            return Err(unavailable());
        }
        self.inner.count(index, query)
    }

    fn refresh(&self, index: &str) -> StoreResult<()> {
        if self.record(OpKind::Refresh, index).is_some() {
            return Err(unavailable());
        }
        self.inner.refresh(index)
    }
}
