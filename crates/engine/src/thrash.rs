//! Soft-delete ("thrash") state machine
//!
//! ## States
//!
//! - `VISIBLE`: `deleted = false`
//! - `THRASHED`: `deleted = true`, still stored, history intact
//! - removed: physically deleted via a forced delete (terminal)
//!
//! ## Query mode
//!
//! Which of those states a read can see is decided by a [`QueryMode`]. Every
//! model carries a current mode (default [`QueryMode::ExcludeDeleted`]);
//! read operations take it unless called with an explicit mode.
//!
//! The current mode is changed only through [`QueryModeScope`], a guard that
//! restores the previous mode when dropped, including during unwinding.
//! Nested scopes therefore unwind in stack order.
//!
//! The mode belongs to the model, not to a caller: two threads opening
//! scopes on the same model at the same time will observe each other's
//! mode. Callers that need isolation pass the mode explicitly
//! (`Repository::get_in_mode`, `Repository::search_in_mode`).

use parking_lot::Mutex;
use tracing::trace;
use verso_core::schema::DELETED_FIELD;
use verso_store::Query;

/// Which soft-delete states a read can see
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueryMode {
    /// Only visible documents
    #[default]
    ExcludeDeleted,
    /// Visible and thrashed documents
    IncludeDeleted,
    /// Only thrashed documents
    DeletedOnly,
}

impl QueryMode {
    /// Check if a document with the given flag is visible in this mode
    pub fn admits(&self, deleted: bool) -> bool {
        match self {
            QueryMode::ExcludeDeleted => !deleted,
            QueryMode::IncludeDeleted => true,
            QueryMode::DeletedOnly => deleted,
        }
    }

    /// Restrict `query` to what this mode can see
    pub fn apply(&self, query: Query) -> Query {
        match self {
            // must_not keeps documents that lack the flag entirely
            QueryMode::ExcludeDeleted => query.and_not(Query::term(DELETED_FIELD, true)),
            QueryMode::IncludeDeleted => query,
            QueryMode::DeletedOnly => query.and(Query::term(DELETED_FIELD, true)),
        }
    }
}

/// Current query mode of one model
#[derive(Debug, Default)]
pub(crate) struct ModeCell {
    mode: Mutex<QueryMode>,
}

impl ModeCell {
    pub(crate) fn get(&self) -> QueryMode {
        *self.mode.lock()
    }

    fn replace(&self, mode: QueryMode) -> QueryMode {
        std::mem::replace(&mut *self.mode.lock(), mode)
    }
}

/// Guard holding a model's query mode; restores the previous mode on drop
///
/// # Example
///
/// ```ignore
/// {
///     let _scope = model.scoped_mode(QueryMode::IncludeDeleted);
///     let thrashed = repo.get(&id)?;
/// } // previous mode restored here, even if `get` returned early or panicked
/// ```
#[must_use = "the mode is restored as soon as the scope is dropped"]
pub struct QueryModeScope<'a> {
    cell: &'a ModeCell,
    previous: QueryMode,
    doc_type: &'a str,
}

impl<'a> QueryModeScope<'a> {
    pub(crate) fn enter(cell: &'a ModeCell, mode: QueryMode, doc_type: &'a str) -> Self {
        let previous = cell.replace(mode);
        trace!(target: "verso::thrash", doc_type, ?previous, ?mode, "enter query mode");
        Self {
            cell,
            previous,
            doc_type,
        }
    }

    /// Mode that will be restored on drop
    pub fn previous(&self) -> QueryMode {
        self.previous
    }
}

impl Drop for QueryModeScope<'_> {
    fn drop(&mut self) {
        let left = self.cell.replace(self.previous);
        trace!(target: "verso::thrash", doc_type = self.doc_type, ?left, restored = ?self.previous, "leave query mode");
    }
}
