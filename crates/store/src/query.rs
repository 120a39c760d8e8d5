//! Search request model
//!
//! The subset of a search engine's query DSL the mapping layer needs:
//! match-all, exact term and boolean composition, plus sorting and
//! `search_after` cursors for paging through large result sets.

use std::cmp::Ordering;
use verso_core::{DocId, Document, Value};

/// Pseudo-field addressing the document id in queries and sorts
pub const ID_SORT_FIELD: &str = "_id";

/// Page size used when a request does not set one
pub const DEFAULT_SEARCH_SIZE: usize = 10;

/// Document filter
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    /// Every document
    MatchAll,
    /// Field equals value (arrays match on any member)
    Term {
        /// Stored field name, or `_id`
        field: String,
        /// Value to match
        value: Value,
    },
    /// All of `must` match and none of `must_not` do
    Bool {
        /// Required clauses
        must: Vec<Query>,
        /// Excluded clauses
        must_not: Vec<Query>,
    },
}

impl Query {
    /// Exact term query
    pub fn term(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Query::Term {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Match a single id
    pub fn id(id: &DocId) -> Self {
        Query::term(ID_SORT_FIELD, id.as_str())
    }

    /// Conjunction of `self` and `other`
    pub fn and(self, other: Query) -> Self {
        match (self, other) {
            (Query::MatchAll, q) | (q, Query::MatchAll) => q,
            (Query::Bool { mut must, must_not }, q) => {
                must.push(q);
                Query::Bool { must, must_not }
            }
            (q, other) => Query::Bool {
                must: vec![q, other],
                must_not: Vec::new(),
            },
        }
    }

    /// `self` with `excluded` ruled out
    pub fn and_not(self, excluded: Query) -> Self {
        match self {
            Query::Bool { must, mut must_not } => {
                must_not.push(excluded);
                Query::Bool { must, must_not }
            }
            q => Query::Bool {
                must: vec![q],
                must_not: vec![excluded],
            },
        }
    }

    /// Evaluate against one stored document
    pub fn matches(&self, id: &DocId, body: &Document) -> bool {
        match self {
            Query::MatchAll => true,
            Query::Term { field, value } if field == ID_SORT_FIELD => {
                value.as_str() == Some(id.as_str())
            }
            Query::Term { field, value } => body
                .get(field)
                .map(|stored| stored.term_matches(value))
                .unwrap_or(false),
            Query::Bool { must, must_not } => {
                must.iter().all(|q| q.matches(id, body))
                    && !must_not.iter().any(|q| q.matches(id, body))
            }
        }
    }
}

impl Default for Query {
    fn default() -> Self {
        Query::MatchAll
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    /// Smallest first
    Asc,
    /// Largest first
    Desc,
}

/// One sort criterion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortField {
    /// Stored field name, or `_id`
    pub field: String,
    /// Direction
    pub order: SortOrder,
}

impl SortField {
    /// Ascending sort on `field`
    pub fn asc(field: impl Into<String>) -> Self {
        SortField {
            field: field.into(),
            order: SortOrder::Asc,
        }
    }

    /// Descending sort on `field`
    pub fn desc(field: impl Into<String>) -> Self {
        SortField {
            field: field.into(),
            order: SortOrder::Desc,
        }
    }
}

/// A single search call
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SearchRequest {
    /// Filter
    pub query: Query,
    /// Sort criteria, applied in order
    pub sort: Vec<SortField>,
    /// Maximum hits, [`DEFAULT_SEARCH_SIZE`] when unset
    pub size: Option<usize>,
    /// Sort key of the last hit of the previous page
    pub search_after: Option<Vec<Value>>,
}

impl SearchRequest {
    /// Request for `query` with default sort and size
    pub fn new(query: Query) -> Self {
        SearchRequest {
            query,
            ..Default::default()
        }
    }

    /// Set sort criteria
    pub fn sort(mut self, sort: Vec<SortField>) -> Self {
        self.sort = sort;
        self
    }

    /// Set page size
    pub fn size(mut self, size: usize) -> Self {
        self.size = Some(size);
        self
    }

    /// Continue after the given sort key
    pub fn search_after(mut self, key: Vec<Value>) -> Self {
        self.search_after = Some(key);
        self
    }

    /// Effective page size
    pub fn effective_size(&self) -> usize {
        self.size.unwrap_or(DEFAULT_SEARCH_SIZE)
    }

    /// Sort key of a document under this request's sort criteria
    pub fn sort_key(&self, id: &DocId, body: &Document) -> Vec<Value> {
        self.sort
            .iter()
            .map(|s| {
                if s.field == ID_SORT_FIELD {
                    Value::from(id.as_str())
                } else {
                    body.get(&s.field).cloned().unwrap_or(Value::Null)
                }
            })
            .collect()
    }

    /// Compare two sort keys. Missing values sort last in either direction.
    pub fn compare_keys(&self, a: &[Value], b: &[Value]) -> Ordering {
        for (i, criterion) in self.sort.iter().enumerate() {
            let (x, y) = match (a.get(i), b.get(i)) {
                (Some(x), Some(y)) => (x, y),
                _ => break,
            };
            let ord = match (x.is_null(), y.is_null()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                (false, false) => match criterion.order {
                    SortOrder::Asc => x.sort_cmp(y),
                    SortOrder::Desc => y.sort_cmp(x),
                },
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }
}
