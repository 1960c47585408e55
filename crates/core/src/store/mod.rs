//! Document store contract.
//!
//! Patient records are persisted as JSON objects keyed by record id. The record store needs a
//! small set of primitives from its backend: get by key, existence, upsert, a filtered and
//! optionally sorted stream, and a count over the same filters.
//!
//! ## Filters
//!
//! A [`Query`] is a conjunction of [`Filter`]s over top-level fields. Values compare numerically
//! when both sides are numbers and lexicographically when both are strings; values of different
//! types never match. [`Filter::Contains`] matches an array holding the value and also a scalar
//! equal to it, so one filter covers every stored shape of an identifier field.
//!
//! Backends share the evaluation in [`Query::evaluate`], so they only differ in how documents
//! are loaded and written.

mod json_dir;
mod memory;

pub use json_dir::JsonDirStore;
pub use memory::MemoryStore;

use crate::PatientResult;
use serde_json::Value;
use std::cmp::Ordering;
use std::ops::Bound;

/// A stored document: a JSON object.
pub type Document = serde_json::Map<String, Value>;

/// Documents produced by [`DocumentStore::stream`], in query order.
pub type DocumentCursor<'a> = Box<dyn Iterator<Item = PatientResult<(String, Document)>> + 'a>;

/// Persistence primitives used by the record store.
///
/// Every call is evaluated afresh, so a stream can be rerun after the store changes.
pub trait DocumentStore: Send + Sync {
    fn get(&self, id: &str) -> PatientResult<Option<Document>>;

    fn exists(&self, id: &str) -> PatientResult<bool>;

    /// Writes the whole document, replacing any previous version.
    fn upsert(&self, id: &str, document: Document) -> PatientResult<()>;

    fn stream(&self, query: &Query) -> PatientResult<DocumentCursor<'_>>;

    /// Number of documents matching the query's filters. Ordering and limit are ignored.
    fn count(&self, query: &Query) -> PatientResult<u64>;
}

// ============================================================================
// Queries
// ============================================================================

#[derive(Clone, Debug, PartialEq)]
pub enum Filter {
    Eq(String, Value),
    /// The field is an array containing the value, or a scalar equal to it.
    Contains(String, Value),
    Range(String, Bound<Value>, Bound<Value>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Query {
    filters: Vec<Filter>,
    order_by: Option<(String, Direction)>,
    limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn eq(self, field: &str, value: impl Into<Value>) -> Self {
        self.filter(Filter::Eq(field.to_owned(), value.into()))
    }

    pub fn contains(self, field: &str, value: impl Into<Value>) -> Self {
        self.filter(Filter::Contains(field.to_owned(), value.into()))
    }

    pub fn range(self, field: &str, lower: Bound<Value>, upper: Bound<Value>) -> Self {
        self.filter(Filter::Range(field.to_owned(), lower, upper))
    }

    /// Sorts by `field`. Documents without the field come last.
    pub fn order_by(mut self, field: &str, direction: Direction) -> Self {
        self.order_by = Some((field.to_owned(), direction));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, document: &Document) -> bool {
        self.filters.iter().all(|f| f.matches(document))
    }

    /// Filters, sorts and truncates `documents` according to this query.
    ///
    /// Input order is kept for documents that sort equal.
    pub fn evaluate(
        &self,
        documents: impl IntoIterator<Item = (String, Document)>,
    ) -> Vec<(String, Document)> {
        let mut selected: Vec<(String, Document)> = documents
            .into_iter()
            .filter(|(_, doc)| self.matches(doc))
            .collect();

        if let Some((field, direction)) = &self.order_by {
            selected.sort_by(|(_, a), (_, b)| match (a.get(field), b.get(field)) {
                (Some(x), Some(y)) => {
                    let ord = sort_order(x, y);
                    match direction {
                        Direction::Ascending => ord,
                        Direction::Descending => ord.reverse(),
                    }
                }
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            });
        }

        if let Some(limit) = self.limit {
            selected.truncate(limit);
        }
        selected
    }
}

impl Filter {
    fn matches(&self, document: &Document) -> bool {
        match self {
            Filter::Eq(field, wanted) => document
                .get(field)
                .is_some_and(|v| compare(v, wanted) == Some(Ordering::Equal)),
            Filter::Contains(field, wanted) => match document.get(field) {
                Some(Value::Array(items)) => items
                    .iter()
                    .any(|v| compare(v, wanted) == Some(Ordering::Equal)),
                Some(v) => compare(v, wanted) == Some(Ordering::Equal),
                None => false,
            },
            Filter::Range(field, lower, upper) => {
                let Some(v) = document.get(field) else {
                    return false;
                };
                let above = match lower {
                    Bound::Included(l) => matches!(compare(v, l), Some(o) if o.is_ge()),
                    Bound::Excluded(l) => compare(v, l) == Some(Ordering::Greater),
                    Bound::Unbounded => true,
                };
                let below = match upper {
                    Bound::Included(u) => matches!(compare(v, u), Some(o) if o.is_le()),
                    Bound::Excluded(u) => compare(v, u) == Some(Ordering::Less),
                    Bound::Unbounded => true,
                };
                above && below
            }
        }
    }
}

/// Total order used for sorting: values group by kind first, then compare within the kind.
fn sort_order(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }
    rank(a)
        .cmp(&rank(b))
        .then_with(|| compare(a, b).unwrap_or(Ordering::Equal))
}

/// Compares two scalar JSON values of the same kind.
fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => Some(x.cmp(&y)),
            _ => x.as_f64()?.partial_cmp(&y.as_f64()?),
        },
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}
