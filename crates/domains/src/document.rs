//! # Document Model
//!
//! The loosely-typed shape exchanged with the persistence collaborator.
//! Documents are addressed by (collection path, id); entities are produced from them
//! by the decode step in [`crate::decode`].

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Slash-separated path of a collection, e.g. `routes/abc/points`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CollectionPath(String);

impl CollectionPath {
    /// A top-level collection (`routes`, `users`).
    pub fn root(name: &str) -> Self {
        Self(name.to_owned())
    }

    /// Nested collection under one of this collection's documents.
    pub fn child(&self, doc_id: &str, collection: &str) -> Self {
        Self(format!("{}/{}/{}", self.0, doc_id, collection))
    }

    pub fn doc(&self, id: impl Into<String>) -> DocRef {
        DocRef {
            collection: self.clone(),
            id: id.into(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Last segment, i.e. the collection's own name.
    pub fn name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Address of a single document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocRef {
    pub collection: CollectionPath,
    pub id: String,
}

impl DocRef {
    /// Nested collection under this document.
    pub fn collection(&self, name: &str) -> CollectionPath {
        self.collection.child(&self.id, name)
    }
}

impl fmt::Display for DocRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

/// A stored document: its id plus the raw field map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub fields: Map<String, Value>,
}

impl Document {
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name).filter(|v| !v.is_null())
    }
}

/// One field of a write.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldWrite {
    Set(Value),
    /// Replaced by the collaborator's clock at commit time.
    ServerTimestamp,
    /// Removes the field on update; ignored on create.
    Delete,
}

/// Field writes keyed by field name. Only listed fields are touched by an update.
pub type WriteSet = BTreeMap<String, FieldWrite>;

/// Small builder so call sites read as a list of assignments.
#[derive(Debug, Clone, Default)]
pub struct Writes(WriteSet);

impl Writes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.0.insert(field.to_owned(), FieldWrite::Set(value.into()));
        self
    }

    pub fn set_opt(self, field: &str, value: Option<impl Into<Value>>) -> Self {
        match value {
            Some(v) => self.set(field, v),
            None => self,
        }
    }

    pub fn server_timestamp(mut self, field: &str) -> Self {
        self.0.insert(field.to_owned(), FieldWrite::ServerTimestamp);
        self
    }

    pub fn delete(mut self, field: &str) -> Self {
        self.0.insert(field.to_owned(), FieldWrite::Delete);
        self
    }

    pub fn build(self) -> WriteSet {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOp {
    Eq,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

/// Filtered, optionally ordered and limited listing of one collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub collection: CollectionPath,
    pub filters: Vec<Filter>,
    pub order_by: Option<OrderBy>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new(collection: CollectionPath) -> Self {
        Self {
            collection,
            filters: Vec::new(),
            order_by: None,
            limit: None,
        }
    }

    pub fn filter(mut self, field: &str, op: FilterOp, value: impl Into<Value>) -> Self {
        self.filters.push(Filter {
            field: field.to_owned(),
            op,
            value: value.into(),
        });
        self
    }

    pub fn eq(self, field: &str, value: impl Into<Value>) -> Self {
        self.filter(field, FilterOp::Eq, value)
    }

    pub fn order_by(mut self, field: &str, direction: Direction) -> Self {
        self.order_by = Some(OrderBy {
            field: field.to_owned(),
            direction,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether a document passes every filter. Missing fields never match.
    pub fn matches(&self, doc: &Document) -> bool {
        self.filters.iter().all(|f| {
            let Some(actual) = doc.field(&f.field) else {
                return false;
            };
            match (f.op, compare_values(actual, &f.value)) {
                (FilterOp::Eq, Some(o)) => o == Ordering::Equal,
                (FilterOp::Lt, Some(o)) => o == Ordering::Less,
                (FilterOp::Le, Some(o)) => o != Ordering::Greater,
                (FilterOp::Gt, Some(o)) => o == Ordering::Greater,
                (FilterOp::Ge, Some(o)) => o != Ordering::Less,
                (_, None) => false,
            }
        })
    }

    /// Filters, stable-sorts and truncates `docs` the way the collaborator would.
    /// Documents lacking the order field are excluded from ordered results.
    pub fn apply(&self, docs: impl IntoIterator<Item = Document>) -> Vec<Document> {
        let mut out: Vec<Document> = docs.into_iter().filter(|d| self.matches(d)).collect();
        if let Some(order) = &self.order_by {
            out.retain(|d| d.field(&order.field).is_some());
            out.sort_by(|a, b| {
                let ord = match (a.field(&order.field), b.field(&order.field)) {
                    (Some(x), Some(y)) => compare_values(x, y).unwrap_or(Ordering::Equal),
                    _ => Ordering::Equal,
                };
                match order.direction {
                    Direction::Asc => ord,
                    Direction::Desc => ord.reverse(),
                }
            });
        }
        if let Some(limit) = self.limit {
            out.truncate(limit);
        }
        out
    }
}

/// Orders two JSON values of the same kind; values of different kinds are incomparable.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => None,
    }
}
