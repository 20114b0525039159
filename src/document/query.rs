//! Query - field equality filters, ordering and limits over JSON documents.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Versioned;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq)]
struct FieldFilter {
    field: String,
    value: Value,
}

#[derive(Debug, Clone, PartialEq)]
struct OrderBy {
    field: String,
    direction: SortDirection,
}

/// Query over one collection.
///
/// Field names may be dotted (`"snapshot.customer_id"`) to reach nested
/// values. Documents are ordered by id unless `order_by` is given; ties keep
/// id order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Query {
    filters: Vec<FieldFilter>,
    order_by: Option<OrderBy>,
    limit: Option<usize>,
}

impl Query {
    /// Query matching every document in the collection.
    pub fn all() -> Self {
        Self::default()
    }

    /// Keep documents whose `field` equals `value`.
    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(FieldFilter {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.order_by = Some(OrderBy {
            field: field.into(),
            direction,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether a single document passes every filter.
    pub fn matches(&self, doc: &Value) -> bool {
        self.filters
            .iter()
            .all(|filter| lookup(doc, &filter.field) == Some(&filter.value))
    }

    /// Filter, sort and truncate documents already ordered by id.
    pub(crate) fn run(&self, docs: Vec<Versioned<Value>>) -> Vec<Versioned<Value>> {
        let mut matched: Vec<Versioned<Value>> =
            docs.into_iter().filter(|doc| self.matches(&doc.data)).collect();

        if let Some(order) = &self.order_by {
            matched.sort_by(|a, b| {
                let ordering =
                    compare_values(lookup(&a.data, &order.field), lookup(&b.data, &order.field));
                match order.direction {
                    SortDirection::Ascending => ordering,
                    SortDirection::Descending => ordering.reverse(),
                }
            });
        }

        if let Some(limit) = self.limit {
            matched.truncate(limit);
        }
        matched
    }
}

fn lookup<'a>(doc: &'a Value, field: &str) -> Option<&'a Value> {
    field
        .split('.')
        .try_fold(doc, |current, segment| current.get(segment))
}

fn type_rank(value: Option<&Value>) -> u8 {
    match value {
        None | Some(Value::Null) => 0,
        Some(Value::Bool(_)) => 1,
        Some(Value::Number(_)) => 2,
        Some(Value::String(_)) => 3,
        Some(Value::Array(_)) => 4,
        Some(Value::Object(_)) => 5,
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            if let (Some(x), Some(y)) = (x.as_i64(), y.as_i64()) {
                x.cmp(&y)
            } else if let (Some(x), Some(y)) = (x.as_u64(), y.as_u64()) {
                x.cmp(&y)
            } else {
                let x = x.as_f64().unwrap_or(f64::NAN);
                let y = y.as_f64().unwrap_or(f64::NAN);
                x.partial_cmp(&y).unwrap_or(Ordering::Equal)
            }
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}
