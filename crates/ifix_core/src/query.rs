//! Query options and conditions.
//!
//! Queries run over a copy of the record sequence: filter, then a stable
//! sort, then offset/limit. Conditions compare JSON values loosely: numbers
//! compare numerically regardless of integer/float representation, and an
//! equality test against an array field means "the array contains it".

use crate::record::Record;
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    /// Smallest first.
    #[default]
    Asc,
    /// Largest first.
    Desc,
}

/// Options for `find_all` / `find_where`.
///
/// ```rust
/// use ifix_core::{FindOptions, SortOrder};
///
/// let options = FindOptions::new()
///     .sort_by("totalSpent", SortOrder::Desc)
///     .limit(10)
///     .filter(|r| r.status() == Some("active"));
/// # let _ = options;
/// ```
#[derive(Default)]
pub struct FindOptions<'a> {
    /// Field to sort by; insertion order when `None`.
    pub sort_by: Option<String>,
    /// Sort direction.
    pub order: SortOrder,
    /// Maximum records returned.
    pub limit: Option<usize>,
    /// Records skipped after sorting.
    pub offset: usize,
    /// Extra predicate applied before sorting.
    pub filter: Option<Box<dyn Fn(&Record) -> bool + 'a>>,
}

impl fmt::Debug for FindOptions<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FindOptions")
            .field("sort_by", &self.sort_by)
            .field("order", &self.order)
            .field("limit", &self.limit)
            .field("offset", &self.offset)
            .field("filter", &self.filter.is_some())
            .finish()
    }
}

impl<'a> FindOptions<'a> {
    /// Creates options returning everything in insertion order.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sorts by `field` in `order`.
    #[must_use]
    pub fn sort_by(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.sort_by = Some(field.into());
        self.order = order;
        self
    }

    /// Returns at most `limit` records.
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skips the first `offset` records.
    #[must_use]
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Keeps only records matching `predicate`.
    #[must_use]
    pub fn filter(mut self, predicate: impl Fn(&Record) -> bool + 'a) -> Self {
        self.filter = Some(Box::new(predicate));
        self
    }

    /// Applies filter, sort and pagination to `records`.
    #[must_use]
    pub fn apply(&self, mut records: Vec<Record>) -> Vec<Record> {
        if let Some(predicate) = &self.filter {
            records.retain(|r| predicate(r));
        }

        if let Some(field) = &self.sort_by {
            records.sort_by(|a, b| {
                let ord = compare_values(a.value(field).as_deref(), b.value(field).as_deref());
                match self.order {
                    SortOrder::Asc => ord,
                    SortOrder::Desc => ord.reverse(),
                }
            });
        }

        let iter = records.into_iter().skip(self.offset);
        match self.limit {
            Some(limit) => iter.take(limit).collect(),
            None => iter.collect(),
        }
    }
}

/// A comparison applied to one field.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    /// Equal, or contained when the field is an array.
    Eq(Value),
    /// Negation of [`Op::Eq`].
    Ne(Value),
    /// Strictly greater (numbers or strings).
    Gt(Value),
    /// Greater or equal.
    Gte(Value),
    /// Strictly less.
    Lt(Value),
    /// Less or equal.
    Lte(Value),
    /// Array field contains the value, or string field contains the substring.
    Contains(Value),
    /// Field equals one of the values.
    In(Vec<Value>),
}

/// A query condition. A list of conditions is AND-combined.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Tests one field.
    Field {
        /// Field name, system fields included.
        field: String,
        /// The comparison.
        op: Op,
    },
    /// Matches when any nested condition matches.
    Any(Vec<Condition>),
    /// Matches when every nested condition matches.
    All(Vec<Condition>),
}

impl Condition {
    fn field(field: impl Into<String>, op: Op) -> Self {
        Self::Field {
            field: field.into(),
            op,
        }
    }

    /// `field == value` (or array containment).
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::field(field, Op::Eq(value.into()))
    }

    /// `field != value`.
    pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::field(field, Op::Ne(value.into()))
    }

    /// `field > value`.
    pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::field(field, Op::Gt(value.into()))
    }

    /// `field >= value`.
    pub fn gte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::field(field, Op::Gte(value.into()))
    }

    /// `field < value`.
    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::field(field, Op::Lt(value.into()))
    }

    /// `field <= value`.
    pub fn lte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::field(field, Op::Lte(value.into()))
    }

    /// Array or substring containment.
    pub fn contains(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::field(field, Op::Contains(value.into()))
    }

    /// `field` is one of `values`.
    pub fn is_in<I, V>(field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::field(field, Op::In(values.into_iter().map(Into::into).collect()))
    }

    /// Any of `conditions`.
    #[must_use]
    pub fn any(conditions: Vec<Condition>) -> Self {
        Self::Any(conditions)
    }

    /// All of `conditions`.
    #[must_use]
    pub fn all(conditions: Vec<Condition>) -> Self {
        Self::All(conditions)
    }

    /// Tests `record`.
    #[must_use]
    pub fn matches(&self, record: &Record) -> bool {
        match self {
            Self::Any(conditions) => conditions.iter().any(|c| c.matches(record)),
            Self::All(conditions) => conditions.iter().all(|c| c.matches(record)),
            Self::Field { field, op } => {
                let actual = record.value(field);
                op.matches(actual.as_deref())
            }
        }
    }

    /// Returns the status value if this is a plain `status == "<string>"` test.
    #[must_use]
    pub fn status_equality(&self) -> Option<&str> {
        match self {
            Self::Field {
                field,
                op: Op::Eq(Value::String(status)),
            } if field == crate::record::STATUS_FIELD => Some(status.as_str()),
            _ => None,
        }
    }
}

/// Returns `true` if `record` satisfies every condition.
#[must_use]
pub fn matches_all(conditions: &[Condition], record: &Record) -> bool {
    conditions.iter().all(|c| c.matches(record))
}

impl Op {
    fn matches(&self, actual: Option<&Value>) -> bool {
        match self {
            Self::Eq(expected) => loose_eq(actual, expected),
            Self::Ne(expected) => !loose_eq(actual, expected),
            Self::Gt(bound) => ordered(actual, bound).is_some_and(Ordering::is_gt),
            Self::Gte(bound) => ordered(actual, bound).is_some_and(Ordering::is_ge),
            Self::Lt(bound) => ordered(actual, bound).is_some_and(Ordering::is_lt),
            Self::Lte(bound) => ordered(actual, bound).is_some_and(Ordering::is_le),
            Self::Contains(needle) => match actual {
                Some(Value::Array(items)) => items.iter().any(|i| values_equal(i, needle)),
                Some(Value::String(s)) => needle.as_str().is_some_and(|n| s.contains(n)),
                _ => false,
            },
            Self::In(options) => options.iter().any(|o| loose_eq(actual, o)),
        }
    }
}

fn loose_eq(actual: Option<&Value>, expected: &Value) -> bool {
    match (actual, expected) {
        (None, Value::Null) => true,
        (None, _) => false,
        (Some(Value::Array(items)), e) if !e.is_array() => {
            items.iter().any(|i| values_equal(i, e))
        }
        (Some(a), e) => values_equal(a, e),
    }
}

/// Orders two values of the same kind (both numbers or both strings).
fn ordered(actual: Option<&Value>, bound: &Value) -> Option<Ordering> {
    match (actual?, bound) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

/// JSON equality with numeric comparison across integer/float forms.
#[must_use]
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn kind_rank(value: Option<&Value>) -> u8 {
    match value {
        None | Some(Value::Null) => 0,
        Some(Value::Bool(_)) => 1,
        Some(Value::Number(_)) => 2,
        Some(Value::String(_)) => 3,
        Some(Value::Array(_)) => 4,
        Some(Value::Object(_)) => 5,
    }
}

/// Total order used for sorting.
///
/// Missing and null sort first, then booleans, numbers, strings, arrays and
/// objects. Values of the same kind compare naturally; arrays element-wise;
/// objects are considered equal.
#[must_use]
pub fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .unwrap_or(0.0)
            .partial_cmp(&y.as_f64().unwrap_or(0.0))
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Array(x)), Some(Value::Array(y))) => x
            .iter()
            .zip(y.iter())
            .map(|(i, j)| compare_values(Some(i), Some(j)))
            .find(|o| o.is_ne())
            .unwrap_or_else(|| x.len().cmp(&y.len())),
        _ => kind_rank(a).cmp(&kind_rank(b)),
    }
}
