//! Backend-neutral query values: filters, sorts and patches.
//!
//! Field names are the snake_case column names, which are also the serde
//! field names of every entity model. The in-memory backend evaluates these
//! values against serialized documents; the sea-orm backend translates them
//! into SQL.

use std::cmp::Ordering;

use chrono::{DateTime, FixedOffset};
use serde_json::{Map, Value};
use tubeline_common::{AppError, AppResult};

/// A serialized document or joined view row.
pub type Row = Map<String, Value>;

/// One predicate of a [`Filter`].
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Field equals value.
    Eq(&'static str, Value),
    /// Field equals one of the values.
    In(&'static str, Vec<Value>),
    /// Array field contains the value.
    Contains(&'static str, Value),
    /// Case-insensitive substring match on any of the fields.
    Search(Vec<&'static str>, String),
}

impl Condition {
    /// Evaluate against a serialized document.
    #[must_use]
    pub fn matches(&self, row: &Row) -> bool {
        match self {
            Self::Eq(field, value) => row.get(*field).unwrap_or(&Value::Null) == value,
            Self::In(field, values) => {
                let actual = row.get(*field).unwrap_or(&Value::Null);
                values.iter().any(|v| v == actual)
            }
            Self::Contains(field, value) => row
                .get(*field)
                .and_then(Value::as_array)
                .is_some_and(|items| items.contains(value)),
            Self::Search(fields, needle) => {
                let needle = needle.to_lowercase();
                fields.iter().any(|field| {
                    row.get(*field)
                        .and_then(Value::as_str)
                        .is_some_and(|text| text.to_lowercase().contains(&needle))
                })
            }
        }
    }
}

/// Conjunction of conditions. An empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<Condition>,
}

impl Filter {
    /// Match every document.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Add an equality condition.
    #[must_use]
    pub fn eq(mut self, field: &'static str, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition::Eq(field, value.into()));
        self
    }

    /// Add a membership condition.
    #[must_use]
    pub fn is_in<V: Into<Value>>(
        mut self,
        field: &'static str,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.conditions.push(Condition::In(
            field,
            values.into_iter().map(Into::into).collect(),
        ));
        self
    }

    /// Add an array-containment condition.
    #[must_use]
    pub fn contains(mut self, field: &'static str, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition::Contains(field, value.into()));
        self
    }

    /// Add a case-insensitive substring search across `fields`.
    #[must_use]
    pub fn search(mut self, fields: Vec<&'static str>, text: impl Into<String>) -> Self {
        self.conditions.push(Condition::Search(fields, text.into()));
        self
    }

    /// Append every condition of `other`.
    #[must_use]
    pub fn and(mut self, other: Self) -> Self {
        self.conditions.extend(other.conditions);
        self
    }

    /// The conditions, in insertion order.
    #[must_use]
    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    /// Evaluate against a serialized document.
    #[must_use]
    pub fn matches(&self, row: &Row) -> bool {
        self.conditions.iter().all(|c| c.matches(row))
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    /// Parse a caller-supplied direction; anything but `asc` is descending.
    #[must_use]
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            Some(d) if d.eq_ignore_ascii_case("asc") => Self::Asc,
            _ => Self::Desc,
        }
    }
}

/// One sort key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortKey {
    pub field: &'static str,
    pub direction: SortDirection,
}

impl SortKey {
    /// Ascending on `field`.
    #[must_use]
    pub const fn asc(field: &'static str) -> Self {
        Self {
            field,
            direction: SortDirection::Asc,
        }
    }

    /// Descending on `field`.
    #[must_use]
    pub const fn desc(field: &'static str) -> Self {
        Self {
            field,
            direction: SortDirection::Desc,
        }
    }
}

/// Sort and window for `find`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FindOptions {
    pub sort: Vec<SortKey>,
    pub skip: u64,
    pub limit: Option<u64>,
}

impl FindOptions {
    /// Sort by the given keys, no window.
    #[must_use]
    pub fn sorted(sort: Vec<SortKey>) -> Self {
        Self {
            sort,
            ..Self::default()
        }
    }

    /// Set skip and limit.
    #[must_use]
    pub const fn window(mut self, skip: u64, limit: u64) -> Self {
        self.skip = skip;
        self.limit = Some(limit);
        self
    }
}

/// Columns stored as RFC 3339 strings in rows.
const TIMESTAMP_FIELDS: [&str; 2] = ["created_at", "updated_at"];

/// Compare two values of `field` the way both backends order that column.
///
/// Timestamp columns compare chronologically, other strings by their text.
/// `null` sorts before everything else.
#[must_use]
pub fn compare_values(field: &str, a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => x
                .as_f64()
                .unwrap_or_default()
                .total_cmp(&y.as_f64().unwrap_or_default()),
        },
        (Value::String(x), Value::String(y)) if TIMESTAMP_FIELDS.contains(&field) => {
            match (parse_timestamp(x), parse_timestamp(y)) {
                (Some(x), Some(y)) => x.cmp(&y),
                _ => x.cmp(y),
            }
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => x.len().cmp(&y.len()),
        _ => Ordering::Equal,
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<FixedOffset>> {
    // Cheap shape check before attempting a full parse.
    if raw.len() < 20 || raw.as_bytes().get(4) != Some(&b'-') {
        return None;
    }
    DateTime::parse_from_rfc3339(raw).ok()
}

/// Order rows by `keys`, then by `id` in the direction of the first key.
pub fn sort_rows(rows: &mut [Row], keys: &[SortKey]) {
    let tiebreak = keys.first().map_or(SortDirection::Desc, |k| k.direction);
    rows.sort_by(|a, b| {
        keys.iter()
            .map(|key| directed(key.direction, compare_field(a, b, key.field)))
            .find(|ord| ord.is_ne())
            .unwrap_or_else(|| directed(tiebreak, compare_field(a, b, "id")))
    });
}

fn compare_field(a: &Row, b: &Row, field: &str) -> Ordering {
    compare_values(
        field,
        a.get(field).unwrap_or(&Value::Null),
        b.get(field).unwrap_or(&Value::Null),
    )
}

const fn directed(direction: SortDirection, ord: Ordering) -> Ordering {
    match direction {
        SortDirection::Asc => ord,
        SortDirection::Desc => ord.reverse(),
    }
}

/// An atomic operation on one field of one document.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldOp {
    /// Replace the value.
    Set(&'static str, Value),
    /// Add to an integer field.
    Increment(&'static str, i64),
    /// Append to an array field unless already present.
    AddToSet(&'static str, Value),
    /// Remove every occurrence from an array field.
    Pull(&'static str, Value),
}

impl FieldOp {
    const fn field(&self) -> &'static str {
        match self {
            Self::Set(f, _) | Self::Increment(f, _) | Self::AddToSet(f, _) | Self::Pull(f, _) => f,
        }
    }
}

/// A list of field operations applied to one document atomically.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Patch {
    ops: Vec<FieldOp>,
}

impl Patch {
    /// An empty patch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace a field.
    #[must_use]
    pub fn set(mut self, field: &'static str, value: impl Into<Value>) -> Self {
        self.ops.push(FieldOp::Set(field, value.into()));
        self
    }

    /// Add `by` to an integer field.
    #[must_use]
    pub fn increment(mut self, field: &'static str, by: i64) -> Self {
        self.ops.push(FieldOp::Increment(field, by));
        self
    }

    /// Append to an array field unless already present.
    #[must_use]
    pub fn add_to_set(mut self, field: &'static str, value: impl Into<Value>) -> Self {
        self.ops.push(FieldOp::AddToSet(field, value.into()));
        self
    }

    /// Remove every occurrence of a value from an array field.
    #[must_use]
    pub fn pull(mut self, field: &'static str, value: impl Into<Value>) -> Self {
        self.ops.push(FieldOp::Pull(field, value.into()));
        self
    }

    /// Whether the patch has no operations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Fields touched by the patch, deduplicated, in first-touch order.
    #[must_use]
    pub fn fields(&self) -> Vec<&'static str> {
        let mut fields: Vec<&'static str> = Vec::with_capacity(self.ops.len());
        for op in &self.ops {
            if !fields.contains(&op.field()) {
                fields.push(op.field());
            }
        }
        fields
    }

    /// Apply the operations to a serialized document.
    pub fn apply(&self, row: &mut Row) -> AppResult<()> {
        for op in &self.ops {
            if op.field() == "id" {
                return Err(AppError::Internal("document id is immutable".to_string()));
            }
            match op {
                FieldOp::Set(field, value) => {
                    row.insert((*field).to_string(), value.clone());
                }
                FieldOp::Increment(field, by) => {
                    let current = row.get(*field).and_then(Value::as_i64).ok_or_else(|| {
                        AppError::Internal(format!("field {field} is not an integer"))
                    })?;
                    row.insert((*field).to_string(), Value::from(current + by));
                }
                FieldOp::AddToSet(field, value) => {
                    let items = array_field(row, field)?;
                    if !items.contains(value) {
                        items.push(value.clone());
                    }
                }
                FieldOp::Pull(field, value) => {
                    array_field(row, field)?.retain(|item| item != value);
                }
            }
        }
        Ok(())
    }
}

fn array_field<'a>(row: &'a mut Row, field: &str) -> AppResult<&'a mut Vec<Value>> {
    row.get_mut(field)
        .and_then(Value::as_array_mut)
        .ok_or_else(|| AppError::Internal(format!("field {field} is not an array")))
}
