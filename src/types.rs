//! Core data model: typed cell values and the in-memory columnar [`Table`].
//!
//! A flattened document is materialized as a [`Table`]: an ordered list of equally long
//! [`Column`]s keyed by name. Every query stage (filter, group, aggregate, sort, limit)
//! operates on tables and produces a new table; rows are only materialized at the boundary
//! via [`Table::to_records`].

use std::cmp::Ordering;
use std::collections::HashMap;

use serde_json::{Map, Number, Value as JsonValue};

use crate::error::{RowpadError, RowpadResult};

/// A materialized output row: column name → JSON value, in column order.
pub type FlatRow = Map<String, JsonValue>;

/// Logical data type of a column, inferred from its non-null values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    /// Every value is null (or the column is empty).
    Null,
    /// 64-bit signed integer.
    Int64,
    /// 64-bit floating point number.
    Float64,
    /// Boolean.
    Bool,
    /// UTF-8 string. Also the fallback for columns mixing incompatible types.
    Utf8,
}

impl DataType {
    /// Returns `true` for `Int64` and `Float64`.
    pub fn is_numeric(self) -> bool {
        matches!(self, Self::Int64 | Self::Float64)
    }

    fn unify(self, other: Self) -> Self {
        match (self, other) {
            (a, b) if a == b => a,
            (Self::Null, x) | (x, Self::Null) => x,
            (Self::Int64, Self::Float64) | (Self::Float64, Self::Int64) => Self::Float64,
            _ => Self::Utf8,
        }
    }
}

/// A single named, typed field in a [`Schema`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    /// Field/column name.
    pub name: String,
    /// Field data type.
    pub data_type: DataType,
}

impl Field {
    /// Create a new field.
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

/// Column introspection result for a [`Table`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    /// Ordered list of fields.
    pub fields: Vec<Field>,
}

impl Schema {
    /// Create a new schema from fields.
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    /// Iterate field names in order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Returns the index of a field by name, if present.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }
}

/// A single typed cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Missing/empty value.
    Null,
    /// 64-bit signed integer.
    Int64(i64),
    /// 64-bit float.
    Float64(f64),
    /// Boolean.
    Bool(bool),
    /// UTF-8 string.
    Utf8(String),
}

/// Hashable identity of a [`Value`], used as a group-by key.
///
/// Integral floats collapse onto the matching integer so `1` and `1.0` share a group.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueKey {
    Null,
    Bool(bool),
    Int(i64),
    Float(u64),
    Text(String),
}

impl Value {
    /// Convert a JSON leaf into a cell value.
    ///
    /// Arrays and objects that survive flattening are kept as compact JSON text.
    pub fn from_json(v: &JsonValue) -> Self {
        match v {
            JsonValue::Null => Self::Null,
            JsonValue::Bool(b) => Self::Bool(*b),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => Self::Int64(i),
                None => n.as_f64().map(Self::Float64).unwrap_or(Self::Null),
            },
            JsonValue::String(s) => Self::Utf8(s.clone()),
            JsonValue::Array(_) | JsonValue::Object(_) => Self::Utf8(v.to_string()),
        }
    }

    /// Convert back into JSON. Non-finite floats become `null`.
    pub fn to_json(&self) -> JsonValue {
        match self {
            Self::Null => JsonValue::Null,
            Self::Int64(i) => JsonValue::Number((*i).into()),
            Self::Float64(f) => Number::from_f64(*f)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            Self::Bool(b) => JsonValue::Bool(*b),
            Self::Utf8(s) => JsonValue::String(s.clone()),
        }
    }

    /// Logical type of this single value.
    pub fn data_type(&self) -> DataType {
        match self {
            Self::Null => DataType::Null,
            Self::Int64(_) => DataType::Int64,
            Self::Float64(_) => DataType::Float64,
            Self::Bool(_) => DataType::Bool,
            Self::Utf8(_) => DataType::Utf8,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Numeric view of `Int64`/`Float64` values.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int64(i) => Some(*i as f64),
            Self::Float64(f) => Some(*f),
            _ => None,
        }
    }

    /// Numeric view that also accepts strings holding a number (`" 12.5 "`).
    pub fn numeric_lossy(&self) -> Option<f64> {
        match self {
            Self::Utf8(s) => {
                let t = s.trim();
                if t.is_empty() {
                    None
                } else {
                    t.parse::<f64>().ok()
                }
            }
            other => other.as_f64(),
        }
    }

    /// Replace `Null` with integer zero.
    pub fn or_zero(&self) -> Value {
        match self {
            Self::Null => Self::Int64(0),
            other => other.clone(),
        }
    }

    /// Textual rendering used by substring operators. `Null` has no text.
    pub fn text(&self) -> Option<String> {
        match self {
            Self::Null => None,
            Self::Int64(i) => Some(i.to_string()),
            Self::Float64(f) => Some(f.to_string()),
            Self::Bool(b) => Some(b.to_string()),
            Self::Utf8(s) => Some(s.clone()),
        }
    }

    /// Comparison used by filter predicates.
    ///
    /// Same-typed values compare directly; numbers compare with numeric strings. Anything else
    /// (including a single `Null` side) is incomparable.
    pub fn loose_cmp(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Self::Null, Self::Null) => Some(Ordering::Equal),
            (Self::Null, _) | (_, Self::Null) => None,
            (Self::Utf8(a), Self::Utf8(b)) => Some(a.cmp(b)),
            (Self::Bool(a), Self::Bool(b)) => Some(a.cmp(b)),
            (Self::Int64(a), Self::Int64(b)) => Some(a.cmp(b)),
            (Self::Bool(_), _) | (_, Self::Bool(_)) => None,
            _ => {
                let a = self.numeric_lossy()?;
                let b = other.numeric_lossy()?;
                a.partial_cmp(&b)
            }
        }
    }

    pub fn loose_eq(&self, other: &Value) -> bool {
        self.loose_cmp(other) == Some(Ordering::Equal)
    }

    /// Total order used for sorting: null < bool < number < text.
    pub fn sort_cmp(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Self::Int64(a), Self::Int64(b)) => a.cmp(b),
            (Self::Bool(a), Self::Bool(b)) => a.cmp(b),
            (Self::Utf8(a), Self::Utf8(b)) => a.cmp(b),
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => a.total_cmp(&b),
                _ => self.sort_rank().cmp(&other.sort_rank()),
            },
        }
    }

    fn sort_rank(&self) -> u8 {
        match self {
            Self::Null => 0,
            Self::Bool(_) => 1,
            Self::Int64(_) | Self::Float64(_) => 2,
            Self::Utf8(_) => 3,
        }
    }

    /// Hashable identity for grouping.
    pub fn group_key(&self) -> ValueKey {
        match self {
            Self::Null => ValueKey::Null,
            Self::Bool(b) => ValueKey::Bool(*b),
            Self::Int64(i) => ValueKey::Int(*i),
            Self::Float64(f) => {
                if f.fract() == 0.0 && *f >= i64::MIN as f64 && *f < i64::MAX as f64 {
                    ValueKey::Int(*f as i64)
                } else {
                    ValueKey::Float(f.to_bits())
                }
            }
            Self::Utf8(s) => ValueKey::Text(s.clone()),
        }
    }
}

/// A named vector of cell values.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    /// Column name.
    pub name: String,
    /// Cell values, one per table row.
    pub values: Vec<Value>,
}

impl Column {
    pub fn new(name: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    /// A column repeating `value` `len` times.
    pub fn filled(name: impl Into<String>, value: Value, len: usize) -> Self {
        Self::new(name, vec![value; len])
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Infer the column type from its values.
    pub fn data_type(&self) -> DataType {
        self.values
            .iter()
            .fold(DataType::Null, |acc, v| acc.unify(v.data_type()))
    }

    pub fn null_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_null()).count()
    }
}

/// In-memory columnar table.
///
/// All columns have exactly [`Table::height`] values, so every materialized row carries the
/// same set of keys.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    columns: Vec<Column>,
    height: usize,
}

impl Table {
    /// A table with `height` rows and no columns yet.
    pub fn with_height(height: usize) -> Self {
        Self {
            columns: Vec::new(),
            height,
        }
    }

    /// Build a table from columns, checking that lengths agree and names are unique.
    pub fn from_columns(columns: Vec<Column>) -> RowpadResult<Self> {
        let height = columns.first().map(Column::len).unwrap_or(0);
        let mut table = Self::with_height(height);
        for column in columns {
            if table.has_column(&column.name) {
                return Err(RowpadError::engine(format!(
                    "duplicate column '{}'",
                    column.name
                )));
            }
            table.upsert_column(column)?;
        }
        Ok(table)
    }

    /// Number of rows.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Number of columns.
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.index_of(name).is_some()
    }

    /// Inferred schema of the table.
    pub fn schema(&self) -> Schema {
        Schema::new(
            self.columns
                .iter()
                .map(|c| Field::new(c.name.clone(), c.data_type()))
                .collect(),
        )
    }

    /// Insert a column, replacing an existing column of the same name in place.
    ///
    /// Returns `true` when an existing column was replaced.
    pub fn upsert_column(&mut self, column: Column) -> RowpadResult<bool> {
        if column.len() != self.height {
            return Err(RowpadError::engine(format!(
                "column '{}' has {} values, table has {} rows",
                column.name,
                column.len(),
                self.height
            )));
        }
        match self.index_of(&column.name) {
            Some(idx) => {
                self.columns[idx] = column;
                Ok(true)
            }
            None => {
                self.columns.push(column);
                Ok(false)
            }
        }
    }

    /// Rewrite every value of a column. Returns `false` if the column does not exist.
    pub fn map_column<F>(&mut self, name: &str, mut f: F) -> bool
    where
        F: FnMut(&Value) -> Value,
    {
        match self.columns.iter_mut().find(|c| c.name == name) {
            Some(column) => {
                for v in column.values.iter_mut() {
                    *v = f(v);
                }
                true
            }
            None => false,
        }
    }

    /// Project the named columns, in the given order. Unknown names are ignored.
    pub fn select(&self, names: &[&str]) -> Self {
        let columns = names
            .iter()
            .filter_map(|name| self.column(name).cloned())
            .collect();
        Self {
            columns,
            height: self.height,
        }
    }

    /// Keep the rows whose mask entry is `true`.
    pub fn filter_mask(&self, mask: &[bool]) -> Self {
        let indices: Vec<usize> = mask
            .iter()
            .enumerate()
            .filter_map(|(i, keep)| keep.then_some(i))
            .collect();
        self.take(&indices)
    }

    /// Build a table from the given row indices, in that order.
    pub fn take(&self, indices: &[usize]) -> Self {
        let columns = self
            .columns
            .iter()
            .map(|c| {
                Column::new(
                    c.name.clone(),
                    indices
                        .iter()
                        .map(|&i| c.values.get(i).cloned().unwrap_or(Value::Null))
                        .collect(),
                )
            })
            .collect();
        Self {
            columns,
            height: indices.len(),
        }
    }

    /// The first `n` rows.
    pub fn head(&self, n: usize) -> Self {
        let indices: Vec<usize> = (0..n.min(self.height)).collect();
        self.take(&indices)
    }

    /// Cell lookup by row index and column name.
    pub fn value(&self, row: usize, column: &str) -> Option<&Value> {
        self.column(column).and_then(|c| c.values.get(row))
    }

    /// Materialize rows as ordered JSON records.
    pub fn to_records(&self) -> Vec<FlatRow> {
        (0..self.height)
            .map(|row| {
                self.columns
                    .iter()
                    .map(|c| (c.name.clone(), c.values[row].to_json()))
                    .collect()
            })
            .collect()
    }

    /// Build a table from records. The column set is the union of keys in first-seen order;
    /// absent keys become `Null`.
    pub fn from_records(records: &[FlatRow]) -> Self {
        let mut order: Vec<String> = Vec::new();
        let mut seen: HashMap<&str, usize> = HashMap::new();
        for record in records {
            for key in record.keys() {
                if !seen.contains_key(key.as_str()) {
                    seen.insert(key.as_str(), order.len());
                    order.push(key.clone());
                }
            }
        }

        let columns = order
            .iter()
            .map(|name| {
                Column::new(
                    name.clone(),
                    records
                        .iter()
                        .map(|r| r.get(name).map(Value::from_json).unwrap_or(Value::Null))
                        .collect(),
                )
            })
            .collect();

        Self {
            columns,
            height: records.len(),
        }
    }
}
