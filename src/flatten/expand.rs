//! Row expansion with padding.
//!
//! The output height is the length of the longest array field (at least one row). Scalars and
//! flattened struct leaves are repeated on every row; each array contributes its elements row by
//! row and the padding sentinel where it has run out.

use std::collections::HashMap;

use serde_json::{Map, Value as JsonValue};

use crate::error::RowpadResult;
use crate::observability::{Diagnostics, PipelineEvent};
use crate::types::{Column, Table, Value};

use super::classify::{flatten_structs, group_numeric_suffixes, ClassifiedFields};
use super::{FlattenOptions, PaddingPolicy, ScalarArrayNaming, ROW_NUMBER_COLUMN};

/// An array field awaiting expansion.
struct ArrayField {
    name: String,
    items: Vec<JsonValue>,
    /// Scalar elements use the bare field name (suffix-grouped arrays).
    bare: bool,
}

/// Expand classified fields into a padded, rectangular table.
pub fn expand(classified: &ClassifiedFields, options: &FlattenOptions) -> RowpadResult<Table> {
    expand_with(classified, options, Diagnostics::silent())
}

pub(crate) fn expand_with(
    classified: &ClassifiedFields,
    options: &FlattenOptions,
    diag: Diagnostics<'_>,
) -> RowpadResult<Table> {
    let flattened = flatten_structs(&classified.structs);

    let mut broadcast: Vec<(String, JsonValue)> = classified.scalars.clone();
    broadcast.extend(flattened.leaves);

    let mut arrays: Vec<ArrayField> = classified
        .arrays
        .iter()
        .cloned()
        .chain(flattened.arrays)
        .map(|(name, items)| ArrayField {
            name,
            items,
            bare: false,
        })
        .collect();

    if options.group_numeric_suffixes {
        let grouping = group_numeric_suffixes(broadcast);
        broadcast = grouping.remaining;
        for (base, items) in grouping.groups {
            diag.emit(PipelineEvent::SuffixGroupFormed {
                base: base.clone(),
                members: items.len(),
            });
            arrays.push(ArrayField {
                name: base,
                items,
                bare: true,
            });
        }
    }

    let row_count = arrays.iter().map(|a| a.items.len()).max().unwrap_or(0).max(1);

    let mut table = Table::with_height(row_count);
    table.upsert_column(Column::new(
        ROW_NUMBER_COLUMN,
        (1..=row_count as i64).map(Value::Int64).collect(),
    ))?;

    for (name, raw) in broadcast {
        let value = match (Value::from_json(&raw), options.padding) {
            (Value::Null, PaddingPolicy::Zero) => PaddingPolicy::Zero.sentinel(),
            (v, _) => v,
        };
        insert(&mut table, Column::filled(name, value, row_count), diag)?;
    }

    for array in &arrays {
        for column in array_columns(array, row_count, options) {
            insert(&mut table, column, diag)?;
        }
    }

    diag.emit(PipelineEvent::RowsExpanded {
        rows: table.height(),
        columns: table.width(),
    });
    Ok(table)
}

/// Document columns named `rn` never replace the generated row numbers; they are dropped with a
/// collision warning.
fn insert(table: &mut Table, column: Column, diag: Diagnostics<'_>) -> RowpadResult<()> {
    let name = column.name.clone();
    if name == ROW_NUMBER_COLUMN {
        diag.emit(PipelineEvent::ColumnCollision { column: name });
        return Ok(());
    }
    if table.upsert_column(column)? {
        diag.emit(PipelineEvent::ColumnCollision { column: name });
    }
    Ok(())
}

/// Build the padded columns of one array field.
///
/// Object elements contribute `{array}_{key}` columns (union of keys over all elements, in
/// first-seen order); scalar elements share one scalar column. A `null` element, a key missing
/// from an element, and rows past the end of the array hold the padding sentinel.
fn array_columns(array: &ArrayField, row_count: usize, options: &FlattenOptions) -> Vec<Column> {
    let scalar_name = if array.bare || options.scalar_array_naming == ScalarArrayNaming::Bare {
        array.name.clone()
    } else {
        format!("{}_value", array.name)
    };

    let mut builder = ColumnSet::new(row_count, options.padding.sentinel());
    for (row, item) in array.items.iter().enumerate() {
        match item {
            JsonValue::Null => {}
            JsonValue::Object(obj) => {
                for (key, leaf) in element_leaves(obj) {
                    builder.set(format!("{}_{key}", array.name), row, Value::from_json(&leaf));
                }
            }
            other => builder.set(scalar_name.clone(), row, Value::from_json(other)),
        }
    }
    if builder.columns.is_empty() {
        builder.slot(scalar_name);
    }
    builder.columns
}

/// Columns of one array field, created on first write and pre-filled with the sentinel.
struct ColumnSet {
    columns: Vec<Column>,
    index: HashMap<String, usize>,
    row_count: usize,
    sentinel: Value,
}

impl ColumnSet {
    fn new(row_count: usize, sentinel: Value) -> Self {
        Self {
            columns: Vec::new(),
            index: HashMap::new(),
            row_count,
            sentinel,
        }
    }

    fn slot(&mut self, name: String) -> usize {
        if let Some(&idx) = self.index.get(&name) {
            return idx;
        }
        self.columns
            .push(Column::filled(name.clone(), self.sentinel.clone(), self.row_count));
        self.index.insert(name, self.columns.len() - 1);
        self.columns.len() - 1
    }

    fn set(&mut self, name: String, row: usize, value: Value) {
        let idx = self.slot(name);
        self.columns[idx].values[row] = value;
    }
}

/// Flatten one array element. Nested objects join keys with `_`; nested arrays stay as JSON.
fn element_leaves(obj: &Map<String, JsonValue>) -> Vec<(String, JsonValue)> {
    let mut out = Vec::new();
    collect_leaves(None, obj, &mut out);
    out
}

fn collect_leaves(prefix: Option<&str>, obj: &Map<String, JsonValue>, out: &mut Vec<(String, JsonValue)>) {
    for (key, value) in obj {
        let name = match prefix {
            Some(p) => format!("{p}_{key}"),
            None => key.clone(),
        };
        match value {
            JsonValue::Object(nested) => collect_leaves(Some(&name), nested, out),
            _ => out.push((name, value.clone())),
        }
    }
}
