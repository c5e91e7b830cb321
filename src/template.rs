//! Template type resolution.
//!
//! A template is a form-builder schema describing the declared type of each field. Two shapes
//! are recognized:
//!
//! - **grouped**: `{"groups": [{"items": [{"properties": {"key": "price", "inputoptiontype": "number"}}]}]}`;
//!   a non-empty `dateoptiontype` takes priority over `inputoptiontype`
//! - **legacy**: any nested object; every sub-object carrying `inputoptiontype` declares the type
//!   of its immediate key, found depth first (including inside arrays)
//!
//! Flattened column names are matched exactly first, then by their last `_` segment, so
//! `items_price` resolves through a template key `price`.

use std::collections::HashMap;

use serde_json::{Map, Value as JsonValue};

use crate::error::RowpadResult;
use crate::flatten::{flatten_document, PipelineOptions, ROW_NUMBER_COLUMN};
use crate::observability::{Diagnostics, PipelineEvent};
use crate::types::{FlatRow, Table, Value};

/// Declared type that triggers numeric coercion.
pub const NUMBER_TYPE: &str = "number";

const INPUT_TYPE_KEY: &str = "inputoptiontype";
const DATE_TYPE_KEY: &str = "dateoptiontype";

/// Which template layout a document was read as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateShape {
    Grouped,
    Legacy,
    /// Neither layout produced a field; the type map is empty.
    Unrecognized,
}

/// Field name → declared type, in template declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldTypeMap {
    entries: Vec<(String, String)>,
    index: HashMap<String, usize>,
}

impl FieldTypeMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a field type. Overwriting keeps the original position.
    pub fn insert(&mut self, field: impl Into<String>, data_type: impl Into<String>) {
        let field = field.into();
        let data_type = data_type.into();
        match self.index.get(&field) {
            Some(&i) => self.entries[i].1 = data_type,
            None => {
                self.index.insert(field.clone(), self.entries.len());
                self.entries.push((field, data_type));
            }
        }
    }

    /// Exact lookup.
    pub fn get(&self, field: &str) -> Option<&str> {
        self.index.get(field).map(|&i| self.entries[i].1.as_str())
    }

    /// Lookup for a flattened column: exact name, then the segment after the last `_`.
    pub fn resolve(&self, column: &str) -> Option<&str> {
        self.get(column).or_else(|| {
            column
                .rsplit_once('_')
                .and_then(|(_, base)| self.get(base))
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Field names whose type equals `filter_type`, or every field when `None`.
    pub fn fields_of_type(&self, filter_type: Option<&str>) -> Vec<String> {
        self.iter()
            .filter(|(_, ty)| filter_type.is_none_or(|f| f == *ty))
            .map(|(name, _)| name.to_string())
            .collect()
    }

    fn keeps(&self, column: &str, filter_type: Option<&str>) -> bool {
        match self.resolve(column) {
            Some(ty) => filter_type.is_none_or(|f| f == ty),
            None => false,
        }
    }
}

/// Extract field types from a template of either shape.
pub fn extract_field_types(template: &JsonValue) -> FieldTypeMap {
    read_template(template).0
}

/// Extract field types and report which shape was recognized.
pub fn read_template(template: &JsonValue) -> (FieldTypeMap, TemplateShape) {
    if let Some(groups) = template.get("groups").and_then(JsonValue::as_array) {
        return (read_grouped(groups), TemplateShape::Grouped);
    }

    let mut types = FieldTypeMap::new();
    walk_legacy(template, &mut types);
    if types.is_empty() {
        (types, TemplateShape::Unrecognized)
    } else {
        (types, TemplateShape::Legacy)
    }
}

pub(crate) fn read_template_with(template: &JsonValue, diag: Diagnostics<'_>) -> FieldTypeMap {
    let (types, shape) = read_template(template);
    match shape {
        TemplateShape::Unrecognized => diag.emit(PipelineEvent::TemplateShapeUnrecognized),
        shape => diag.emit(PipelineEvent::TemplateResolved {
            shape,
            fields: types.len(),
        }),
    }
    types
}

fn read_grouped(groups: &[JsonValue]) -> FieldTypeMap {
    let mut types = FieldTypeMap::new();
    let properties = groups
        .iter()
        .filter_map(|g| g.get("items").and_then(JsonValue::as_array))
        .flatten()
        .filter_map(|item| item.get("properties").and_then(JsonValue::as_object));

    for props in properties {
        let key = non_empty_str(props.get("key"));
        let data_type = non_empty_str(props.get(DATE_TYPE_KEY))
            .or_else(|| non_empty_str(props.get(INPUT_TYPE_KEY)));
        if let (Some(key), Some(data_type)) = (key, data_type) {
            types.insert(key, data_type);
        }
    }
    types
}

fn walk_legacy(value: &JsonValue, types: &mut FieldTypeMap) {
    match value {
        JsonValue::Object(map) => {
            for (key, child) in map {
                visit_legacy(key, child, types);
            }
        }
        JsonValue::Array(items) => {
            for (i, child) in items.iter().enumerate() {
                visit_legacy(&i.to_string(), child, types);
            }
        }
        _ => {}
    }
}

fn visit_legacy(key: &str, value: &JsonValue, types: &mut FieldTypeMap) {
    match value {
        JsonValue::Object(map) => {
            if let Some(data_type) = non_empty_str(map.get(INPUT_TYPE_KEY)) {
                types.insert(key, data_type);
            }
            walk_legacy(value, types);
        }
        JsonValue::Array(items) => {
            for item in items.iter().filter(|i| i.is_object() || i.is_array()) {
                walk_legacy(item, types);
            }
        }
        _ => {}
    }
}

fn non_empty_str(v: Option<&JsonValue>) -> Option<&str> {
    v.and_then(JsonValue::as_str).filter(|s| !s.is_empty())
}

/// Field names declared in `template`, optionally restricted to one type.
pub fn fields_by_type(template: &JsonValue, filter_type: Option<&str>) -> Vec<String> {
    extract_field_types(template).fields_of_type(filter_type)
}

/// Keep the fields of one flattened row that the template declares.
///
/// `rn` is always kept. With `filter_type`, only fields of that type survive.
pub fn filter_fields_by_type(row: &FlatRow, field_types: &FieldTypeMap, filter_type: Option<&str>) -> FlatRow {
    row.iter()
        .filter(|(key, _)| key.as_str() == ROW_NUMBER_COLUMN || field_types.keeps(key, filter_type))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect::<Map<String, JsonValue>>()
}

/// Table-level counterpart of [`filter_fields_by_type`]: project `rn` plus declared columns.
pub fn select_typed_columns(table: &Table, field_types: &FieldTypeMap, filter_type: Option<&str>) -> Table {
    let keep: Vec<&str> = table
        .column_names()
        .filter(|name| *name == ROW_NUMBER_COLUMN || field_types.keeps(name, filter_type))
        .collect();
    table.select(&keep)
}

/// Cast every column declared as `number` to floats: empty string → null → parse → null → 0.
///
/// Returns the names of the coerced columns.
pub fn coerce_numeric_columns(table: &mut Table, field_types: &FieldTypeMap) -> Vec<String> {
    let targets: Vec<String> = table
        .column_names()
        .filter(|name| *name != ROW_NUMBER_COLUMN && field_types.resolve(name) == Some(NUMBER_TYPE))
        .map(str::to_string)
        .collect();
    for name in &targets {
        table.map_column(name, |v| Value::Float64(cast_f64(v).unwrap_or(0.0)));
    }
    targets
}

fn cast_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Null => None,
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        other => other.numeric_lossy(),
    }
}

/// Apply template projection and numeric coercion to a flattened table.
pub(crate) fn apply_template(
    table: &Table,
    template: &JsonValue,
    filter_type: Option<&str>,
    diag: Diagnostics<'_>,
) -> Table {
    let field_types = read_template_with(template, diag);
    let mut selected = select_typed_columns(table, &field_types, filter_type);
    let coerced = coerce_numeric_columns(&mut selected, &field_types);
    if !coerced.is_empty() {
        diag.emit(PipelineEvent::ColumnsCoerced { columns: coerced });
    }
    selected
}

/// Flatten a document, then keep `rn` plus the template's fields (optionally only those of
/// `filter_type`) and cast `number` fields.
pub fn flatten_with_template(
    doc: &JsonValue,
    template: &JsonValue,
    filter_type: Option<&str>,
    options: &PipelineOptions,
) -> RowpadResult<Table> {
    let table = flatten_document(doc, options)?;
    Ok(apply_template(&table, template, filter_type, options.diagnostics()))
}
