//! Row-padding flattener: nested JSON document → rectangular [`crate::types::Table`].
//!
//! Flattening happens in three steps:
//!
//! - [`classify::classify`] partitions the top-level keys into scalars, structs and arrays
//! - [`classify::flatten_structs`] rewrites structs into `{parent}_{child}` leaves
//! - [`expand::expand`] sizes the table by the longest array and broadcasts/pads every field
//!
//! ## Example
//!
//! ```rust
//! use rowpad::flatten::{flatten_document, PipelineOptions};
//! use rowpad::types::Value;
//! use serde_json::json;
//!
//! let doc = json!({"name": "Bob", "tags": ["a", "b", "c"]});
//! let table = flatten_document(&doc, &PipelineOptions::default()).unwrap();
//!
//! assert_eq!(table.height(), 3);
//! assert_eq!(table.value(2, "name"), Some(&Value::Utf8("Bob".to_string())));
//! assert_eq!(table.value(2, "tags_value"), Some(&Value::Utf8("c".to_string())));
//! ```

pub mod classify;
pub mod expand;

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Map, Value as JsonValue};

use crate::error::{RowpadError, RowpadResult};
use crate::observability::{DiagnosticSeverity, Diagnostics, PipelineEvent, PipelineObserver};
use crate::types::{Table, Value};

/// Name of the generated row-number column.
pub const ROW_NUMBER_COLUMN: &str = "rn";

/// Sentinel written where an array has no element for a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaddingPolicy {
    /// Pad with `null`.
    #[default]
    Null,
    /// Pad with `0`; null broadcast scalars are zero-filled as well.
    Zero,
}

impl PaddingPolicy {
    pub fn sentinel(self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Zero => Value::Int64(0),
        }
    }
}

/// Column name used for scalar elements of an array field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarArrayNaming {
    /// `{array}_value`
    #[default]
    ValueSuffix,
    /// `{array}`
    Bare,
}

/// Options controlling the shape of flattened output.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct FlattenOptions {
    pub padding: PaddingPolicy,
    pub scalar_array_naming: ScalarArrayNaming,
    /// Group sibling keys like `size-1`, `size-2` into an array field `size`.
    ///
    /// Off by default: it reshapes any same-prefixed fields ending in a number.
    pub group_numeric_suffixes: bool,
}

/// Options shared by every pipeline entrypoint.
///
/// Use [`Default`] for common cases.
#[derive(Clone)]
pub struct PipelineOptions {
    pub flatten: FlattenOptions,
    /// Optional observer for diagnostic events.
    pub observer: Option<Arc<dyn PipelineObserver>>,
    /// Events below this severity are not delivered.
    pub min_severity: DiagnosticSeverity,
}

impl fmt::Debug for PipelineOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineOptions")
            .field("flatten", &self.flatten)
            .field("observer_set", &self.observer.is_some())
            .field("min_severity", &self.min_severity)
            .finish()
    }
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            flatten: FlattenOptions::default(),
            observer: None,
            min_severity: DiagnosticSeverity::Info,
        }
    }
}

impl PipelineOptions {
    pub(crate) fn diagnostics(&self) -> Diagnostics<'_> {
        Diagnostics::new(self.observer.as_ref(), self.min_severity)
    }
}

/// Parse raw JSON text into a document.
pub fn parse_document(input: &str) -> RowpadResult<JsonValue> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(RowpadError::malformed("json input is empty"));
    }
    Ok(serde_json::from_str(trimmed)?)
}

/// Flatten a parsed document into a padded table.
///
/// Non-object documents are not rejected: `null` flattens like `{}` and any other value is
/// wrapped as `{"value": doc}`.
pub fn flatten_document(doc: &JsonValue, options: &PipelineOptions) -> RowpadResult<Table> {
    let diag = options.diagnostics();
    let object = document_object(doc, diag);
    let classified = classify::classify(&object);
    diag.emit(PipelineEvent::DocumentClassified {
        scalars: classified.scalars.len(),
        structs: classified.structs.len(),
        arrays: classified.arrays.len(),
    });
    expand::expand_with(&classified, &options.flatten, diag)
}

/// Parse and flatten raw JSON text.
pub fn flatten_str(input: &str, options: &PipelineOptions) -> RowpadResult<Table> {
    let doc = parse_document(input)?;
    flatten_document(&doc, options)
}

fn document_object<'a>(doc: &'a JsonValue, diag: Diagnostics<'_>) -> Cow<'a, Map<String, JsonValue>> {
    match doc {
        JsonValue::Object(map) => Cow::Borrowed(map),
        JsonValue::Null => Cow::Owned(Map::new()),
        other => {
            diag.emit(PipelineEvent::DocumentWrapped {
                json_type: json_type_name(other),
            });
            let mut map = Map::new();
            map.insert("value".to_string(), other.clone());
            Cow::Owned(map)
        }
    }
}

fn json_type_name(v: &JsonValue) -> &'static str {
    match v {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "bool",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}
