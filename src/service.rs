//! JSON boundary operations.
//!
//! Each operation takes a request payload and returns a serializable response. Transport
//! concerns (HTTP status codes, routing) belong to the caller; failures are reported as
//! [`ErrorResponse`].

use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::{RowpadError, RowpadResult};
use crate::flatten::{flatten_document, PipelineOptions};
use crate::query::{ChartQuery, QueryExecutor, QueryResult};
use crate::template::{fields_by_type as template_fields, flatten_with_template as template_flatten};
use crate::types::FlatRow;

/// `filterType` reported when no filter was requested.
pub const ALL_TYPES: &str = "all";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FlattenRequest {
    #[serde(default)]
    pub data: JsonValue,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateFlattenRequest {
    #[serde(default)]
    pub data: JsonValue,
    #[serde(default)]
    pub template: JsonValue,
    #[serde(default)]
    pub filter_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldsByTypeRequest {
    #[serde(default)]
    pub template: JsonValue,
    #[serde(default)]
    pub filter_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlattenResponse {
    pub success: bool,
    pub row_count: usize,
    pub rows: Vec<FlatRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateFlattenResponse {
    pub success: bool,
    pub row_count: usize,
    pub filter_type: String,
    pub rows: Vec<FlatRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldsByTypeResponse {
    pub success: bool,
    pub filter_type: String,
    pub field_count: usize,
    pub fields: Vec<String>,
}

/// Structured failure payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub message: String,
    /// Error class, see [`RowpadError::kind`].
    pub error: String,
}

impl From<&RowpadError> for ErrorResponse {
    fn from(err: &RowpadError) -> Self {
        Self {
            success: false,
            message: err.to_string(),
            error: err.kind().to_string(),
        }
    }
}

impl From<RowpadError> for ErrorResponse {
    fn from(err: RowpadError) -> Self {
        Self::from(&err)
    }
}

fn decode<T: DeserializeOwned>(payload: JsonValue) -> RowpadResult<T> {
    serde_json::from_value(payload).map_err(|e| RowpadError::malformed(format!("invalid request: {e}")))
}

fn require(value: &JsonValue, field: &str) -> RowpadResult<()> {
    if value.is_null() {
        return Err(RowpadError::malformed(format!("missing \"{field}\" field in request body")));
    }
    Ok(())
}

/// Empty filter strings mean "no filter".
fn requested_type(filter_type: Option<&str>) -> Option<&str> {
    filter_type.filter(|t| !t.is_empty())
}

/// `{data}` → `{rowCount, rows}`.
pub fn flatten(payload: JsonValue, options: &PipelineOptions) -> RowpadResult<FlattenResponse> {
    let req: FlattenRequest = decode(payload)?;
    require(&req.data, "data")?;
    let rows = flatten_document(&req.data, options)?.to_records();
    Ok(FlattenResponse {
        success: true,
        row_count: rows.len(),
        rows,
    })
}

/// `{data, template, filterType?}` → `{rowCount, filterType, rows}`.
pub fn flatten_with_template(payload: JsonValue, options: &PipelineOptions) -> RowpadResult<TemplateFlattenResponse> {
    let req: TemplateFlattenRequest = decode(payload)?;
    require(&req.data, "data")?;
    require(&req.template, "template")?;
    let filter_type = requested_type(req.filter_type.as_deref());
    let rows = template_flatten(&req.data, &req.template, filter_type, options)?.to_records();
    Ok(TemplateFlattenResponse {
        success: true,
        row_count: rows.len(),
        filter_type: filter_type.unwrap_or(ALL_TYPES).to_string(),
        rows,
    })
}

/// `{template, filterType?}` → `{filterType, fieldCount, fields}`.
pub fn fields_by_type(payload: JsonValue) -> RowpadResult<FieldsByTypeResponse> {
    let req: FieldsByTypeRequest = decode(payload)?;
    require(&req.template, "template")?;
    let filter_type = requested_type(req.filter_type.as_deref());
    let fields = template_fields(&req.template, filter_type);
    Ok(FieldsByTypeResponse {
        success: true,
        filter_type: filter_type.unwrap_or(ALL_TYPES).to_string(),
        field_count: fields.len(),
        fields,
    })
}

/// Chart query payload → [`QueryResult`].
///
/// Only an undecodable payload is an `Err`; pipeline failures come back as `success: false`.
pub fn chart_query(payload: JsonValue, options: &PipelineOptions) -> RowpadResult<QueryResult> {
    let query = ChartQuery::from_payload(payload)?;
    Ok(QueryExecutor::new(options.clone()).execute(&query))
}

/// The four boundary operations, addressable by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Flatten,
    FlattenWithTemplate,
    FieldsByType,
    ChartQuery,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Flatten => "flatten",
            Self::FlattenWithTemplate => "flatten-template",
            Self::FieldsByType => "fields",
            Self::ChartQuery => "query",
        }
    }

    /// Run the operation and serialize its response.
    pub fn run(self, payload: JsonValue, options: &PipelineOptions) -> Result<JsonValue, ErrorResponse> {
        let out = match self {
            Self::Flatten => flatten(payload, options).and_then(to_json),
            Self::FlattenWithTemplate => flatten_with_template(payload, options).and_then(to_json),
            Self::FieldsByType => fields_by_type(payload).and_then(to_json),
            Self::ChartQuery => chart_query(payload, options).and_then(to_json),
        };
        out.map_err(ErrorResponse::from)
    }
}

fn to_json<T: Serialize>(value: T) -> RowpadResult<JsonValue> {
    Ok(serde_json::to_value(value)?)
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = RowpadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "flatten" => Ok(Self::Flatten),
            "flatten-template" => Ok(Self::FlattenWithTemplate),
            "fields" => Ok(Self::FieldsByType),
            "query" => Ok(Self::ChartQuery),
            other => Err(RowpadError::malformed(format!("unknown operation '{other}'"))),
        }
    }
}
