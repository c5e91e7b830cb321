//! Chart query payloads and results.
//!
//! Field names follow the JSON wire format (`dateRange`, `countDistinct`, `filtersApplied`, ...).
//! Optional lists accept both a missing key and an explicit `null`.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;

use crate::error::{RowpadError, RowpadResult};
use crate::types::FlatRow;

/// Identifier reported in [`QueryMetadata::engine`].
pub const ENGINE_NAME: &str = "rowpad-columnar";

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// A BI-style query over one flattened document.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartQuery {
    /// The raw document to flatten.
    #[serde(default)]
    pub data: JsonValue,
    /// Optional template; when present, columns are pruned to declared fields and `number`
    /// fields are cast.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<JsonValue>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub dimensions: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub metrics: Vec<MetricSpec>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub filters: Vec<FilterSpec>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub sort: Vec<SortSpec>,
    /// Applied only when positive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_range: Option<DateRangeSpec>,
}

impl ChartQuery {
    /// Decode a query payload. A missing or `null` `data` field is malformed input.
    pub fn from_payload(payload: JsonValue) -> RowpadResult<Self> {
        let query: ChartQuery = serde_json::from_value(payload)
            .map_err(|e| RowpadError::malformed(format!("invalid chart query: {e}")))?;
        if query.data.is_null() {
            return Err(RowpadError::malformed("chart query requires 'data'"));
        }
        Ok(query)
    }

    /// Number of filter stages reported in metadata: every filter plus the date range.
    pub fn filters_applied(&self) -> usize {
        self.filters.len() + usize::from(self.date_range.is_some())
    }
}

/// A field plus the aggregation applied to it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct MetricSpec {
    pub field: String,
    pub aggregation: Aggregation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

impl MetricSpec {
    pub fn new(field: impl Into<String>, aggregation: Aggregation) -> Self {
        Self {
            field: field.into(),
            aggregation,
            alias: None,
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Output column name: the alias, or `{field}_{aggregation}`.
    pub fn output_name(&self) -> String {
        match &self.alias {
            Some(alias) => alias.clone(),
            None => format!("{}_{}", self.field, self.aggregation.as_str()),
        }
    }

    /// Name listed in [`QueryMetadata::metrics`]: the alias, or the field.
    pub fn label(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.field)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Aggregation {
    Sum,
    Avg,
    /// Non-null values.
    Count,
    Min,
    Max,
    Median,
    /// Sample standard deviation.
    Std,
    /// Distinct non-null values.
    CountDistinct,
}

impl Aggregation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sum => "sum",
            Self::Avg => "avg",
            Self::Count => "count",
            Self::Min => "min",
            Self::Max => "max",
            Self::Median => "median",
            Self::Std => "std",
            Self::CountDistinct => "countDistinct",
        }
    }

    /// Aggregations that fill nulls with zero and require numeric input.
    pub fn is_numeric(self) -> bool {
        !matches!(self, Self::Count | Self::CountDistinct)
    }
}

/// One predicate in the `filters` list. Filters combine with AND.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FilterSpec {
    pub field: String,
    pub operator: FilterOperator,
    /// Scalar for comparisons, array for `in`/`notIn`, `[low, high]` for `between`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<JsonValue>,
}

impl FilterSpec {
    pub fn new(field: impl Into<String>, operator: FilterOperator, value: Option<JsonValue>) -> Self {
        Self {
            field: field.into(),
            operator,
            value,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FilterOperator {
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
    GreaterThanOrEqual,
    LessThanOrEqual,
    Contains,
    NotContains,
    In,
    NotIn,
    IsNull,
    IsNotNull,
    Between,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SortSpec {
    pub field: String,
    #[serde(default)]
    pub direction: SortDirection,
}

impl SortSpec {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Desc,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

/// Inclusive range on one field. A missing, `null` or empty bound is open.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DateRangeSpec {
    pub field: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<JsonValue>,
}

/// Outcome of a chart query. Failures are reported here, never raised.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct QueryResult {
    pub success: bool,
    pub data: Vec<FlatRow>,
    pub metadata: QueryMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryMetadata {
    pub row_count: usize,
    pub dimensions: Vec<String>,
    pub metrics: Vec<String>,
    pub filters_applied: usize,
    pub engine: String,
    /// Wall-clock time in milliseconds.
    #[serde(rename = "executionTime")]
    pub execution_time_ms: u64,
}

impl QueryMetadata {
    pub(crate) fn for_query(query: &ChartQuery, row_count: usize, execution_time_ms: u64) -> Self {
        Self {
            row_count,
            dimensions: query.dimensions.clone(),
            metrics: query.metrics.iter().map(|m| m.label().to_string()).collect(),
            filters_applied: query.filters_applied(),
            engine: ENGINE_NAME.to_string(),
            execution_time_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{Aggregation, ChartQuery, FilterOperator, MetricSpec, QueryMetadata, SortDirection};

    #[test]
    fn decodes_wire_payload() {
        let q = ChartQuery::from_payload(json!({
            "data": {"a": 1},
            "dimensions": ["region"],
            "metrics": [{"field": "amount", "aggregation": "countDistinct", "alias": "n"}],
            "filters": [{"field": "x", "operator": "greaterThanOrEqual", "value": 3}],
            "sort": [{"field": "n", "direction": "desc"}, {"field": "region"}],
            "limit": 5,
            "dateRange": {"field": "day", "startDate": "2024-01-01"}
        }))
        .unwrap();

        assert_eq!(q.metrics[0].aggregation, Aggregation::CountDistinct);
        assert_eq!(q.filters[0].operator, FilterOperator::GreaterThanOrEqual);
        assert_eq!(q.sort[1].direction, SortDirection::Asc);
        assert_eq!(q.date_range.as_ref().unwrap().end_date, None);
        assert_eq!(q.filters_applied(), 2);
    }

    #[test]
    fn null_lists_are_empty() {
        let q = ChartQuery::from_payload(json!({"data": [], "dimensions": null, "filters": null})).unwrap();
        assert!(q.dimensions.is_empty());
        assert!(q.filters.is_empty());
        assert!(q.template.is_none());
    }

    #[test]
    fn missing_data_is_malformed() {
        let err = ChartQuery::from_payload(json!({"dimensions": ["a"]})).unwrap_err();
        assert_eq!(err.kind(), "malformed_input");
        let err = ChartQuery::from_payload(json!({"data": {}, "metrics": [{"field": "a", "aggregation": "mode"}]}))
            .unwrap_err();
        assert!(err.to_string().contains("invalid chart query"));
    }

    #[test]
    fn metric_names_default_to_field_and_aggregation() {
        let m = MetricSpec::new("amount", Aggregation::CountDistinct);
        assert_eq!(m.output_name(), "amount_countDistinct");
        assert_eq!(m.label(), "amount");
        let m = m.with_alias("total");
        assert_eq!(m.output_name(), "total");
        assert_eq!(m.label(), "total");
    }

    #[test]
    fn metadata_serializes_camel_case() {
        let q = ChartQuery {
            metrics: vec![MetricSpec::new("a", Aggregation::Sum)],
            ..Default::default()
        };
        let meta = serde_json::to_value(QueryMetadata::for_query(&q, 3, 12)).unwrap();
        assert_eq!(meta["rowCount"], json!(3));
        assert_eq!(meta["filtersApplied"], json!(0));
        assert_eq!(meta["executionTime"], json!(12));
        assert_eq!(meta["metrics"], json!(["a"]));
    }
}
