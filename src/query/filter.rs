//! Row filters and the date-range stage.
//!
//! Comparison, membership and range operators read a null cell as `0`, so
//! `greaterThan -1` keeps null rows. `isNull`/`isNotNull` look at the raw cell and substring
//! operators use its text; a null cell never contains anything.

use std::cmp::Ordering;

use chrono::{DateTime, Days, NaiveDate, NaiveDateTime};
use serde_json::Value as JsonValue;

use crate::observability::{Diagnostics, PipelineEvent, QueryStage};
use crate::types::{Table, Value};

use super::model::{DateRangeSpec, FilterOperator, FilterSpec};

/// A filter compiled against its operand.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Compare { operator: FilterOperator, target: Value },
    Contains { needle: String, negate: bool },
    /// Both the cell and the set members read `Null` as `0`.
    Membership { set: Vec<Value>, negate: bool },
    Between { low: Value, high: Value },
    IsNull,
    IsNotNull,
}

impl Predicate {
    /// Compile a filter. `Err` carries the reason the filter cannot be evaluated.
    pub fn compile(spec: &FilterSpec) -> Result<Self, String> {
        use FilterOperator as Op;

        match spec.operator {
            Op::IsNull => return Ok(Self::IsNull),
            Op::IsNotNull => return Ok(Self::IsNotNull),
            _ => {}
        }

        let value = match &spec.value {
            None | Some(JsonValue::Null) => return Err("no value given".to_string()),
            Some(v) => v,
        };

        match spec.operator {
            Op::Equals
            | Op::NotEquals
            | Op::GreaterThan
            | Op::LessThan
            | Op::GreaterThanOrEqual
            | Op::LessThanOrEqual => Ok(Self::Compare {
                operator: spec.operator,
                target: scalar(value)?,
            }),
            Op::Contains | Op::NotContains => {
                let needle = scalar(value)?
                    .text()
                    .ok_or_else(|| "no value given".to_string())?;
                Ok(Self::Contains {
                    needle,
                    negate: spec.operator == Op::NotContains,
                })
            }
            Op::In | Op::NotIn => match value {
                JsonValue::Array(items) => Ok(Self::Membership {
                    set: items.iter().map(|v| Value::from_json(v).or_zero()).collect(),
                    negate: spec.operator == Op::NotIn,
                }),
                _ => Err("expected an array value".to_string()),
            },
            Op::Between => match value.as_array().map(Vec::as_slice) {
                Some([low, high]) => Ok(Self::Between {
                    low: scalar(low)?,
                    high: scalar(high)?,
                }),
                _ => Err("expected a [low, high] array".to_string()),
            },
            Op::IsNull => Ok(Self::IsNull),
            Op::IsNotNull => Ok(Self::IsNotNull),
        }
    }

    /// Evaluate against one cell.
    pub fn matches(&self, cell: &Value) -> bool {
        match self {
            Self::IsNull => cell.is_null(),
            Self::IsNotNull => !cell.is_null(),
            Self::Contains { needle, negate } => {
                let found = cell.text().is_some_and(|t| t.contains(needle.as_str()));
                found != *negate
            }
            Self::Compare { operator, target } => {
                let ord = cell.or_zero().loose_cmp(target);
                match operator {
                    FilterOperator::Equals => ord == Some(Ordering::Equal),
                    FilterOperator::NotEquals => ord != Some(Ordering::Equal),
                    FilterOperator::GreaterThan => ord == Some(Ordering::Greater),
                    FilterOperator::LessThan => ord == Some(Ordering::Less),
                    FilterOperator::GreaterThanOrEqual => {
                        matches!(ord, Some(Ordering::Greater | Ordering::Equal))
                    }
                    FilterOperator::LessThanOrEqual => {
                        matches!(ord, Some(Ordering::Less | Ordering::Equal))
                    }
                    _ => false,
                }
            }
            Self::Membership { set, negate } => {
                let cell = cell.or_zero();
                set.iter().any(|v| cell.loose_eq(v)) != *negate
            }
            Self::Between { low, high } => {
                let cell = cell.or_zero();
                matches!(cell.loose_cmp(low), Some(Ordering::Greater | Ordering::Equal))
                    && matches!(cell.loose_cmp(high), Some(Ordering::Less | Ordering::Equal))
            }
        }
    }
}

fn scalar(v: &JsonValue) -> Result<Value, String> {
    match v {
        JsonValue::Array(_) | JsonValue::Object(_) => Err("expected a scalar value".to_string()),
        other => Ok(Value::from_json(other)),
    }
}

/// Apply filters in order (logical AND).
///
/// A filter on an unknown column, or one that cannot be compiled, is skipped with a warning.
pub(crate) fn apply_filters(table: &Table, filters: &[FilterSpec], diag: Diagnostics<'_>) -> Table {
    let mut current = table.clone();
    for spec in filters {
        let Some(column) = current.column(&spec.field) else {
            diag.emit(PipelineEvent::UnknownField {
                stage: QueryStage::Filter,
                field: spec.field.clone(),
            });
            continue;
        };
        let predicate = match Predicate::compile(spec) {
            Ok(p) => p,
            Err(reason) => {
                diag.emit(PipelineEvent::FilterSkipped {
                    field: spec.field.clone(),
                    reason,
                });
                continue;
            }
        };
        let mask: Vec<bool> = column.values.iter().map(|v| predicate.matches(v)).collect();
        current = current.filter_mask(&mask);
    }
    current
}

/// One end of a date range.
#[derive(Debug, Clone, PartialEq)]
struct Bound {
    raw: Value,
    instant: Option<NaiveDateTime>,
    /// The bound was a bare date (`YYYY-MM-DD`).
    date_only: bool,
}

impl Bound {
    fn parse(v: Option<&JsonValue>) -> Option<Self> {
        let raw = match v? {
            JsonValue::Null => return None,
            JsonValue::String(s) if s.trim().is_empty() => return None,
            other => Value::from_json(other),
        };
        let parsed = match &raw {
            Value::Utf8(s) => parse_datetime(s),
            _ => None,
        };
        Some(Self {
            raw,
            instant: parsed.map(|(dt, _)| dt),
            date_only: parsed.is_some_and(|(_, d)| d),
        })
    }

    fn after_start(&self, cell: &Value) -> bool {
        matches!(compare(cell, self), Some(Ordering::Greater | Ordering::Equal))
    }

    fn before_end(&self, cell: &Value) -> bool {
        if self.date_only {
            if let (Some(end), Some(at)) = (self.instant, cell_datetime(cell)) {
                return match end.checked_add_days(Days::new(1)) {
                    Some(next_day) => at < next_day,
                    None => true,
                };
            }
        }
        matches!(compare(cell, self), Some(Ordering::Less | Ordering::Equal))
    }
}

/// Dates when both sides parse, otherwise numbers, otherwise text.
fn compare(cell: &Value, bound: &Bound) -> Option<Ordering> {
    if let (Some(at), Some(b)) = (cell_datetime(cell), bound.instant) {
        return Some(at.cmp(&b));
    }
    if let (Some(a), Some(b)) = (cell.numeric_lossy(), bound.raw.numeric_lossy()) {
        return a.partial_cmp(&b);
    }
    match (cell, &bound.raw) {
        (Value::Null, _) => None,
        (a, b) => a.text().zip(b.text()).map(|(a, b)| a.cmp(&b)),
    }
}

fn cell_datetime(cell: &Value) -> Option<NaiveDateTime> {
    match cell {
        Value::Utf8(s) => parse_datetime(s).map(|(dt, _)| dt),
        _ => None,
    }
}

/// Parse an RFC 3339 timestamp, a naive `YYYY-MM-DD[T ]HH:MM:SS[.f]`, or a bare date.
///
/// The flag is `true` for bare dates.
pub fn parse_datetime(s: &str) -> Option<(NaiveDateTime, bool)> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some((dt.naive_utc(), false));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some((dt, false));
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| (dt, true))
}

/// Keep rows whose `field` lies within `[startDate, endDate]`. Null cells are dropped.
pub(crate) fn apply_date_range(table: &Table, range: &DateRangeSpec, diag: Diagnostics<'_>) -> Table {
    let Some(column) = table.column(&range.field) else {
        diag.emit(PipelineEvent::UnknownField {
            stage: QueryStage::DateRange,
            field: range.field.clone(),
        });
        return table.clone();
    };

    let start = Bound::parse(range.start_date.as_ref());
    let end = Bound::parse(range.end_date.as_ref());
    let mask: Vec<bool> = column
        .values
        .iter()
        .map(|cell| {
            !cell.is_null()
                && start.as_ref().is_none_or(|b| b.after_start(cell))
                && end.as_ref().is_none_or(|b| b.before_end(cell))
        })
        .collect();
    table.filter_mask(&mask)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{apply_date_range, apply_filters, parse_datetime, Predicate};
    use crate::observability::Diagnostics;
    use crate::query::model::{DateRangeSpec, FilterOperator as Op, FilterSpec};
    use crate::types::{Column, Table, Value};

    fn table() -> Table {
        Table::from_columns(vec![
            Column::new(
                "x",
                vec![Value::Null, Value::Int64(-1), Value::Int64(5), Value::Float64(2.5)],
            ),
            Column::new(
                "name",
                vec![
                    Value::Utf8("alpha".to_string()),
                    Value::Null,
                    Value::Utf8("beta".to_string()),
                    Value::Utf8("alphabet".to_string()),
                ],
            ),
        ])
        .unwrap()
    }

    fn run(filters: Vec<FilterSpec>) -> Vec<Value> {
        apply_filters(&table(), &filters, Diagnostics::silent())
            .column("x")
            .unwrap()
            .values
            .clone()
    }

    #[test]
    fn greater_than_reads_null_as_zero() {
        let out = run(vec![FilterSpec::new("x", Op::GreaterThan, Some(json!(-1)))]);
        assert_eq!(out, vec![Value::Null, Value::Int64(5), Value::Float64(2.5)]);
    }

    #[test]
    fn equals_zero_matches_null() {
        let out = run(vec![FilterSpec::new("x", Op::Equals, Some(json!(0)))]);
        assert_eq!(out, vec![Value::Null]);
    }

    #[test]
    fn filters_combine_with_and() {
        let out = run(vec![
            FilterSpec::new("x", Op::GreaterThanOrEqual, Some(json!(0))),
            FilterSpec::new("name", Op::Contains, Some(json!("alpha"))),
        ]);
        assert_eq!(out, vec![Value::Null, Value::Float64(2.5)]);
    }

    #[test]
    fn substring_and_null_checks_use_raw_cells() {
        assert_eq!(
            run(vec![FilterSpec::new("name", Op::NotContains, Some(json!("alpha")))]),
            vec![Value::Int64(-1), Value::Int64(5)]
        );
        assert_eq!(run(vec![FilterSpec::new("x", Op::IsNull, None)]), vec![Value::Null]);
        assert_eq!(run(vec![FilterSpec::new("x", Op::IsNotNull, None)]).len(), 3);
    }

    #[test]
    fn membership_and_between() {
        assert_eq!(
            run(vec![FilterSpec::new("x", Op::In, Some(json!([0, 5])))]),
            vec![Value::Null, Value::Int64(5)]
        );
        assert_eq!(
            run(vec![FilterSpec::new("x", Op::NotIn, Some(json!([0, 5])))]),
            vec![Value::Int64(-1), Value::Float64(2.5)]
        );
        assert_eq!(
            run(vec![FilterSpec::new("x", Op::Between, Some(json!([-1, 2.5])))]),
            vec![Value::Null, Value::Int64(-1), Value::Float64(2.5)]
        );
    }

    #[test]
    fn null_in_membership_set_reads_as_zero() {
        assert_eq!(
            run(vec![FilterSpec::new("x", Op::In, Some(json!([null])))]),
            vec![Value::Null]
        );
        assert_eq!(
            run(vec![FilterSpec::new("x", Op::NotIn, Some(json!([null, 5])))]),
            vec![Value::Int64(-1), Value::Float64(2.5)]
        );
    }

    #[test]
    fn unusable_filters_are_skipped() {
        assert_eq!(run(vec![FilterSpec::new("missing", Op::Equals, Some(json!(1)))]).len(), 4);
        assert_eq!(run(vec![FilterSpec::new("x", Op::Equals, None)]).len(), 4);
        assert_eq!(run(vec![FilterSpec::new("x", Op::In, Some(json!(3)))]).len(), 4);
        assert!(Predicate::compile(&FilterSpec::new("x", Op::Between, Some(json!([1])))).is_err());
    }

    #[test]
    fn incomparable_values_only_pass_not_equals() {
        let p = Predicate::compile(&FilterSpec::new("x", Op::GreaterThan, Some(json!("abc")))).unwrap();
        assert!(!p.matches(&Value::Int64(1)));
        let p = Predicate::compile(&FilterSpec::new("x", Op::NotEquals, Some(json!("abc")))).unwrap();
        assert!(p.matches(&Value::Int64(1)));
        let p = Predicate::compile(&FilterSpec::new("x", Op::LessThan, Some(json!("10")))).unwrap();
        assert!(p.matches(&Value::Int64(9)));
    }

    fn dates() -> Table {
        Table::from_columns(vec![Column::new(
            "day",
            vec![
                Value::Utf8("2024-01-01".to_string()),
                Value::Utf8("2024-01-15T10:30:00Z".to_string()),
                Value::Utf8("2024-01-31 23:00:00".to_string()),
                Value::Utf8("2024-02-01".to_string()),
                Value::Null,
            ],
        )])
        .unwrap()
    }

    #[test]
    fn date_range_is_inclusive_and_covers_whole_end_day() {
        let range = DateRangeSpec {
            field: "day".to_string(),
            start_date: Some(json!("2024-01-01")),
            end_date: Some(json!("2024-01-31")),
        };
        let out = apply_date_range(&dates(), &range, Diagnostics::silent());
        assert_eq!(out.height(), 3);
        assert_eq!(out.value(2, "day"), Some(&Value::Utf8("2024-01-31 23:00:00".to_string())));
    }

    #[test]
    fn open_ended_date_range_drops_nulls() {
        let range = DateRangeSpec {
            field: "day".to_string(),
            start_date: Some(json!("2024-01-15T00:00:00")),
            end_date: None,
        };
        let out = apply_date_range(&dates(), &range, Diagnostics::silent());
        assert_eq!(out.height(), 3);
    }

    #[test]
    fn numeric_range_falls_back_to_numbers() {
        let t = Table::from_columns(vec![Column::new(
            "year",
            vec![Value::Int64(2019), Value::Int64(2021), Value::Int64(2023)],
        )])
        .unwrap();
        let range = DateRangeSpec {
            field: "year".to_string(),
            start_date: Some(json!(2020)),
            end_date: Some(json!("2022")),
        };
        let out = apply_date_range(&t, &range, Diagnostics::silent());
        assert_eq!(out.column("year").unwrap().values, vec![Value::Int64(2021)]);
    }

    #[test]
    fn parses_supported_formats() {
        assert_eq!(parse_datetime("2024-03-01").map(|(_, d)| d), Some(true));
        assert_eq!(parse_datetime("2024-03-01T08:00:00.250").map(|(_, d)| d), Some(false));
        assert!(parse_datetime("2024-03-01T08:00:00+02:00").is_some());
        assert!(parse_datetime("March 1st").is_none());
    }
}
