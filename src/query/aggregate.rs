//! Group-by and aggregation over a [`Table`].

use std::collections::{HashMap, HashSet};

use crate::error::{RowpadError, RowpadResult};
use crate::observability::{Diagnostics, PipelineEvent, QueryStage};
use crate::types::{Column, Table, Value, ValueKey};

use super::model::{Aggregation, MetricSpec};

/// Aggregate a sequence of cells.
///
/// `sum/avg/min/max/median/std` read nulls as `0` and fail on non-numeric cells. `count`
/// counts non-null cells and `countDistinct` counts distinct cells, `Null` being one value.
///
/// Over zero cells `sum` and `count` are `0`, everything else is `Null`.
pub fn aggregate<'a, I>(cells: I, aggregation: Aggregation) -> RowpadResult<Value>
where
    I: IntoIterator<Item = &'a Value>,
{
    match aggregation {
        Aggregation::Count => {
            let n = cells.into_iter().filter(|v| !v.is_null()).count();
            Ok(Value::Int64(n as i64))
        }
        Aggregation::CountDistinct => {
            let distinct: HashSet<ValueKey> = cells.into_iter().map(Value::group_key).collect();
            Ok(Value::Int64(distinct.len() as i64))
        }
        numeric => {
            let nums = Numbers::collect(cells, numeric)?;
            Ok(nums.reduce(numeric))
        }
    }
}

/// Numeric cells with nulls already replaced by zero.
struct Numbers {
    floats: Vec<f64>,
    /// Every cell was an integer; `ints` mirrors `floats`.
    ints: Option<Vec<i64>>,
}

impl Numbers {
    fn collect<'a, I>(cells: I, aggregation: Aggregation) -> RowpadResult<Self>
    where
        I: IntoIterator<Item = &'a Value>,
    {
        let mut floats = Vec::new();
        let mut ints = Some(Vec::new());
        for cell in cells {
            match cell {
                Value::Null => {
                    floats.push(0.0);
                    if let Some(ints) = ints.as_mut() {
                        ints.push(0);
                    }
                }
                Value::Int64(i) => {
                    floats.push(*i as f64);
                    if let Some(ints) = ints.as_mut() {
                        ints.push(*i);
                    }
                }
                Value::Float64(f) => {
                    floats.push(*f);
                    ints = None;
                }
                other => {
                    return Err(RowpadError::engine(format!(
                        "cannot {} non-numeric value {other:?}",
                        aggregation.as_str()
                    )));
                }
            }
        }
        Ok(Self { floats, ints })
    }

    fn reduce(&self, aggregation: Aggregation) -> Value {
        let n = self.floats.len();
        match aggregation {
            Aggregation::Sum => match &self.ints {
                Some(ints) => ints
                    .iter()
                    .try_fold(0i64, |acc, v| acc.checked_add(*v))
                    .map(Value::Int64)
                    .unwrap_or_else(|| Value::Float64(self.floats.iter().sum())),
                None => Value::Float64(self.floats.iter().sum()),
            },
            Aggregation::Min | Aggregation::Max => {
                let pick_max = aggregation == Aggregation::Max;
                match &self.ints {
                    Some(ints) => {
                        let best = if pick_max { ints.iter().max() } else { ints.iter().min() };
                        best.map(|v| Value::Int64(*v)).unwrap_or(Value::Null)
                    }
                    None => self
                        .floats
                        .iter()
                        .copied()
                        .reduce(|a, b| if pick_max { a.max(b) } else { a.min(b) })
                        .map(Value::Float64)
                        .unwrap_or(Value::Null),
                }
            }
            Aggregation::Avg => {
                if n == 0 {
                    Value::Null
                } else {
                    Value::Float64(self.floats.iter().sum::<f64>() / n as f64)
                }
            }
            Aggregation::Median => {
                if n == 0 {
                    return Value::Null;
                }
                let mut sorted = self.floats.clone();
                sorted.sort_by(f64::total_cmp);
                let mid = n / 2;
                if n % 2 == 1 {
                    Value::Float64(sorted[mid])
                } else {
                    Value::Float64((sorted[mid - 1] + sorted[mid]) / 2.0)
                }
            }
            Aggregation::Std => {
                if n < 2 {
                    return Value::Null;
                }
                let mean = self.floats.iter().sum::<f64>() / n as f64;
                let var = self.floats.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
                Value::Float64(var.sqrt())
            }
            Aggregation::Count | Aggregation::CountDistinct => Value::Null,
        }
    }
}

fn known_metrics<'m>(table: &Table, metrics: &'m [MetricSpec], diag: Diagnostics<'_>) -> Vec<&'m MetricSpec> {
    metrics
        .iter()
        .filter(|m| {
            let known = table.has_column(&m.field);
            if !known {
                diag.emit(PipelineEvent::UnknownField {
                    stage: QueryStage::Aggregate,
                    field: m.field.clone(),
                });
            }
            known
        })
        .collect()
}

/// Append an output column. Output names must be unique across dimensions and metrics.
fn push_output(out: &mut Table, column: Column) -> RowpadResult<()> {
    if out.has_column(&column.name) {
        return Err(RowpadError::engine(format!(
            "duplicate output column '{}'",
            column.name
        )));
    }
    out.upsert_column(column)?;
    Ok(())
}

/// Group rows by `dimensions` and aggregate `metrics` per group.
///
/// Unknown dimensions and metric fields are skipped with a warning. With no valid dimension or
/// no valid metric the input table is returned unchanged. Groups appear in order of first
/// occurrence; output columns are the dimensions followed by one column per metric. A metric
/// output name that repeats a dimension or an earlier metric is an engine error.
pub(crate) fn group_and_aggregate(
    table: &Table,
    dimensions: &[String],
    metrics: &[MetricSpec],
    diag: Diagnostics<'_>,
) -> RowpadResult<Table> {
    let dims: Vec<&Column> = dimensions
        .iter()
        .filter_map(|d| {
            let column = table.column(d);
            if column.is_none() {
                diag.emit(PipelineEvent::UnknownField {
                    stage: QueryStage::GroupBy,
                    field: d.clone(),
                });
            }
            column
        })
        .collect();
    let metrics = known_metrics(table, metrics, diag);
    if dims.is_empty() || metrics.is_empty() {
        return Ok(table.clone());
    }

    let mut index: HashMap<Vec<ValueKey>, usize> = HashMap::new();
    let mut groups: Vec<Vec<usize>> = Vec::new();
    for row in 0..table.height() {
        let key: Vec<ValueKey> = dims.iter().map(|c| c.values[row].group_key()).collect();
        let slot = *index.entry(key).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[slot].push(row);
    }

    let mut out = Table::with_height(groups.len());
    for dim in &dims {
        let values = groups.iter().map(|rows| dim.values[rows[0]].clone()).collect();
        push_output(&mut out, Column::new(dim.name.clone(), values))?;
    }
    for metric in metrics {
        let Some(source) = table.column(&metric.field) else {
            continue;
        };
        let values = groups
            .iter()
            .map(|rows| aggregate(rows.iter().map(|&r| &source.values[r]), metric.aggregation))
            .collect::<RowpadResult<Vec<Value>>>()?;
        push_output(&mut out, Column::new(metric.output_name(), values))?;
    }
    Ok(out)
}

/// Aggregate `metrics` over the whole table into a single row.
///
/// Unknown metric fields are skipped with a warning; if none remain the result has no rows.
/// Repeated output names are an engine error.
pub(crate) fn aggregate_all(table: &Table, metrics: &[MetricSpec], diag: Diagnostics<'_>) -> RowpadResult<Table> {
    let metrics = known_metrics(table, metrics, diag);
    if metrics.is_empty() {
        return Ok(Table::default());
    }

    let mut out = Table::with_height(1);
    for metric in metrics {
        let Some(source) = table.column(&metric.field) else {
            continue;
        };
        let value = aggregate(&source.values, metric.aggregation)?;
        push_output(&mut out, Column::new(metric.output_name(), vec![value]))?;
    }
    Ok(out)
}
