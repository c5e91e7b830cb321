//! Multi-key sort and limit.

use std::cmp::Ordering;

use crate::observability::{Diagnostics, PipelineEvent, QueryStage};
use crate::types::{Column, Table};

use super::model::{SortDirection, SortSpec};

/// Stable sort by `specs` in order; the first key is primary.
///
/// Nulls compare as `0`. Unknown sort fields are skipped with a warning.
pub(crate) fn sort_table(table: &Table, specs: &[SortSpec], diag: Diagnostics<'_>) -> Table {
    let keys: Vec<(&Column, SortDirection)> = specs
        .iter()
        .filter_map(|spec| match table.column(&spec.field) {
            Some(column) => Some((column, spec.direction)),
            None => {
                diag.emit(PipelineEvent::UnknownField {
                    stage: QueryStage::Sort,
                    field: spec.field.clone(),
                });
                None
            }
        })
        .collect();
    if keys.is_empty() {
        return table.clone();
    }

    let mut order: Vec<usize> = (0..table.height()).collect();
    order.sort_by(|&a, &b| {
        for (column, direction) in &keys {
            let ord = column.values[a]
                .or_zero()
                .sort_cmp(&column.values[b].or_zero());
            let ord = match direction {
                SortDirection::Asc => ord,
                SortDirection::Desc => ord.reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
    table.take(&order)
}

/// Keep the first `limit` rows. Missing or non-positive limits keep everything.
pub fn apply_limit(table: &Table, limit: Option<i64>) -> Table {
    match limit {
        Some(n) if n > 0 => table.head(usize::try_from(n).unwrap_or(usize::MAX)),
        _ => table.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::{apply_limit, sort_table};
    use crate::observability::Diagnostics;
    use crate::query::model::SortSpec;
    use crate::types::{Column, Table, Value};

    fn table() -> Table {
        Table::from_columns(vec![
            Column::new("x", vec![Value::Null, Value::Int64(1), Value::Int64(-1), Value::Int64(1)]),
            Column::new("id", vec![Value::Int64(0), Value::Int64(1), Value::Int64(2), Value::Int64(3)]),
        ])
        .unwrap()
    }

    fn ids(t: &Table) -> Vec<Value> {
        t.column("id").unwrap().values.clone()
    }

    #[test]
    fn nulls_sort_as_zero() {
        let out = sort_table(&table(), &[SortSpec::asc("x")], Diagnostics::silent());
        assert_eq!(
            ids(&out),
            vec![Value::Int64(2), Value::Int64(0), Value::Int64(1), Value::Int64(3)]
        );
        assert_eq!(out.value(1, "x"), Some(&Value::Null));
    }

    #[test]
    fn ties_fall_through_to_next_key() {
        let out = sort_table(
            &table(),
            &[SortSpec::desc("x"), SortSpec::desc("id")],
            Diagnostics::silent(),
        );
        assert_eq!(
            ids(&out),
            vec![Value::Int64(3), Value::Int64(1), Value::Int64(0), Value::Int64(2)]
        );
    }

    #[test]
    fn unknown_keys_leave_order_unchanged() {
        let t = table();
        assert_eq!(sort_table(&t, &[SortSpec::asc("missing")], Diagnostics::silent()), t);
    }

    #[test]
    fn limit_only_when_positive() {
        let t = table();
        assert_eq!(apply_limit(&t, Some(2)).height(), 2);
        assert_eq!(apply_limit(&t, Some(0)).height(), 4);
        assert_eq!(apply_limit(&t, Some(-3)).height(), 4);
        assert_eq!(apply_limit(&t, Some(10)).height(), 4);
        assert_eq!(apply_limit(&t, None).height(), 4);
    }
}
