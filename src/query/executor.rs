//! Chart query pipeline: flatten → template → filters → date range → group/aggregate → sort → limit.

use std::time::Instant;

use crate::error::RowpadResult;
use crate::flatten::{flatten_document, PipelineOptions};
use crate::observability::{Diagnostics, PipelineEvent, QueryStage};
use crate::template::apply_template;
use crate::types::Table;

use super::aggregate::{aggregate_all, group_and_aggregate};
use super::filter::{apply_date_range, apply_filters};
use super::model::{ChartQuery, QueryMetadata, QueryResult};
use super::sort::{apply_limit, sort_table};

/// Runs [`ChartQuery`]s. Each call works on its own table; executors can be shared across threads.
#[derive(Debug, Clone, Default)]
pub struct QueryExecutor {
    options: PipelineOptions,
}

impl QueryExecutor {
    pub fn new(options: PipelineOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Execute a query. Failures of any stage become a `success: false` result.
    pub fn execute(&self, query: &ChartQuery) -> QueryResult {
        let started = Instant::now();
        let diag = self.options.diagnostics();

        match self.run(query, diag) {
            Ok(table) => {
                let data = table.to_records();
                let elapsed = started.elapsed();
                diag.emit(PipelineEvent::QueryFinished {
                    rows: data.len(),
                    elapsed,
                });
                QueryResult {
                    success: true,
                    metadata: QueryMetadata::for_query(query, data.len(), elapsed.as_millis() as u64),
                    data,
                    error: None,
                }
            }
            Err(e) => {
                let message = e.to_string();
                diag.emit(PipelineEvent::QueryFailed {
                    message: message.clone(),
                });
                QueryResult {
                    success: false,
                    data: Vec::new(),
                    metadata: QueryMetadata::for_query(query, 0, started.elapsed().as_millis() as u64),
                    error: Some(message),
                }
            }
        }
    }

    fn run(&self, query: &ChartQuery, diag: Diagnostics<'_>) -> RowpadResult<Table> {
        let mut table = flatten_document(&query.data, &self.options)?;
        stage_done(diag, QueryStage::Flatten, &table);

        if let Some(template) = &query.template {
            table = apply_template(&table, template, None, diag);
            stage_done(diag, QueryStage::Template, &table);
        }

        if !query.filters.is_empty() {
            table = apply_filters(&table, &query.filters, diag);
            stage_done(diag, QueryStage::Filter, &table);
        }

        if let Some(range) = &query.date_range {
            table = apply_date_range(&table, range, diag);
            stage_done(diag, QueryStage::DateRange, &table);
        }

        if !query.metrics.is_empty() {
            if query.dimensions.is_empty() {
                table = aggregate_all(&table, &query.metrics, diag)?;
                stage_done(diag, QueryStage::Aggregate, &table);
            } else {
                table = group_and_aggregate(&table, &query.dimensions, &query.metrics, diag)?;
                stage_done(diag, QueryStage::GroupBy, &table);
            }
        }

        if !query.sort.is_empty() {
            table = sort_table(&table, &query.sort, diag);
            stage_done(diag, QueryStage::Sort, &table);
        }

        if query.limit.is_some() {
            table = apply_limit(&table, query.limit);
            stage_done(diag, QueryStage::Limit, &table);
        }

        Ok(table)
    }
}

fn stage_done(diag: Diagnostics<'_>, stage: QueryStage, table: &Table) {
    diag.emit(PipelineEvent::StageCompleted {
        stage,
        rows: table.height(),
    });
}

/// Execute one query with the given options.
pub fn execute_query(query: &ChartQuery, options: &PipelineOptions) -> QueryResult {
    QueryExecutor::new(options.clone()).execute(query)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::QueryExecutor;
    use crate::query::model::ChartQuery;

    #[test]
    fn passes_table_through_without_aggregation() {
        let q = ChartQuery::from_payload(json!({"data": {"name": "Bob", "tags": ["a", "b"]}})).unwrap();
        let r = QueryExecutor::default().execute(&q);
        assert!(r.success);
        assert_eq!(r.metadata.row_count, 2);
        assert_eq!(r.data[1]["tags_value"], json!("b"));
        assert_eq!(r.metadata.engine, "rowpad-columnar");
    }

    #[test]
    fn template_prunes_and_casts_before_filtering() {
        let q = ChartQuery::from_payload(json!({
            "data": {"items": [{"price": "10"}, {"price": ""}, {"price": "4.5"}], "secret": "x"},
            "template": {"groups": [{"items": [{"properties": {"key": "price", "inputoptiontype": "number"}}]}]},
            "filters": [{"field": "items_price", "operator": "lessThan", "value": 5}]
        }))
        .unwrap();
        let r = QueryExecutor::default().execute(&q);
        assert!(r.success);
        assert_eq!(r.data.len(), 2);
        assert_eq!(r.data[0]["items_price"], json!(0.0));
        assert_eq!(r.data[1]["items_price"], json!(4.5));
        assert!(r.data[0].get("secret").is_none());
    }

    #[test]
    fn engine_errors_become_failure_results() {
        let q = ChartQuery::from_payload(json!({
            "data": {"rows": [{"amount": "lots"}]},
            "metrics": [{"field": "rows_amount", "aggregation": "sum"}],
            "filters": [{"field": "rows_amount", "operator": "isNotNull"}]
        }))
        .unwrap();
        let r = QueryExecutor::default().execute(&q);
        assert!(!r.success);
        assert!(r.data.is_empty());
        assert!(r.error.unwrap().contains("cannot sum"));
        assert_eq!(r.metadata.row_count, 0);
        assert_eq!(r.metadata.filters_applied, 1);
        assert_eq!(r.metadata.metrics, vec!["rows_amount"]);
    }
}
