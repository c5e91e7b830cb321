use rowpad::flatten::PipelineOptions;
use rowpad::query::{
    execute_query, Aggregation, ChartQuery, DateRangeSpec, FilterOperator, FilterSpec, MetricSpec,
    QueryExecutor, SortSpec,
};
use serde_json::{json, Value as JsonValue};

fn fixture(name: &str) -> JsonValue {
    let text = std::fs::read_to_string(format!("tests/fixtures/{name}")).unwrap();
    serde_json::from_str(&text).unwrap()
}

fn sales_query() -> ChartQuery {
    ChartQuery::from_payload(fixture("sales_query.json")).unwrap()
}

fn column(data: &[rowpad::types::FlatRow], name: &str) -> Vec<JsonValue> {
    data.iter().map(|r| r[name].clone()).collect()
}

#[test]
fn groups_by_region_with_nulls_as_zero() {
    let r = QueryExecutor::default().execute(&sales_query());
    assert!(r.success, "{:?}", r.error);
    assert_eq!(r.data.len(), 2);
    assert_eq!(column(&r.data, "sales_region"), vec![json!("north"), json!("south")]);
    assert_eq!(column(&r.data, "sales_amount_sum"), vec![json!(10), json!(12.5)]);

    assert_eq!(r.metadata.row_count, 2);
    assert_eq!(r.metadata.dimensions, vec!["sales_region"]);
    assert_eq!(r.metadata.metrics, vec!["sales_amount"]);
    assert_eq!(r.metadata.filters_applied, 0);
}

#[test]
fn greater_than_includes_null_rows() {
    let mut q = sales_query();
    q.dimensions.clear();
    q.metrics.clear();
    q.sort.clear();
    q.filters = vec![FilterSpec::new("sales_amount", FilterOperator::GreaterThan, Some(json!(-1)))];

    let r = execute_query(&q, &PipelineOptions::default());
    assert_eq!(r.data.len(), 4);
    assert_eq!(r.metadata.filters_applied, 1);
}

#[test]
fn count_and_count_distinct_over_whole_table() {
    let mut q = sales_query();
    q.dimensions.clear();
    q.metrics = vec![
        MetricSpec::new("sales_amount", Aggregation::Count),
        MetricSpec::new("sales_region", Aggregation::CountDistinct).with_alias("regions"),
        MetricSpec::new("sales_amount", Aggregation::Sum).with_alias("total"),
    ];
    q.sort.clear();

    let r = execute_query(&q, &PipelineOptions::default());
    assert!(r.success);
    assert_eq!(r.data.len(), 1);
    assert_eq!(r.data[0]["sales_amount_count"], json!(3));
    assert_eq!(r.data[0]["regions"], json!(2));
    assert_eq!(r.data[0]["total"], json!(22.5));
    assert_eq!(r.metadata.metrics, vec!["sales_amount", "regions", "total"]);
}

#[test]
fn sort_treats_null_as_zero_and_limit_truncates() {
    let q = ChartQuery {
        data: json!({"rows": [{"x": null, "id": "a"}, {"x": 1, "id": "b"}, {"x": -1, "id": "c"}]}),
        sort: vec![SortSpec::asc("rows_x")],
        ..Default::default()
    };
    let r = execute_query(&q, &PipelineOptions::default());
    assert_eq!(column(&r.data, "rows_id"), vec![json!("c"), json!("a"), json!("b")]);

    let q = ChartQuery {
        sort: vec![SortSpec::desc("rows_x")],
        limit: Some(2),
        ..q
    };
    let r = execute_query(&q, &PipelineOptions::default());
    assert_eq!(column(&r.data, "rows_id"), vec![json!("b"), json!("a")]);
    assert_eq!(r.metadata.row_count, 2);
}

#[test]
fn date_range_runs_after_filters() {
    let mut q = sales_query();
    q.date_range = Some(DateRangeSpec {
        field: "sales_day".to_string(),
        start_date: Some(json!("2024-03-01")),
        end_date: Some(json!("2024-03-31")),
    });
    q.filters = vec![FilterSpec::new("sales_region", FilterOperator::In, Some(json!(["north", "south"])))];

    let r = execute_query(&q, &PipelineOptions::default());
    assert!(r.success);
    assert_eq!(column(&r.data, "sales_amount_sum"), vec![json!(10), json!(5)]);
    assert_eq!(r.metadata.filters_applied, 2);
}

#[test]
fn unknown_fields_are_skipped_not_fatal() {
    let mut q = sales_query();
    q.dimensions.push("nope".to_string());
    q.metrics.push(MetricSpec::new("missing", Aggregation::Avg));
    q.filters = vec![FilterSpec::new("ghost", FilterOperator::Equals, Some(json!(1)))];
    q.sort.push(SortSpec::desc("phantom"));

    let r = execute_query(&q, &PipelineOptions::default());
    assert!(r.success);
    assert_eq!(r.data.len(), 2);
    assert_eq!(r.data[0].keys().collect::<Vec<_>>(), vec!["sales_region", "sales_amount_sum"]);
}

#[test]
fn template_cast_feeds_aggregation() {
    let q = ChartQuery::from_payload(json!({
        "data": {"items": [{"price": "2.5"}, {"price": ""}, {"price": "4"}]},
        "template": {"price": {"inputoptiontype": "number"}},
        "metrics": [{"field": "items_price", "aggregation": "avg"}]
    }))
    .unwrap();
    let r = execute_query(&q, &PipelineOptions::default());
    assert!(r.success, "{:?}", r.error);
    assert_eq!(r.data[0]["items_price_avg"], json!(6.5 / 3.0));
}

#[test]
fn failure_result_serializes_with_error() {
    let q = ChartQuery::from_payload(json!({
        "data": {"v": [true, false]},
        "metrics": [{"field": "v_value", "aggregation": "max"}]
    }))
    .unwrap();
    let r = execute_query(&q, &PipelineOptions::default());
    let body = serde_json::to_value(&r).unwrap();
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["data"], json!([]));
    assert_eq!(body["metadata"]["engine"], json!("rowpad-columnar"));
    assert!(body["error"].as_str().unwrap().starts_with("engine failure"));
    assert!(body["metadata"].get("executionTime").is_some());
}

#[test]
fn alias_shadowing_a_dimension_fails_the_query() {
    let mut q = sales_query();
    q.metrics = vec![MetricSpec::new("sales_amount", Aggregation::Sum).with_alias("sales_region")];

    let r = execute_query(&q, &PipelineOptions::default());
    assert!(!r.success);
    assert!(r.data.is_empty());
    assert!(r.error.unwrap().contains("duplicate output column 'sales_region'"));
}

#[test]
fn count_distinct_counts_padded_nulls_once() {
    let q = ChartQuery::from_payload(json!({
        "data": {"rows": [{"x": 1}, {"x": null}, {"x": 1}], "tags": ["a"]},
        "metrics": [
            {"field": "rows_x", "aggregation": "countDistinct"},
            {"field": "tags_value", "aggregation": "countDistinct"}
        ]
    }))
    .unwrap();

    let r = execute_query(&q, &PipelineOptions::default());
    assert!(r.success, "{:?}", r.error);
    assert_eq!(r.data[0]["rows_x_countDistinct"], json!(2));
    assert_eq!(r.data[0]["tags_value_countDistinct"], json!(2));
}
