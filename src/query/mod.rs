//! BI query execution over a flattened document.
//!
//! A [`ChartQuery`] is evaluated in a fixed order by [`QueryExecutor`]:
//!
//! 1. flatten the document (and apply the template, when given)
//! 2. `filters`, combined with AND
//! 3. `dateRange`
//! 4. group by `dimensions` and aggregate `metrics`, or aggregate the whole table when only
//!    metrics are given
//! 5. `sort`, then `limit`
//!
//! ```rust
//! use rowpad::query::{ChartQuery, QueryExecutor};
//! use serde_json::json;
//!
//! let query = ChartQuery::from_payload(json!({
//!     "data": {"sales": [
//!         {"region": "north", "amount": 10},
//!         {"region": "south", "amount": 4},
//!         {"region": "north", "amount": null}
//!     ]},
//!     "dimensions": ["sales_region"],
//!     "metrics": [{"field": "sales_amount", "aggregation": "sum", "alias": "total"}]
//! }))
//! .unwrap();
//!
//! let result = QueryExecutor::default().execute(&query);
//! assert!(result.success);
//! assert_eq!(result.data[0]["total"], json!(10));
//! assert_eq!(result.metadata.metrics, vec!["total"]);
//! ```

pub mod aggregate;
pub mod executor;
pub mod filter;
pub mod model;
pub mod sort;

pub use executor::{execute_query, QueryExecutor};
pub use model::{
    Aggregation, ChartQuery, DateRangeSpec, FilterOperator, FilterSpec, MetricSpec, QueryMetadata,
    QueryResult, SortDirection, SortSpec, ENGINE_NAME,
};
