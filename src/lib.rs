//! `rowpad` flattens nested JSON documents into rectangular, row-padded tables and runs BI-style
//! chart queries (filter, date range, group/aggregate, sort, limit) over the result.
//!
//! ## Row padding
//!
//! Scalars and nested objects become one column each (`{parent}_{child}`); every array field
//! contributes its elements row by row. The table is as tall as the longest array, shorter arrays
//! are padded with a sentinel (`null` by default, `0` with [`flatten::PaddingPolicy::Zero`]) and
//! scalars are repeated on every row. A generated `rn` column numbers the rows from 1.
//!
//! ```rust
//! use rowpad::flatten::{flatten_document, PipelineOptions};
//! use serde_json::json;
//!
//! let doc = json!({"items": [{"p": 1}, {"p": 2}], "notes": ["x"]});
//! let rows = flatten_document(&doc, &PipelineOptions::default()).unwrap().to_records();
//!
//! assert_eq!(rows.len(), 2);
//! assert_eq!(rows[0]["notes_value"], json!("x"));
//! assert_eq!(rows[1]["items_p"], json!(2));
//! assert_eq!(rows[1]["notes_value"], json!(null));
//! ```
//!
//! ## Modules
//!
//! - [`types`]: cell values and the in-memory columnar [`types::Table`]
//! - [`flatten`]: field classification, struct flattening, suffix grouping and row expansion
//! - [`template`]: template field types, type filtering and numeric casting
//! - [`query`]: chart query model and the query executor
//! - [`execution`]: parallel batch execution with throttling and metrics
//! - [`service`]: the JSON boundary operations (`flatten`, `flatten_with_template`,
//!   `fields_by_type`, `chart_query`)
//! - [`observability`]: diagnostic events and observers
//! - [`config`]: TOML configuration for the binary
//! - [`error`]: error types
//!
//! ## Diagnostics
//!
//! Recoverable problems (unknown query fields, unusable filters, unrecognized templates, column
//! collisions) never fail a call. They are reported to the observer set on
//! [`flatten::PipelineOptions`]:
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use rowpad::flatten::PipelineOptions;
//! use rowpad::observability::{DiagnosticSeverity, StdErrObserver};
//!
//! let options = PipelineOptions {
//!     observer: Some(Arc::new(StdErrObserver)),
//!     min_severity: DiagnosticSeverity::Warning,
//!     ..Default::default()
//! };
//! # let _ = options;
//! ```

pub mod config;
pub mod error;
pub mod execution;
pub mod flatten;
pub mod observability;
pub mod query;
pub mod service;
pub mod template;
pub mod types;

pub use error::{RowpadError, RowpadResult};
