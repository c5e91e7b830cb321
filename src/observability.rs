//! Structured diagnostic events emitted by the flattening and query pipeline.
//!
//! The pipeline never prints. Recoverable conditions (unknown fields, skipped filters,
//! unrecognized templates, column collisions) are reported as [`PipelineEvent`]s to an optional
//! [`PipelineObserver`] configured on [`crate::flatten::PipelineOptions`], which decides where
//! they go.

use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Deserialize;

use crate::template::TemplateShape;

/// Severity attached to every [`PipelineEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticSeverity {
    /// Step-by-step tracing (classification counts, stage row counts).
    Debug,
    /// Informational event.
    Info,
    /// A field-level problem that was recovered from.
    Warning,
    /// The operation failed and was converted into a failure result.
    Error,
}

/// Query pipeline stage, used to locate diagnostic events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStage {
    Flatten,
    Template,
    Filter,
    DateRange,
    GroupBy,
    Aggregate,
    Sort,
    Limit,
}

impl fmt::Display for QueryStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Flatten => "flatten",
            Self::Template => "template",
            Self::Filter => "filter",
            Self::DateRange => "date_range",
            Self::GroupBy => "group_by",
            Self::Aggregate => "aggregate",
            Self::Sort => "sort",
            Self::Limit => "limit",
        };
        f.write_str(name)
    }
}

/// A single diagnostic event.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    /// The document was not an object and was wrapped as `{"value": doc}`.
    DocumentWrapped { json_type: &'static str },
    DocumentClassified {
        scalars: usize,
        structs: usize,
        arrays: usize,
    },
    /// Numeric-suffix siblings were grouped into one array field.
    SuffixGroupFormed { base: String, members: usize },
    /// Two sources produced the same column name; the later one won.
    ColumnCollision { column: String },
    RowsExpanded { rows: usize, columns: usize },
    TemplateResolved { shape: TemplateShape, fields: usize },
    /// The template matched neither known shape; type filtering is a no-op.
    TemplateShapeUnrecognized,
    ColumnsCoerced { columns: Vec<String> },
    /// A query item referenced a column absent from the flattened table.
    UnknownField { stage: QueryStage, field: String },
    FilterSkipped { field: String, reason: String },
    StageCompleted { stage: QueryStage, rows: usize },
    QueryFinished { rows: usize, elapsed: Duration },
    QueryFailed { message: String },
}

impl PipelineEvent {
    pub fn severity(&self) -> DiagnosticSeverity {
        match self {
            Self::DocumentClassified { .. }
            | Self::RowsExpanded { .. }
            | Self::TemplateResolved { .. }
            | Self::ColumnsCoerced { .. }
            | Self::StageCompleted { .. } => DiagnosticSeverity::Debug,
            Self::SuffixGroupFormed { .. } | Self::QueryFinished { .. } => DiagnosticSeverity::Info,
            Self::DocumentWrapped { .. }
            | Self::ColumnCollision { .. }
            | Self::TemplateShapeUnrecognized
            | Self::UnknownField { .. }
            | Self::FilterSkipped { .. } => DiagnosticSeverity::Warning,
            Self::QueryFailed { .. } => DiagnosticSeverity::Error,
        }
    }
}

impl fmt::Display for PipelineEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DocumentWrapped { json_type } => {
                write!(f, "document is a json {json_type}, wrapped as {{\"value\": ...}}")
            }
            Self::DocumentClassified {
                scalars,
                structs,
                arrays,
            } => write!(f, "classified scalars={scalars} structs={structs} arrays={arrays}"),
            Self::SuffixGroupFormed { base, members } => {
                write!(f, "grouped {members} suffixed fields into array '{base}'")
            }
            Self::ColumnCollision { column } => {
                write!(f, "column '{column}' produced twice, keeping the later value")
            }
            Self::RowsExpanded { rows, columns } => {
                write!(f, "expanded rows={rows} columns={columns}")
            }
            Self::TemplateResolved { shape, fields } => {
                write!(f, "template shape={shape:?} fields={fields}")
            }
            Self::TemplateShapeUnrecognized => {
                f.write_str("template matches no known shape, no field types extracted")
            }
            Self::ColumnsCoerced { columns } => {
                write!(f, "cast to number: {}", columns.join(", "))
            }
            Self::UnknownField { stage, field } => {
                write!(f, "{stage}: column '{field}' not found, skipping")
            }
            Self::FilterSkipped { field, reason } => {
                write!(f, "filter on '{field}' skipped: {reason}")
            }
            Self::StageCompleted { stage, rows } => write!(f, "{stage}: rows={rows}"),
            Self::QueryFinished { rows, elapsed } => {
                write!(f, "query finished rows={rows} elapsed={}ms", elapsed.as_millis())
            }
            Self::QueryFailed { message } => write!(f, "query failed: {message}"),
        }
    }
}

/// Consumer of diagnostic events.
pub trait PipelineObserver: Send + Sync {
    fn on_event(&self, event: &PipelineEvent);
}

/// Severity-filtered dispatch to an optional observer.
#[derive(Clone, Copy)]
pub(crate) struct Diagnostics<'a> {
    observer: Option<&'a dyn PipelineObserver>,
    min_severity: DiagnosticSeverity,
}

impl<'a> Diagnostics<'a> {
    pub(crate) fn new(
        observer: Option<&'a Arc<dyn PipelineObserver>>,
        min_severity: DiagnosticSeverity,
    ) -> Self {
        Self {
            observer: observer.map(|o| &**o),
            min_severity,
        }
    }

    pub(crate) fn silent() -> Self {
        Self {
            observer: None,
            min_severity: DiagnosticSeverity::Error,
        }
    }

    pub(crate) fn emit(&self, event: PipelineEvent) {
        if let Some(obs) = self.observer {
            if event.severity() >= self.min_severity {
                obs.on_event(&event);
            }
        }
    }
}

/// An observer that fans out events to a list of observers.
#[derive(Default)]
pub struct CompositeObserver {
    observers: Vec<Arc<dyn PipelineObserver>>,
}

impl CompositeObserver {
    pub fn new(observers: Vec<Arc<dyn PipelineObserver>>) -> Self {
        Self { observers }
    }
}

impl fmt::Debug for CompositeObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeObserver")
            .field("observers_len", &self.observers.len())
            .finish()
    }
}

impl PipelineObserver for CompositeObserver {
    fn on_event(&self, event: &PipelineEvent) {
        for o in &self.observers {
            o.on_event(event);
        }
    }
}

/// Logs events to stderr.
#[derive(Debug, Default)]
pub struct StdErrObserver;

impl PipelineObserver for StdErrObserver {
    fn on_event(&self, event: &PipelineEvent) {
        eprintln!("[rowpad][{:?}] {event}", event.severity());
    }
}

/// Appends events to a local log file.
#[derive(Debug)]
pub struct FileObserver {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileObserver {
    /// Create a file observer that appends events to `path`.
    ///
    /// Writes are best-effort; failures to open/write the log file are ignored.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    fn append_line(&self, line: &str) {
        let _guard = self.lock.lock().ok();
        if let Ok(mut f) = OpenOptions::new().create(true).append(true).open(&self.path) {
            let _ = writeln!(f, "{line}");
        }
    }
}

impl PipelineObserver for FileObserver {
    fn on_event(&self, event: &PipelineEvent) {
        self.append_line(&format!(
            "{} severity={:?} {event}",
            unix_ts(),
            event.severity()
        ));
    }
}

fn unix_ts() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::{
        CompositeObserver, DiagnosticSeverity, Diagnostics, FileObserver, PipelineEvent,
        PipelineObserver, QueryStage,
    };

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<PipelineEvent>>,
    }

    impl PipelineObserver for Recorder {
        fn on_event(&self, event: &PipelineEvent) {
            self.events.lock().unwrap().push(event.clone());
        }
    }

    #[test]
    fn diagnostics_drop_events_below_threshold() {
        let rec = Arc::new(Recorder::default());
        let obs: Arc<dyn PipelineObserver> = rec.clone();
        let diag = Diagnostics::new(Some(&obs), DiagnosticSeverity::Warning);

        diag.emit(PipelineEvent::RowsExpanded { rows: 1, columns: 1 });
        diag.emit(PipelineEvent::UnknownField {
            stage: QueryStage::Sort,
            field: "x".to_string(),
        });

        let events = rec.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].to_string(), "sort: column 'x' not found, skipping");
    }

    #[test]
    fn composite_fans_out() {
        let a = Arc::new(Recorder::default());
        let b = Arc::new(Recorder::default());
        let a_dyn: Arc<dyn PipelineObserver> = a.clone();
        let b_dyn: Arc<dyn PipelineObserver> = b.clone();
        let composite = CompositeObserver::new(vec![a_dyn, b_dyn]);
        composite.on_event(&PipelineEvent::TemplateShapeUnrecognized);
        assert_eq!(a.events.lock().unwrap().len(), 1);
        assert_eq!(b.events.lock().unwrap().len(), 1);
    }

    #[test]
    fn file_observer_appends_lines() {
        let path = std::env::temp_dir().join(format!(
            "rowpad_observer_{}_{}.log",
            std::process::id(),
            line!()
        ));
        let _ = std::fs::remove_file(&path);
        let obs = FileObserver::new(&path);
        obs.on_event(&PipelineEvent::QueryFailed {
            message: "boom".to_string(),
        });
        obs.on_event(&PipelineEvent::TemplateShapeUnrecognized);

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("severity=Error query failed: boom"));
        let _ = std::fs::remove_file(&path);
    }
}
