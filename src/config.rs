//! TOML configuration for the `rowpad` binary.
//!
//! ```toml
//! [flatten]
//! padding = "zero"              # "null" (default) | "zero"
//! scalar_array_naming = "bare"  # "value_suffix" (default) | "bare"
//! group_numeric_suffixes = true
//!
//! [diagnostics]
//! min_severity = "warning"      # debug | info | warning | error
//! log_file = "rowpad.log"
//!
//! [execution]
//! num_threads = 4
//! max_in_flight = 2
//! ```
//!
//! Every section and key is optional.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;

use crate::error::{RowpadError, RowpadResult};
use crate::execution::ExecutionOptions;
use crate::flatten::{FlattenOptions, PipelineOptions};
use crate::observability::{
    CompositeObserver, DiagnosticSeverity, FileObserver, PipelineObserver, StdErrObserver,
};

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RowpadConfig {
    pub flatten: FlattenOptions,
    pub diagnostics: DiagnosticsConfig,
    pub execution: ExecutionConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DiagnosticsConfig {
    #[serde(default = "default_min_severity")]
    pub min_severity: DiagnosticSeverity,
    /// Also append events to this file.
    pub log_file: Option<PathBuf>,
}

fn default_min_severity() -> DiagnosticSeverity {
    DiagnosticSeverity::Warning
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            min_severity: default_min_severity(),
            log_file: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExecutionConfig {
    pub num_threads: Option<usize>,
    pub max_in_flight: Option<usize>,
}

/// Read and validate a config file.
pub fn load_config(path: &Path) -> RowpadResult<RowpadConfig> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
        .map_err(|e| RowpadError::config(format!("{}: {e}", path.display())))
}

/// Parse and validate config text.
pub fn parse_config(content: &str) -> RowpadResult<RowpadConfig> {
    let config: RowpadConfig =
        toml::from_str(content).map_err(|e| RowpadError::config(e.to_string()))?;

    if config.execution.num_threads == Some(0) {
        return Err(RowpadError::config("execution.num_threads must be > 0"));
    }
    if config.execution.max_in_flight == Some(0) {
        return Err(RowpadError::config("execution.max_in_flight must be > 0"));
    }
    Ok(config)
}

impl RowpadConfig {
    /// Pipeline options with diagnostics routed to stderr and, when configured, the log file.
    pub fn pipeline_options(&self) -> PipelineOptions {
        let stderr: Arc<dyn PipelineObserver> = Arc::new(StdErrObserver);
        let observer: Arc<dyn PipelineObserver> = match &self.diagnostics.log_file {
            Some(path) => {
                let file: Arc<dyn PipelineObserver> = Arc::new(FileObserver::new(path));
                Arc::new(CompositeObserver::new(vec![stderr, file]))
            }
            None => stderr,
        };

        PipelineOptions {
            flatten: self.flatten.clone(),
            observer: Some(observer),
            min_severity: self.diagnostics.min_severity,
        }
    }

    pub fn execution_options(&self) -> ExecutionOptions {
        let defaults = ExecutionOptions::default();
        ExecutionOptions {
            num_threads: self.execution.num_threads.or(defaults.num_threads),
            max_in_flight: self.execution.max_in_flight.unwrap_or(defaults.max_in_flight),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_config, RowpadConfig};
    use crate::flatten::{PaddingPolicy, ScalarArrayNaming};
    use crate::observability::DiagnosticSeverity;

    #[test]
    fn empty_config_uses_defaults() {
        let cfg = parse_config("").unwrap();
        assert_eq!(cfg, RowpadConfig::default());
        assert_eq!(cfg.flatten.padding, PaddingPolicy::Null);
        assert_eq!(cfg.diagnostics.min_severity, DiagnosticSeverity::Warning);
    }

    #[test]
    fn full_config_parses() {
        let cfg = parse_config(
            r#"
            [flatten]
            padding = "zero"
            scalar_array_naming = "bare"
            group_numeric_suffixes = true

            [diagnostics]
            min_severity = "debug"
            log_file = "/tmp/rowpad.log"

            [execution]
            num_threads = 3
            max_in_flight = 2
            "#,
        )
        .unwrap();
        assert_eq!(cfg.flatten.padding, PaddingPolicy::Zero);
        assert_eq!(cfg.flatten.scalar_array_naming, ScalarArrayNaming::Bare);
        assert!(cfg.flatten.group_numeric_suffixes);
        assert_eq!(cfg.execution_options().num_threads, Some(3));
        assert_eq!(cfg.execution_options().max_in_flight, 2);

        let opts = cfg.pipeline_options();
        assert!(opts.observer.is_some());
        assert_eq!(opts.min_severity, DiagnosticSeverity::Debug);
    }

    #[test]
    fn rejects_bad_values() {
        let err = parse_config("[flatten]\npadding = \"sometimes\"").unwrap_err();
        assert_eq!(err.kind(), "config");
        let err = parse_config("[execution]\nmax_in_flight = 0").unwrap_err();
        assert!(err.to_string().contains("max_in_flight must be > 0"));
        assert!(parse_config("[unknown]\nx = 1").is_err());
    }
}
