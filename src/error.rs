use thiserror::Error;

/// Convenience result type for flattening and query operations.
pub type RowpadResult<T> = Result<T, RowpadError>;

/// Error type returned by the flattening pipeline and the boundary operations.
///
/// Field-level problems (unknown columns, unrecognized templates) are not errors; they are
/// reported as [`crate::observability::PipelineEvent`]s and the pipeline continues.
#[derive(Debug, Error)]
pub enum RowpadError {
    /// Underlying I/O error (e.g. payload or config file not found).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The raw input text is not valid JSON.
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),

    /// The input parsed, but cannot be interpreted (missing `data`, unusable query shape, ...).
    #[error("malformed input: {message}")]
    MalformedInput { message: String },

    /// The columnar engine could not evaluate an operation.
    #[error("engine failure: {message}")]
    Engine { message: String },

    /// A configuration file could not be read as TOML.
    #[error("invalid config: {message}")]
    Config { message: String },
}

impl RowpadError {
    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedInput {
            message: message.into(),
        }
    }

    pub(crate) fn engine(message: impl Into<String>) -> Self {
        Self::Engine {
            message: message.into(),
        }
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Stable identifier for the error class, used in structured error payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Io(_) => "io",
            Self::Json(_) | Self::MalformedInput { .. } => "malformed_input",
            Self::Engine { .. } => "engine_failure",
            Self::Config { .. } => "config",
        }
    }
}
