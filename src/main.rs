//! # rowpad CLI
//!
//! Runs one boundary operation over a JSON payload read from a file or stdin and prints the
//! JSON response.
//!
//! ```bash
//! rowpad flatten --input doc.json
//! rowpad flatten-template --input payload.json --padding zero
//! rowpad fields --input template_payload.json
//! rowpad query --input chart_query.json --config rowpad.toml --verbose
//! rowpad query --batch --input queries.json
//! ```
//!
//! Failures print an `ErrorResponse` (`{"success": false, "message", "error"}`) and exit with
//! status 1.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use serde_json::Value as JsonValue;

use rowpad::config::{load_config, RowpadConfig};
use rowpad::error::{RowpadError, RowpadResult};
use rowpad::execution::BatchExecutor;
use rowpad::flatten::{PaddingPolicy, PipelineOptions};
use rowpad::observability::DiagnosticSeverity;
use rowpad::query::ChartQuery;
use rowpad::service::{ErrorResponse, FlattenResponse, Operation};

/// Row-padding JSON flattener and chart query executor.
#[derive(Parser)]
#[command(name = "rowpad", version, about)]
struct Cli {
    /// TOML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Payload file; reads stdin when omitted.
    #[arg(long, global = true)]
    input: Option<PathBuf>,

    /// Padding sentinel for exhausted arrays (overrides the config file).
    #[arg(long, global = true, value_enum)]
    padding: Option<PaddingArg>,

    /// Group `name-1`, `name-2`, ... siblings into one array field.
    #[arg(long, global = true)]
    group_suffixes: bool,

    /// Report debug-level diagnostics on stderr.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Flatten `{"data": ...}` into padded rows.
    ///
    /// With `--batch`, the input is an array of documents.
    Flatten {
        #[arg(long)]
        batch: bool,
    },
    /// Flatten `{"data", "template", "filterType"?}` and keep template fields.
    FlattenTemplate,
    /// List template fields from `{"template", "filterType"?}`.
    Fields,
    /// Run a chart query.
    ///
    /// With `--batch`, the input is an array of chart queries.
    Query {
        #[arg(long)]
        batch: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum PaddingArg {
    Null,
    Zero,
}

impl From<PaddingArg> for PaddingPolicy {
    fn from(p: PaddingArg) -> Self {
        match p {
            PaddingArg::Null => PaddingPolicy::Null,
            PaddingArg::Zero => PaddingPolicy::Zero,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(&cli) {
        Ok(out) => {
            println!("{out}");
            ExitCode::SUCCESS
        }
        Err(body) => {
            match serde_json::to_string_pretty(&body) {
                Ok(text) => println!("{text}"),
                Err(_) => eprintln!("{}", body.message),
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<String, ErrorResponse> {
    let config = resolve_config(cli)?;
    let options = config.pipeline_options();
    let payload = read_payload(cli.input.as_deref())?;

    let response = match cli.command {
        Command::Flatten { batch: true } => run_flatten_batch(&config, options, payload)?,
        Command::Query { batch: true } => run_query_batch(&config, options, payload)?,
        Command::Flatten { batch: false } => Operation::Flatten.run(payload, &options)?,
        Command::FlattenTemplate => Operation::FlattenWithTemplate.run(payload, &options)?,
        Command::Fields => Operation::FieldsByType.run(payload, &options)?,
        Command::Query { batch: false } => Operation::ChartQuery.run(payload, &options)?,
    };
    serde_json::to_string_pretty(&response).map_err(|e| ErrorResponse::from(RowpadError::from(e)))
}

fn resolve_config(cli: &Cli) -> RowpadResult<RowpadConfig> {
    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => RowpadConfig::default(),
    };
    if let Some(padding) = cli.padding {
        config.flatten.padding = padding.into();
    }
    if cli.group_suffixes {
        config.flatten.group_numeric_suffixes = true;
    }
    if cli.verbose {
        config.diagnostics.min_severity = DiagnosticSeverity::Debug;
    }
    Ok(config)
}

fn read_payload(input: Option<&Path>) -> RowpadResult<JsonValue> {
    let text = match input {
        Some(path) => std::fs::read_to_string(path)?,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };
    rowpad::flatten::parse_document(&text)
}

fn batch_items(payload: JsonValue) -> RowpadResult<Vec<JsonValue>> {
    match payload {
        JsonValue::Array(items) => Ok(items),
        _ => Err(RowpadError::MalformedInput {
            message: "--batch expects a json array".to_string(),
        }),
    }
}

fn run_flatten_batch(config: &RowpadConfig, options: PipelineOptions, payload: JsonValue) -> RowpadResult<JsonValue> {
    let documents = batch_items(payload)?;
    let executor = BatchExecutor::new(config.execution_options(), options)?;
    let responses: Vec<JsonValue> = executor
        .flatten_batch(&documents)
        .into_iter()
        .map(|result| {
            let value = result.map(|table| {
                let rows = table.to_records();
                FlattenResponse {
                    success: true,
                    row_count: rows.len(),
                    rows,
                }
            });
            match value {
                Ok(resp) => serde_json::to_value(resp),
                Err(e) => serde_json::to_value(ErrorResponse::from(e)),
            }
        })
        .collect::<Result<_, _>>()?;
    Ok(JsonValue::Array(responses))
}

fn run_query_batch(config: &RowpadConfig, options: PipelineOptions, payload: JsonValue) -> RowpadResult<JsonValue> {
    let queries = batch_items(payload)?
        .into_iter()
        .map(ChartQuery::from_payload)
        .collect::<RowpadResult<Vec<_>>>()?;
    let executor = BatchExecutor::new(config.execution_options(), options)?;
    Ok(serde_json::to_value(executor.query_batch(&queries))?)
}
