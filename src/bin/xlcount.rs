//! CLI for xlcount - transforms traffic-count workbooks
//!
//! Usage:
//!   xlcount transform counts.xlsx -o out.xlsx -p 13 --operation increase
//!   xlcount classify counts.xlsx
//!   xlcount invoke < request.json > response.json

use anyhow::{bail, Context};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use xlcount::{
    classify_workbook, preview_transform, transform_workbook, ColumnRole, EngineConfig,
    TransformRequest, WorkbookClassification, XlcountError,
};

#[derive(Parser)]
#[command(name = "xlcount")]
#[command(about = "Scale the traffic counts in an XLSX workbook by a percentage")]
#[command(version)]
struct Cli {
    /// JSON engine configuration (locator thresholds, transform and save options)
    #[arg(long, global = true, env = "XLCOUNT_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Transform the count cells of a workbook and write the result
    Transform {
        /// Input workbook (.xlsx)
        input: PathBuf,

        /// Output workbook
        #[arg(short, long, required_unless_present = "dry_run")]
        output: Option<PathBuf>,

        /// Whole percentage, 1 to 100
        #[arg(short, long)]
        percentage: String,

        /// increase or decrease
        #[arg(long)]
        operation: String,

        /// Only consider these sheets (repeatable)
        #[arg(long = "sheet")]
        sheets: Vec<String>,

        /// Push small counts in 1..=N that rounding leaves unchanged by one
        #[arg(long, value_name = "N")]
        nudge: Option<u32>,

        /// Leave calcPr untouched instead of forcing recalculation on open
        #[arg(long)]
        no_recalc: bool,

        /// Print the change log without writing a file
        #[arg(short = 'n', long)]
        dry_run: bool,
    },

    /// Show the role assigned to every column
    Classify {
        /// Input workbook (.xlsx)
        input: PathBuf,

        /// Print the classification as JSON
        #[arg(long)]
        json: bool,
    },

    /// Read a JSON request on stdin and answer on stdout
    Invoke,
}

/// `{ "file": base64, "percentage": 13, "operation": "increase" }`
#[derive(Deserialize)]
struct InvokeRequest {
    file: String,
    /// Number or numeric string.
    percentage: serde_json::Value,
    operation: String,
}

/// Failures at the invoke boundary: the request itself, or the engine.
#[derive(Debug, thiserror::Error)]
enum InvokeError {
    #[error("Invalid request: {0}")]
    Request(String),
    #[error(transparent)]
    Engine(#[from] XlcountError),
}

impl InvokeError {
    fn kind(&self) -> &'static str {
        match self {
            Self::Request(_) => "invalid_request",
            Self::Engine(e) => e.kind(),
        }
    }

    fn is_warning(&self) -> bool {
        matches!(self, Self::Engine(e) if e.is_warning())
    }
}

#[derive(Serialize)]
#[serde(untagged)]
enum InvokeResponse {
    Done { file: String, log: String },
    Failed { error: String, kind: &'static str },
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(io::stderr)
        .init();
}

fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let mut config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Transform {
            input,
            output,
            percentage,
            operation,
            sheets,
            nudge,
            no_recalc,
            dry_run,
        } => {
            if !sheets.is_empty() {
                config.locator.sheets = Some(sheets);
            }
            if nudge.is_some() {
                config.transform.small_count_nudge = nudge;
            }
            if no_recalc {
                config.save.force_full_calc_on_load = false;
            }

            let request = TransformRequest::parse(&percentage, &operation)?;
            let data = read_input(&input)?;

            if dry_run {
                let (_, log) = preview_transform(&data, &request, &config)?;
                println!("{log}");
                return Ok(ExitCode::SUCCESS);
            }

            let result = transform_workbook(&data, &request, &config)?;
            let Some(output) = output else {
                bail!("--output is required unless --dry-run is given");
            };
            fs::write(&output, &result.bytes)
                .with_context(|| format!("failed to write {}", output.display()))?;
            println!("{}", result.log);
            eprintln!("Written: {}", output.display());
            Ok(ExitCode::SUCCESS)
        }

        Commands::Classify { input, json } => {
            let data = read_input(&input)?;
            let classification = classify_workbook(&data, &config)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&classification)?);
            } else {
                print_classification(&classification);
            }
            Ok(ExitCode::SUCCESS)
        }

        Commands::Invoke => {
            let mut body = String::new();
            io::stdin()
                .read_to_string(&mut body)
                .context("failed to read request from stdin")?;

            let response = invoke(&body, &config);
            let failed = matches!(response, InvokeResponse::Failed { .. });
            let mut stdout = io::stdout().lock();
            serde_json::to_writer(&mut stdout, &response)?;
            writeln!(stdout)?;
            Ok(if failed {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            })
        }
    }
}

fn invoke(body: &str, config: &EngineConfig) -> InvokeResponse {
    match handle_invoke(body, config) {
        Ok(response) => response,
        Err(e) => {
            if e.is_warning() {
                tracing::warn!(error = %e, "request rejected");
            } else {
                tracing::error!(error = %e, "request failed");
            }
            InvokeResponse::Failed {
                error: e.to_string(),
                kind: e.kind(),
            }
        }
    }
}

fn handle_invoke(body: &str, config: &EngineConfig) -> Result<InvokeResponse, InvokeError> {
    let request: InvokeRequest = serde_json::from_str(body)
        .map_err(|e| InvokeError::Request(format!("body is not a valid request: {e}")))?;

    let percentage = match &request.percentage {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let transform = TransformRequest::parse(&percentage, &request.operation)?;
    let data = STANDARD
        .decode(request.file.trim())
        .map_err(|e| InvokeError::Request(format!("file is not valid base64: {e}")))?;

    let output = transform_workbook(&data, &transform, config)?;
    Ok(InvokeResponse::Done {
        file: STANDARD.encode(&output.bytes),
        log: output.log.to_string(),
    })
}

fn read_input(path: &Path) -> anyhow::Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("failed to read {}", path.display()))
}

fn load_config(path: Option<&Path>) -> anyhow::Result<EngineConfig> {
    let Some(path) = path else {
        return Ok(EngineConfig::default());
    };
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("failed to parse JSON config {}", path.display()))
}

fn print_classification(classification: &WorkbookClassification) {
    for name in &classification.missing_sheets {
        println!("{name} (not found)");
    }
    for sheet in &classification.sheets {
        match sheet.header_rows {
            Some((first, last)) => println!(
                "{} (header rows {}-{}, {} count cells)",
                sheet.sheet_name,
                first + 1,
                last + 1,
                sheet.count_cells
            ),
            None => println!("{} (empty)", sheet.sheet_name),
        }
        for column in sheet.columns.values() {
            let marker = if column.role == ColumnRole::TrafficCount {
                "*"
            } else {
                " "
            };
            println!(
                " {marker} {:<4} {:<24} {}",
                column.letter,
                column.header.as_deref().unwrap_or("-"),
                column.role
            );
        }
    }
}
