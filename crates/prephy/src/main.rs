//! Pre-Phy filters launcher
//!
//! Reads the pipeline's JSON module input, reclassifies cluster labels in the
//! Kilosort output directory, and emits the output manifest as JSON.

use anyhow::{Context, Result};
use clap::Parser;
use prephy_filters::{filter_by_metrics, FilterParams, RunSummary};
use prephy_logging::{init_logging, LogConfig};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "prephy",
    about = "Reclassify sorted clusters from their quality metrics before Phy curation"
)]
struct Cli {
    /// Module input parameters (JSON)
    #[arg(long = "input_json", visible_alias = "input-json", env = "PREPHY_INPUT_JSON")]
    input_json: PathBuf,

    /// Write the output manifest here instead of stdout; overrides `output_json`
    /// from the input file
    #[arg(long = "output_json", visible_alias = "output-json")]
    output_json: Option<PathBuf>,

    /// Enable verbose logging (per-cluster decisions to stderr)
    #[arg(short = 'v', long)]
    verbose: bool,
}

fn manifest(summary: &RunSummary, params: &FilterParams) -> Result<serde_json::Value> {
    let mut value = serde_json::to_value(summary).context("Failed to serialize run summary")?;
    let input = serde_json::to_value(params).context("Failed to serialize input parameters")?;
    if let Some(map) = value.as_object_mut() {
        map.insert("input_parameters".to_string(), input);
    }
    Ok(value)
}

fn write_manifest(value: &serde_json::Value, destination: Option<&Path>) -> Result<()> {
    let text = serde_json::to_string_pretty(value)?;
    match destination {
        Some(path) => {
            std::fs::write(path, text)
                .with_context(|| format!("Failed to write output manifest: {}", path.display()))?;
            info!("Wrote output manifest to {}", path.display());
        }
        None => println!("{}", text),
    }
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    let params = FilterParams::load(&cli.input_json)
        .with_context(|| format!("Failed to load input parameters from {}", cli.input_json.display()))?;

    let summary = filter_by_metrics(&params).with_context(|| {
        format!(
            "pre-Phy filters failed for {}",
            params.directories.kilosort_output_directory.display()
        )
    })?;

    let destination = cli.output_json.as_deref().or(params.output_json.as_deref());
    write_manifest(&manifest(&summary, &params)?, destination)
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(err) = init_logging(LogConfig {
        app_name: "prephy",
        verbose: cli.verbose,
    }) {
        eprintln!("Warning: failed to initialize logging: {:?}", err);
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{:?}", err);
            ExitCode::from(1)
        }
    }
}
