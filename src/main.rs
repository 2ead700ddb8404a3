//! tracegen: turn vehicle telemetry into Perfetto traces.

use std::io::{self, Read};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use tracegen::adapters::{adapter_for, SUPPORTED_TYPES};
use tracegen::fetch::{load_json_records, DataFetcher, FetchRequest, FileFetcher, HttpFetcher};
use tracegen::mapper::ConfigFile;
use tracegen::merge::merge_json;
use tracegen::output::output_file_name;
use tracegen::{BuilderOptions, ConversionReport, TraceBuilder};

#[derive(Debug, Parser)]
#[command(name = "tracegen")]
#[command(about = "Convert vehicle telemetry into Perfetto trace files")]
#[command(version)]
struct Cli {
    /// Enable debug logging
    #[arg(long)]
    verbose: bool,

    /// Seed identifier generation for reproducible output
    #[arg(long)]
    seed: Option<u64>,

    /// Timezone log-line dates are written in
    #[arg(long, default_value = "+0000", allow_hyphen_values = true)]
    log_timezone: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Fetch telemetry for one vehicle and convert it
    Fetch {
        /// Vehicle VIN
        #[arg(short = 'v', long)]
        vin: String,

        /// Window start, 'YYYY-MM-DD HH:MM:SS'
        #[arg(short, long)]
        start: String,

        /// Window end, 'YYYY-MM-DD HH:MM:SS'
        #[arg(short, long)]
        end: String,

        /// Data types to fetch
        #[arg(short = 't', long = "type", required = true)]
        types: Vec<String>,

        /// Timezone of wall-clock times in the fetched data
        #[arg(long, default_value = "+0800", allow_hyphen_values = true)]
        timezone: String,

        /// Output directory
        #[arg(short, long, default_value = ".")]
        output: PathBuf,

        /// Query service URL
        #[arg(long, env = "TRACEGEN_ENDPOINT")]
        endpoint: Option<String>,

        /// Read previously downloaded files from this directory instead
        #[arg(long)]
        input_dir: Option<PathBuf>,
    },

    /// Map JSON records onto tracks with a track configuration
    Map {
        /// JSON record files
        #[arg(short, long, required = true)]
        input: Vec<PathBuf>,

        /// Track configuration file
        #[arg(short, long)]
        config: PathBuf,

        /// Process name for list-form configurations
        #[arg(short, long, default_value = "default")]
        process: String,

        /// Output trace file
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Build a trace from column-oriented merge JSON
    Merge {
        /// Output trace file
        #[arg(short, long)]
        output: PathBuf,

        /// Merge JSON file, stdin when absent
        input: Option<PathBuf>,
    },
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn print_report(report: &ConversionReport) {
    for line in report.to_string().lines() {
        tracing::info!("{}", line);
    }
}

#[allow(clippy::too_many_arguments)]
fn run_fetch(
    options: BuilderOptions,
    vin: String,
    start: String,
    end: String,
    types: Vec<String>,
    timezone: String,
    output: PathBuf,
    endpoint: Option<String>,
    input_dir: Option<PathBuf>,
) -> Result<()> {
    let fetcher: Box<dyn DataFetcher> = match (endpoint, input_dir) {
        (_, Some(dir)) => Box::new(FileFetcher::new(dir)),
        (Some(url), None) => Box::new(HttpFetcher::new(url)?),
        (None, None) => {
            bail!("No data source: pass --endpoint or --input-dir, or set TRACEGEN_ENDPOINT")
        }
    };

    let mut builder = TraceBuilder::with_options(options);
    let mut report = ConversionReport::new();
    for data_type in &types {
        let Some(adapter) = adapter_for(data_type, &timezone) else {
            tracing::warn!(
                "Unsupported data type {}, expected one of {:?}",
                data_type,
                SUPPORTED_TYPES
            );
            continue;
        };

        tracing::info!("Fetching {} data...", data_type);
        let request = FetchRequest {
            subject: vin.clone(),
            start: start.clone(),
            end: end.clone(),
            data_type: data_type.clone(),
        };
        let raw = fetcher
            .fetch(&request)
            .with_context(|| format!("Failed to fetch {} data", data_type))?;
        tracing::info!("Fetched {} raw {} records", raw.len(), data_type);

        let standard = adapter.to_standard(&raw);
        tracing::info!("Adapted to {} standard records", standard.len());
        report.merge(&builder.ingest_standard(&standard)?);
    }

    let path = output.join(output_file_name(&vin, &start, &end));
    builder.save(&path)?;
    print_report(&report);
    tracing::info!("Open {} in the Perfetto UI", path.display());
    Ok(())
}

fn run_map(
    options: BuilderOptions,
    inputs: Vec<PathBuf>,
    config: &Path,
    process: &str,
    output: &Path,
) -> Result<()> {
    let configs = ConfigFile::load(config)?.into_map(process);

    let mut records = Vec::new();
    for input in &inputs {
        records.extend(load_json_records(input)?);
    }
    tracing::info!("Loaded {} records from {} files", records.len(), inputs.len());

    let mut builder = TraceBuilder::with_options(options);
    let report = builder.apply_all(&records, &configs)?;
    builder.save(output)?;
    print_report(&report);
    Ok(())
}

fn run_merge(options: BuilderOptions, input: Option<PathBuf>, output: &Path) -> Result<()> {
    let text = match input {
        Some(path) => std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => {
            let mut text = String::new();
            io::stdin()
                .read_to_string(&mut text)
                .context("Failed to read stdin")?;
            text
        }
    };

    let (doc, report) = merge_json(&text, options)?;
    doc.save(output)?;
    print_report(&report);
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let options = BuilderOptions {
        log_timezone: cli.log_timezone,
        seed: cli.seed,
    };

    match cli.command {
        Commands::Fetch {
            vin,
            start,
            end,
            types,
            timezone,
            output,
            endpoint,
            input_dir,
        } => run_fetch(
            options, vin, start, end, types, timezone, output, endpoint, input_dir,
        ),
        Commands::Map {
            input,
            config,
            process,
            output,
        } => run_map(options, input, &config, &process, &output),
        Commands::Merge { output, input } => run_merge(options, input, &output),
    }
}
