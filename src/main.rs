//! CLI entry point for the food desert resilience analysis.
//!
//! Each subcommand runs one fixed report over the joined tract table.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use food_desert_resilience::config::AnalysisConfig;
use food_desert_resilience::output::{print_json, print_pretty};
use food_desert_resilience::reports::{self, anomalies, least_resilient, resilient, sensitivity, tables};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "food_desert_resilience")]
#[command(about = "Classify and summarize food desert resilience by census tract", long_about = None)]
struct Cli {
    /// JSON config file (falls back to RESILIENCE_CONFIG, then defaults)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Model results CSV with resilience scores
    #[arg(long, global = true)]
    model: Option<PathBuf>,

    /// Tract attribute CSV from the food access atlas
    #[arg(long, global = true)]
    attributes: Option<PathBuf>,

    /// Tab-separated tract centroid file
    #[arg(long, global = true)]
    centroids: Option<PathBuf>,

    /// Directory for report CSV and JSON files
    #[arg(short, long, global = true)]
    output_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List LILA tracts in the top resilience decile
    Resilient,
    /// List LILA tracts in the bottom resilience decile and compare them to the top
    LeastResilient,
    /// Investigate data quality anomalies and alternative explanations
    Anomalies,
    /// Write the publication tables
    Tables,
    /// Compare resilience across LILA definitions
    Sensitivity,
    /// Run every report on one load of the inputs
    All,
}

impl Cli {
    fn config(&self) -> Result<AnalysisConfig> {
        let mut config =
            AnalysisConfig::resolve(self.config.as_deref()).context("loading analysis config")?;

        if let Some(path) = &self.model {
            config.paths.model_results = path.clone();
        }
        if let Some(path) = &self.attributes {
            config.paths.tract_attributes = path.clone();
        }
        if let Some(path) = &self.centroids {
            config.paths.centroids = Some(path.clone());
        }
        if let Some(dir) = &self.output_dir {
            config.paths.output_dir = dir.clone();
        }

        config.validate()?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/resilience.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("resilience.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();
    let config = cli.config()?;
    print_pretty(&config);

    let tracts = reports::load(&config)?;
    info!(tracts = tracts.len(), "Tracts loaded");

    match cli.command {
        Commands::Resilient => print_json(&resilient::run(&config, &tracts)?)?,
        Commands::LeastResilient => print_json(&least_resilient::run(&config, &tracts)?)?,
        Commands::Anomalies => print_json(&anomalies::run(&config, &tracts)?)?,
        Commands::Tables => print_json(&tables::run(&config, &tracts)?)?,
        Commands::Sensitivity => print_json(&sensitivity::run(&config, &tracts)?)?,
        Commands::All => reports::run_all(&config, &tracts)?,
    }

    Ok(())
}
