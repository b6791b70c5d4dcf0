//! SDP Ingest - Snapshot validation pipeline runner

use anyhow::Result;
use clap::Parser;
use sdp_common::logging::{init_logging, LogConfig, LogLevel};
use sdp_ingest::config::PipelineConfig;
use sdp_ingest::datalake::{Datalake, DatalakeConfig};
use sdp_ingest::pipeline::ValidationPipeline;
use sdp_ingest::sink::{Sink, SinkConfig};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "sdp-ingest")]
#[command(author, version, about = "Snapshot ingestion and validation pipelines")]
struct Cli {
    /// Path to the pipeline configuration document
    #[arg(
        short,
        long,
        default_value = "config/pipelines.json",
        env = "SDP_CONFIG"
    )]
    config: String,

    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Parser, Debug)]
enum Command {
    /// Validate and load the latest snapshot for one pipeline
    Validate {
        /// Pipeline name from the configuration document
        #[arg(short, long)]
        pipeline: String,
    },

    /// Validate and load the latest snapshot for every pipeline
    ValidateAll,

    /// Count staging rows and append aggregate records
    CountRows,

    /// List the pipelines in the configuration document
    Pipelines,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Initialize logging based on verbose flag
    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("sdp-ingest".to_string())
        .build();

    // Merge with environment variables (they take precedence)
    let log_config = LogConfig::from_env().unwrap_or(log_config);

    init_logging(&log_config)?;

    let config = PipelineConfig::load(&cli.config)?;

    if let Command::Pipelines = cli.command {
        for name in config.pipelines.keys() {
            println!("{}", name);
        }
        return Ok(());
    }

    let datalake = Datalake::new(DatalakeConfig::from_env()?);
    let sink = Sink::connect(&SinkConfig::from_env()?).await?;
    let pipeline = ValidationPipeline::new(config, datalake, sink);

    match cli.command {
        Command::Validate { pipeline: name } => {
            let report = pipeline.run(&name).await?;
            info!(
                pipeline = %report.pipeline,
                folder = %report.snapshot_folder,
                rows = report.row_count,
                "Validation run complete"
            );
        }
        Command::ValidateAll => {
            let reports = pipeline.run_all().await?;
            for report in &reports {
                info!(
                    pipeline = %report.pipeline,
                    folder = %report.snapshot_folder,
                    rows = report.row_count,
                    "Validation run complete"
                );
            }
            info!(pipelines = reports.len(), "All pipelines completed");
        }
        Command::CountRows => {
            let records = pipeline.record_staging_counts().await?;
            for record in &records {
                info!(
                    table = %record.tbl_name,
                    rows = record.aggregate_value,
                    "Staging row count recorded"
                );
            }
        }
        Command::Pipelines => unreachable!("handled before connecting"),
    }

    Ok(())
}
