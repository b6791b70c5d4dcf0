//! SDP Ingest Library
//!
//! Snapshot ingestion-and-validation pipelines for dated landings in a
//! cloud object store.
//!
//! A run discovers the most recent dated snapshot folder under a configured
//! prefix, downloads the snapshot file, evaluates a declarative set of
//! per-column expectations, and only on full success appends a provenance
//! record to the ingestion log and writes staging outputs (relational table
//! and/or CSV artefact).
//!
//! # Example
//!
//! ```no_run
//! use sdp_ingest::config::PipelineConfig;
//! use sdp_ingest::datalake::{Datalake, DatalakeConfig};
//! use sdp_ingest::pipeline::ValidationPipeline;
//! use sdp_ingest::sink::{Sink, SinkConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = PipelineConfig::load("config/pipelines.json")?;
//!     let datalake = Datalake::new(DatalakeConfig::from_env()?);
//!     let sink = Sink::connect(&SinkConfig::from_env()?).await?;
//!
//!     let pipeline = ValidationPipeline::new(config, datalake, sink);
//!     let report = pipeline.run("social_care_digital_records").await?;
//!     println!("validated {} rows", report.row_count);
//!     Ok(())
//! }
//! ```

pub mod audit;
pub mod config;
pub mod datalake;
pub mod pipeline;
pub mod resolver;
pub mod sink;
pub mod table;
pub mod validate;

// Re-export main types
pub use audit::{AggregateRecord, AuditRecord, IngestionLogger};
pub use config::{ConfigError, PipelineConfig, PipelineSpec};
pub use datalake::{Datalake, DatalakeConfig, DatalakeError, UploadResult};
pub use pipeline::{PipelineError, RunReport, ValidationPipeline};
pub use resolver::{latest_folder, parse_dated_folders, DatedFolder, ResolveError};
pub use sink::{Sink, SinkConfig, SinkError, WriteMode};
pub use table::{ColumnType, CsvOptions, Table, TableError};
pub use validate::{ensure_all_passed, validate, ExpectationResult, ExpectationSpec, ValidateError};
