//! Pipeline orchestration
//!
//! [`ValidationPipeline`] runs one configured pipeline end to end: resolve
//! the latest dated snapshot folder, download the snapshot, process it,
//! evaluate expectations, and only then write staging outputs and append
//! the provenance record. A failed expectation aborts before any write, so
//! the logs and staging tables never see an invalid snapshot.

use tracing::info;
use uuid::Uuid;

use crate::audit::{AggregateRecord, AuditRecord, IngestionLogger};
use crate::config::{ConfigError, PipelineConfig, PipelineSpec};
use crate::datalake::{Datalake, DatalakeError, UploadResult};
use crate::sink::{Sink, SinkError};
use crate::table::{CsvOptions, Table, TableError};
use crate::validate::{ensure_all_passed, validate, ValidateError};

/// Result type for pipeline runs
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors raised while running a pipeline
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Datalake(#[from] DatalakeError),

    #[error(transparent)]
    Table(#[from] TableError),

    #[error(transparent)]
    Validation(#[from] ValidateError),

    #[error(transparent)]
    Sink(#[from] SinkError),
}

/// Default decimal places for float cells in CSV artefacts
const DEFAULT_FLOAT_PRECISION: u32 = 4;

/// What one successful run did
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Pipeline that ran
    pub pipeline: String,
    /// Dated folder the snapshot came from
    pub snapshot_folder: String,
    /// Full key of the snapshot file that was loaded
    pub source_key: String,
    /// Rows in the processed table
    pub row_count: usize,
    /// Expectations evaluated against the snapshot
    pub expectations_evaluated: usize,
    /// Rows written to the staging table, when one is configured
    pub staging_rows: Option<u64>,
    /// Uploaded CSV artefact, when one is configured
    pub artefact: Option<UploadResult>,
}

/// End-to-end runner for configured pipelines
pub struct ValidationPipeline {
    config: PipelineConfig,
    datalake: Datalake,
    sink: Sink,
    logger: IngestionLogger,
}

impl ValidationPipeline {
    pub fn new(config: PipelineConfig, datalake: Datalake, sink: Sink) -> Self {
        let logger = IngestionLogger::new(
            sink.clone(),
            config.audit_table.clone(),
            config.aggregate_table.clone(),
        );
        Self {
            config,
            datalake,
            sink,
            logger,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run one pipeline by name
    pub async fn run(&self, name: &str) -> Result<RunReport> {
        let spec = self.config.pipeline(name)?;
        let run_id = Uuid::new_v4();
        info!(pipeline = name, run_id = %run_id, "Starting snapshot validation pipeline");

        info!("Step 1/5: Resolving latest snapshot folder...");
        let folder = self
            .datalake
            .latest_snapshot_folder(&spec.source_path)
            .await?;

        info!("Step 2/5: Downloading snapshot file...");
        let source_key = self
            .datalake
            .find_snapshot_file(&spec.source_path, &folder.name, &spec.source_file)
            .await?;
        let bytes = self.datalake.download(&source_key).await?;

        info!("Step 3/5: Processing snapshot...");
        let table = process_snapshot(&bytes, spec)?;
        info!(
            rows = table.row_count(),
            columns = table.columns().len(),
            "Processed snapshot table"
        );

        info!("Step 4/5: Evaluating expectations...");
        let results = validate(&table, &spec.expectations);
        ensure_all_passed(&source_key, &results)?;
        info!(expectations = results.len(), "All expectations passed");

        info!("Step 5/5: Writing staging outputs...");
        let staging_rows = self.write_staging(spec, &table).await?;
        let artefact = self.upload_artefact(spec, &folder.name, &table).await?;

        let record = AuditRecord::new(
            source_key.clone(),
            table.row_count() as i64,
            spec.sink_table.clone(),
        );
        self.logger.log_ingestion(&record).await?;

        info!(pipeline = name, run_id = %run_id, folder = %folder, "Pipeline run completed");

        Ok(RunReport {
            pipeline: name.to_string(),
            snapshot_folder: folder.name,
            source_key,
            row_count: table.row_count(),
            expectations_evaluated: results.len(),
            staging_rows,
            artefact,
        })
    }

    /// Run every configured pipeline in name order
    ///
    /// The first failure aborts the batch; completed runs keep their log
    /// records.
    pub async fn run_all(&self) -> Result<Vec<RunReport>> {
        let names: Vec<String> = self.config.pipelines.keys().cloned().collect();
        let mut reports = Vec::with_capacity(names.len());

        for name in names {
            reports.push(self.run(&name).await?);
        }

        Ok(reports)
    }

    /// Count every configured staging table and append aggregate records
    pub async fn record_staging_counts(&self) -> Result<Vec<AggregateRecord>> {
        let tables = self.config.staging_tables();
        info!(tables = tables.len(), "Starting staging row-count job");

        let records = self.logger.log_staging_counts(&tables).await?;
        Ok(records)
    }

    async fn write_staging(&self, spec: &PipelineSpec, table: &Table) -> Result<Option<u64>> {
        let Some(table_name) = &spec.sink_table else {
            return Ok(None);
        };

        let written = self
            .sink
            .write_table(table, table_name, spec.write_mode)
            .await?;
        Ok(Some(written))
    }

    async fn upload_artefact(
        &self,
        spec: &PipelineSpec,
        folder: &str,
        table: &Table,
    ) -> Result<Option<UploadResult>> {
        let (Some(sink_path), Some(sink_file)) = (&spec.sink_path, &spec.sink_file) else {
            return Ok(None);
        };

        let options = artefact_options(spec);
        let bytes = table.to_csv(&options)?;
        let key = artefact_key(sink_path, folder, sink_file);

        let result = self
            .datalake
            .upload(&key, bytes, Some("text/csv".to_string()))
            .await?;
        Ok(Some(result))
    }
}

fn process_snapshot(bytes: &[u8], spec: &PipelineSpec) -> Result<Table> {
    let mut table = Table::from_csv(bytes)?;
    table.mask_blanks();

    if spec.key_columns.is_empty() {
        return Ok(table);
    }

    let keys: Vec<&str> = spec.key_columns.iter().map(String::as_str).collect();
    let deduped = table.dedupe_keep_last(&keys)?;
    Ok(deduped)
}

fn artefact_options(spec: &PipelineSpec) -> CsvOptions {
    CsvOptions::indexed(spec.float_precision.unwrap_or(DEFAULT_FLOAT_PRECISION))
}

// Artefacts land under a dated folder mirroring the snapshot folder.
fn artefact_key(sink_path: &str, folder: &str, sink_file: &str) -> String {
    let prefix = sink_path.trim_end_matches('/');
    if prefix.is_empty() {
        format!("{}/{}", folder, sink_file)
    } else {
        format!("{}/{}/{}", prefix, folder, sink_file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::WriteMode as Wm;

    fn spec() -> PipelineSpec {
        PipelineSpec {
            source_path: "land/records/".to_string(),
            source_file: "snapshot.csv".to_string(),
            sink_path: Some("proc/records/".to_string()),
            sink_file: Some("records.csv".to_string()),
            sink_table: Some("records_staging".to_string()),
            key_columns: vec!["org".to_string()],
            float_precision: None,
            write_mode: Wm::Overwrite,
            expectations: Vec::new(),
        }
    }

    #[test]
    fn processing_masks_blanks_then_dedupes_keep_last() {
        let csv = b"org,count\nX26, \nX26,2\nY55,3\n";
        let table = process_snapshot(csv, &spec()).unwrap();

        assert_eq!(table.row_count(), 2);
        // X26 keeps its last occurrence, with the blank already nulled away
        assert_eq!(table.rows()[0][1].as_deref(), Some("2"));
        assert_eq!(table.rows()[1][0].as_deref(), Some("Y55"));
    }

    #[test]
    fn processing_without_key_columns_skips_dedupe() {
        let mut s = spec();
        s.key_columns.clear();

        let csv = b"org,count\nX26,1\nX26,2\n";
        let table = process_snapshot(csv, &s).unwrap();
        assert_eq!(table.row_count(), 2);
    }

    #[test]
    fn artefact_keys_nest_under_the_snapshot_folder() {
        assert_eq!(
            artefact_key("proc/records/", "2022-04-01", "records.csv"),
            "proc/records/2022-04-01/records.csv"
        );
        assert_eq!(
            artefact_key("proc/records", "2022-04-01", "records.csv"),
            "proc/records/2022-04-01/records.csv"
        );
        assert_eq!(
            artefact_key("", "2022-04-01", "records.csv"),
            "2022-04-01/records.csv"
        );
    }

    #[test]
    fn artefact_options_default_to_four_decimal_places() {
        let options = artefact_options(&spec());
        assert_eq!(options.float_precision, Some(4));
        assert_eq!(options.index_label.as_deref(), Some("Unique ID"));

        let mut s = spec();
        s.float_precision = Some(2);
        assert_eq!(artefact_options(&s).float_precision, Some(2));
    }
}
