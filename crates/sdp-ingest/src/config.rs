//! Pipeline configuration
//!
//! Configuration is a JSON document parsed once into an immutable
//! [`PipelineConfig`] and passed by reference into each component; nothing
//! reads configuration ambiently. Pipelines are keyed by name.
//!
//! The historical document layout addressed sinks by fixed array position
//! (`databricks[i]` paired with `staging[i]`), which meant inserting an
//! entry shifted every later consumer. [`PipelineConfig::from_legacy_document`]
//! migrates that layout into the keyed form.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

use crate::sink::WriteMode;
use crate::validate::ExpectationSpec;

/// Result type for configuration loading
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors raised while loading or validating configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config document: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config document: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Unknown pipeline: {0}")]
    UnknownPipeline(String),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

fn default_audit_table() -> String {
    "ingestion_log".to_string()
}

fn default_aggregate_table() -> String {
    "staging_row_counts".to_string()
}

/// Immutable configuration for all pipelines of a deployment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Append-only ingestion log table
    #[serde(default = "default_audit_table")]
    pub audit_table: String,

    /// Append-only staging row-count log table
    #[serde(default = "default_aggregate_table")]
    pub aggregate_table: String,

    /// Pipelines keyed by name
    pub pipelines: BTreeMap<String, PipelineSpec>,
}

/// Per-pipeline source, sink, and validation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSpec {
    /// Object-store prefix holding the dated snapshot folders
    pub source_path: String,

    /// File-name fragment identifying the snapshot file inside a folder
    pub source_file: String,

    /// Object-store prefix for the processed CSV artefact
    #[serde(default)]
    pub sink_path: Option<String>,

    /// File name of the processed CSV artefact
    #[serde(default)]
    pub sink_file: Option<String>,

    /// Relational staging table written after validation
    #[serde(default)]
    pub sink_table: Option<String>,

    /// Composite key for dedupe-keep-last; empty means no dedupe
    #[serde(default)]
    pub key_columns: Vec<String>,

    /// Decimal places for float cells in the CSV artefact
    #[serde(default)]
    pub float_precision: Option<u32>,

    /// Staging write mode
    #[serde(default)]
    pub write_mode: WriteMode,

    /// Expectations evaluated against the snapshot before any write
    #[serde(default)]
    pub expectations: Vec<ExpectationSpec>,
}

impl PipelineConfig {
    /// Read and parse a config document from disk
    ///
    /// Accepts both the keyed layout and the legacy positional layout.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let document = std::fs::read_to_string(path)?;
        Self::from_json(&document)
    }

    /// Parse a config document, detecting the layout
    pub fn from_json(document: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(document)?;

        let config = if value.get("pipelines").is_some() {
            serde_json::from_value(value)?
        } else if value.get("pipeline").is_some() {
            Self::migrate_legacy(serde_json::from_value(value)?)
        } else {
            return Err(ConfigError::Invalid(
                "document has neither a 'pipelines' map nor a legacy 'pipeline' section"
                    .to_string(),
            ));
        };

        config.validate()?;
        Ok(config)
    }

    /// Migrate a legacy positional document into the keyed form
    ///
    /// `databricks[i]` sink entries pair with `staging[i]` table entries by
    /// index; each pair becomes one keyed pipeline, named after its staging
    /// table when present.
    pub fn from_legacy_document(document: &str) -> Result<Self> {
        let legacy: LegacyDocument = serde_json::from_str(document)?;
        let config = Self::migrate_legacy(legacy);
        config.validate()?;
        Ok(config)
    }

    fn migrate_legacy(legacy: LegacyDocument) -> Self {
        let project = legacy.pipeline.project;
        let staging = legacy.pipeline.staging;
        let mut pipelines = BTreeMap::new();

        for (index, sink) in project.databricks.into_iter().enumerate() {
            let staging_table = staging.get(index).map(|s| s.sink_table.clone());

            let name = staging_table
                .clone()
                .or_else(|| {
                    sink.sink_file
                        .as_deref()
                        .map(|f| f.trim_end_matches(".csv").to_string())
                })
                .unwrap_or_else(|| format!("pipeline-{:02}", index));

            let spec = PipelineSpec {
                source_path: project.source_path.clone(),
                source_file: project.source_file.clone(),
                sink_path: sink.sink_path,
                sink_file: sink.sink_file,
                sink_table: staging_table,
                key_columns: Vec::new(),
                float_precision: None,
                write_mode: WriteMode::default(),
                expectations: Vec::new(),
            };

            info!(pipeline = %name, position = index, "Migrated positional config entry");
            pipelines.insert(name, spec);
        }

        Self {
            audit_table: default_audit_table(),
            aggregate_table: default_aggregate_table(),
            pipelines,
        }
    }

    /// Look up one pipeline by name
    pub fn pipeline(&self, name: &str) -> Result<&PipelineSpec> {
        self.pipelines
            .get(name)
            .ok_or_else(|| ConfigError::UnknownPipeline(name.to_string()))
    }

    /// Staging tables named across all pipelines, for the row-count job
    pub fn staging_tables(&self) -> Vec<String> {
        self.pipelines
            .values()
            .filter_map(|spec| spec.sink_table.clone())
            .collect()
    }

    /// Check structural invariants of the parsed document
    pub fn validate(&self) -> Result<()> {
        if self.pipelines.is_empty() {
            return Err(ConfigError::Invalid("no pipelines configured".to_string()));
        }
        if self.audit_table.is_empty() {
            return Err(ConfigError::Invalid("audit_table is empty".to_string()));
        }

        for (name, spec) in &self.pipelines {
            if spec.source_path.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "pipeline '{}' has an empty source_path",
                    name
                )));
            }
            if spec.source_file.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "pipeline '{}' has an empty source_file",
                    name
                )));
            }
            if spec.sink_path.is_some() != spec.sink_file.is_some() {
                return Err(ConfigError::Invalid(format!(
                    "pipeline '{}' must set sink_path and sink_file together",
                    name
                )));
            }
        }

        Ok(())
    }
}

// Legacy positional document shape, kept only as migration input.

#[derive(Debug, Deserialize)]
pub struct LegacyDocument {
    pipeline: LegacyPipeline,
}

#[derive(Debug, Deserialize)]
struct LegacyPipeline {
    project: LegacyProject,
    #[serde(default)]
    staging: Vec<LegacyStaging>,
}

#[derive(Debug, Deserialize)]
struct LegacyProject {
    source_path: String,
    source_file: String,
    #[serde(default)]
    databricks: Vec<LegacySink>,
}

#[derive(Debug, Deserialize)]
struct LegacySink {
    #[serde(default)]
    sink_path: Option<String>,
    #[serde(default)]
    sink_file: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LegacyStaging {
    sink_table: String,
}
