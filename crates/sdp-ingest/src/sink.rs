//! Relational staging sink
//!
//! Staging tables and the append-only log tables live in Postgres. Table
//! and column names come from configuration, so every dynamic identifier
//! passes through [`quote_ident`] before it reaches a statement; values are
//! always bound, never interpolated.

use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::audit::{AggregateRecord, AuditRecord};
use crate::table::Table;

/// Result type for sink operations
pub type Result<T> = std::result::Result<T, SinkError>;

/// Errors raised while writing to the staging database
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Refusing to write empty table to '{0}'")]
    EmptyTable(String),

    #[error("Invalid identifier: {0}")]
    InvalidName(String),

    #[error("Missing environment variable: {0}")]
    MissingEnv(String),
}

/// How rows land in an existing staging table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteMode {
    /// Replace the table contents inside one transaction
    #[default]
    Overwrite,
    /// Leave existing rows in place and add the new ones
    Append,
}

impl WriteMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Overwrite => "overwrite",
            Self::Append => "append",
        }
    }
}

impl std::fmt::Display for WriteMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection settings for the staging database
#[derive(Debug, Clone)]
pub struct SinkConfig {
    /// Postgres connection string
    pub database_url: String,
    /// Upper bound on pooled connections
    pub max_connections: u32,
}

impl SinkConfig {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            max_connections: 5,
        }
    }

    /// Read connection settings from the environment
    ///
    /// `DATABASE_URL` is required; `DATABASE_MAX_CONNECTIONS` is optional.
    pub fn from_env() -> Result<Self> {
        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| SinkError::MissingEnv("DATABASE_URL".to_string()))?;

        let max_connections = std::env::var("DATABASE_MAX_CONNECTIONS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(5);

        Ok(Self {
            database_url,
            max_connections,
        })
    }
}

/// Quote a configured table or column name as a Postgres identifier
///
/// Names are wrapped in double quotes; empty names and names containing a
/// quote character are rejected rather than escaped.
pub fn quote_ident(name: &str) -> Result<String> {
    if name.is_empty() {
        return Err(SinkError::InvalidName("empty identifier".to_string()));
    }
    if name.contains('"') {
        return Err(SinkError::InvalidName(name.to_string()));
    }
    Ok(format!("\"{}\"", name))
}

/// Handle to the staging database
#[derive(Debug, Clone)]
pub struct Sink {
    pool: PgPool,
}

impl Sink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a connection pool against the configured database
    pub async fn connect(config: &SinkConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.database_url)
            .await?;

        info!(max_connections = config.max_connections, "Connected to staging database");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Write a validated table into a staging table
    ///
    /// Overwrite truncates and inserts inside one transaction, so readers
    /// never observe a half-written table. Append inserts without touching
    /// existing rows. Returns the number of rows written.
    pub async fn write_table(
        &self,
        table: &Table,
        table_name: &str,
        mode: WriteMode,
    ) -> Result<u64> {
        if table.row_count() == 0 {
            return Err(SinkError::EmptyTable(table_name.to_string()));
        }

        let target = quote_ident(table_name)?;
        let insert_sql = build_insert_sql(&target, table.columns())?;

        let mut tx = self.pool.begin().await?;

        if mode == WriteMode::Overwrite {
            sqlx::query(&format!("TRUNCATE TABLE {}", target))
                .execute(&mut *tx)
                .await?;
        }

        let written = insert_rows(&mut tx, &insert_sql, table).await?;
        tx.commit().await?;

        info!(
            table = table_name,
            mode = %mode,
            rows = written,
            "Wrote staging table"
        );
        Ok(written)
    }

    /// Count the rows currently in a staging table
    pub async fn read_row_count(&self, table_name: &str) -> Result<i64> {
        let target = quote_ident(table_name)?;
        let (count,): (i64,) =
            sqlx::query_as(&format!("SELECT COUNT(*) FROM {}", target))
                .fetch_one(&self.pool)
                .await?;

        debug!(table = table_name, rows = count, "Read staging row count");
        Ok(count)
    }

    /// Append one provenance record to the ingestion log
    pub async fn append_audit(&self, audit_table: &str, record: &AuditRecord) -> Result<()> {
        let target = quote_ident(audit_table)?;
        let sql = format!(
            "INSERT INTO {} (load_date, file_to_load, row_count, tbl_name) VALUES ($1, $2, $3, $4)",
            target
        );

        sqlx::query(&sql)
            .bind(record.load_date)
            .bind(&record.file_to_load)
            .bind(record.row_count)
            .bind(&record.tbl_name)
            .execute(&self.pool)
            .await?;

        debug!(
            table = audit_table,
            file = %record.file_to_load,
            rows = record.row_count,
            "Appended ingestion log record"
        );
        Ok(())
    }

    /// Append one row-count record to the aggregate log
    pub async fn append_aggregate(
        &self,
        aggregate_table: &str,
        record: &AggregateRecord,
    ) -> Result<()> {
        let target = quote_ident(aggregate_table)?;
        let sql = format!(
            "INSERT INTO {} (load_date, tbl_name, aggregation, aggregate_value) VALUES ($1, $2, $3, $4)",
            target
        );

        sqlx::query(&sql)
            .bind(record.load_date)
            .bind(&record.tbl_name)
            .bind(&record.aggregation)
            .bind(record.aggregate_value)
            .execute(&self.pool)
            .await?;

        debug!(
            table = aggregate_table,
            staging = %record.tbl_name,
            value = record.aggregate_value,
            "Appended aggregate record"
        );
        Ok(())
    }
}

fn build_insert_sql(target: &str, columns: &[String]) -> Result<String> {
    let quoted: Vec<String> = columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Result<_>>()?;

    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("${}", i)).collect();

    Ok(format!(
        "INSERT INTO {} ({}) VALUES ({})",
        target,
        quoted.join(", "),
        placeholders.join(", ")
    ))
}

async fn insert_rows(
    tx: &mut Transaction<'_, Postgres>,
    insert_sql: &str,
    table: &Table,
) -> Result<u64> {
    let mut written = 0u64;
    for row in table.rows() {
        let mut query = sqlx::query(insert_sql);
        for cell in row {
            query = query.bind(cell.as_deref());
        }
        written += query.execute(&mut **tx).await?.rows_affected();
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_mode_defaults_to_overwrite_and_serializes_lowercase() {
        assert_eq!(WriteMode::default(), WriteMode::Overwrite);

        let mode: WriteMode = serde_json::from_str("\"append\"").unwrap();
        assert_eq!(mode, WriteMode::Append);
        assert_eq!(serde_json::to_string(&WriteMode::Overwrite).unwrap(), "\"overwrite\"");
    }

    #[test]
    fn quote_ident_wraps_plain_names() {
        assert_eq!(quote_ident("digital_records_staging").unwrap(), "\"digital_records_staging\"");
        assert_eq!(quote_ident("Org Code").unwrap(), "\"Org Code\"");
    }

    #[test]
    fn quote_ident_rejects_empty_and_quoted_names() {
        assert!(matches!(quote_ident(""), Err(SinkError::InvalidName(_))));
        assert!(matches!(
            quote_ident("x\"; DROP TABLE y; --"),
            Err(SinkError::InvalidName(_))
        ));
    }

    #[test]
    fn insert_sql_quotes_columns_and_numbers_placeholders() {
        let sql = build_insert_sql(
            "\"staging\"",
            &["org".to_string(), "Org Name".to_string(), "count".to_string()],
        )
        .unwrap();

        assert_eq!(
            sql,
            "INSERT INTO \"staging\" (\"org\", \"Org Name\", \"count\") VALUES ($1, $2, $3)"
        );
    }

    #[test]
    fn config_from_env_requires_database_url() {
        // No other test touches DATABASE_URL
        std::env::remove_var("DATABASE_URL");
        let err = SinkConfig::from_env().unwrap_err();
        assert!(matches!(err, SinkError::MissingEnv(_)));
    }
}
