//! Minimal in-memory tabular model
//!
//! The validator, sink, and CSV codec all operate on [`Table`]: ordered
//! column names plus rows of nullable string cells. Snapshots are decoded
//! from CSV, blanks are masked to null, and processed tables are encoded
//! back to CSV with an index column and fixed float precision.

use chrono::NaiveDate;
use csv::{ReaderBuilder, WriterBuilder};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Result type for table operations
pub type Result<T> = std::result::Result<T, TableError>;

/// Errors raised by the tabular model
#[derive(Debug, thiserror::Error)]
pub enum TableError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("CSV encode error: {0}")]
    Encode(String),

    #[error("Unknown column: {0}")]
    UnknownColumn(String),

    #[error("Row has {actual} cells, table has {expected} columns")]
    RowArity { expected: usize, actual: usize },
}

/// Type vocabulary for column expectations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Int,
    Float,
    Str,
    Date,
}

impl ColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Int => "int",
            Self::Float => "float",
            Self::Str => "str",
            Self::Date => "date",
        }
    }

    /// Whether a non-null cell value conforms to this type
    pub fn matches(&self, value: &str) -> bool {
        match self {
            Self::Int => value.parse::<i64>().is_ok(),
            Self::Float => value.parse::<f64>().is_ok(),
            Self::Str => true,
            Self::Date => NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok(),
        }
    }
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Options for CSV serialization
#[derive(Debug, Clone, Default)]
pub struct CsvOptions {
    /// Header label for a leading positional index column, if any
    pub index_label: Option<String>,
    /// Decimal places to round float-like cells to before writing
    pub float_precision: Option<u32>,
}

impl CsvOptions {
    /// The conventional output shape: "Unique ID" index column plus
    /// float rounding at the given precision.
    pub fn indexed(float_precision: u32) -> Self {
        Self {
            index_label: Some("Unique ID".to_string()),
            float_precision: Some(float_precision),
        }
    }
}

/// An in-memory table of nullable string cells
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Option<String>>>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Option<String>>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn push_row(&mut self, row: Vec<Option<String>>) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(TableError::RowArity {
                expected: self.columns.len(),
                actual: row.len(),
            });
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn column_index(&self, name: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| TableError::UnknownColumn(name.to_string()))
    }

    /// All cell values of one column, in row order
    pub fn column_values(&self, name: &str) -> Result<Vec<Option<&str>>> {
        let idx = self.column_index(name)?;
        Ok(self.rows.iter().map(|row| row[idx].as_deref()).collect())
    }

    /// Decode a headered UTF-8 CSV document
    ///
    /// Empty cells decode as null.
    pub fn from_csv(bytes: &[u8]) -> Result<Self> {
        let mut reader = ReaderBuilder::new().from_reader(bytes);

        let columns: Vec<String> = reader
            .headers()?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        let mut table = Table::new(columns);
        for record in reader.records() {
            let record = record?;
            let row = record
                .iter()
                .map(|cell| {
                    if cell.is_empty() {
                        None
                    } else {
                        Some(cell.to_string())
                    }
                })
                .collect();
            table.rows.push(row);
        }

        Ok(table)
    }

    /// Encode as UTF-8 CSV
    ///
    /// Null cells serialize as empty fields. With an index label set, a
    /// leading positional column is written; with a float precision set,
    /// cells containing a decimal point are rounded before writing.
    pub fn to_csv(&self, options: &CsvOptions) -> Result<Vec<u8>> {
        let mut writer = WriterBuilder::new().from_writer(Vec::new());

        let mut header: Vec<&str> = Vec::with_capacity(self.columns.len() + 1);
        if let Some(label) = &options.index_label {
            header.push(label);
        }
        header.extend(self.columns.iter().map(String::as_str));
        writer.write_record(&header)?;

        for (idx, row) in self.rows.iter().enumerate() {
            let mut record: Vec<String> = Vec::with_capacity(header.len());
            if options.index_label.is_some() {
                record.push(idx.to_string());
            }
            for cell in row {
                record.push(match cell {
                    None => String::new(),
                    Some(value) => format_cell(value, options.float_precision),
                });
            }
            writer.write_record(&record)?;
        }

        writer
            .into_inner()
            .map_err(|e| TableError::Encode(e.to_string()))
    }

    /// Convert blank cells (empty or whitespace-only) to null
    pub fn mask_blanks(&mut self) {
        for row in &mut self.rows {
            for cell in row {
                if matches!(cell.as_deref(), Some(v) if v.trim().is_empty()) {
                    *cell = None;
                }
            }
        }
    }

    /// Drop duplicate rows by composite key, keeping the last occurrence
    ///
    /// Surviving rows keep the first-appearance relative order of their
    /// key groups.
    pub fn dedupe_keep_last(&self, key_columns: &[&str]) -> Result<Self> {
        let key_indices: Vec<usize> = key_columns
            .iter()
            .map(|c| self.column_index(c))
            .collect::<Result<_>>()?;

        let mut last_row_for_key: HashMap<Vec<Option<String>>, usize> = HashMap::new();
        let mut key_order: Vec<Vec<Option<String>>> = Vec::new();

        for (i, row) in self.rows.iter().enumerate() {
            let key: Vec<Option<String>> =
                key_indices.iter().map(|&k| row[k].clone()).collect();
            if !last_row_for_key.contains_key(&key) {
                key_order.push(key.clone());
            }
            last_row_for_key.insert(key, i);
        }

        let mut deduped = Table::new(self.columns.clone());
        for key in key_order {
            if let Some(&i) = last_row_for_key.get(&key) {
                deduped.rows.push(self.rows[i].clone());
            }
        }

        Ok(deduped)
    }
}

fn format_cell(value: &str, precision: Option<u32>) -> String {
    let Some(places) = precision else {
        return value.to_string();
    };
    // Integer-looking cells stay untouched; only decimal forms round
    if !value.contains('.') {
        return value.to_string();
    }
    match value.parse::<f64>() {
        Ok(number) => {
            let factor = 10f64.powi(places as i32);
            let rounded = (number * factor).round() / factor;
            format!("{}", rounded)
        }
        Err(_) => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(columns: &[&str], rows: &[&[&str]]) -> Table {
        let mut table = Table::new(columns.iter().map(|c| c.to_string()).collect());
        for row in rows {
            let cells = row
                .iter()
                .map(|c| {
                    if c.is_empty() {
                        None
                    } else {
                        Some(c.to_string())
                    }
                })
                .collect();
            table.push_row(cells).unwrap();
        }
        table
    }

    #[test]
    fn csv_round_trip_preserves_nulls() {
        let csv = b"org,count\nX26,3\nY55,\n";
        let table = Table::from_csv(csv).unwrap();

        assert_eq!(table.columns(), &["org", "count"]);
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.rows()[1][1], None);

        let out = table.to_csv(&CsvOptions::default()).unwrap();
        assert_eq!(out, csv.to_vec());
    }

    #[test]
    fn mask_blanks_converts_whitespace_cells() {
        let mut table = sample(&["a", "b"], &[&[" ", "kept"], &["", "also kept"]]);
        // builder already nulled the empty string; the single space survives
        assert_eq!(table.rows()[0][0].as_deref(), Some(" "));

        table.mask_blanks();
        assert_eq!(table.rows()[0][0], None);
        assert_eq!(table.rows()[0][1].as_deref(), Some("kept"));
    }

    #[test]
    fn dedupe_keep_last_keeps_last_occurrence_in_group_order() {
        let table = sample(&["key", "val"], &[&["A", "1"], &["A", "2"], &["B", "1"]]);
        let deduped = table.dedupe_keep_last(&["key"]).unwrap();

        assert_eq!(deduped.row_count(), 2);
        assert_eq!(deduped.rows()[0][1].as_deref(), Some("2"));
        assert_eq!(deduped.rows()[1][0].as_deref(), Some("B"));
    }

    #[test]
    fn dedupe_on_unknown_column_fails() {
        let table = sample(&["key"], &[&["A"]]);
        let err = table.dedupe_keep_last(&["missing"]).unwrap_err();
        assert!(matches!(err, TableError::UnknownColumn(_)));
    }

    #[test]
    fn index_column_and_float_rounding_on_output() {
        let table = sample(&["name", "ratio"], &[&["a", "0.123456"], &["b", "7"]]);
        let out = table.to_csv(&CsvOptions::indexed(4)).unwrap();
        let text = String::from_utf8(out).unwrap();

        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("Unique ID,name,ratio"));
        assert_eq!(lines.next(), Some("0,a,0.1235"));
        assert_eq!(lines.next(), Some("1,b,7"));
    }

    #[test]
    fn rounding_to_two_decimals() {
        assert_eq!(format_cell("0.126", Some(2)), "0.13");
        assert_eq!(format_cell("12.5", Some(2)), "12.5");
        assert_eq!(format_cell("not a number", Some(2)), "not a number");
    }

    #[test]
    fn column_type_matching() {
        assert!(ColumnType::Int.matches("42"));
        assert!(!ColumnType::Int.matches("42.0"));
        assert!(ColumnType::Float.matches("42.0"));
        assert!(ColumnType::Float.matches("42"));
        assert!(ColumnType::Date.matches("2022-04-01"));
        assert!(!ColumnType::Date.matches("01/04/2022"));
        assert!(ColumnType::Str.matches("anything"));
    }

    #[test]
    fn push_row_rejects_wrong_arity() {
        let mut table = Table::new(vec!["only".to_string()]);
        let err = table
            .push_row(vec![Some("a".to_string()), Some("b".to_string())])
            .unwrap_err();
        assert!(matches!(err, TableError::RowArity { expected: 1, actual: 2 }));
    }
}
