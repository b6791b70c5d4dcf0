//! Declarative snapshot validation
//!
//! Expectations are immutable per-column (or table-level) rules loaded from
//! the pipeline configuration. [`validate`] evaluates every expectation
//! without short-circuiting and returns one result per rule, in rule order;
//! the caller decides whether to abort via [`ensure_all_passed`].

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::table::{ColumnType, Table};

/// Errors raised by the validation caller contract
#[derive(Debug, thiserror::Error)]
pub enum ValidateError {
    #[error("Validation failed for {file_path}: {failed} of {total} expectations failed\n{details}")]
    ExpectationFailure {
        file_path: String,
        failed: usize,
        total: usize,
        details: String,
    },
}

/// A single declarative data-quality rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "check", rename_all = "snake_case")]
pub enum ExpectationSpec {
    /// Every non-null value of the column parses as the expected type
    ColumnValuesOfType { column: String, expected: ColumnType },
    /// No null values in the column
    ColumnValuesNotNull { column: String },
    /// No non-null value of the column occurs more than once
    ColumnValuesUnique { column: String },
    /// Every non-null value of the column is in the allowed set
    /// (case-sensitive)
    ColumnValuesInSet { column: String, allowed: Vec<String> },
    /// The table has exactly the expected number of rows
    RowCountEquals { expected: usize },
}

impl ExpectationSpec {
    pub fn describe(&self) -> String {
        match self {
            Self::ColumnValuesOfType { column, expected } => {
                format!("column '{}' values of type {}", column, expected)
            }
            Self::ColumnValuesNotNull { column } => {
                format!("column '{}' values not null", column)
            }
            Self::ColumnValuesUnique { column } => {
                format!("column '{}' values unique", column)
            }
            Self::ColumnValuesInSet { column, .. } => {
                format!("column '{}' values in allowed set", column)
            }
            Self::RowCountEquals { expected } => {
                format!("row count equals {}", expected)
            }
        }
    }
}

/// Outcome of evaluating one expectation
#[derive(Debug, Clone, PartialEq)]
pub struct ExpectationResult {
    pub success: bool,
    pub message: String,
    /// Number of cells (or rows) violating the rule
    pub unexpected_count: usize,
}

impl ExpectationResult {
    fn passed(message: String) -> Self {
        Self {
            success: true,
            message,
            unexpected_count: 0,
        }
    }

    fn failed(message: String, unexpected_count: usize) -> Self {
        Self {
            success: false,
            message,
            unexpected_count,
        }
    }
}

/// Evaluate every expectation against the table
///
/// No short-circuit: a failing rule does not stop evaluation of the rest.
/// Results come back in rule order, one per rule.
pub fn validate(table: &Table, specs: &[ExpectationSpec]) -> Vec<ExpectationResult> {
    specs.iter().map(|spec| evaluate(table, spec)).collect()
}

fn evaluate(table: &Table, spec: &ExpectationSpec) -> ExpectationResult {
    let values = match spec {
        ExpectationSpec::RowCountEquals { .. } => Vec::new(),
        ExpectationSpec::ColumnValuesOfType { column, .. }
        | ExpectationSpec::ColumnValuesNotNull { column }
        | ExpectationSpec::ColumnValuesUnique { column }
        | ExpectationSpec::ColumnValuesInSet { column, .. } => {
            match table.column_values(column) {
                Ok(values) => values,
                Err(_) => {
                    return ExpectationResult::failed(
                        format!("{}: column not present in table", spec.describe()),
                        table.row_count(),
                    );
                }
            }
        }
    };

    match spec {
        ExpectationSpec::ColumnValuesOfType { expected, .. } => {
            let unexpected = values
                .iter()
                .filter(|v| matches!(v, Some(value) if !expected.matches(value)))
                .count();
            outcome(spec, unexpected)
        }
        ExpectationSpec::ColumnValuesNotNull { .. } => {
            let unexpected = values.iter().filter(|v| v.is_none()).count();
            outcome(spec, unexpected)
        }
        ExpectationSpec::ColumnValuesUnique { .. } => {
            let mut seen: HashSet<&str> = HashSet::new();
            let mut duplicated: HashSet<&str> = HashSet::new();
            for value in values.iter().flatten() {
                if !seen.insert(*value) {
                    duplicated.insert(*value);
                }
            }
            let unexpected = values
                .iter()
                .flatten()
                .filter(|v| duplicated.contains(**v))
                .count();
            outcome(spec, unexpected)
        }
        ExpectationSpec::ColumnValuesInSet { allowed, .. } => {
            let allowed: HashSet<&str> = allowed.iter().map(String::as_str).collect();
            let unexpected = values
                .iter()
                .filter(|v| matches!(v, Some(value) if !allowed.contains(value)))
                .count();
            outcome(spec, unexpected)
        }
        ExpectationSpec::RowCountEquals { expected } => {
            let actual = table.row_count();
            if actual == *expected {
                ExpectationResult::passed(format!("{}: passed", spec.describe()))
            } else {
                ExpectationResult::failed(
                    format!(
                        "{}: failed, expected {} rows, found {}",
                        spec.describe(),
                        expected,
                        actual
                    ),
                    actual.abs_diff(*expected),
                )
            }
        }
    }
}

fn outcome(spec: &ExpectationSpec, unexpected: usize) -> ExpectationResult {
    if unexpected == 0 {
        ExpectationResult::passed(format!("{}: passed", spec.describe()))
    } else {
        ExpectationResult::failed(
            format!("{}: failed, {} unexpected values", spec.describe(), unexpected),
            unexpected,
        )
    }
}

/// Abort the run when any expectation failed
///
/// The error message names each failing expectation and the offending file
/// path so an operator can locate and fix the snapshot by hand.
pub fn ensure_all_passed(
    file_path: &str,
    results: &[ExpectationResult],
) -> std::result::Result<(), ValidateError> {
    let failures: Vec<&ExpectationResult> = results.iter().filter(|r| !r.success).collect();
    if failures.is_empty() {
        return Ok(());
    }

    let details = failures
        .iter()
        .map(|r| format!("- {}", r.message))
        .collect::<Vec<_>>()
        .join("\n");

    Err(ValidateError::ExpectationFailure {
        file_path: file_path.to_string(),
        failed: failures.len(),
        total: results.len(),
        details,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(columns: &[&str], rows: &[&[Option<&str>]]) -> Table {
        let mut t = Table::new(columns.iter().map(|c| c.to_string()).collect());
        for row in rows {
            t.push_row(row.iter().map(|c| c.map(|v| v.to_string())).collect())
                .unwrap();
        }
        t
    }

    #[test]
    fn every_spec_is_evaluated_without_short_circuit() {
        let t = table(
            &["org"],
            &[&[Some("X26")], &[None], &[Some("Y55")]],
        );
        let specs = vec![
            ExpectationSpec::ColumnValuesNotNull {
                column: "org".to_string(),
            },
            ExpectationSpec::ColumnValuesUnique {
                column: "org".to_string(),
            },
            ExpectationSpec::RowCountEquals { expected: 3 },
        ];

        let results = validate(&t, &specs);

        assert_eq!(results.len(), 3);
        assert!(!results[0].success);
        assert!(results[1].success);
        assert!(results[2].success);
    }

    #[test]
    fn row_count_mismatch_names_expected_and_actual() {
        let t = table(
            &["v"],
            &[
                &[Some("1")],
                &[Some("2")],
                &[Some("3")],
                &[Some("4")],
                &[Some("5")],
                &[Some("6")],
            ],
        );
        let results = validate(&t, &[ExpectationSpec::RowCountEquals { expected: 7 }]);

        assert!(!results[0].success);
        assert!(results[0].message.contains("expected 7"));
        assert!(results[0].message.contains("found 6"));
    }

    #[test]
    fn type_check_ignores_nulls() {
        let t = table(&["n"], &[&[Some("1")], &[None], &[Some("x")]]);
        let results = validate(
            &t,
            &[ExpectationSpec::ColumnValuesOfType {
                column: "n".to_string(),
                expected: ColumnType::Int,
            }],
        );

        assert!(!results[0].success);
        assert_eq!(results[0].unexpected_count, 1);
    }

    #[test]
    fn uniqueness_counts_every_duplicated_occurrence() {
        let t = table(
            &["k"],
            &[&[Some("a")], &[Some("a")], &[Some("b")], &[None], &[None]],
        );
        let results = validate(
            &t,
            &[ExpectationSpec::ColumnValuesUnique {
                column: "k".to_string(),
            }],
        );

        // Nulls are ignored; both "a" occurrences count as unexpected
        assert!(!results[0].success);
        assert_eq!(results[0].unexpected_count, 2);
    }

    #[test]
    fn set_membership_is_case_sensitive() {
        let t = table(&["m"], &[&[Some("M1")], &[Some("m1")]]);
        let results = validate(
            &t,
            &[ExpectationSpec::ColumnValuesInSet {
                column: "m".to_string(),
                allowed: vec!["M1".to_string()],
            }],
        );

        assert!(!results[0].success);
        assert_eq!(results[0].unexpected_count, 1);
    }

    #[test]
    fn missing_column_fails_without_stopping_others() {
        let t = table(&["present"], &[&[Some("1")]]);
        let specs = vec![
            ExpectationSpec::ColumnValuesNotNull {
                column: "absent".to_string(),
            },
            ExpectationSpec::RowCountEquals { expected: 1 },
        ];
        let results = validate(&t, &specs);

        assert!(!results[0].success);
        assert!(results[0].message.contains("column not present"));
        assert!(results[1].success);
    }

    #[test]
    fn ensure_all_passed_lists_failures_and_file_path() {
        let results = vec![
            ExpectationResult::failed("column 'org' values not null: failed".to_string(), 2),
            ExpectationResult::passed("row count equals 3: passed".to_string()),
        ];

        let err = ensure_all_passed("land/2022-04-01/snapshot.csv", &results).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("land/2022-04-01/snapshot.csv"));
        assert!(message.contains("1 of 2"));
        assert!(message.contains("column 'org' values not null"));

        let all_pass = vec![ExpectationResult::passed("ok".to_string())];
        assert!(ensure_all_passed("f.csv", &all_pass).is_ok());
    }

    #[test]
    fn expectation_specs_deserialize_from_config_documents() {
        let json = r#"[
            {"check": "column_values_of_type", "column": "count", "expected": "int"},
            {"check": "column_values_not_null", "column": "org"},
            {"check": "column_values_in_set", "column": "region", "allowed": ["north", "south"]},
            {"check": "row_count_equals", "expected": 12}
        ]"#;

        let specs: Vec<ExpectationSpec> = serde_json::from_str(json).unwrap();
        assert_eq!(specs.len(), 4);
        assert_eq!(
            specs[0],
            ExpectationSpec::ColumnValuesOfType {
                column: "count".to_string(),
                expected: ColumnType::Int,
            }
        );
    }
}
