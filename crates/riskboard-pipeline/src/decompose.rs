//! Date decomposition
//!
//! Parses a designated timestamp column and derives `YEAR` and `MONTH` from
//! it. Works on a copy: the cached table is never mutated, and the derived
//! columns are recomputed from scratch every time the table is (re)fetched.

use chrono::Datelike;
use riskboard_core::{Column, ColumnType, Result, Table, Value, parse_timestamp};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const YEAR_COLUMN: &str = "YEAR";
pub const MONTH_COLUMN: &str = "MONTH";

/// What happens to rows whose timestamp cell does not parse
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampPolicy {
    /// Remove the row, keeping grouping well-defined
    #[default]
    DropRow,
    /// Keep the row with null timestamp, YEAR and MONTH
    KeepAsNull,
}

/// Decomposition output
#[derive(Debug, Clone, PartialEq)]
pub struct Decomposed {
    pub table: Table,
    /// Rows whose timestamp was null or malformed
    pub malformed: usize,
}

/// Derive `YEAR`/`MONTH` from `timestamp_column`
///
/// The timestamp column is retyped to `Timestamp`. String cells are parsed;
/// anything else that is not already a timestamp (including null) counts as
/// malformed and is handled according to `policy`. Existing `YEAR`/`MONTH`
/// columns are overwritten.
///
/// The explicit empty result (no columns) passes through unchanged.
///
/// # Errors
/// - `Error::ColumnNotFound` if the table has columns but not `timestamp_column`
pub fn decompose(
    table: &Table,
    timestamp_column: &str,
    policy: TimestampPolicy,
) -> Result<Decomposed> {
    if table.columns().is_empty() {
        return Ok(Decomposed {
            table: table.clone(),
            malformed: 0,
        });
    }

    let ts_idx = table.column_index(timestamp_column)?;

    let mut columns = table.columns().to_vec();
    columns[ts_idx].data_type = ColumnType::Timestamp;
    let year_idx = derived_column(&mut columns, YEAR_COLUMN);
    let month_idx = derived_column(&mut columns, MONTH_COLUMN);
    let width = columns.len();

    let mut rows = Vec::with_capacity(table.row_count());
    let mut malformed = 0;

    for row in table.rows() {
        let parsed = match &row[ts_idx] {
            Value::Timestamp(ts) => Some(*ts),
            Value::String(s) => parse_timestamp(s),
            _ => None,
        };

        let mut out = row.clone();
        out.resize(width, Value::Null);

        match parsed {
            Some(ts) => {
                out[ts_idx] = Value::Timestamp(ts);
                out[year_idx] = Value::Integer(i64::from(ts.year()));
                out[month_idx] = Value::Integer(i64::from(ts.month()));
            }
            None => {
                malformed += 1;
                if policy == TimestampPolicy::DropRow {
                    continue;
                }
                out[ts_idx] = Value::Null;
                out[year_idx] = Value::Null;
                out[month_idx] = Value::Null;
            }
        }

        rows.push(out);
    }

    if malformed > 0 {
        debug!(
            column = timestamp_column,
            malformed,
            ?policy,
            "Unparseable timestamps during decomposition"
        );
    }

    Ok(Decomposed {
        table: Table::new(columns, rows)?.with_truncated(table.is_truncated()),
        malformed,
    })
}

// Index of `name`, appending an integer column when absent
fn derived_column(columns: &mut Vec<Column>, name: &str) -> usize {
    match columns.iter().position(|c| c.name == name) {
        Some(idx) => {
            columns[idx].data_type = ColumnType::Integer;
            idx
        }
        None => {
            columns.push(Column::new(name, ColumnType::Integer));
            columns.len() - 1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use riskboard_core::Error;

    fn trends() -> Table {
        Table::new(
            vec![
                Column::new("TXN_DATE", ColumnType::String),
                Column::new("HIGH_RISK_TXNS", ColumnType::Integer),
            ],
            vec![
                vec![Value::from("2024-01-05"), Value::Integer(10)],
                vec![Value::from("2024-01-20"), Value::Integer(5)],
                vec![Value::from("garbage"), Value::Integer(99)],
                vec![Value::from("2023-12-31 23:59:59"), Value::Integer(7)],
                vec![Value::Null, Value::Integer(1)],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_derives_year_and_month() {
        let out = decompose(&trends(), "TXN_DATE", TimestampPolicy::DropRow).unwrap();
        let table = out.table;

        assert_eq!(out.malformed, 2);
        assert_eq!(table.row_count(), 3);
        assert_eq!(table.column("TXN_DATE").unwrap().data_type, ColumnType::Timestamp);
        assert_eq!(table.column(YEAR_COLUMN).unwrap().data_type, ColumnType::Integer);

        let years: Vec<_> = table.column_values(YEAR_COLUMN).unwrap().cloned().collect();
        let months: Vec<_> = table.column_values(MONTH_COLUMN).unwrap().cloned().collect();
        assert_eq!(
            years,
            vec![Value::Integer(2024), Value::Integer(2024), Value::Integer(2023)]
        );
        assert_eq!(
            months,
            vec![Value::Integer(1), Value::Integer(1), Value::Integer(12)]
        );

        // Derived fields agree with the parsed source cell
        for row in table.rows() {
            let ts = row[0].as_timestamp().unwrap();
            assert_eq!(row[2], Value::Integer(i64::from(ts.year())));
            assert_eq!(row[3], Value::Integer(i64::from(ts.month())));
        }
    }

    #[test]
    fn test_keep_as_null_policy() {
        let out = decompose(&trends(), "TXN_DATE", TimestampPolicy::KeepAsNull).unwrap();
        assert_eq!(out.malformed, 2);
        assert_eq!(out.table.row_count(), 5);

        let garbage = &out.table.rows()[2];
        assert_eq!(garbage[0], Value::Null);
        assert_eq!(garbage[1], Value::Integer(99));
        assert_eq!(garbage[2], Value::Null);
        assert_eq!(garbage[3], Value::Null);
    }

    #[test]
    fn test_does_not_mutate_input() {
        let input = trends();
        let before = input.clone();
        decompose(&input, "TXN_DATE", TimestampPolicy::DropRow).unwrap();
        assert_eq!(input, before);
    }

    #[test]
    fn test_overwrites_existing_derived_columns() {
        let table = Table::new(
            vec![
                Column::new("TXN_TIME", ColumnType::String),
                Column::new("YEAR", ColumnType::String),
            ],
            vec![vec![Value::from("2022-06-15T08:00:00"), Value::from("stale")]],
        )
        .unwrap();

        let out = decompose(&table, "TXN_TIME", TimestampPolicy::DropRow).unwrap().table;
        assert_eq!(out.columns().len(), 3);
        assert_eq!(out.rows()[0][1], Value::Integer(2022));
        assert_eq!(out.rows()[0][2], Value::Integer(6));
    }

    #[test]
    fn test_missing_column_and_empty_result() {
        assert!(matches!(
            decompose(&trends(), "TXN_TIME", TimestampPolicy::DropRow),
            Err(Error::ColumnNotFound(_))
        ));

        let out = decompose(&Table::empty(), "TXN_TIME", TimestampPolicy::DropRow).unwrap();
        assert_eq!(out.table, Table::empty());
    }

    #[test]
    fn test_preserves_truncation_flag() {
        let mut table = trends();
        table.truncate_to(2);
        let out = decompose(&table, "TXN_DATE", TimestampPolicy::DropRow).unwrap();
        assert!(out.table.is_truncated());
    }
}
