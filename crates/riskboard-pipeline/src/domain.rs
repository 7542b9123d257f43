//! Selector domains
//!
//! The values a selector may offer. Downstream selectors are derived from the
//! table already restricted by upstream selections, so a month with zero rows
//! for the chosen year is never offered.

use riskboard_core::{Result, Table, Value};
use std::collections::BTreeSet;

use crate::filter::{FilterSpec, filter};

/// Distinct non-null values of `column`, ascending
///
/// The explicit empty result has an empty domain for every column.
pub fn distinct_values(table: &Table, column: &str) -> Result<Vec<Value>> {
    if table.columns().is_empty() {
        return Ok(Vec::new());
    }

    let values: BTreeSet<&Value> = table
        .column_values(column)?
        .filter(|v| !v.is_null())
        .collect();

    Ok(values.into_iter().cloned().collect())
}

/// Domain of `column` within the rows matching `upstream`
pub fn dependent_domain(table: &Table, upstream: &FilterSpec, column: &str) -> Result<Vec<Value>> {
    if table.columns().is_empty() {
        return Ok(Vec::new());
    }
    distinct_values(&filter(table, upstream)?, column)
}
