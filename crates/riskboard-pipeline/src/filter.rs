//! Equality filtering
//!
//! A [`FilterSpec`] is an ordered list of `(column, value)` equality
//! constraints, where [`FilterValue::All`] means "no constraint". Constraints
//! are combined with AND, so their order never changes the result.

use riskboard_core::{ColumnType, Error, Result, Table, Value};
use std::fmt;

/// Selector sentinel meaning "unconstrained"
pub const ALL: &str = "ALL";

/// One side of an equality constraint
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterValue {
    All,
    Eq(Value),
}

impl FilterValue {
    /// Interpret selector text for a column of type `ty`
    ///
    /// `"ALL"` maps to [`FilterValue::All`]; anything else must parse as `ty`.
    pub fn from_selection(text: &str, ty: ColumnType) -> Result<Self> {
        if text == ALL {
            return Ok(FilterValue::All);
        }
        Value::parse_as(ty, text).map(FilterValue::Eq)
    }

    pub fn is_all(&self) -> bool {
        matches!(self, FilterValue::All)
    }
}

impl From<Value> for FilterValue {
    fn from(value: Value) -> Self {
        FilterValue::Eq(value)
    }
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        FilterValue::Eq(Value::from(value))
    }
}

impl From<String> for FilterValue {
    fn from(value: String) -> Self {
        FilterValue::Eq(Value::from(value))
    }
}

impl From<i64> for FilterValue {
    fn from(value: i64) -> Self {
        FilterValue::Eq(Value::Integer(value))
    }
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterValue::All => write!(f, "{}", ALL),
            FilterValue::Eq(v) => write!(f, "{}", v),
        }
    }
}

/// Ordered set of equality constraints
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSpec {
    constraints: Vec<(String, FilterValue)>,
}

impl FilterSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `column == value`
    pub fn with(mut self, column: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        self.constraints.push((column.into(), value.into()));
        self
    }

    /// Add an unconstrained entry for `column`
    pub fn with_all(mut self, column: impl Into<String>) -> Self {
        self.constraints.push((column.into(), FilterValue::All));
        self
    }

    pub fn constraints(&self) -> &[(String, FilterValue)] {
        &self.constraints
    }

    /// True when every constraint is `ALL` (or there are none)
    pub fn is_unconstrained(&self) -> bool {
        self.constraints.iter().all(|(_, v)| v.is_all())
    }
}

/// Rows of `table` satisfying every non-`ALL` constraint, in original order
///
/// Equality is exact and typed. An all-`ALL` spec returns the table unchanged,
/// and a table with no rows filters to itself.
///
/// # Errors
/// - `Error::ColumnNotFound` for a constrained column missing from the table
/// - `Error::TypeMismatch` when a constraint value's type differs from the
///   column's declared type (or is null)
pub fn filter(table: &Table, spec: &FilterSpec) -> Result<Table> {
    if table.is_empty() || spec.is_unconstrained() {
        return Ok(table.clone());
    }

    let mut active = Vec::new();
    for (column, value) in &spec.constraints {
        let FilterValue::Eq(expected) = value else {
            continue;
        };

        let idx = table.column_index(column)?;
        let declared = table.columns()[idx].data_type;
        if expected.column_type() != Some(declared) {
            return Err(Error::TypeMismatch(format!(
                "cannot compare {} column '{}' with '{}'",
                declared, column, expected
            )));
        }
        active.push((idx, expected));
    }

    Ok(table.select_rows(|row| active.iter().all(|(idx, expected)| &row[*idx] == *expected)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use riskboard_core::Column;

    fn row(year: i64, month: i64, city: Option<&str>, risk: &str) -> Vec<Value> {
        vec![
            Value::Integer(year),
            Value::Integer(month),
            city.map(Value::from).unwrap_or(Value::Null),
            Value::from(risk),
        ]
    }

    fn drilldown() -> Table {
        Table::new(
            vec![
                Column::new("YEAR", ColumnType::Integer),
                Column::new("MONTH", ColumnType::Integer),
                Column::new("LOCATION", ColumnType::String),
                Column::new("FRAUD_RISK_LEVEL", ColumnType::String),
            ],
            vec![
                row(2024, 1, Some("Delhi"), "HIGH_RISK"),
                row(2024, 1, Some("Pune"), "LOW_RISK"),
                row(2023, 1, Some("Delhi"), "HIGH_RISK"),
                row(2024, 2, Some("Delhi"), "HIGH_RISK"),
                row(2024, 2, None, "MEDIUM_RISK"),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_all_spec_is_identity() {
        let table = drilldown();
        let spec = FilterSpec::new()
            .with_all("YEAR")
            .with_all("MONTH")
            .with_all("LOCATION")
            .with_all("FRAUD_RISK_LEVEL");
        assert!(spec.is_unconstrained());
        assert_eq!(filter(&table, &spec).unwrap(), table);
        assert_eq!(filter(&table, &FilterSpec::new()).unwrap(), table);
    }

    #[test]
    fn test_conjunction() {
        let table = drilldown();
        let spec = FilterSpec::new()
            .with("YEAR", 2024i64)
            .with("FRAUD_RISK_LEVEL", "HIGH_RISK");
        let out = filter(&table, &spec).unwrap();

        // Every returned row satisfies both constraints...
        for row in out.rows() {
            assert_eq!(row[0], Value::Integer(2024));
            assert_eq!(row[3], Value::from("HIGH_RISK"));
        }
        // ...and no satisfying row is left out
        let expected = table
            .rows()
            .iter()
            .filter(|r| r[0] == Value::Integer(2024) && r[3] == Value::from("HIGH_RISK"))
            .count();
        assert_eq!(out.row_count(), expected);
        assert_eq!(out.row_count(), 2);
    }

    #[test]
    fn test_order_independent() {
        let table = drilldown();
        let a = FilterSpec::new()
            .with("MONTH", 2i64)
            .with_all("LOCATION")
            .with("FRAUD_RISK_LEVEL", "HIGH_RISK");
        let b = FilterSpec::new()
            .with("FRAUD_RISK_LEVEL", "HIGH_RISK")
            .with("MONTH", 2i64)
            .with_all("LOCATION");
        assert_eq!(filter(&table, &a).unwrap(), filter(&table, &b).unwrap());
    }

    #[test]
    fn test_case_sensitive_and_typed() {
        let table = drilldown();

        let out = filter(&table, &FilterSpec::new().with("LOCATION", "delhi")).unwrap();
        assert!(out.is_empty());
        // Empty result keeps the schema
        assert_eq!(out.columns(), table.columns());

        let err = filter(&table, &FilterSpec::new().with("YEAR", "2024")).unwrap_err();
        assert!(matches!(err, Error::TypeMismatch(_)));
    }

    #[test]
    fn test_unknown_column() {
        let table = drilldown();
        let err = filter(&table, &FilterSpec::new().with("CITY", "Delhi")).unwrap_err();
        assert!(matches!(err, Error::ColumnNotFound(c) if c == "CITY"));

        // ALL on an unknown column is not a constraint at all
        assert!(filter(&table, &FilterSpec::new().with_all("CITY")).is_ok());
    }

    #[test]
    fn test_from_selection() {
        assert_eq!(
            FilterValue::from_selection("ALL", ColumnType::String).unwrap(),
            FilterValue::All
        );
        assert_eq!(
            FilterValue::from_selection("2024", ColumnType::Integer).unwrap(),
            FilterValue::Eq(Value::Integer(2024))
        );
        assert_eq!(
            FilterValue::from_selection("Mumbai", ColumnType::String)
                .unwrap()
                .to_string(),
            "Mumbai"
        );
        assert!(FilterValue::from_selection("May", ColumnType::Integer).is_err());
    }

    #[test]
    fn test_empty_table_filters_to_itself() {
        let spec = FilterSpec::new().with("YEAR", 2024i64);
        assert_eq!(filter(&Table::empty(), &spec).unwrap(), Table::empty());
    }
}
