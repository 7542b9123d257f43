//! Group-sum aggregation

use riskboard_core::{Column, ColumnType, Error, Result, Table, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    #[default]
    Sum,
}

/// Group-by columns, metric column and aggregation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationSpec {
    pub group_by: Vec<String>,
    pub metric: String,
    pub aggregation: Aggregation,
}

impl AggregationSpec {
    pub fn sum<I, S>(group_by: I, metric: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            group_by: group_by.into_iter().map(Into::into).collect(),
            metric: metric.into(),
            aggregation: Aggregation::Sum,
        }
    }
}

enum Accumulator {
    Integer(i64),
    Float(f64),
}

impl Accumulator {
    fn add(&mut self, value: &Value) {
        match (self, value) {
            (Accumulator::Integer(acc), Value::Integer(v)) => *acc = acc.saturating_add(*v),
            (Accumulator::Float(acc), v) => *acc += v.as_f64().unwrap_or(0.0),
            _ => {}
        }
    }

    fn into_value(self) -> Value {
        match self {
            Accumulator::Integer(v) => Value::Integer(v),
            Accumulator::Float(v) => Value::Float(v),
        }
    }
}

/// One row per distinct group key, ascending, with `metric` summed per group
///
/// Output columns are the group-by columns followed by the metric column.
/// Rows whose key contains a null are left out; null metric cells are skipped.
/// Groups only exist for keys present in the input (no zero-fill), and an
/// input without rows aggregates to a table with no rows.
///
/// # Errors
/// - `Error::ColumnNotFound` for an unknown group-by or metric column
/// - `Error::TypeMismatch` if the metric column is not integer or float
pub fn aggregate(table: &Table, spec: &AggregationSpec) -> Result<Table> {
    if table.columns().is_empty() {
        return Ok(Table::empty());
    }

    let key_idx = spec
        .group_by
        .iter()
        .map(|name| table.column_index(name))
        .collect::<Result<Vec<_>>>()?;
    let metric_idx = table.column_index(&spec.metric)?;
    let metric_type = table.columns()[metric_idx].data_type;

    let new_acc = || match metric_type {
        ColumnType::Integer => Ok(Accumulator::Integer(0)),
        ColumnType::Float => Ok(Accumulator::Float(0.0)),
        other => Err(Error::TypeMismatch(format!(
            "cannot sum {} column '{}'",
            other, spec.metric
        ))),
    };
    // Fail on the column type even when there is nothing to sum
    new_acc()?;

    let mut groups: BTreeMap<Vec<Value>, Accumulator> = BTreeMap::new();
    for row in table.rows() {
        let key: Vec<Value> = key_idx.iter().map(|&i| row[i].clone()).collect();
        if key.iter().any(Value::is_null) {
            continue;
        }

        let acc = match groups.entry(key) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(e) => e.insert(new_acc()?),
        };
        acc.add(&row[metric_idx]);
    }

    let mut columns: Vec<Column> = key_idx.iter().map(|&i| table.columns()[i].clone()).collect();
    columns.push(Column::new(spec.metric.clone(), metric_type));

    let rows = groups
        .into_iter()
        .map(|(mut key, acc)| {
            key.push(acc.into_value());
            key
        })
        .collect();

    Table::new(columns, rows)
}
