//! SQLite data source
//!
//! Runs read-only queries against a local SQLite database, typically an
//! extract of the warehouse views. Column types are decided here, once per
//! result, from the declared SQLite type (or the first non-null value when
//! the column has no declared type).

use async_trait::async_trait;
use riskboard_core::{
    Column, ColumnType, DataSource, Error, Query, Result, Table, Value, parse_timestamp,
};
use sqlx::sqlite::{
    SqliteColumn, SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow,
    SqliteValueRef,
};
use sqlx::{Column as _, Decode, Executor, Row, Sqlite, TypeInfo, ValueRef};
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, instrument};

/// SQLite-backed [`DataSource`]
#[derive(Clone)]
pub struct SqliteSource {
    pool: SqlitePool,
    name: String,
}

impl SqliteSource {
    /// Open an existing database file, read-only
    ///
    /// # Errors
    /// - `Error::Database` if the file does not exist or cannot be opened
    pub async fn open(db_path: &Path) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(
                SqliteConnectOptions::new()
                    .filename(db_path)
                    .create_if_missing(false)
                    .read_only(true),
            )
            .await
            .map_err(|e| {
                Error::Database(format!("failed to open {}: {}", db_path.display(), e))
            })?;

        info!("Opened SQLite source at {}", db_path.display());
        Ok(Self::from_pool(pool))
    }

    /// A private in-memory database
    ///
    /// Uses a single long-lived connection, since every SQLite in-memory
    /// connection is its own database.
    pub async fn in_memory() -> Result<Self> {
        let options: SqliteConnectOptions = "sqlite::memory:"
            .parse()
            .map_err(|e: sqlx::Error| Error::Database(e.to_string()))?;

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        Ok(Self::from_pool(pool))
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self {
            pool,
            name: "sqlite".to_string(),
        }
    }

    /// Run one or more statements without reading results (fixtures, seeding)
    ///
    /// Not part of [`DataSource`], so the read-only contract of `execute`
    /// is unaffected.
    pub async fn execute_batch(&self, sql: &str) -> Result<()> {
        sqlx::raw_sql(sql)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }

    // The engine refuses writes for the duration of the statement, whatever
    // the text slipped past `Query::is_read_only`
    async fn fetch_read_only(&self, sql: &str) -> Result<Vec<SqliteRow>> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        conn.execute(sqlx::raw_sql("PRAGMA query_only = ON"))
            .await
            .map_err(|e| Error::Database(e.to_string()))?;
        let rows = conn.fetch_all(sqlx::query(sql)).await;
        conn.execute(sqlx::raw_sql("PRAGMA query_only = OFF"))
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        rows.map_err(|e| Error::Database(e.to_string()))
    }

    // Columns of a statement that returned no rows
    async fn describe_columns(&self, sql: &str) -> Result<Vec<Column>> {
        let described = (&self.pool)
            .describe(sql)
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        Ok(described
            .columns()
            .iter()
            .map(|col| Column::new(col.name(), column_type(col.type_info().name())))
            .collect())
    }
}

#[async_trait]
impl DataSource for SqliteSource {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip(self, query), fields(query = %query))]
    async fn execute(&self, query: &Query) -> Result<Table> {
        if !query.is_read_only() {
            return Err(Error::InvalidQuery(format!(
                "only SELECT/WITH statements are allowed: {}",
                query
            )));
        }

        let sql = query.effective_sql();
        let started = Instant::now();

        let rows = self.fetch_read_only(&sql).await?;

        let table = match rows.first() {
            Some(first) => {
                let columns = infer_columns(first.columns(), &rows);
                let cells = rows
                    .iter()
                    .map(|row| decode_row(row, &columns))
                    .collect::<Result<Vec<_>>>()?;
                Table::new(columns, cells)?
            }
            None => Table::new(self.describe_columns(&sql).await?, Vec::new())?,
        };

        debug!(
            rows = table.row_count(),
            columns = table.columns().len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "SQLite query completed"
        );

        Ok(table)
    }
}

/// Map a SQLite type name to a column type
pub fn column_type(sqlite_type: &str) -> ColumnType {
    match sqlite_type.to_ascii_uppercase().as_str() {
        "INTEGER" | "BOOLEAN" => ColumnType::Integer,
        "REAL" | "NUMERIC" => ColumnType::Float,
        "DATE" | "DATETIME" | "TIMESTAMP" => ColumnType::Timestamp,
        _ => ColumnType::String,
    }
}

fn infer_columns(columns: &[SqliteColumn], rows: &[SqliteRow]) -> Vec<Column> {
    columns
        .iter()
        .enumerate()
        .map(|(idx, col)| {
            let declared = col.type_info();
            let ty = if declared.is_null() {
                // No declared type; use the first value that has one
                rows.iter()
                    .filter_map(|row| row.try_get_raw(idx).ok())
                    .find(|raw| !raw.is_null())
                    .map(|raw| column_type(raw.type_info().name()))
                    .unwrap_or(ColumnType::String)
            } else {
                column_type(declared.name())
            };
            Column::new(col.name(), ty)
        })
        .collect()
}

fn decode_row(row: &SqliteRow, columns: &[Column]) -> Result<Vec<Value>> {
    columns
        .iter()
        .enumerate()
        .map(|(idx, col)| {
            let raw = row
                .try_get_raw(idx)
                .map_err(|e| Error::Database(e.to_string()))?;
            Ok(decode_cell(raw, col.data_type))
        })
        .collect()
}

// Best effort: a cell that does not fit its column type becomes null
fn decode_cell(raw: SqliteValueRef<'_>, ty: ColumnType) -> Value {
    if raw.is_null() {
        return Value::Null;
    }
    let stored = column_type(raw.type_info().name());

    match (ty, stored) {
        (ColumnType::Integer, ColumnType::Integer) => {
            <i64 as Decode<Sqlite>>::decode(raw).map_or(Value::Null, Value::Integer)
        }
        (ColumnType::Float, ColumnType::Integer | ColumnType::Float) => {
            <f64 as Decode<Sqlite>>::decode(raw).map_or(Value::Null, Value::Float)
        }
        (ColumnType::Timestamp, _) => <String as Decode<Sqlite>>::decode(raw)
            .ok()
            .and_then(|text| parse_timestamp(&text))
            .map_or(Value::Null, Value::Timestamp),
        (ColumnType::String, _) => {
            <String as Decode<Sqlite>>::decode(raw).map_or(Value::Null, Value::String)
        }
        _ => Value::Null,
    }
}
