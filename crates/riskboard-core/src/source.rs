//! Data source trait
//!
//! A `DataSource` executes one read-only query against a warehouse and
//! returns a typed [`Table`]. Implementations:
//! - `SqliteSource`: local SQLite database (extracts, fixtures)
//! - `SnowflakeSource`: Snowflake SQL REST API
//!
//! Sources report failures as errors; turning those into empty results is the
//! job of the query runner in `riskboard-pipeline`.

use async_trait::async_trait;

use crate::{Query, Result, Table};

#[async_trait]
pub trait DataSource: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Execute a read-only query
    ///
    /// Limited queries should be sent as [`Query::effective_sql`]; the caller
    /// applies the row cap and truncation flag.
    ///
    /// # Errors
    /// - `Error::InvalidQuery` for statements that are not plain reads
    /// - `Error::Query` / `Error::Database` / `Error::Http` for backend failures
    async fn execute(&self, query: &Query) -> Result<Table>;
}
