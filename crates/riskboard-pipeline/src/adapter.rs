//! Data source adapter
//!
//! `QueryRunner` is the only place a warehouse call happens. It bounds the call
//! with a timeout, applies the row cap to limited queries, and converts every
//! failure into [`Table::empty`] plus a report, so callers always get a table.

use riskboard_core::{DataSource, Error, Query, Result, Table};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, instrument};

use crate::report::ErrorReporter;

/// Maximum rows a limited (drill-down) query may return
pub const DEFAULT_ROW_CAP: usize = 2000;

/// Upper bound on a single warehouse call
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Query runner configuration
#[derive(Debug, Clone)]
pub struct QueryRunnerConfig {
    /// Expiry is treated as a query failure
    pub timeout: Duration,

    /// Hard cap for limited queries, regardless of the limit they ask for
    pub row_cap: usize,
}

impl Default for QueryRunnerConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_QUERY_TIMEOUT,
            row_cap: DEFAULT_ROW_CAP,
        }
    }
}

/// Runs queries against a [`DataSource`] without ever failing
pub struct QueryRunner {
    source: Arc<dyn DataSource>,
    reporter: Arc<dyn ErrorReporter>,
    config: QueryRunnerConfig,
}

impl QueryRunner {
    /// Create a runner with the default timeout and row cap
    pub fn new(source: Arc<dyn DataSource>, reporter: Arc<dyn ErrorReporter>) -> Self {
        Self::with_config(source, reporter, QueryRunnerConfig::default())
    }

    pub fn with_config(
        source: Arc<dyn DataSource>,
        reporter: Arc<dyn ErrorReporter>,
        config: QueryRunnerConfig,
    ) -> Self {
        Self {
            source,
            reporter,
            config,
        }
    }

    pub fn config(&self) -> &QueryRunnerConfig {
        &self.config
    }

    pub fn source_name(&self) -> &str {
        self.source.name()
    }

    /// Run `query`, returning an empty table on any failure
    ///
    /// Failures (backend errors, timeouts, rejected statements) are passed to
    /// the reporter. No retry happens here.
    #[instrument(skip(self, query), fields(source = %self.source.name(), query = %query))]
    pub async fn run(&self, query: &Query) -> Table {
        match self.try_run(query).await {
            Ok(table) => table,
            Err(e) => {
                self.reporter.report(query, &e.to_string());
                Table::empty()
            }
        }
    }

    async fn try_run(&self, query: &Query) -> Result<Table> {
        let started = Instant::now();

        let mut table = tokio::time::timeout(self.config.timeout, self.source.execute(query))
            .await
            .map_err(|_| Error::Timeout(self.config.timeout))??;

        if let Some(limit) = query.row_limit() {
            let cap = limit.min(self.config.row_cap);
            if table.truncate_to(cap) {
                debug!(cap, "Result truncated at row cap");
            }
        }

        debug!(
            rows = table.row_count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Query completed"
        );

        Ok(table)
    }
}
