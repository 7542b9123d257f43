//! Riskboard query pipeline
//!
//! Everything between the warehouse and the presentation layer:
//! - `QueryRunner`: runs one query with a timeout and row cap, turning any
//!   failure into an empty table plus an error report
//! - `ResultCache`: time-based memoization of query results
//! - `decompose`: YEAR/MONTH columns derived from a timestamp column
//! - `filter` / `aggregate`: equality filtering and group-sum
//! - `Dashboard`: one full render cycle, `render(selection) -> view`

pub mod adapter;
pub mod aggregate;
pub mod cache;
pub mod dashboard;
pub mod decompose;
pub mod domain;
pub mod filter;
pub mod report;

pub use adapter::{DEFAULT_QUERY_TIMEOUT, DEFAULT_ROW_CAP, QueryRunner, QueryRunnerConfig};
pub use aggregate::{Aggregation, AggregationSpec, aggregate};
pub use cache::{DEFAULT_TTL, ResultCache};
pub use dashboard::{
    Dashboard, DashboardColumns, DashboardConfig, DashboardData, DashboardQueries, DashboardView,
    DailyView, DrillDownView, KpiTiles, MonthlyView, RiskLevel, Selection, compose,
};
pub use decompose::{Decomposed, MONTH_COLUMN, TimestampPolicy, YEAR_COLUMN, decompose};
pub use domain::{dependent_domain, distinct_values};
pub use filter::{ALL, FilterSpec, FilterValue, filter};
pub use report::{CollectingReporter, ErrorReporter, ReportedError, TracingReporter};
