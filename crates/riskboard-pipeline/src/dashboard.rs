//! Dashboard render cycle
//!
//! One call to [`Dashboard::render`] is one full request/augment/filter cycle:
//! the four dashboard queries go through the result cache, then [`compose`]
//! turns the fetched tables and the current [`Selection`] into a
//! [`DashboardView`]. `compose` is pure, so everything after the fetch can be
//! tested without a data source.
//!
//! No step is fatal. A failed query renders as empty sub-views plus a message,
//! and a pipeline error (missing column, wrong type) is reported the same way.

use riskboard_core::{DataSource, Error, Query, Result, Table, Value};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::adapter::{QueryRunner, QueryRunnerConfig};
use crate::aggregate::{AggregationSpec, aggregate};
use crate::cache::{DEFAULT_TTL, ResultCache};
use crate::decompose::{MONTH_COLUMN, TimestampPolicy, YEAR_COLUMN, decompose};
use crate::domain::{dependent_domain, distinct_values};
use crate::filter::{ALL, FilterSpec, filter};
use crate::report::CollectingReporter;

/// Transaction risk classification assigned by the warehouse
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    HighRisk,
    MediumRisk,
    LowRisk,
}

impl RiskLevel {
    pub const LEVELS: [RiskLevel; 3] = [
        RiskLevel::HighRisk,
        RiskLevel::MediumRisk,
        RiskLevel::LowRisk,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::HighRisk => "HIGH_RISK",
            RiskLevel::MediumRisk => "MEDIUM_RISK",
            RiskLevel::LowRisk => "LOW_RISK",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        RiskLevel::LEVELS
            .into_iter()
            .find(|level| level.as_str() == s)
            .ok_or_else(|| Error::TypeMismatch(format!("unknown risk level '{}'", s)))
    }
}

/// The four queries feeding the dashboard
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardQueries {
    pub kpi: Query,
    pub trends: Query,
    pub location_risk: Query,
    /// Limited query; the runner's row cap also applies
    pub drilldown: Query,
}

impl Default for DashboardQueries {
    fn default() -> Self {
        Self {
            kpi: Query::new("SELECT * FROM FIN_FRAUD_DB.GOLD.VW_FRAUD_KPI"),
            trends: Query::new("SELECT * FROM FIN_FRAUD_DB.GOLD.VW_FRAUD_TRENDS"),
            location_risk: Query::new("SELECT * FROM FIN_FRAUD_DB.GOLD.VW_LOCATION_RISK"),
            drilldown: Query::limited("SELECT * FROM FIN_FRAUD_DB.GOLD.VW_FRAUD_DASHBOARD", 2000),
        }
    }
}

/// Names of the columns the dashboard reads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardColumns {
    pub trend_date: String,
    pub trend_metric: String,
    pub drilldown_time: String,
    pub location: String,
    pub risk_level: String,
    pub total_txns: String,
    pub total_amount: String,
    pub high_risk_txns: String,
    pub medium_risk_txns: String,
    pub low_risk_txns: String,
}

impl Default for DashboardColumns {
    fn default() -> Self {
        Self {
            trend_date: "TXN_DATE".to_string(),
            trend_metric: "HIGH_RISK_TXNS".to_string(),
            drilldown_time: "TXN_TIME".to_string(),
            location: "LOCATION".to_string(),
            risk_level: "FRAUD_RISK_LEVEL".to_string(),
            total_txns: "TOTAL_TXNS".to_string(),
            total_amount: "TOTAL_AMOUNT".to_string(),
            high_risk_txns: "HIGH_RISK_TXNS".to_string(),
            medium_risk_txns: "MEDIUM_RISK_TXNS".to_string(),
            low_risk_txns: "LOW_RISK_TXNS".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DashboardConfig {
    pub queries: DashboardQueries,
    pub columns: DashboardColumns,
    pub timestamp_policy: TimestampPolicy,
    pub cache_ttl: Duration,
    pub runner: QueryRunnerConfig,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            queries: DashboardQueries::default(),
            columns: DashboardColumns::default(),
            timestamp_policy: TimestampPolicy::default(),
            cache_ttl: DEFAULT_TTL,
            runner: QueryRunnerConfig::default(),
        }
    }
}

impl DashboardConfig {
    /// Most rows the drill-down table can ever hold
    pub fn drilldown_cap(&self) -> usize {
        self.queries
            .drilldown
            .row_limit()
            .map_or(self.runner.row_cap, |limit| limit.min(self.runner.row_cap))
    }
}

/// Current selector state
///
/// A year or month that is absent, or not offered by its domain, resolves to
/// the first value of the domain. City and risk default to `ALL`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Selection {
    pub monthly_year: Option<i64>,
    pub daily_year: Option<i64>,
    pub daily_month: Option<i64>,
    pub year: Option<i64>,
    pub month: Option<i64>,
    /// `None` or `"ALL"` means every city
    pub city: Option<String>,
    /// `None` means every risk level
    pub risk: Option<RiskLevel>,
}

/// Headline numbers from the KPI view
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KpiTiles {
    pub total_txns: i64,
    pub total_amount: f64,
    pub high_risk_txns: i64,
    pub medium_risk_txns: i64,
    pub low_risk_txns: i64,
}

impl KpiTiles {
    /// Total amount rounded to whole units with thousands separators
    pub fn formatted_amount(&self) -> String {
        let rounded = self.total_amount.round();
        let digits = format!("{:.0}", rounded.abs());
        if !rounded.is_finite() {
            return digits;
        }

        let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
        if rounded < 0.0 {
            out.push('-');
        }
        for (i, ch) in digits.chars().enumerate() {
            if i > 0 && (digits.len() - i) % 3 == 0 {
                out.push(',');
            }
            out.push(ch);
        }
        out
    }
}

/// Monthly distribution for one selected year
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MonthlyView {
    pub years: Vec<i64>,
    pub year: Option<i64>,
    pub table: Table,
}

/// Trend rows for one selected year and month
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DailyView {
    pub years: Vec<i64>,
    /// Only months with rows in the selected year
    pub months: Vec<i64>,
    pub year: Option<i64>,
    pub month: Option<i64>,
    pub table: Table,
}

/// Filtered drill-down table and its selector state
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DrillDownView {
    pub years: Vec<i64>,
    pub months: Vec<i64>,
    pub cities: Vec<String>,
    pub risks: Vec<String>,
    pub year: Option<i64>,
    pub month: Option<i64>,
    pub city: String,
    pub risk: String,
    pub table: Table,
    /// More rows existed upstream than `row_cap`
    pub truncated: bool,
    pub row_cap: usize,
    pub notice: Option<String>,
}

/// Everything the presentation layer needs for one render
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DashboardView {
    pub kpi: Option<KpiTiles>,
    pub yearly: Table,
    pub monthly: MonthlyView,
    pub daily: DailyView,
    pub location_risk: Table,
    pub drilldown: DrillDownView,
    /// User-visible failures from this cycle
    pub messages: Vec<String>,
}

/// Raw query results for one render cycle
#[derive(Debug, Clone, Default)]
pub struct DashboardData {
    pub kpi: Arc<Table>,
    pub trends: Arc<Table>,
    pub location_risk: Arc<Table>,
    pub drilldown: Arc<Table>,
}

/// Long-lived dashboard state: the result cache and the reporter it feeds
pub struct Dashboard {
    cache: ResultCache,
    reporter: Arc<CollectingReporter>,
    config: DashboardConfig,
}

impl Dashboard {
    pub fn new(source: Arc<dyn DataSource>, config: DashboardConfig) -> Self {
        let reporter = Arc::new(CollectingReporter::new());
        let runner = QueryRunner::with_config(source, reporter.clone(), config.runner.clone());
        let cache = ResultCache::with_ttl(runner, config.cache_ttl);

        Self {
            cache,
            reporter,
            config,
        }
    }

    pub fn config(&self) -> &DashboardConfig {
        &self.config
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    /// Fetch the four dashboard queries through the cache, one after another
    pub async fn fetch(&self) -> DashboardData {
        let queries = &self.config.queries;
        DashboardData {
            kpi: self.cache.get_or_fetch(&queries.kpi).await,
            trends: self.cache.get_or_fetch(&queries.trends).await,
            location_risk: self.cache.get_or_fetch(&queries.location_risk).await,
            drilldown: self.cache.get_or_fetch(&queries.drilldown).await,
        }
    }

    /// Run one render cycle for `selection`
    ///
    /// Query failures reported while fetching come first in
    /// `DashboardView::messages`. A failed result served from the cache is
    /// rendered empty without repeating its message.
    pub async fn render(&self, selection: &Selection) -> DashboardView {
        let started = Instant::now();

        let data = self.fetch().await;
        let failures = self.reporter.drain();

        let mut view = compose(&data, selection, &self.config);
        let mut messages: Vec<String> = failures.iter().map(ToString::to_string).collect();
        messages.append(&mut view.messages);
        view.messages = messages;

        info!(
            source = %self.cache.runner().source_name(),
            messages = view.messages.len(),
            drilldown_rows = view.drilldown.table.row_count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Dashboard rendered"
        );

        view
    }
}

/// Build the view for `selection` from already-fetched tables
pub fn compose(
    data: &DashboardData,
    selection: &Selection,
    config: &DashboardConfig,
) -> DashboardView {
    let mut messages = Vec::new();
    let columns = &config.columns;

    let kpi = if data.kpi.is_empty() {
        None
    } else {
        or_report(kpi_tiles(&data.kpi, columns).map(Some), "KPI", &mut messages)
    };

    let trends = or_report(
        decompose(&data.trends, &columns.trend_date, config.timestamp_policy).map(|d| d.table),
        "Trends",
        &mut messages,
    );
    let yearly = or_report(
        aggregate(&trends, &AggregationSpec::sum([YEAR_COLUMN], columns.trend_metric.as_str())),
        "Yearly distribution",
        &mut messages,
    );
    let monthly = or_report(
        monthly_view(&trends, selection, columns),
        "Monthly distribution",
        &mut messages,
    );
    let daily = or_report(daily_view(&trends, selection), "Daily trend", &mut messages);

    let drilldown = or_report(
        drilldown_view(&data.drilldown, selection, config),
        "Drill down",
        &mut messages,
    );

    DashboardView {
        kpi,
        yearly,
        monthly,
        daily,
        location_risk: data.location_risk.as_ref().clone(),
        drilldown,
        messages,
    }
}

fn or_report<T: Default>(result: Result<T>, section: &str, messages: &mut Vec<String>) -> T {
    match result {
        Ok(value) => value,
        Err(e) => {
            warn!(section, error = %e, "Dashboard section failed");
            messages.push(format!("{}: {}", section, e));
            T::default()
        }
    }
}

fn kpi_tiles(table: &Table, columns: &DashboardColumns) -> Result<KpiTiles> {
    Ok(KpiTiles {
        total_txns: kpi_count(table, &columns.total_txns)?,
        total_amount: kpi_amount(table, &columns.total_amount)?,
        high_risk_txns: kpi_count(table, &columns.high_risk_txns)?,
        medium_risk_txns: kpi_count(table, &columns.medium_risk_txns)?,
        low_risk_txns: kpi_count(table, &columns.low_risk_txns)?,
    })
}

fn kpi_cell<'a>(table: &'a Table, name: &str) -> Result<&'a Value> {
    table.column_index(name)?;
    match table.value(0, name) {
        Some(value) if !value.is_null() => Ok(value),
        _ => Err(Error::TypeMismatch(format!("{} is null", name))),
    }
}

// Counts may arrive as whole floats (NUMERIC, scaled decimals)
fn kpi_count(table: &Table, name: &str) -> Result<i64> {
    match kpi_cell(table, name)? {
        Value::Integer(i) => Ok(*i),
        Value::Float(f) if f.fract() == 0.0 && f.abs() < 9.2e18 => Ok(*f as i64),
        other => Err(Error::TypeMismatch(format!(
            "{} is not a whole number: {}",
            name, other
        ))),
    }
}

fn kpi_amount(table: &Table, name: &str) -> Result<f64> {
    let value = kpi_cell(table, name)?;
    value
        .as_f64()
        .ok_or_else(|| Error::TypeMismatch(format!("{} is not numeric: {}", name, value)))
}

fn integers(values: Vec<Value>) -> Vec<i64> {
    values.iter().filter_map(Value::as_i64).collect()
}

// The chosen value if the domain offers it, else the domain's first value
fn resolve(choice: Option<i64>, domain: &[i64]) -> Option<i64> {
    choice
        .filter(|c| domain.contains(c))
        .or_else(|| domain.first().copied())
}

fn year_month_spec(year: Option<i64>, month: Option<i64>) -> Option<FilterSpec> {
    Some(FilterSpec::new().with(YEAR_COLUMN, year?).with(MONTH_COLUMN, month?))
}

fn monthly_view(
    trends: &Table,
    selection: &Selection,
    columns: &DashboardColumns,
) -> Result<MonthlyView> {
    let years = integers(distinct_values(trends, YEAR_COLUMN)?);
    let year = resolve(selection.monthly_year, &years);

    let table = match year {
        Some(y) => aggregate(
            &filter(trends, &FilterSpec::new().with(YEAR_COLUMN, y))?,
            &AggregationSpec::sum([MONTH_COLUMN], columns.trend_metric.as_str()),
        )?,
        None => Table::empty(),
    };

    Ok(MonthlyView { years, year, table })
}

fn daily_view(trends: &Table, selection: &Selection) -> Result<DailyView> {
    let years = integers(distinct_values(trends, YEAR_COLUMN)?);
    let year = resolve(selection.daily_year, &years);

    let months = match year {
        Some(y) => integers(dependent_domain(
            trends,
            &FilterSpec::new().with(YEAR_COLUMN, y),
            MONTH_COLUMN,
        )?),
        None => Vec::new(),
    };
    let month = resolve(selection.daily_month, &months);

    let table = match year_month_spec(year, month) {
        Some(spec) => filter(trends, &spec)?,
        None => trends.select_rows(|_| false),
    };

    Ok(DailyView {
        years,
        months,
        year,
        month,
        table,
    })
}

fn drilldown_view(
    raw: &Table,
    selection: &Selection,
    config: &DashboardConfig,
) -> Result<DrillDownView> {
    let columns = &config.columns;
    let row_cap = config.drilldown_cap();
    let truncated = raw.is_truncated();

    let table = decompose(raw, &columns.drilldown_time, config.timestamp_policy)?.table;

    let years = integers(distinct_values(&table, YEAR_COLUMN)?);
    let year = resolve(selection.year, &years);

    let months = match year {
        Some(y) => integers(dependent_domain(
            &table,
            &FilterSpec::new().with(YEAR_COLUMN, y),
            MONTH_COLUMN,
        )?),
        None => Vec::new(),
    };
    let month = resolve(selection.month, &months);

    let mut cities = vec![ALL.to_string()];
    if let Some(spec) = year_month_spec(year, month) {
        cities.extend(
            dependent_domain(&table, &spec, &columns.location)?
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string)),
        );
    }
    let city = selection
        .city
        .clone()
        .filter(|c| cities.contains(c))
        .unwrap_or_else(|| ALL.to_string());

    let mut risks = vec![ALL.to_string()];
    risks.extend(RiskLevel::LEVELS.iter().map(|r| r.as_str().to_string()));
    let risk = selection
        .risk
        .map_or_else(|| ALL.to_string(), |r| r.as_str().to_string());

    let filtered = match year_month_spec(year, month) {
        Some(spec) => {
            let spec = if city == ALL {
                spec.with_all(columns.location.as_str())
            } else {
                spec.with(columns.location.as_str(), city.as_str())
            };
            let spec = match selection.risk {
                Some(r) => spec.with(columns.risk_level.as_str(), r.as_str()),
                None => spec.with_all(columns.risk_level.as_str()),
            };
            filter(&table, &spec)?
        }
        None => table.select_rows(|_| false),
    };

    let notice = truncated.then(|| {
        format!(
            "Showing the first {} rows; filters apply to these rows only",
            row_cap
        )
    });

    Ok(DrillDownView {
        years,
        months,
        cities,
        risks,
        year,
        month,
        city,
        risk,
        table: filtered,
        truncated,
        row_cap,
        notice,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use riskboard_core::{Column, ColumnType};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn kpi_table() -> Table {
        Table::new(
            vec![
                Column::new("TOTAL_TXNS", ColumnType::Integer),
                Column::new("TOTAL_AMOUNT", ColumnType::Float),
                Column::new("HIGH_RISK_TXNS", ColumnType::Integer),
                Column::new("MEDIUM_RISK_TXNS", ColumnType::Integer),
                Column::new("LOW_RISK_TXNS", ColumnType::Integer),
            ],
            vec![vec![
                Value::Integer(1200),
                Value::Float(9876543.21),
                Value::Integer(40),
                Value::Integer(160),
                Value::Integer(1000),
            ]],
        )
        .unwrap()
    }

    fn trends_table() -> Table {
        Table::new(
            vec![
                Column::new("TXN_DATE", ColumnType::String),
                Column::new("HIGH_RISK_TXNS", ColumnType::Integer),
            ],
            vec![
                vec![Value::from("2023-11-30"), Value::Integer(4)],
                vec![Value::from("2024-01-05"), Value::Integer(10)],
                vec![Value::from("2024-01-20"), Value::Integer(5)],
                vec![Value::from("2024-02-01"), Value::Integer(7)],
            ],
        )
        .unwrap()
    }

    fn location_table() -> Table {
        Table::new(
            vec![
                Column::new("LOCATION", ColumnType::String),
                Column::new("HIGH_RISK_TXNS", ColumnType::Integer),
            ],
            vec![
                vec![Value::from("Delhi"), Value::Integer(12)],
                vec![Value::from("Mumbai"), Value::Integer(9)],
            ],
        )
        .unwrap()
    }

    fn drilldown_table() -> Table {
        let rows = [
            ("2024-01-03 10:00:00", Some("Delhi"), "HIGH_RISK"),
            ("2024-01-09 11:30:00", Some("Pune"), "LOW_RISK"),
            ("2024-01-15 08:15:00", Some("Delhi"), "LOW_RISK"),
            ("2024-02-02 09:00:00", Some("Mumbai"), "HIGH_RISK"),
            ("2023-12-24 23:00:00", Some("Agra"), "MEDIUM_RISK"),
            ("2024-01-20 17:45:00", None, "HIGH_RISK"),
        ];
        Table::new(
            vec![
                Column::new("TXN_ID", ColumnType::Integer),
                Column::new("TXN_TIME", ColumnType::String),
                Column::new("LOCATION", ColumnType::String),
                Column::new("FRAUD_RISK_LEVEL", ColumnType::String),
            ],
            rows.iter()
                .enumerate()
                .map(|(i, (ts, city, risk))| {
                    vec![
                        Value::Integer(i as i64),
                        Value::from(*ts),
                        Value::from(*city),
                        Value::from(*risk),
                    ]
                })
                .collect(),
        )
        .unwrap()
    }

    fn full_data() -> DashboardData {
        DashboardData {
            kpi: Arc::new(kpi_table()),
            trends: Arc::new(trends_table()),
            location_risk: Arc::new(location_table()),
            drilldown: Arc::new(drilldown_table()),
        }
    }

    fn txn_ids(table: &Table) -> Vec<i64> {
        table
            .column_values("TXN_ID")
            .unwrap()
            .filter_map(Value::as_i64)
            .collect()
    }

    // Serves fixed tables by query text; unknown queries fail like a missing view
    struct FixtureSource {
        tables: HashMap<String, Table>,
        calls: AtomicUsize,
    }

    impl FixtureSource {
        fn new(queries: &DashboardQueries) -> Self {
            let mut tables = HashMap::new();
            tables.insert(queries.kpi.text().to_string(), kpi_table());
            tables.insert(queries.trends.text().to_string(), trends_table());
            tables.insert(queries.location_risk.text().to_string(), location_table());
            tables.insert(queries.drilldown.text().to_string(), drilldown_table());
            Self {
                tables,
                calls: AtomicUsize::new(0),
            }
        }

        fn without(mut self, query: &Query) -> Self {
            self.tables.remove(query.text());
            self
        }
    }

    #[async_trait]
    impl DataSource for FixtureSource {
        fn name(&self) -> &str {
            "fixture"
        }

        async fn execute(&self, query: &Query) -> Result<Table> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.tables.get(query.text()).cloned().ok_or_else(|| {
                Error::Query(format!("Object '{}' does not exist", query.text()))
            })
        }
    }

    fn kpi_data(row: Vec<Value>) -> DashboardData {
        let kpi = Table::new(kpi_table().columns().to_vec(), vec![row]).unwrap();
        DashboardData {
            kpi: Arc::new(kpi),
            ..full_data()
        }
    }

    #[test]
    fn test_null_kpi_is_reported() {
        let data = kpi_data(vec![
            Value::Integer(1200),
            Value::Null,
            Value::Integer(40),
            Value::Integer(160),
            Value::Integer(1000),
        ]);
        let view = compose(&data, &Selection::default(), &DashboardConfig::default());

        assert!(view.kpi.is_none());
        assert_eq!(view.messages.len(), 1);
        assert!(view.messages[0].starts_with("KPI:"));
        assert!(view.messages[0].contains("TOTAL_AMOUNT"));
        // Other sections still render
        assert_eq!(view.yearly.row_count(), 2);
    }

    #[test]
    fn test_kpi_counts_are_exact() {
        let big = (1i64 << 53) + 1;
        let data = kpi_data(vec![
            Value::Integer(big),
            Value::Float(10.5),
            Value::Float(40.0),
            Value::Integer(160),
            Value::Integer(1000),
        ]);
        let view = compose(&data, &Selection::default(), &DashboardConfig::default());

        let kpi = view.kpi.unwrap();
        assert_eq!(kpi.total_txns, big);
        assert_eq!(kpi.high_risk_txns, 40);
        assert_eq!(kpi.total_amount, 10.5);
    }

    #[test]
    fn test_fractional_kpi_count_is_reported() {
        let data = kpi_data(vec![
            Value::Float(12.5),
            Value::Float(10.5),
            Value::Integer(40),
            Value::Integer(160),
            Value::Integer(1000),
        ]);
        let view = compose(&data, &Selection::default(), &DashboardConfig::default());
        assert!(view.kpi.is_none());
        assert!(view.messages[0].contains("TOTAL_TXNS"));
    }

    #[test]
    fn test_compose_default_selection() {
        let view = compose(&full_data(), &Selection::default(), &DashboardConfig::default());
        assert!(view.messages.is_empty());

        let kpi = view.kpi.unwrap();
        assert_eq!(kpi.total_txns, 1200);
        assert_eq!(kpi.high_risk_txns, 40);
        assert_eq!(kpi.formatted_amount(), "9,876,543");

        assert_eq!(
            view.yearly.rows(),
            &[
                vec![Value::Integer(2023), Value::Integer(4)],
                vec![Value::Integer(2024), Value::Integer(22)],
            ]
        );

        // Select boxes default to their first option
        assert_eq!(view.monthly.years, vec![2023, 2024]);
        assert_eq!(view.monthly.year, Some(2023));
        assert_eq!(view.daily.months, vec![11]);
        assert_eq!(view.daily.table.row_count(), 1);

        assert_eq!(view.location_risk.row_count(), 2);

        let dd = &view.drilldown;
        assert_eq!(dd.year, Some(2023));
        assert_eq!(dd.months, vec![12]);
        assert_eq!(dd.cities, vec!["ALL", "Agra"]);
        assert_eq!(dd.risks, vec!["ALL", "HIGH_RISK", "MEDIUM_RISK", "LOW_RISK"]);
        assert_eq!(txn_ids(&dd.table), vec![4]);
        assert!(!dd.truncated);
        assert_eq!(dd.row_cap, 2000);
        assert!(dd.notice.is_none());
    }

    #[test]
    fn test_compose_with_selection() {
        let selection = Selection {
            monthly_year: Some(2024),
            daily_year: Some(2024),
            daily_month: Some(1),
            year: Some(2024),
            month: Some(1),
            city: Some("Delhi".to_string()),
            risk: Some(RiskLevel::HighRisk),
        };
        let view = compose(&full_data(), &selection, &DashboardConfig::default());
        assert!(view.messages.is_empty());

        assert_eq!(
            view.monthly.table.rows(),
            &[
                vec![Value::Integer(1), Value::Integer(15)],
                vec![Value::Integer(2), Value::Integer(7)],
            ]
        );
        assert_eq!(view.daily.months, vec![1, 2]);
        assert_eq!(view.daily.table.row_count(), 2);

        let dd = &view.drilldown;
        assert_eq!(dd.months, vec![1, 2]);
        assert_eq!(dd.cities, vec!["ALL", "Delhi", "Pune"]);
        assert_eq!(dd.city, "Delhi");
        assert_eq!(dd.risk, "HIGH_RISK");
        assert_eq!(txn_ids(&dd.table), vec![0]);

        // Derived columns are present in the drill-down output
        assert!(dd.table.has_column("YEAR"));
        assert!(dd.table.has_column("MONTH"));
    }

    #[test]
    fn test_stale_selection_falls_back() {
        let selection = Selection {
            daily_year: Some(2023),
            // No rows in March 2023
            daily_month: Some(3),
            year: Some(1999),
            city: Some("Atlantis".to_string()),
            ..Selection::default()
        };
        let view = compose(&full_data(), &selection, &DashboardConfig::default());

        assert_eq!(view.daily.month, Some(11));
        assert_eq!(view.drilldown.year, Some(2023));
        assert_eq!(view.drilldown.city, ALL);
        assert_eq!(txn_ids(&view.drilldown.table), vec![4]);
    }

    #[test]
    fn test_compose_all_empty() {
        let view = compose(
            &DashboardData::default(),
            &Selection::default(),
            &DashboardConfig::default(),
        );

        assert!(view.messages.is_empty());
        assert!(view.kpi.is_none());
        assert!(view.yearly.is_empty());
        assert!(view.monthly.years.is_empty());
        assert_eq!(view.monthly.year, None);
        assert!(view.daily.table.is_empty());
        assert!(view.drilldown.table.is_empty());
        assert_eq!(view.drilldown.cities, vec!["ALL"]);
    }

    #[test]
    fn test_pipeline_error_is_a_message() {
        let config = DashboardConfig {
            columns: DashboardColumns {
                trend_date: "TXN_DAY".to_string(),
                ..DashboardColumns::default()
            },
            ..DashboardConfig::default()
        };
        let view = compose(&full_data(), &Selection::default(), &config);

        assert_eq!(view.messages.len(), 1);
        assert!(view.messages[0].starts_with("Trends:"));
        assert!(view.yearly.is_empty());
        // Other sections are unaffected
        assert!(view.kpi.is_some());
        assert_eq!(txn_ids(&view.drilldown.table), vec![4]);
    }

    #[test]
    fn test_truncation_notice() {
        let mut drilldown = drilldown_table();
        drilldown.truncate_to(5);
        let data = DashboardData {
            drilldown: Arc::new(drilldown),
            ..full_data()
        };

        let view = compose(&data, &Selection::default(), &DashboardConfig::default());
        assert!(view.drilldown.truncated);
        assert!(view.drilldown.notice.unwrap().contains("2000"));
    }

    #[test]
    fn test_risk_level_round_trip() {
        for level in RiskLevel::LEVELS {
            assert_eq!(level.as_str().parse::<RiskLevel>().unwrap(), level);
        }
        assert!("high_risk".parse::<RiskLevel>().is_err());
        assert_eq!(
            serde_json::to_string(&RiskLevel::MediumRisk).unwrap(),
            "\"MEDIUM_RISK\""
        );
    }

    #[test]
    fn test_formatted_amount() {
        let tiles = |amount| KpiTiles {
            total_txns: 0,
            total_amount: amount,
            high_risk_txns: 0,
            medium_risk_txns: 0,
            low_risk_txns: 0,
        };
        assert_eq!(tiles(0.4).formatted_amount(), "0");
        assert_eq!(tiles(999.6).formatted_amount(), "1,000");
        assert_eq!(tiles(123456.0).formatted_amount(), "123,456");
        assert_eq!(tiles(-1234567.0).formatted_amount(), "-1,234,567");
    }

    #[tokio::test]
    async fn test_render_isolates_failed_query() {
        let config = DashboardConfig::default();
        let source = FixtureSource::new(&config.queries).without(&config.queries.location_risk);
        let dashboard = Dashboard::new(Arc::new(source), config);

        let view = dashboard.render(&Selection::default()).await;

        assert_eq!(view.messages.len(), 1);
        assert!(view.messages[0].starts_with("Query Failed:"));
        assert!(view.messages[0].contains("VW_LOCATION_RISK"));
        assert!(view.location_risk.is_empty());

        assert!(view.kpi.is_some());
        assert_eq!(view.yearly.row_count(), 2);
        assert_eq!(view.drilldown.table.row_count(), 1);
    }

    #[tokio::test]
    async fn test_render_uses_cache() {
        let config = DashboardConfig::default();
        let source = Arc::new(
            FixtureSource::new(&config.queries).without(&config.queries.location_risk),
        );
        let dashboard = Dashboard::new(source.clone(), config);

        let first = dashboard.render(&Selection::default()).await;
        let second = dashboard
            .render(&Selection {
                year: Some(2024),
                ..Selection::default()
            })
            .await;

        assert_eq!(source.calls.load(Ordering::SeqCst), 4);
        assert_eq!(dashboard.cache().len(), 4);
        assert_eq!(first.messages.len(), 1);
        // Cached failure renders empty without repeating its message
        assert!(second.messages.is_empty());
        assert_eq!(second.drilldown.year, Some(2024));
    }
}
