use anyhow::Context;
use riskboard_core::{Error, Query};
use riskboard_pipeline::{
    DEFAULT_QUERY_TIMEOUT, DEFAULT_ROW_CAP, DEFAULT_TTL, DashboardConfig, DashboardQueries,
    QueryRunnerConfig, TimestampPolicy,
};
use riskboard_source_snowflake::{HttpClientConfig, SnowflakeConfig, TokenType};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub source: SourceConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub queries: QueriesConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where the dashboard views are read from
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SourceConfig {
    Sqlite {
        #[serde(default = "default_sqlite_path")]
        path: String,
    },
    Snowflake(SnowflakeSettings),
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig::Sqlite {
            path: default_sqlite_path(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SnowflakeSettings {
    #[serde(default)]
    pub account_url: String,

    /// Usually supplied through `SNOWFLAKE_TOKEN`; never written back out
    #[serde(default, skip_serializing)]
    pub token: Option<String>,

    #[serde(default)]
    pub token_type: TokenType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warehouse: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statement_timeout_secs: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll_interval_ms: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_polls: Option<u32>,
}

impl SnowflakeSettings {
    pub fn to_connector_config(&self) -> riskboard_core::Result<SnowflakeConfig> {
        if self.account_url.is_empty() {
            return Err(Error::Config(
                "snowflake source requires account_url (or SNOWFLAKE_ACCOUNT_URL)".to_string(),
            ));
        }
        let token = self.token.clone().ok_or_else(|| {
            Error::Config("snowflake source requires a token (set SNOWFLAKE_TOKEN)".to_string())
        })?;

        let mut config =
            SnowflakeConfig::new(&self.account_url, token).with_token_type(self.token_type);
        if let Some(warehouse) = &self.warehouse {
            config = config.with_warehouse(warehouse);
        }
        if let Some(database) = &self.database {
            config = config.with_database(database);
        }
        if let Some(schema) = &self.schema {
            config = config.with_schema(schema);
        }
        if let Some(role) = &self.role {
            config = config.with_role(role);
        }
        if let Some(secs) = self.statement_timeout_secs {
            config.statement_timeout_secs = secs;
        }
        if let Some(ms) = self.poll_interval_ms {
            config.poll_interval_ms = ms;
        }
        if let Some(polls) = self.max_polls {
            config.max_polls = polls;
        }
        config.client_config = HttpClientConfig::default();

        Ok(config)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
        }
    }
}

/// SQL overrides for the four dashboard views
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueriesConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kpi: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trends: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_risk: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drilldown: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drilldown_limit: Option<usize>,
}

impl QueriesConfig {
    fn apply(&self, queries: &mut DashboardQueries) {
        if let Some(sql) = &self.kpi {
            queries.kpi = Query::new(sql.as_str());
        }
        if let Some(sql) = &self.trends {
            queries.trends = Query::new(sql.as_str());
        }
        if let Some(sql) = &self.location_risk {
            queries.location_risk = Query::new(sql.as_str());
        }

        let text = self
            .drilldown
            .clone()
            .unwrap_or_else(|| queries.drilldown.text().to_string());
        let limit = self
            .drilldown_limit
            .or(queries.drilldown.row_limit())
            .unwrap_or(DEFAULT_ROW_CAP)
            .min(DEFAULT_ROW_CAP);
        queries.drilldown = Query::limited(text, limit);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_row_cap")]
    pub row_cap: usize,

    #[serde(default = "default_query_timeout_secs")]
    pub query_timeout_secs: u64,

    #[serde(default)]
    pub timestamp_policy: TimestampPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            row_cap: default_row_cap(),
            query_timeout_secs: default_query_timeout_secs(),
            timestamp_policy: TimestampPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub log_sql_queries: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            log_sql_queries: false,
        }
    }
}

impl AppConfig {
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let config = if path.extension().and_then(|s| s.to_str()) == Some("toml") {
            toml::from_str(&contents)
                .with_context(|| format!("Invalid TOML in {}", path.display()))?
        } else {
            // Default to YAML
            serde_yaml::from_str(&contents)
                .with_context(|| format!("Invalid YAML in {}", path.display()))?
        };

        Ok(config)
    }

    /// Merge environment variables into config (env vars take precedence)
    pub fn merge_env(&mut self) {
        self.merge_env_from(|key| std::env::var(key).ok());
    }

    pub fn merge_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup("RISKBOARD_LOG_LEVEL") {
            self.logging.level = val;
        }

        if let Some(path) = lookup("RISKBOARD_SQLITE_PATH") {
            self.source = SourceConfig::Sqlite { path };
        }

        // Selects Snowflake even when the file configured SQLite
        if let Some(url) = lookup("SNOWFLAKE_ACCOUNT_URL") {
            match &mut self.source {
                SourceConfig::Snowflake(settings) => settings.account_url = url,
                SourceConfig::Sqlite { .. } => {
                    self.source = SourceConfig::Snowflake(SnowflakeSettings {
                        account_url: url,
                        ..SnowflakeSettings::default()
                    });
                }
            }
        }

        if let Some(token) = lookup("SNOWFLAKE_TOKEN")
            && let SourceConfig::Snowflake(settings) = &mut self.source
        {
            settings.token = Some(token);
        }

        if let Some(val) = lookup("RISKBOARD_CACHE_TTL_SECS") {
            match val.parse::<u64>() {
                Ok(secs) => self.cache.ttl_secs = secs,
                Err(_) => eprintln!("Warning: Invalid RISKBOARD_CACHE_TTL_SECS '{}', ignoring", val),
            }
        }

        if let Some(val) = lookup("RISKBOARD_QUERY_TIMEOUT_SECS") {
            match val.parse::<u64>() {
                Ok(secs) => self.pipeline.query_timeout_secs = secs,
                Err(_) => eprintln!(
                    "Warning: Invalid RISKBOARD_QUERY_TIMEOUT_SECS '{}', ignoring",
                    val
                ),
            }
        }
    }

    /// SQLite path with `~` expanded, when the source is SQLite
    pub fn sqlite_path(&self) -> Option<PathBuf> {
        match &self.source {
            SourceConfig::Sqlite { path } => Some(PathBuf::from(shellexpand::tilde(path).into_owned())),
            SourceConfig::Snowflake(_) => None,
        }
    }

    pub fn runner_config(&self) -> QueryRunnerConfig {
        QueryRunnerConfig {
            timeout: Duration::from_secs(self.pipeline.query_timeout_secs),
            row_cap: self.pipeline.row_cap.min(DEFAULT_ROW_CAP),
        }
    }

    pub fn dashboard_config(&self) -> DashboardConfig {
        let mut queries = DashboardQueries::default();
        self.queries.apply(&mut queries);

        DashboardConfig {
            queries,
            timestamp_policy: self.pipeline.timestamp_policy,
            cache_ttl: Duration::from_secs(self.cache.ttl_secs),
            runner: self.runner_config(),
            ..DashboardConfig::default()
        }
    }
}

fn default_sqlite_path() -> String {
    "~/.riskboard/fraud.db".to_string()
}

fn default_ttl_secs() -> u64 {
    DEFAULT_TTL.as_secs()
}

fn default_row_cap() -> usize {
    DEFAULT_ROW_CAP
}

fn default_query_timeout_secs() -> u64 {
    DEFAULT_QUERY_TIMEOUT.as_secs()
}

fn default_log_level() -> String {
    "info".to_string()
}
