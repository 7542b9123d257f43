//! Riskboard CLI
//!
//! Renders the fraud risk dashboard from a warehouse (Snowflake) or a local
//! SQLite extract of the same views.
//!
//! Usage:
//! ```bash
//! # Local extract, default selection, JSON output
//! riskboard render --sqlite ~/.riskboard/fraud.db
//!
//! # Snowflake, configured by file plus environment
//! SNOWFLAKE_TOKEN=... riskboard --config riskboard.yaml render --year 2024 --month 3 --city Delhi
//!
//! # One ad-hoc read-only query
//! riskboard query "SELECT * FROM VW_LOCATION_RISK" --limit 20
//! ```

mod config;
mod output;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand, ValueEnum};
use config::{AppConfig, SourceConfig};
use riskboard_core::{DataSource, Query};
use riskboard_pipeline::{CollectingReporter, Dashboard, QueryRunner, RiskLevel, Selection};
use riskboard_source_snowflake::SnowflakeSource;
use riskboard_source_sqlite::SqliteSource;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{Level, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Riskboard - fraud risk dashboard
#[derive(Parser)]
#[command(name = "riskboard")]
#[command(about = "Fraud risk dashboard over warehouse views", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file (YAML or TOML)
    #[arg(
        short,
        long,
        value_name = "FILE",
        env = "RISKBOARD_CONFIG",
        global = true
    )]
    config: Option<PathBuf>,

    /// Read from this SQLite extract instead of the configured source
    #[arg(long, value_name = "PATH", global = true)]
    sqlite: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one render cycle and print the dashboard
    Render {
        /// Year for the monthly distribution
        #[arg(long)]
        monthly_year: Option<i64>,

        /// Year for the daily trend
        #[arg(long)]
        daily_year: Option<i64>,

        /// Month for the daily trend
        #[arg(long)]
        daily_month: Option<i64>,

        /// Drill-down year
        #[arg(long)]
        year: Option<i64>,

        /// Drill-down month
        #[arg(long)]
        month: Option<i64>,

        /// Drill-down city, or ALL
        #[arg(long)]
        city: Option<String>,

        /// Drill-down risk level (HIGH_RISK, MEDIUM_RISK, LOW_RISK)
        #[arg(long)]
        risk: Option<RiskLevel>,

        #[arg(long, value_enum, default_value = "json")]
        format: OutputFormat,
    },
    /// Run one read-only query and print the result as JSON
    Query {
        sql: String,

        /// Row limit (the pipeline row cap still applies)
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Print the effective configuration
    Config,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Json,
    Text,
}

fn init_tracing(config: &AppConfig) -> anyhow::Result<()> {
    let log_level = match config.logging.level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::new(format!("{}", log_level));

    // sqlx logs every statement at info
    if !config.logging.log_sql_queries {
        match "sqlx=warn".parse() {
            Ok(directive) => filter = filter.add_directive(directive),
            Err(e) => tracing::warn!("Failed to set sqlx log filter: {}", e),
        }
    }

    // Logs go to stderr so stdout stays machine-readable
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

async fn open_source(config: &AppConfig) -> anyhow::Result<Arc<dyn DataSource>> {
    match &config.source {
        SourceConfig::Sqlite { .. } => {
            let path = config
                .sqlite_path()
                .context("SQLite source without a path")?;
            info!("Opening SQLite extract {}", path.display());
            let source = SqliteSource::open(&path)
                .await
                .with_context(|| format!("Failed to open {}", path.display()))?;
            Ok(Arc::new(source))
        }
        SourceConfig::Snowflake(settings) => {
            let connector = settings.to_connector_config()?;
            info!("Using Snowflake account {}", connector.account_url);
            Ok(Arc::new(SnowflakeSource::new(connector)?))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => {
            let path = shellexpand::tilde(&path.to_string_lossy()).into_owned();
            AppConfig::from_file(&path)?
        }
        None => AppConfig::default(),
    };

    // Environment overrides the file; flags override both
    config.merge_env();
    if let Some(path) = &cli.sqlite {
        config.source = SourceConfig::Sqlite {
            path: path.to_string_lossy().into_owned(),
        };
    }

    init_tracing(&config)?;

    match cli.command {
        Commands::Config => {
            print!("{}", serde_yaml::to_string(&config)?);
        }
        Commands::Query { sql, limit } => {
            let source = open_source(&config).await?;
            let reporter = Arc::new(CollectingReporter::new());
            let runner = QueryRunner::with_config(source, reporter.clone(), config.runner_config());

            let query = match limit {
                Some(n) => Query::limited(sql, n),
                None => Query::new(sql),
            };
            let table = runner.run(&query).await;

            if let Some(failure) = reporter.drain().into_iter().next() {
                bail!("{}", failure);
            }
            println!("{}", serde_json::to_string_pretty(&table)?);
        }
        Commands::Render {
            monthly_year,
            daily_year,
            daily_month,
            year,
            month,
            city,
            risk,
            format,
        } => {
            let source = open_source(&config).await?;
            let dashboard = Dashboard::new(source, config.dashboard_config());

            let selection = Selection {
                monthly_year,
                daily_year,
                daily_month,
                year,
                month,
                city,
                risk,
            };
            let view = dashboard.render(&selection).await;

            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&view)?),
                OutputFormat::Text => print!("{}", output::format_view(&view)),
            }
        }
    }

    Ok(())
}
