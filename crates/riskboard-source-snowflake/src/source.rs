//! Snowflake SQL API connector

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use riskboard_core::{DataSource, Error, Query, Result, Table, Value};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::client::{HttpClientConfig, RequestError, create_client, with_retry};
use crate::decode::RowType;

/// Kind of bearer token sent to the SQL API
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TokenType {
    #[default]
    Oauth,
    KeypairJwt,
    ProgrammaticAccessToken,
}

impl TokenType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenType::Oauth => "OAUTH",
            TokenType::KeypairJwt => "KEYPAIR_JWT",
            TokenType::ProgrammaticAccessToken => "PROGRAMMATIC_ACCESS_TOKEN",
        }
    }
}

/// Snowflake connector configuration
#[derive(Clone)]
pub struct SnowflakeConfig {
    /// e.g. `https://myorg-myaccount.snowflakecomputing.com`
    pub account_url: String,

    pub token: String,
    pub token_type: TokenType,

    /// Session context; the user's defaults apply when unset
    pub warehouse: Option<String>,
    pub database: Option<String>,
    pub schema: Option<String>,
    pub role: Option<String>,

    /// Server-side statement timeout in seconds
    pub statement_timeout_secs: u64,

    /// Delay between status polls of a running statement
    pub poll_interval_ms: u64,

    /// Polls before giving up (the statement is then cancelled)
    pub max_polls: u32,

    /// HTTP client configuration
    pub client_config: HttpClientConfig,
}

impl SnowflakeConfig {
    pub fn new(account_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            account_url: account_url.into(),
            token: token.into(),
            token_type: TokenType::default(),
            warehouse: None,
            database: None,
            schema: None,
            role: None,
            statement_timeout_secs: 30,
            poll_interval_ms: 500,
            max_polls: 120,
            client_config: HttpClientConfig::default(),
        }
    }

    pub fn with_token_type(mut self, token_type: TokenType) -> Self {
        self.token_type = token_type;
        self
    }

    pub fn with_warehouse(mut self, warehouse: impl Into<String>) -> Self {
        self.warehouse = Some(warehouse.into());
        self
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    pub fn with_polling(mut self, interval: Duration, max_polls: u32) -> Self {
        self.poll_interval_ms = interval.as_millis() as u64;
        self.max_polls = max_polls;
        self
    }

    fn base_url(&self) -> &str {
        self.account_url.trim_end_matches('/')
    }
}

impl fmt::Debug for SnowflakeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnowflakeConfig")
            .field("account_url", &self.account_url)
            .field("token", &"<redacted>")
            .field("token_type", &self.token_type)
            .field("warehouse", &self.warehouse)
            .field("database", &self.database)
            .field("schema", &self.schema)
            .field("role", &self.role)
            .field("statement_timeout_secs", &self.statement_timeout_secs)
            .field("poll_interval_ms", &self.poll_interval_ms)
            .field("max_polls", &self.max_polls)
            .finish()
    }
}

#[derive(Debug, Serialize)]
struct StatementRequest<'a> {
    statement: &'a str,
    timeout: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    warehouse: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    database: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    schema: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatementResponse {
    #[serde(default)]
    statement_handle: Option<String>,
    #[serde(default)]
    statement_status_url: Option<String>,
    #[serde(default)]
    result_set_meta_data: Option<ResultSetMetaData>,
    #[serde(default)]
    data: Vec<Vec<Option<String>>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResultSetMetaData {
    row_type: Vec<RowType>,
    #[serde(default)]
    partition_info: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct PartitionResponse {
    #[serde(default)]
    data: Vec<Vec<Option<String>>>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    code: Option<String>,
    message: Option<String>,
}

enum StatementStatus {
    Complete(StatementResponse),
    /// Still running; poll this status URL
    Pending(String),
}

/// Snowflake-backed [`DataSource`]
pub struct SnowflakeSource {
    config: SnowflakeConfig,
    client: Client,
}

impl SnowflakeSource {
    pub fn new(config: SnowflakeConfig) -> Result<Self> {
        let client = create_client(&config.client_config)?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &SnowflakeConfig {
        &self.config
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .bearer_auth(&self.config.token)
            .header(
                "X-Snowflake-Authorization-Token-Type",
                self.config.token_type.as_str(),
            )
            .header("Accept", "application/json")
    }

    fn absolute(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else {
            format!("{}{}", self.config.base_url(), url)
        }
    }

    async fn submit(&self, sql: &str) -> Result<StatementResponse> {
        let url = format!("{}/api/v2/statements", self.config.base_url());
        let body = StatementRequest {
            statement: sql,
            timeout: self.config.statement_timeout_secs,
            warehouse: self.config.warehouse.as_deref(),
            database: self.config.database.as_deref(),
            schema: self.config.schema.as_deref(),
            role: self.config.role.as_deref(),
        };

        let (url, body) = (&url, &body);
        let status = with_retry(self.config.client_config.max_retries, || async move {
            let response = self
                .authorized(self.client.post(url))
                .json(body)
                .send()
                .await?;
            handle_statement_response(response).await
        })
        .await?;

        match status {
            StatementStatus::Complete(response) => Ok(response),
            StatementStatus::Pending(status_url) => self.poll(&status_url).await,
        }
    }

    async fn poll(&self, status_url: &str) -> Result<StatementResponse> {
        let url = self.absolute(status_url);
        let interval = Duration::from_millis(self.config.poll_interval_ms);

        for attempt in 1..=self.config.max_polls {
            tokio::time::sleep(interval).await;
            debug!(attempt, "Polling statement status");

            let url = url.as_str();
            let status = with_retry(self.config.client_config.max_retries, || async move {
                let response = self.authorized(self.client.get(url)).send().await?;
                handle_statement_response(response).await
            })
            .await?;

            if let StatementStatus::Complete(response) = status {
                return Ok(response);
            }
        }

        self.cancel(&url).await;
        Err(Error::Timeout(interval * self.config.max_polls))
    }

    // Best effort; the statement times out server-side anyway
    async fn cancel(&self, status_url: &str) {
        let path = status_url.split('?').next().unwrap_or(status_url);
        let url = format!("{}/cancel", path);

        match self.authorized(self.client.post(&url)).send().await {
            Ok(response) if response.status().is_success() => {
                debug!("Cancelled statement after polling gave up");
            }
            Ok(response) => warn!(status = %response.status(), "Statement cancel rejected"),
            Err(e) => warn!(error = %e, "Statement cancel failed"),
        }
    }

    async fn fetch_partition(
        &self,
        handle: &str,
        partition: usize,
    ) -> Result<Vec<Vec<Option<String>>>> {
        let url = format!(
            "{}/api/v2/statements/{}?partition={}",
            self.config.base_url(),
            handle,
            partition
        );

        let url = url.as_str();
        let page = with_retry(self.config.client_config.max_retries, || async move {
            let response = self.authorized(self.client.get(url)).send().await?;
            if !response.status().is_success() {
                return Err(status_error(response).await);
            }
            response
                .json::<PartitionResponse>()
                .await
                .map_err(|e| RequestError::Decode(format!("partition {}: {}", partition, e)))
        })
        .await?;

        debug!(partition, rows = page.data.len(), "Fetched result partition");
        Ok(page.data)
    }
}

#[async_trait]
impl DataSource for SnowflakeSource {
    fn name(&self) -> &str {
        "snowflake"
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
        // Enough for the adapter to see that a limited query was cut short
        let budget = query.row_limit().map(|limit| limit.saturating_add(1));

        let response = self.submit(&sql).await?;
        let meta = response.result_set_meta_data.ok_or_else(|| {
            Error::from(RequestError::Decode(
                "missing resultSetMetaData".to_string(),
            ))
        })?;

        let mut data = response.data;
        for partition in 1..meta.partition_info.len() {
            if budget.is_some_and(|b| data.len() >= b) {
                debug!(partition, "Row budget met, skipping remaining partitions");
                break;
            }
            let handle = response.statement_handle.as_deref().ok_or_else(|| {
                Error::from(RequestError::Decode(
                    "partitioned result without statementHandle".to_string(),
                ))
            })?;
            data.extend(self.fetch_partition(handle, partition).await?);
        }
        if let Some(b) = budget {
            data.truncate(b);
        }

        let columns = meta.row_type.iter().map(RowType::column).collect();
        let rows = data
            .iter()
            .map(|cells| {
                meta.row_type
                    .iter()
                    .zip(cells)
                    .map(|(ty, cell)| ty.decode(cell.as_deref()))
                    .collect::<Vec<Value>>()
            })
            .collect();

        Table::new(columns, rows)
    }
}

async fn handle_statement_response(
    response: reqwest::Response,
) -> std::result::Result<StatementStatus, RequestError> {
    match response.status().as_u16() {
        200 => response
            .json::<StatementResponse>()
            .await
            .map(StatementStatus::Complete)
            .map_err(|e| RequestError::Decode(e.to_string())),
        202 => {
            let body = response
                .json::<StatementResponse>()
                .await
                .map_err(|e| RequestError::Decode(e.to_string()))?;
            body.statement_status_url
                .or_else(|| {
                    body.statement_handle
                        .map(|h| format!("/api/v2/statements/{}", h))
                })
                .map(StatementStatus::Pending)
                .ok_or_else(|| {
                    RequestError::Decode("202 response without statementStatusUrl".to_string())
                })
        }
        _ => Err(status_error(response).await),
    }
}

async fn status_error(response: reqwest::Response) -> RequestError {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    let body: ErrorBody = serde_json::from_str(&text).unwrap_or_default();

    let message = body
        .message
        .or_else(|| (!text.is_empty()).then(|| text.clone()))
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown error").to_string());

    RequestError::Status {
        status: status.as_u16(),
        code: body.code,
        message,
    }
}
