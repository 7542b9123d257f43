//! Shared HTTP client utilities

use reqwest::{Client, ClientBuilder};
use riskboard_core::Error;
use std::time::Duration;
use tracing::{debug, warn};

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Per-request timeout in seconds (a single submit or poll, not the whole statement)
    pub timeout_secs: u64,

    /// Connection timeout in seconds
    pub connect_timeout_secs: u64,

    /// Maximum number of idle connections per host
    pub pool_max_idle_per_host: usize,

    /// Maximum number of retries for transient errors
    pub max_retries: u32,

    /// User agent string
    pub user_agent: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 60,
            connect_timeout_secs: 10,
            pool_max_idle_per_host: 8,
            max_retries: 3,
            user_agent: format!("Riskboard/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Create a configured HTTP client with connection pooling
pub fn create_client(config: &HttpClientConfig) -> riskboard_core::Result<Client> {
    ClientBuilder::new()
        .timeout(Duration::from_secs(config.timeout_secs))
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .pool_max_idle_per_host(config.pool_max_idle_per_host)
        // Expire idle connections before the server closes them
        .pool_idle_timeout(Duration::from_secs(90))
        .user_agent(&config.user_agent)
        .tcp_keepalive(Duration::from_secs(60))
        .build()
        .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))
}

/// Failure of a single HTTP exchange with the SQL API
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Snowflake returned {status}{}: {message}", code_suffix(.code))]
    Status {
        status: u16,
        code: Option<String>,
        message: String,
    },

    #[error("Invalid response: {0}")]
    Decode(String),
}

fn code_suffix(code: &Option<String>) -> String {
    code.as_deref()
        .map(|c| format!(" (code {})", c))
        .unwrap_or_default()
}

impl RequestError {
    /// Network errors, timeouts, 429 and 5xx gateway errors are worth retrying
    pub fn is_retryable(&self) -> bool {
        match self {
            RequestError::Transport(e) => e.is_connect() || e.is_timeout() || e.is_request(),
            RequestError::Status { status, .. } => matches!(status, 429 | 500 | 502 | 503 | 504),
            RequestError::Decode(_) => false,
        }
    }
}

impl From<RequestError> for Error {
    fn from(e: RequestError) -> Self {
        match e {
            RequestError::Transport(_) => Error::Http(e.to_string()),
            RequestError::Status { .. } | RequestError::Decode(_) => Error::Query(e.to_string()),
        }
    }
}

/// Retry policy for transient errors
pub async fn with_retry<F, Fut, T>(max_retries: u32, operation: F) -> Result<T, RequestError>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T, RequestError>>,
{
    let mut attempt = 0;
    loop {
        if attempt > 0 {
            // Exponential backoff: 100ms, 200ms, 400ms
            let backoff_ms = 2u64.pow(attempt - 1) * 100;
            debug!(
                "Retrying request after {}ms (attempt {}/{})",
                backoff_ms, attempt, max_retries
            );
            tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
        }

        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if e.is_retryable() && attempt < max_retries => {
                warn!(
                    "Request failed (attempt {}/{}): {}",
                    attempt + 1,
                    max_retries,
                    e
                );
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
