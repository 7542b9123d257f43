//! Snowflake data source
//!
//! Runs read-only statements through the Snowflake SQL REST API
//! (`/api/v2/statements`) and decodes the `jsonv2` result set into a
//! [`riskboard_core::Table`]. Long-running statements are polled; large
//! results are fetched partition by partition, stopping once a limited
//! query has enough rows.

pub mod client;
pub mod decode;
pub mod source;

pub use client::{HttpClientConfig, RequestError, create_client, with_retry};
pub use decode::RowType;
pub use source::{SnowflakeConfig, SnowflakeSource, TokenType};
