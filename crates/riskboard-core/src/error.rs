//! Error types for Riskboard Core

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Query failed: {0}")]
    Query(String),

    #[error("Query timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Invalid table: {0}")]
    InvalidTable(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Backend errors
    #[error("Database error: {0}")]
    Database(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
