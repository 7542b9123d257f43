//! Riskboard Core Types and Traits
//!
//! This crate provides the fundamental types and traits used throughout Riskboard:
//! - Typed tabular results (`Table`, `Column`, `Value`)
//! - Read-only warehouse queries (`Query`)
//! - The `DataSource` abstraction implemented by warehouse adapters
//! - Core error types

pub mod error;
pub mod query;
pub mod source;
pub mod table;
pub mod value;

pub use error::{Error, Result};
pub use query::Query;
pub use source::DataSource;
pub use table::{Column, Table};
pub use value::{ColumnType, Value, parse_timestamp};
