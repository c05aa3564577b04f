//! Error taxonomy for the aggregation engine.
//!
//! Configuration problems abort loading, query problems are rejected with a
//! descriptive message. Data-quality recoveries are not errors; they are
//! tallied in [`crate::schema::NormalizeReport`] instead.

use chrono::NaiveDate;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    /// Input cannot be interpreted at all (missing table, no date or label column).
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("group-by field '{field}' is not available on {table} data")]
    UnknownField { field: String, table: &'static str },
    #[error("invalid date range: start {start} is after end {end}")]
    InvalidDateRange { start: NaiveDate, end: NaiveDate },
    #[error("query error: {0}")]
    Query(String),
}

impl EngineError {
    pub fn configuration(message: impl Into<String>) -> Self {
        EngineError::Configuration(message.into())
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, EngineError::Configuration(_))
    }
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;
