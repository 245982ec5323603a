//! Error types for ledger reports

use thiserror::Error;

/// Errors that can occur while building, persisting or loading reports.
///
/// Malformed individual rows (too few fields, blank book names) are not
/// errors; the aggregator drops them silently.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Invalid input format: {0}")]
    InvalidInputFormat(String),

    #[error("Invalid locality: a non-empty locality key is required")]
    InvalidLocality,

    #[error("No report found for locality: {0}")]
    NotFound(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Encoding error: {0}")]
    Encoding(String),
}
