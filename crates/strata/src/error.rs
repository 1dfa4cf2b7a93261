//! Error types for ingestion, tiering, sync and query.

use std::io;
use thiserror::Error;

/// Strata error type
#[derive(Error, Debug)]
pub enum StrataError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The catalog could not be reached or rejected a statement.
    #[error("Catalog error: {0}")]
    Store(#[from] strata_db::DbError),

    #[error("Walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Pattern error: {0}")]
    Pattern(String),

    #[error("Empty input: {0}")]
    EmptyInput(String),

    #[error("Missing column: {0}")]
    MissingColumn(String),
}

impl StrataError {
    /// True when the error came from the catalog rather than the archive
    /// files. Presentation code renders these as a "catalog unavailable"
    /// message instead of failing the whole page.
    pub fn is_store_error(&self) -> bool {
        matches!(self, StrataError::Store(_))
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, StrataError>;
