//! Crate-wide error type.

use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by configuration loading, model resolution, sampling and
/// output writing.
#[derive(Debug, Error)]
pub enum Error {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("binary encoding error: {0}")]
    Bincode(#[from] bincode::Error),

    #[cfg(feature = "csv")]
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[cfg(feature = "arrow")]
    #[error("arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[cfg(feature = "parquet")]
    #[error("parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("model error: {0}")]
    Model(String),

    #[error("unknown sampling engine {key:?} (known engines: {known})")]
    UnknownEngine { key: String, known: String },

    #[error("output format {0:?} is not enabled in this build")]
    FormatDisabled(&'static str),

    #[error("variable {name:?} not found in {}", path.display())]
    MissingVariable { name: String, path: PathBuf },

    #[error("unknown parameter {0:?}")]
    UnknownParameter(String),
}

pub type Result<T> = std::result::Result<T, Error>;
