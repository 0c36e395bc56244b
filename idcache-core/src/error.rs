//! Error types for idcache operations

use std::path::PathBuf;
use thiserror::Error;

/// Boxed error returned by caller-supplied fetch callbacks and wrapped as a
/// cause by storage failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Request validation errors. Raised before any side effect.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("At least one column must be specified")]
    EmptyColumns,

    #[error("Invalid table name '{table}': {reason}")]
    InvalidTableName { table: String, reason: String },

    #[error("All IDs must be integers: element {index} is {value}")]
    NonIntegerId { index: usize, value: String },
}

/// Cache store errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Invalid row at position {index}: {reason}")]
    InvalidRow { index: usize, reason: String },

    #[error("Failed to write cache file {}: {source}", .path.display())]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: BoxError,
    },

    #[error("Failed to read cache file {}: {source}", .path.display())]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: BoxError,
    },

    #[error("Cache file encoding error: {reason}")]
    Encode { reason: String },
}

/// Dotted-path extraction errors.
///
/// These never escape a read: projection turns them into null cells.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum JsonPathError {
    #[error("Failed to parse JSON string: {reason}")]
    Decode { reason: String },

    #[error("Cannot extract JSON path from data type: {type_name}")]
    UnsupportedType { type_name: &'static str },

    #[error("JSON path '{path}' not found: missing key '{key}'")]
    PathNotFound { path: String, key: String },

    #[error("Cannot access key '{key}' on non-object value: {type_name}")]
    Navigation { key: String, type_name: &'static str },
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Master error type for read-path operations.
#[derive(Debug, Error)]
pub enum IdCacheError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Columns not available in source: {columns:?}")]
    ColumnNotFound { columns: Vec<String> },

    #[error("IDs not found: {ids:?}")]
    DataNotFound { ids: Vec<i64> },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("All {failed} batches failed. First error: {first_error}")]
    AllBatchesFailed { failed: usize, first_error: String },

    #[error("Error fetching data: {source}")]
    FetchStage {
        #[source]
        source: Box<IdCacheError>,
    },
}

impl IdCacheError {
    /// Wrap a fetch-stage failure, leaving the two typed lookup errors as they are.
    pub fn fetch_stage(err: IdCacheError) -> Self {
        match err {
            e @ (IdCacheError::DataNotFound { .. }
            | IdCacheError::ColumnNotFound { .. }
            | IdCacheError::FetchStage { .. }) => e,
            other => IdCacheError::FetchStage {
                source: Box::new(other),
            },
        }
    }

    /// The innermost error, looking through fetch-stage wrapping.
    pub fn root(&self) -> &IdCacheError {
        match self {
            IdCacheError::FetchStage { source } => source.root(),
            other => other,
        }
    }
}

/// Result type alias for idcache operations.
pub type IdCacheResult<T> = Result<T, IdCacheError>;

// =============================================================================
// TESTS
// =============================================================================
