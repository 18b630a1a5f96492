//! Storage Error Types

use crate::schema::SchemaError;
use thiserror::Error;

/// Storage collaborator errors. Every variant is a storage fault from the
/// caller's point of view.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Storage cannot be reached
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    /// Table not found
    #[error("Table not found: {0}")]
    TableNotFound(String),

    /// Row does not fit the table schema
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    /// Column referenced by a query does not exist
    #[error("Column '{column}' not found in table '{table}'")]
    ColumnNotFound { table: String, column: String },

    /// Identity key already used
    #[error("Duplicate key {key} in table '{table}'")]
    DuplicateKey { table: String, key: i32 },

    /// Serial key sequence ran past `i32::MAX`
    #[error("Key sequence exhausted for table '{0}'")]
    KeySequenceExhausted(String),

    /// Table is full
    #[error("Row limit of {limit} reached for table '{table}'")]
    RowLimitExceeded { table: String, limit: usize },

    /// Query fragment could not be executed
    #[error("Query rejected: {0}")]
    QueryRejected(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
