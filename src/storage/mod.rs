//! Storage Module
//!
//! The storage collaborator contract and its in-memory implementation.
//!
//! - [`Storage`]: schema reset/creation, single-row insert, query with a
//!   compiled fragment, and declared native capabilities
//! - [`SqlExpr`] / [`StorageQuery`]: the storage-native query language
//! - [`MemoryStorage`]: a reference engine that interprets that language
//!   directly over in-memory rows
//!
//! Rows come back in insertion order. Queries never reorder.

pub mod error;
pub mod memory;
pub mod sql;

pub use error::{StorageError, StorageResult};
pub use memory::MemoryStorage;
pub use sql::{escape_like, SqlExpr, SqlFunction, StorageQuery, TABLE_ALIAS};

use crate::schema::RecordSchema;
use crate::value::Tuple;

/// Native operations a storage engine supports. The evaluator only pushes
/// fragments built from supported operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub array_to_string: bool,
    pub strpos: bool,
    pub like: bool,
    pub array_any: bool,
    pub string_functions: bool,
    pub cardinality: bool,
    /// Longest LIKE pattern, in characters, the engine will compile
    pub max_like_pattern: usize,
}

/// LIKE pattern bound of engines built with [`Capabilities::full`]
pub const DEFAULT_MAX_LIKE_PATTERN: usize = 4096;

impl Capabilities {
    /// Everything supported
    pub fn full() -> Self {
        Capabilities {
            array_to_string: true,
            strpos: true,
            like: true,
            array_any: true,
            string_functions: true,
            cardinality: true,
            max_like_pattern: DEFAULT_MAX_LIKE_PATTERN,
        }
    }

    /// Plain comparisons only
    pub fn minimal() -> Self {
        Capabilities {
            array_to_string: false,
            strpos: false,
            like: false,
            array_any: false,
            string_functions: false,
            cardinality: false,
            max_like_pattern: 0,
        }
    }

    pub fn supports(&self, func: SqlFunction) -> bool {
        match func {
            SqlFunction::ArrayToString => self.array_to_string,
            SqlFunction::Strpos => self.strpos,
            SqlFunction::Upper | SqlFunction::Lower | SqlFunction::Length => {
                self.string_functions
            }
            SqlFunction::Cardinality => self.cardinality,
        }
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::full()
    }
}

/// The storage collaborator
pub trait Storage {
    /// Drop the table if present. Returns true if something was dropped.
    fn ensure_deleted(&self, table: &str) -> StorageResult<bool>;

    /// Create the table if missing. Returns true if it was created.
    fn ensure_created(&self, schema: &RecordSchema) -> StorageResult<bool>;

    /// Insert one row. A NULL or zero key is replaced by the next serial
    /// value; the stored row is returned.
    fn insert(&self, table: &str, row: Tuple) -> StorageResult<Tuple>;

    /// Run a query, returning the selected columns in insertion order
    fn query(&self, query: &StorageQuery) -> StorageResult<Vec<Tuple>>;

    /// Native operations this engine can execute
    fn capabilities(&self) -> Capabilities;
}

impl<S: Storage + ?Sized> Storage for &S {
    fn ensure_deleted(&self, table: &str) -> StorageResult<bool> {
        (**self).ensure_deleted(table)
    }

    fn ensure_created(&self, schema: &RecordSchema) -> StorageResult<bool> {
        (**self).ensure_created(schema)
    }

    fn insert(&self, table: &str, row: Tuple) -> StorageResult<Tuple> {
        (**self).insert(table, row)
    }

    fn query(&self, query: &StorageQuery) -> StorageResult<Vec<Tuple>> {
        (**self).query(query)
    }

    fn capabilities(&self) -> Capabilities {
        (**self).capabilities()
    }
}
