//! # Record Schema
//!
//! Typed column declarations for a stored table, and row validation.
//!
//! Array columns carry an [`ArrayRepr`] describing how the application
//! declared them (resizable sequence or fixed-size array). The
//! representation is informational only: [`ColumnType::storage_type`] erases
//! it, so every layer below the schema sees one array type per element type.
//!
//! ```rust
//! use shapeql::schema::{ArrayRepr, ColumnType, ElementType, RecordSchema};
//!
//! let schema = RecordSchema::new("Blogs")
//!     .key("Id")
//!     .column("Name", ColumnType::Text)
//!     .column("TagsList", ColumnType::array(ElementType::Text, ArrayRepr::Sequence))
//!     .column("TagsArray", ColumnType::array(ElementType::Text, ArrayRepr::Fixed));
//!
//! let list = schema.column_schema("TagsList").unwrap();
//! let array = schema.column_schema("TagsArray").unwrap();
//! assert_eq!(list.ty.storage_type(), array.ty.storage_type());
//! ```

mod record;

pub use record::{Blog, Record};

use crate::value::{DataType, Tuple};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Schema errors raised when a row does not fit its table
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    /// Wrong number of columns
    #[error("Arity mismatch for table '{table}': expected {expected} columns, got {actual}")]
    ArityMismatch {
        table: String,
        expected: usize,
        actual: usize,
    },

    /// Column value has the wrong type
    #[error("Type mismatch in column '{column}': expected {expected}, got {actual}")]
    TypeMismatch {
        column: String,
        expected: DataType,
        actual: DataType,
    },

    /// NULL in a non-nullable column
    #[error("Column '{0}' does not allow NULL")]
    NullViolation(String),

    /// Column lookup failed
    #[error("Unknown column '{column}' in table '{table}'")]
    UnknownColumn { table: String, column: String },
}

/// How an application declared an array column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArrayRepr {
    /// Ordered, resizable sequence
    Sequence,
    /// Fixed-size ordered array
    Fixed,
}

/// Element type of an array column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementType {
    Text,
    Int32,
}

impl ElementType {
    pub fn data_type(&self) -> DataType {
        match self {
            ElementType::Text => DataType::String,
            ElementType::Int32 => DataType::Int32,
        }
    }
}

/// Declared type of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Int32,
    Int64,
    Text,
    Bool,
    Array { element: ElementType, repr: ArrayRepr },
}

impl ColumnType {
    pub fn array(element: ElementType, repr: ArrayRepr) -> Self {
        ColumnType::Array { element, repr }
    }

    /// The value type storage sees for this column. Array representation is
    /// dropped here.
    pub fn storage_type(&self) -> DataType {
        match self {
            ColumnType::Int32 => DataType::Int32,
            ColumnType::Int64 => DataType::Int64,
            ColumnType::Text => DataType::String,
            ColumnType::Bool => DataType::Bool,
            ColumnType::Array {
                element: ElementType::Text,
                ..
            } => DataType::TextArray,
            ColumnType::Array {
                element: ElementType::Int32,
                ..
            } => DataType::IntArray,
        }
    }

    /// SQL type name used in DDL
    pub fn sql_type(&self) -> &'static str {
        match self.storage_type() {
            DataType::Int32 => "integer",
            DataType::Int64 => "bigint",
            DataType::String => "text",
            DataType::Bool => "boolean",
            DataType::TextArray => "text[]",
            DataType::IntArray => "integer[]",
            DataType::Null => "unknown",
        }
    }

    pub fn repr(&self) -> Option<ArrayRepr> {
        match self {
            ColumnType::Array { repr, .. } => Some(*repr),
            _ => None,
        }
    }

    pub fn is_array(&self) -> bool {
        matches!(self, ColumnType::Array { .. })
    }
}

/// A single column declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    pub ty: ColumnType,
    pub nullable: bool,
    /// Serial identity key assigned by storage
    pub key: bool,
}

impl fmt::Display for ColumnSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\" {}", self.name, self.ty.sql_type())?;
        if self.key {
            write!(f, " GENERATED BY DEFAULT AS IDENTITY")?;
        } else if !self.nullable {
            write!(f, " NOT NULL")?;
        }
        Ok(())
    }
}

/// Schema of one stored table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSchema {
    table: String,
    columns: Vec<ColumnSchema>,
}

impl RecordSchema {
    pub fn new(table: impl Into<String>) -> Self {
        RecordSchema {
            table: table.into(),
            columns: Vec::new(),
        }
    }

    /// Add the serial identity key column
    pub fn key(mut self, name: impl Into<String>) -> Self {
        self.columns.push(ColumnSchema {
            name: name.into(),
            ty: ColumnType::Int32,
            nullable: false,
            key: true,
        });
        self
    }

    /// Add a non-nullable column
    pub fn column(mut self, name: impl Into<String>, ty: ColumnType) -> Self {
        self.columns.push(ColumnSchema {
            name: name.into(),
            ty,
            nullable: false,
            key: false,
        });
        self
    }

    /// Add a nullable column
    pub fn nullable_column(mut self, name: impl Into<String>, ty: ColumnType) -> Self {
        self.columns.push(ColumnSchema {
            name: name.into(),
            ty,
            nullable: true,
            key: false,
        });
        self
    }

    /// Same columns under another table name
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn columns(&self) -> &[ColumnSchema] {
        &self.columns
    }

    pub fn arity(&self) -> usize {
        self.columns.len()
    }

    pub fn index_of(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == column)
    }

    pub fn column_schema(&self, column: &str) -> Option<&ColumnSchema> {
        self.columns.iter().find(|c| c.name == column)
    }

    /// Index of the identity key column, if declared
    pub fn key_index(&self) -> Option<usize> {
        self.columns.iter().position(|c| c.key)
    }

    /// Validate a row against this schema
    pub fn validate(&self, row: &Tuple) -> Result<(), SchemaError> {
        if row.arity() != self.columns.len() {
            return Err(SchemaError::ArityMismatch {
                table: self.table.clone(),
                expected: self.columns.len(),
                actual: row.arity(),
            });
        }

        for (column, value) in self.columns.iter().zip(row.values()) {
            if value.is_null() {
                // Key columns may arrive NULL and be filled in by storage
                if !column.nullable && !column.key {
                    return Err(SchemaError::NullViolation(column.name.clone()));
                }
                continue;
            }
            let expected = column.ty.storage_type();
            if !expected.matches(value) {
                return Err(SchemaError::TypeMismatch {
                    column: column.name.clone(),
                    expected,
                    actual: value.data_type(),
                });
            }
        }
        Ok(())
    }

    /// `CREATE TABLE` statement for this schema
    pub fn create_table_sql(&self) -> String {
        let mut sql = format!("CREATE TABLE \"{}\" (\n", self.table);
        for column in &self.columns {
            sql.push_str(&format!("    {column},\n"));
        }
        match self.columns.iter().find(|c| c.key) {
            Some(key) => sql.push_str(&format!(
                "    CONSTRAINT \"PK_{}\" PRIMARY KEY (\"{}\")\n",
                self.table, key.name
            )),
            None => {
                // Drop the trailing comma of the last column line
                if sql.ends_with(",\n") {
                    sql.truncate(sql.len() - 2);
                    sql.push('\n');
                }
            }
        }
        sql.push_str(");");
        sql
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    fn blogs() -> RecordSchema {
        Blog::schema()
    }

    #[test]
    fn test_storage_type_erases_repr() {
        let seq = ColumnType::array(ElementType::Int32, ArrayRepr::Sequence);
        let fixed = ColumnType::array(ElementType::Int32, ArrayRepr::Fixed);
        assert_ne!(seq, fixed);
        assert_eq!(seq.storage_type(), fixed.storage_type());
        assert_eq!(seq.sql_type(), "integer[]");
        assert_eq!(fixed.sql_type(), "integer[]");
    }

    #[test]
    fn test_validate_accepts_both_reprs_with_same_value_type() {
        let schema = blogs();
        let row = Tuple::new(vec![
            Value::Int32(1),
            Value::from("FooBlog"),
            Value::text_array(["a"]),
            Value::text_array(["b"]),
            Value::int_array([1]),
            Value::int_array([2]),
        ]);
        assert!(schema.validate(&row).is_ok());
    }

    #[test]
    fn test_validate_arity() {
        let schema = blogs();
        let err = schema.validate(&Tuple::new(vec![Value::Int32(1)])).unwrap_err();
        assert!(matches!(err, SchemaError::ArityMismatch { expected: 6, actual: 1, .. }));
    }

    #[test]
    fn test_validate_type_mismatch() {
        let schema = blogs();
        let row = Tuple::new(vec![
            Value::Int32(1),
            Value::from("FooBlog"),
            Value::int_array([1]),
            Value::text_array(["b"]),
            Value::int_array([1]),
            Value::int_array([2]),
        ]);
        let err = schema.validate(&row).unwrap_err();
        assert_eq!(
            err,
            SchemaError::TypeMismatch {
                column: "TagsList".to_string(),
                expected: DataType::TextArray,
                actual: DataType::IntArray,
            }
        );
    }

    #[test]
    fn test_validate_null_key_allowed() {
        let schema = blogs();
        let row = Tuple::new(vec![
            Value::Null,
            Value::from("FooBlog"),
            Value::text_array(["a"]),
            Value::text_array(["b"]),
            Value::int_array([1]),
            Value::int_array([2]),
        ]);
        assert!(schema.validate(&row).is_ok());
    }

    #[test]
    fn test_validate_null_violation() {
        let schema = blogs();
        let row = Tuple::new(vec![
            Value::Int32(1),
            Value::Null,
            Value::text_array(["a"]),
            Value::text_array(["b"]),
            Value::int_array([1]),
            Value::int_array([2]),
        ]);
        assert_eq!(
            schema.validate(&row).unwrap_err(),
            SchemaError::NullViolation("Name".to_string())
        );
    }

    #[test]
    fn test_create_table_sql_uses_same_type_for_both_reprs() {
        let sql = blogs().create_table_sql();
        assert!(sql.starts_with("CREATE TABLE \"Blogs\" ("));
        assert!(sql.contains("\"TagsList\" text[] NOT NULL"));
        assert!(sql.contains("\"TagsArray\" text[] NOT NULL"));
        assert!(sql.contains("\"RatingsList\" integer[] NOT NULL"));
        assert!(sql.contains("\"RatingsArray\" integer[] NOT NULL"));
        assert!(sql.contains("CONSTRAINT \"PK_Blogs\" PRIMARY KEY (\"Id\")"));
        assert!(sql.ends_with(");"));
    }

    #[test]
    fn test_create_table_sql_without_key() {
        let schema = RecordSchema::new("t").column("a", ColumnType::Text);
        assert_eq!(schema.create_table_sql(), "CREATE TABLE \"t\" (\n    \"a\" text NOT NULL\n);");
    }
}
