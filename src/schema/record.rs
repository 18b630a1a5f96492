//! Typed records and their conversion to storage rows.
//!
//! This is the only place where an application type meets the storage row
//! format. Both array representations of a logical column are the same
//! `Vec<T>` on the Rust side; only the schema records how each was declared.

use super::{ArrayRepr, ColumnType, ElementType, RecordSchema, SchemaError};
use crate::value::{DataType, Tuple, Value};
use serde::{Deserialize, Serialize};

/// A type that maps to one row of a stored table
pub trait Record: Sized {
    /// Schema of the backing table (default table name)
    fn schema() -> RecordSchema;

    /// Convert to a storage row in schema column order
    fn to_tuple(&self) -> Tuple;

    /// Rebuild from a storage row
    fn from_tuple(row: &Tuple) -> Result<Self, SchemaError>;
}

/// The blog entity: tags and ratings, each declared twice
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Blog {
    /// Identity key; 0 means "let storage assign one"
    pub id: i32,
    pub name: String,
    pub tags_list: Vec<String>,
    pub tags_array: Vec<String>,
    pub ratings_list: Vec<i32>,
    pub ratings_array: Vec<i32>,
}

impl Record for Blog {
    fn schema() -> RecordSchema {
        RecordSchema::new("Blogs")
            .key("Id")
            .column("Name", ColumnType::Text)
            .column(
                "TagsList",
                ColumnType::array(ElementType::Text, ArrayRepr::Sequence),
            )
            .column(
                "TagsArray",
                ColumnType::array(ElementType::Text, ArrayRepr::Fixed),
            )
            .column(
                "RatingsList",
                ColumnType::array(ElementType::Int32, ArrayRepr::Sequence),
            )
            .column(
                "RatingsArray",
                ColumnType::array(ElementType::Int32, ArrayRepr::Fixed),
            )
    }

    fn to_tuple(&self) -> Tuple {
        let id = if self.id == 0 {
            Value::Null
        } else {
            Value::Int32(self.id)
        };
        Tuple::new(vec![
            id,
            Value::from(self.name.as_str()),
            Value::from(self.tags_list.clone()),
            Value::from(self.tags_array.clone()),
            Value::from(self.ratings_list.clone()),
            Value::from(self.ratings_array.clone()),
        ])
    }

    fn from_tuple(row: &Tuple) -> Result<Self, SchemaError> {
        let schema = Self::schema();
        schema.validate(row)?;

        let id = match row.get(0) {
            Some(Value::Int32(id)) => *id,
            _ => 0,
        };
        Ok(Blog {
            id,
            name: text(row, 1, "Name")?,
            tags_list: text_array(row, 2, "TagsList")?,
            tags_array: text_array(row, 3, "TagsArray")?,
            ratings_list: int_array(row, 4, "RatingsList")?,
            ratings_array: int_array(row, 5, "RatingsArray")?,
        })
    }
}

fn mismatch(row: &Tuple, idx: usize, column: &str, expected: DataType) -> SchemaError {
    SchemaError::TypeMismatch {
        column: column.to_string(),
        expected,
        actual: row.get(idx).map_or(DataType::Null, Value::data_type),
    }
}

fn text(row: &Tuple, idx: usize, column: &str) -> Result<String, SchemaError> {
    row.get(idx)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| mismatch(row, idx, column, DataType::String))
}

fn text_array(row: &Tuple, idx: usize, column: &str) -> Result<Vec<String>, SchemaError> {
    row.get(idx)
        .and_then(Value::as_text_array)
        .map(<[String]>::to_vec)
        .ok_or_else(|| mismatch(row, idx, column, DataType::TextArray))
}

fn int_array(row: &Tuple, idx: usize, column: &str) -> Result<Vec<i32>, SchemaError> {
    row.get(idx)
        .and_then(Value::as_int_array)
        .map(<[i32]>::to_vec)
        .ok_or_else(|| mismatch(row, idx, column, DataType::IntArray))
}
