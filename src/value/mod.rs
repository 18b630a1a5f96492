//! # Value Type System
//!
//! Core value types for rows flowing between the storage collaborator,
//! projections, and predicates.
//!
//! ## Design Decisions
//!
//! - **One container per element type**: a text array is always `Vec<String>`
//!   and an integer array is always `Vec<i32>`, no matter whether the column
//!   was declared as a resizable sequence or a fixed-size array. The
//!   declaration lives in the schema (`ArrayRepr`) and never reaches values.
//! - **Cheap clones**: strings and arrays are reference counted, since rows
//!   are cloned when projected.
//! - **Natural text rendering**: `Value::join` formats elements the way a
//!   derived joined-text field does (integers in decimal, text verbatim).
//!
//! ## Usage
//!
//! ```rust
//! use shapeql::value::{Tuple, Value};
//!
//! let row = Tuple::new(vec![
//!     Value::Int32(1),
//!     Value::from("FooBlog"),
//!     Value::text_array(["tag 1", "tag 2"]),
//! ]);
//! assert_eq!(row.get(2).and_then(|v| v.join(", ")).as_deref(), Some("tag 1, tag 2"));
//! ```

use serde::ser::SerializeSeq;
use serde::{Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// Supported data types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Int32,
    Int64,
    String,
    Bool,
    Null,
    /// Ordered array of text elements
    TextArray,
    /// Ordered array of 32-bit integer elements
    IntArray,
}

impl DataType {
    /// Check if a value matches this type. `Null` matches every type.
    pub fn matches(&self, value: &Value) -> bool {
        matches!(
            (self, value),
            (_, Value::Null)
                | (DataType::Int32, Value::Int32(_))
                | (DataType::Int64, Value::Int64(_))
                | (DataType::String, Value::String(_))
                | (DataType::Bool, Value::Bool(_))
                | (DataType::TextArray, Value::TextArray(_))
                | (DataType::IntArray, Value::IntArray(_))
        )
    }

    /// True for the array types
    pub fn is_array(&self) -> bool {
        matches!(self, DataType::TextArray | DataType::IntArray)
    }

    /// Element type of an array type
    pub fn element_type(&self) -> Option<DataType> {
        match self {
            DataType::TextArray => Some(DataType::String),
            DataType::IntArray => Some(DataType::Int32),
            _ => None,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::Int32 => "int32",
            DataType::Int64 => "int64",
            DataType::String => "string",
            DataType::Bool => "bool",
            DataType::Null => "null",
            DataType::TextArray => "string[]",
            DataType::IntArray => "int32[]",
        };
        f.write_str(name)
    }
}

/// A single value in a row
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Value {
    /// 32-bit signed integer
    Int32(i32),
    /// 64-bit signed integer
    Int64(i64),
    /// UTF-8 string (reference counted for efficient cloning)
    String(Arc<str>),
    /// Boolean value
    Bool(bool),
    /// Null/missing value
    Null,
    /// Array of text
    TextArray(Arc<Vec<String>>),
    /// Array of 32-bit integers
    IntArray(Arc<Vec<i32>>),
}

impl Value {
    /// Build a text array value from anything yielding string-like items
    pub fn text_array<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Value::TextArray(Arc::new(items.into_iter().map(Into::into).collect()))
    }

    /// Build an integer array value
    pub fn int_array<I>(items: I) -> Self
    where
        I: IntoIterator<Item = i32>,
    {
        Value::IntArray(Arc::new(items.into_iter().collect()))
    }

    /// Get the data type of this value
    pub fn data_type(&self) -> DataType {
        match self {
            Value::Int32(_) => DataType::Int32,
            Value::Int64(_) => DataType::Int64,
            Value::String(_) => DataType::String,
            Value::Bool(_) => DataType::Bool,
            Value::Null => DataType::Null,
            Value::TextArray(_) => DataType::TextArray,
            Value::IntArray(_) => DataType::IntArray,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Integer view, widening `Int32`
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int32(v) => Some(i64::from(*v)),
            Value::Int64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_text_array(&self) -> Option<&[String]> {
        match self {
            Value::TextArray(items) => Some(items.as_slice()),
            _ => None,
        }
    }

    pub fn as_int_array(&self) -> Option<&[i32]> {
        match self {
            Value::IntArray(items) => Some(items.as_slice()),
            _ => None,
        }
    }

    /// Number of elements of an array value
    pub fn array_len(&self) -> Option<usize> {
        match self {
            Value::TextArray(items) => Some(items.len()),
            Value::IntArray(items) => Some(items.len()),
            _ => None,
        }
    }

    /// Join array elements with `separator`, each element in its natural
    /// text form. Returns `None` for non-array values.
    ///
    /// This is the single definition of the joined-text transformation; the
    /// in-memory projection and the storage engine's `array_to_string` both
    /// call it.
    pub fn join(&self, separator: &str) -> Option<String> {
        match self {
            Value::TextArray(items) => Some(items.join(separator)),
            Value::IntArray(items) => Some(
                items
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(separator),
            ),
            _ => None,
        }
    }

    /// Element containment for arrays: does the array hold `element`?
    pub fn array_contains(&self, element: &Value) -> Option<bool> {
        match (self, element) {
            (Value::TextArray(items), Value::String(s)) => {
                Some(items.iter().any(|item| item.as_str() == &**s))
            }
            (Value::IntArray(items), other) => {
                let needle = other.as_i64()?;
                Some(items.iter().any(|item| i64::from(*item) == needle))
            }
            _ => None,
        }
    }

    /// Natural text rendering: strings unquoted, arrays joined with `, `
    pub fn to_plain_string(&self) -> String {
        match self {
            Value::String(s) => s.to_string(),
            Value::TextArray(_) | Value::IntArray(_) => self.join(", ").unwrap_or_default(),
            other => other.to_string(),
        }
    }
}

/// SQL-style comparison used by both local evaluation and the storage
/// engine: integers compare numerically across widths, text by bytes, arrays
/// element-wise. NULL or mismatched types compare as unknown.
pub fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::String(a), Value::String(b)) => Some(a.as_bytes().cmp(b.as_bytes())),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::TextArray(a), Value::TextArray(b)) => Some(a.cmp(b)),
        (Value::IntArray(a), Value::IntArray(b)) => Some(a.cmp(b)),
        (a, b) => Some(a.as_i64()?.cmp(&b.as_i64()?)),
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int32(v) => write!(f, "{v}"),
            Value::Int64(v) => write!(f, "{v}"),
            Value::String(s) => write!(f, "\"{s}\""),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Null => write!(f, "NULL"),
            Value::TextArray(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "\"{item}\"")?;
                }
                write!(f, "]")
            }
            Value::IntArray(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
        }
    }
}

// Plain JSON: numbers, strings, booleans, null and arrays, with no type tags.
impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Value::Int32(v) => serializer.serialize_i32(*v),
            Value::Int64(v) => serializer.serialize_i64(*v),
            Value::String(s) => serializer.serialize_str(s),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Null => serializer.serialize_unit(),
            Value::TextArray(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items.iter() {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::IntArray(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items.iter() {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
        }
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(Arc::from(v))
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(Arc::from(v.as_str()))
    }
}

impl From<Vec<String>> for Value {
    fn from(v: Vec<String>) -> Self {
        Value::TextArray(Arc::new(v))
    }
}

impl From<Vec<i32>> for Value {
    fn from(v: Vec<i32>) -> Self {
        Value::IntArray(Arc::new(v))
    }
}

/// A row of values
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct Tuple {
    values: Vec<Value>,
}

impl Tuple {
    /// Create a new tuple from a vector of values
    pub fn new(values: Vec<Value>) -> Self {
        Tuple { values }
    }

    /// Get the number of columns in this tuple
    pub fn arity(&self) -> usize {
        self.values.len()
    }

    /// Get a value by column index
    pub fn get(&self, idx: usize) -> Option<&Value> {
        self.values.get(idx)
    }

    /// Replace a value by column index; returns false if out of range
    pub fn set(&mut self, idx: usize, value: Value) -> bool {
        match self.values.get_mut(idx) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

impl From<Vec<Value>> for Tuple {
    fn from(values: Vec<Value>) -> Self {
        Tuple::new(values)
    }
}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, v) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{v}")?;
        }
        write!(f, ")")
    }
}
