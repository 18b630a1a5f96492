//! IR types shared by the projection builder and the predicate evaluator.
//!
//! A [`FieldExpr`] describes how one projected field is derived from a
//! stored row. A [`Predicate`] is a boolean condition over projected fields,
//! addressed by alias. Both evaluate locally with SQL three-valued logic:
//! `None` means unknown (NULL), and a row is kept only when the predicate is
//! `Some(true)`.

use crate::schema::RecordSchema;
use crate::value::{compare, DataType, Tuple, Value};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// Resolved reference to a stored column
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnRef {
    pub name: String,
    pub index: usize,
}

/// Opaque client-side transformation. It has no storage equivalent, so any
/// predicate that reads a field built from one is evaluated locally.
#[derive(Clone)]
pub struct ClientFn {
    name: String,
    output: DataType,
    func: Arc<dyn Fn(&Value) -> Value + Send + Sync>,
}

impl ClientFn {
    pub fn new<F>(name: impl Into<String>, output: DataType, func: F) -> Self
    where
        F: Fn(&Value) -> Value + Send + Sync + 'static,
    {
        ClientFn {
            name: name.into(),
            output,
            func: Arc::new(func),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn output(&self) -> DataType {
        self.output
    }

    pub fn call(&self, value: &Value) -> Value {
        (self.func)(value)
    }
}

impl fmt::Debug for ClientFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientFn")
            .field("name", &self.name)
            .field("output", &self.output)
            .finish()
    }
}

impl PartialEq for ClientFn {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && Arc::ptr_eq(&self.func, &other.func)
    }
}

/// Expression deriving one projected field from a stored row
#[derive(Debug, Clone, PartialEq)]
pub enum FieldExpr {
    /// Raw stored column
    Column(ColumnRef),
    /// Array elements in natural text form, joined by `separator`
    Join {
        input: Box<FieldExpr>,
        separator: String,
    },
    /// Uppercase text
    Upper(Box<FieldExpr>),
    /// Lowercase text
    Lower(Box<FieldExpr>),
    /// Character length of text
    Length(Box<FieldExpr>),
    /// Number of array elements
    Cardinality(Box<FieldExpr>),
    /// Client-side function, never translated
    Client { input: Box<FieldExpr>, func: ClientFn },
}

impl FieldExpr {
    pub fn column(name: impl Into<String>, index: usize) -> Self {
        FieldExpr::Column(ColumnRef {
            name: name.into(),
            index,
        })
    }

    pub fn join(input: FieldExpr, separator: impl Into<String>) -> Self {
        FieldExpr::Join {
            input: Box::new(input),
            separator: separator.into(),
        }
    }

    /// Evaluate against a full stored row. Type mismatches yield NULL.
    pub fn evaluate(&self, row: &Tuple) -> Value {
        match self {
            FieldExpr::Column(col) => row.get(col.index).cloned().unwrap_or(Value::Null),
            FieldExpr::Join { input, separator } => input
                .evaluate(row)
                .join(separator)
                .map_or(Value::Null, Value::from),
            FieldExpr::Upper(input) => match input.evaluate(row) {
                Value::String(s) => Value::from(s.to_uppercase()),
                _ => Value::Null,
            },
            FieldExpr::Lower(input) => match input.evaluate(row) {
                Value::String(s) => Value::from(s.to_lowercase()),
                _ => Value::Null,
            },
            FieldExpr::Length(input) => match input.evaluate(row) {
                Value::String(s) => Value::Int64(s.chars().count() as i64),
                _ => Value::Null,
            },
            FieldExpr::Cardinality(input) => input
                .evaluate(row)
                .array_len()
                .map_or(Value::Null, |n| Value::Int64(n as i64)),
            FieldExpr::Client { input, func } => func.call(&input.evaluate(row)),
        }
    }

    /// Result type given the stored schema
    pub fn data_type(&self, schema: &RecordSchema) -> DataType {
        match self {
            FieldExpr::Column(col) => schema
                .columns()
                .get(col.index)
                .map_or(DataType::Null, |c| c.ty.storage_type()),
            FieldExpr::Join { .. } | FieldExpr::Upper(_) | FieldExpr::Lower(_) => {
                DataType::String
            }
            FieldExpr::Length(_) | FieldExpr::Cardinality(_) => DataType::Int64,
            FieldExpr::Client { func, .. } => func.output(),
        }
    }

    /// Stored columns this expression reads
    pub fn referenced_columns(&self) -> BTreeSet<usize> {
        self.column_refs().into_iter().map(|col| col.index).collect()
    }

    /// Every column reference in the expression, leaf first
    pub fn column_refs(&self) -> Vec<&ColumnRef> {
        let mut refs = Vec::new();
        self.collect_refs(&mut refs);
        refs
    }

    fn collect_refs<'a>(&'a self, refs: &mut Vec<&'a ColumnRef>) {
        match self {
            FieldExpr::Column(col) => refs.push(col),
            FieldExpr::Join { input, .. }
            | FieldExpr::Upper(input)
            | FieldExpr::Lower(input)
            | FieldExpr::Length(input)
            | FieldExpr::Cardinality(input)
            | FieldExpr::Client { input, .. } => input.collect_refs(refs),
        }
    }

    /// True if the expression is a plain column reference
    pub fn is_column(&self) -> bool {
        matches!(self, FieldExpr::Column(_))
    }
}

impl fmt::Display for FieldExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldExpr::Column(col) => write!(f, "{}", col.name),
            FieldExpr::Join { input, separator } => write!(f, "join({input}, {separator:?})"),
            FieldExpr::Upper(input) => write!(f, "upper({input})"),
            FieldExpr::Lower(input) => write!(f, "lower({input})"),
            FieldExpr::Length(input) => write!(f, "length({input})"),
            FieldExpr::Cardinality(input) => write!(f, "cardinality({input})"),
            FieldExpr::Client { input, func } => write!(f, "{}({input})", func.name()),
        }
    }
}

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "<>",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }

    /// Does `ordering` (left vs right) satisfy this operator?
    pub fn holds(&self, ordering: Ordering) -> bool {
        match self {
            CompareOp::Eq => ordering == Ordering::Equal,
            CompareOp::Ne => ordering != Ordering::Equal,
            CompareOp::Lt => ordering == Ordering::Less,
            CompareOp::Le => ordering != Ordering::Greater,
            CompareOp::Gt => ordering == Ordering::Greater,
            CompareOp::Ge => ordering != Ordering::Less,
        }
    }

    /// Only equality makes sense across every type
    pub fn is_equality(&self) -> bool {
        matches!(self, CompareOp::Eq | CompareOp::Ne)
    }
}

/// Anything predicates can read fields from
pub trait FieldSource {
    fn field(&self, name: &str) -> Option<&Value>;
}

/// Boolean condition over projected fields
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Text field contains a substring
    Contains { field: String, needle: String },
    /// Text field starts with a prefix
    StartsWith { field: String, prefix: String },
    /// Text field ends with a suffix
    EndsWith { field: String, suffix: String },
    /// Field compared to a constant
    Compare {
        field: String,
        op: CompareOp,
        value: Value,
    },
    /// Array field holds the element
    ArrayContains { field: String, element: Value },
    /// Logical AND
    And(Box<Predicate>, Box<Predicate>),
    /// Logical OR
    Or(Box<Predicate>, Box<Predicate>),
    /// Logical NOT
    Not(Box<Predicate>),
    /// Always true
    True,
    /// Always false
    False,
}

impl Predicate {
    pub fn contains(field: impl Into<String>, needle: impl Into<String>) -> Self {
        Predicate::Contains {
            field: field.into(),
            needle: needle.into(),
        }
    }

    pub fn starts_with(field: impl Into<String>, prefix: impl Into<String>) -> Self {
        Predicate::StartsWith {
            field: field.into(),
            prefix: prefix.into(),
        }
    }

    pub fn ends_with(field: impl Into<String>, suffix: impl Into<String>) -> Self {
        Predicate::EndsWith {
            field: field.into(),
            suffix: suffix.into(),
        }
    }

    pub fn compare(field: impl Into<String>, op: CompareOp, value: impl Into<Value>) -> Self {
        Predicate::Compare {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Eq, value)
    }

    pub fn array_contains(field: impl Into<String>, element: impl Into<Value>) -> Self {
        Predicate::ArrayContains {
            field: field.into(),
            element: element.into(),
        }
    }

    pub fn and(self, other: Predicate) -> Self {
        Predicate::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: Predicate) -> Self {
        Predicate::Or(Box::new(self), Box::new(other))
    }

    pub fn not(self) -> Self {
        Predicate::Not(Box::new(self))
    }

    /// Rename every reference to `from` into `to`
    pub fn rename_field(&self, from: &str, to: &str) -> Predicate {
        let rename = |f: &String| {
            if f == from {
                to.to_string()
            } else {
                f.clone()
            }
        };
        match self {
            Predicate::Contains { field, needle } => Predicate::Contains {
                field: rename(field),
                needle: needle.clone(),
            },
            Predicate::StartsWith { field, prefix } => Predicate::StartsWith {
                field: rename(field),
                prefix: prefix.clone(),
            },
            Predicate::EndsWith { field, suffix } => Predicate::EndsWith {
                field: rename(field),
                suffix: suffix.clone(),
            },
            Predicate::Compare { field, op, value } => Predicate::Compare {
                field: rename(field),
                op: *op,
                value: value.clone(),
            },
            Predicate::ArrayContains { field, element } => Predicate::ArrayContains {
                field: rename(field),
                element: element.clone(),
            },
            Predicate::And(l, r) => l.rename_field(from, to).and(r.rename_field(from, to)),
            Predicate::Or(l, r) => l.rename_field(from, to).or(r.rename_field(from, to)),
            Predicate::Not(inner) => inner.rename_field(from, to).not(),
            Predicate::True => Predicate::True,
            Predicate::False => Predicate::False,
        }
    }

    /// All field aliases this predicate reads
    pub fn referenced_fields(&self) -> BTreeSet<&str> {
        let mut fields = BTreeSet::new();
        self.collect_fields(&mut fields);
        fields
    }

    fn collect_fields<'a>(&'a self, fields: &mut BTreeSet<&'a str>) {
        match self {
            Predicate::Contains { field, .. }
            | Predicate::StartsWith { field, .. }
            | Predicate::EndsWith { field, .. }
            | Predicate::Compare { field, .. }
            | Predicate::ArrayContains { field, .. } => {
                fields.insert(field.as_str());
            }
            Predicate::And(l, r) | Predicate::Or(l, r) => {
                l.collect_fields(fields);
                r.collect_fields(fields);
            }
            Predicate::Not(inner) => inner.collect_fields(fields),
            Predicate::True | Predicate::False => {}
        }
    }

    /// Three-valued evaluation against a row of projected fields
    pub fn evaluate<S: FieldSource>(&self, row: &S) -> Option<bool> {
        match self {
            Predicate::Contains { field, needle } => {
                Some(row.field(field)?.as_str()?.contains(needle.as_str()))
            }
            Predicate::StartsWith { field, prefix } => {
                Some(row.field(field)?.as_str()?.starts_with(prefix.as_str()))
            }
            Predicate::EndsWith { field, suffix } => {
                Some(row.field(field)?.as_str()?.ends_with(suffix.as_str()))
            }
            Predicate::Compare { field, op, value } => {
                Some(op.holds(compare(row.field(field)?, value)?))
            }
            Predicate::ArrayContains { field, element } => {
                if element.is_null() {
                    return None;
                }
                row.field(field)?.array_contains(element)
            }
            Predicate::And(l, r) => match (l.evaluate(row), r.evaluate(row)) {
                (Some(false), _) | (_, Some(false)) => Some(false),
                (Some(true), Some(true)) => Some(true),
                _ => None,
            },
            Predicate::Or(l, r) => match (l.evaluate(row), r.evaluate(row)) {
                (Some(true), _) | (_, Some(true)) => Some(true),
                (Some(false), Some(false)) => Some(false),
                _ => None,
            },
            Predicate::Not(inner) => inner.evaluate(row).map(|b| !b),
            Predicate::True => Some(true),
            Predicate::False => Some(false),
        }
    }

    /// Keep-row decision: only a definite `true` passes
    pub fn matches<S: FieldSource>(&self, row: &S) -> bool {
        self.evaluate(row) == Some(true)
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Contains { field, needle } => write!(f, "{field}.contains({needle:?})"),
            Predicate::StartsWith { field, prefix } => {
                write!(f, "{field}.starts_with({prefix:?})")
            }
            Predicate::EndsWith { field, suffix } => write!(f, "{field}.ends_with({suffix:?})"),
            Predicate::Compare { field, op, value } => {
                write!(f, "{field} {} {value}", op.symbol())
            }
            Predicate::ArrayContains { field, element } => {
                write!(f, "{field}.array_contains({element})")
            }
            Predicate::And(l, r) => write!(f, "({l} AND {r})"),
            Predicate::Or(l, r) => write!(f, "({l} OR {r})"),
            Predicate::Not(inner) => write!(f, "NOT {inner}"),
            Predicate::True => write!(f, "TRUE"),
            Predicate::False => write!(f, "FALSE"),
        }
    }
}
