//! Storage-native query fragments.
//!
//! [`SqlExpr`] is the language pushed predicates are translated into. It
//! renders as PostgreSQL text for display and is interpreted directly by the
//! in-memory engine. Columns are referenced by name with the fixed table
//! alias [`TABLE_ALIAS`].

use crate::ir::CompareOp;
use crate::value::Value;
use std::fmt;

/// Alias the table gets in every generated query
pub const TABLE_ALIAS: &str = "b";

/// Native functions the storage engine may offer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlFunction {
    /// `array_to_string(array, separator)`
    ArrayToString,
    /// `strpos(haystack, needle)`: 1-based char position, 0 when absent
    Strpos,
    Upper,
    Lower,
    /// `length(text)` in characters
    Length,
    /// `cardinality(array)`
    Cardinality,
}

impl SqlFunction {
    pub fn name(&self) -> &'static str {
        match self {
            SqlFunction::ArrayToString => "array_to_string",
            SqlFunction::Strpos => "strpos",
            SqlFunction::Upper => "upper",
            SqlFunction::Lower => "lower",
            SqlFunction::Length => "length",
            SqlFunction::Cardinality => "cardinality",
        }
    }
}

/// Expression in the storage query language
#[derive(Debug, Clone, PartialEq)]
pub enum SqlExpr {
    Column(String),
    Literal(Value),
    Call {
        func: SqlFunction,
        args: Vec<SqlExpr>,
    },
    Compare {
        op: CompareOp,
        left: Box<SqlExpr>,
        right: Box<SqlExpr>,
    },
    /// `expr LIKE pattern` with `\` as the escape character
    Like {
        expr: Box<SqlExpr>,
        pattern: String,
    },
    /// `element = ANY (array)`
    AnyEq {
        element: Box<SqlExpr>,
        array: Box<SqlExpr>,
    },
    And(Box<SqlExpr>, Box<SqlExpr>),
    Or(Box<SqlExpr>, Box<SqlExpr>),
    Not(Box<SqlExpr>),
}

impl SqlExpr {
    pub fn column(name: impl Into<String>) -> Self {
        SqlExpr::Column(name.into())
    }

    pub fn literal(value: impl Into<Value>) -> Self {
        SqlExpr::Literal(value.into())
    }

    pub fn call(func: SqlFunction, args: Vec<SqlExpr>) -> Self {
        SqlExpr::Call { func, args }
    }

    pub fn compare(op: CompareOp, left: SqlExpr, right: SqlExpr) -> Self {
        SqlExpr::Compare {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Columns this expression reads
    pub fn columns(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            SqlExpr::Column(name) => {
                if !out.contains(&name.as_str()) {
                    out.push(name);
                }
            }
            SqlExpr::Literal(_) => {}
            SqlExpr::Call { args, .. } => args.iter().for_each(|a| a.collect_columns(out)),
            SqlExpr::Compare { left, right, .. } => {
                left.collect_columns(out);
                right.collect_columns(out);
            }
            SqlExpr::Like { expr, .. } => expr.collect_columns(out),
            SqlExpr::AnyEq { element, array } => {
                element.collect_columns(out);
                array.collect_columns(out);
            }
            SqlExpr::And(l, r) | SqlExpr::Or(l, r) => {
                l.collect_columns(out);
                r.collect_columns(out);
            }
            SqlExpr::Not(inner) => inner.collect_columns(out),
        }
    }

    /// LIKE patterns used anywhere in the expression
    pub fn like_patterns(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_patterns(&mut out);
        out
    }

    fn collect_patterns<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            SqlExpr::Like { expr, pattern } => {
                out.push(pattern);
                expr.collect_patterns(out);
            }
            SqlExpr::Column(_) | SqlExpr::Literal(_) => {}
            SqlExpr::Call { args, .. } => args.iter().for_each(|a| a.collect_patterns(out)),
            SqlExpr::Compare { left, right, .. } => {
                left.collect_patterns(out);
                right.collect_patterns(out);
            }
            SqlExpr::AnyEq { element, array } => {
                element.collect_patterns(out);
                array.collect_patterns(out);
            }
            SqlExpr::And(l, r) | SqlExpr::Or(l, r) => {
                l.collect_patterns(out);
                r.collect_patterns(out);
            }
            SqlExpr::Not(inner) => inner.collect_patterns(out),
        }
    }
}

/// Escape `%`, `_` and `\` so `text` matches literally inside a LIKE pattern
pub fn escape_like(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn quote_literal(f: &mut fmt::Formatter<'_>, value: &Value) -> fmt::Result {
    match value {
        Value::String(s) => write!(f, "'{}'", s.replace('\'', "''")),
        Value::Int32(v) => write!(f, "{v}"),
        Value::Int64(v) => write!(f, "{v}"),
        Value::Bool(b) => write!(f, "{}", if *b { "TRUE" } else { "FALSE" }),
        Value::Null => write!(f, "NULL"),
        Value::TextArray(items) => {
            write!(f, "ARRAY[")?;
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    write!(f, ",")?;
                }
                write!(f, "'{}'", item.replace('\'', "''"))?;
            }
            write!(f, "]::text[]")
        }
        Value::IntArray(items) => {
            write!(f, "ARRAY[")?;
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    write!(f, ",")?;
                }
                write!(f, "{item}")?;
            }
            write!(f, "]::integer[]")
        }
    }
}

impl fmt::Display for SqlExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlExpr::Column(name) => write!(f, "{TABLE_ALIAS}.\"{name}\""),
            SqlExpr::Literal(value) => quote_literal(f, value),
            SqlExpr::Call { func, args } => {
                write!(f, "{}(", func.name())?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ")")
            }
            SqlExpr::Compare { op, left, right } => {
                write!(f, "{left} {} {right}", op.symbol())
            }
            SqlExpr::Like { expr, pattern } => {
                write!(f, "{expr} LIKE '{}'", pattern.replace('\'', "''"))
            }
            SqlExpr::AnyEq { element, array } => write!(f, "{element} = ANY ({array})"),
            SqlExpr::And(l, r) => write!(f, "({l} AND {r})"),
            SqlExpr::Or(l, r) => write!(f, "({l} OR {r})"),
            SqlExpr::Not(inner) => write!(f, "NOT ({inner})"),
        }
    }
}

/// A complete read against one table
#[derive(Debug, Clone, PartialEq)]
pub struct StorageQuery {
    pub table: String,
    /// Selected columns, in output order
    pub columns: Vec<String>,
    /// Pushed predicate, if any
    pub filter: Option<SqlExpr>,
}

impl StorageQuery {
    /// Unfiltered read of the given columns
    pub fn scan(table: impl Into<String>, columns: Vec<String>) -> Self {
        StorageQuery {
            table: table.into(),
            columns,
            filter: None,
        }
    }

    pub fn with_filter(mut self, filter: SqlExpr) -> Self {
        self.filter = Some(filter);
        self
    }
}

impl fmt::Display for StorageQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SELECT ")?;
        for (i, column) in self.columns.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{TABLE_ALIAS}.\"{column}\"")?;
        }
        write!(f, "\nFROM \"{}\" AS {TABLE_ALIAS}", self.table)?;
        if let Some(filter) = &self.filter {
            write!(f, "\nWHERE {filter}")?;
        }
        Ok(())
    }
}
