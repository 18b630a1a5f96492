//! # Projection Builder
//!
//! Builds read-only derived views over stored rows.
//!
//! ```text
//! RecordSchema -> [ProjectionBuilder] -> Projection -> evaluate(row) -> ProjectedRow
//! ```
//!
//! Every field is a [`FieldExpr`] bound to schema column indexes. Fields are
//! identified by alias only; a derived field is never folded into the column
//! it is derived from, even when the two would look alike to a planner.
//!
//! [`Projection::build`] produces the canonical joined view: every column,
//! plus one `<Column>Joined` text field per array column. Because both
//! array representations share one value type and one join function, equal
//! element lists always give byte-identical joined text.

use crate::ir::{ClientFn, FieldExpr, FieldSource};
use crate::schema::RecordSchema;
use crate::value::{DataType, Tuple, Value};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Projection construction errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProjectionError {
    #[error("Unknown column '{column}' in table '{table}'")]
    UnknownColumn { table: String, column: String },

    #[error("Duplicate projected field '{0}'")]
    DuplicateField(String),

    #[error("Field '{field}' requires {expected} input, column has type {actual}")]
    TypeMismatch {
        field: String,
        expected: &'static str,
        actual: DataType,
    },

    #[error("Projection has no fields")]
    Empty,
}

/// One named field of a projection
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectedField {
    pub alias: String,
    pub expr: FieldExpr,
}

/// A derived view over one table
#[derive(Debug, Clone)]
pub struct Projection {
    schema: Arc<RecordSchema>,
    fields: Vec<ProjectedField>,
    aliases: Arc<[String]>,
}

impl Projection {
    /// Canonical joined view: all columns except the key, each array column
    /// followed by its joined-text field.
    pub fn build(schema: &RecordSchema, separator: &str) -> Result<Projection, ProjectionError> {
        let mut builder = ProjectionBuilder::new(schema);
        for column in schema.columns() {
            if column.key {
                continue;
            }
            builder = builder.column(&column.name);
            if column.ty.is_array() {
                builder = builder.joined(format!("{}Joined", column.name), &column.name, separator);
            }
        }
        builder.build()
    }

    pub fn schema(&self) -> &RecordSchema {
        &self.schema
    }

    pub fn fields(&self) -> &[ProjectedField] {
        &self.fields
    }

    pub fn field(&self, alias: &str) -> Option<&ProjectedField> {
        self.fields.iter().find(|f| f.alias == alias)
    }

    pub fn index_of(&self, alias: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.alias == alias)
    }

    /// Result type of a projected field
    pub fn field_type(&self, alias: &str) -> Option<DataType> {
        self.field(alias).map(|f| f.expr.data_type(&self.schema))
    }

    /// Evaluate every field against a full stored row
    pub fn evaluate(&self, row: &Tuple) -> ProjectedRow {
        ProjectedRow {
            aliases: Arc::clone(&self.aliases),
            values: self.fields.iter().map(|f| f.expr.evaluate(row)).collect(),
        }
    }
}

impl fmt::Display for Projection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {{ ", self.schema.table())?;
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            if field.expr.is_column() {
                write!(f, "{}", field.alias)?;
            } else {
                write!(f, "{} = {}", field.alias, field.expr)?;
            }
        }
        write!(f, " }}")
    }
}

/// Builder for [`Projection`]. Errors are collected and reported by
/// [`ProjectionBuilder::build`]; the first error wins.
pub struct ProjectionBuilder {
    schema: Arc<RecordSchema>,
    fields: Vec<ProjectedField>,
    error: Option<ProjectionError>,
}

impl ProjectionBuilder {
    pub fn new(schema: &RecordSchema) -> Self {
        ProjectionBuilder {
            schema: Arc::new(schema.clone()),
            fields: Vec::new(),
            error: None,
        }
    }

    /// Raw column under its own name
    pub fn column(self, name: &str) -> Self {
        self.column_as(name, name)
    }

    /// Raw column under an alias
    pub fn column_as(mut self, alias: impl Into<String>, name: &str) -> Self {
        if let Some(expr) = self.resolve(name) {
            self.push(alias.into(), expr);
        }
        self
    }

    /// Array column elements joined with `separator`
    pub fn joined(mut self, alias: impl Into<String>, column: &str, separator: &str) -> Self {
        let alias = alias.into();
        if let Some(expr) = self.resolve_typed(&alias, column, "array", DataType::is_array) {
            self.push(alias, FieldExpr::join(expr, separator));
        }
        self
    }

    /// Uppercase of a text column
    pub fn upper(mut self, alias: impl Into<String>, column: &str) -> Self {
        let alias = alias.into();
        if let Some(expr) = self.resolve_text(&alias, column) {
            self.push(alias, FieldExpr::Upper(Box::new(expr)));
        }
        self
    }

    /// Lowercase of a text column
    pub fn lower(mut self, alias: impl Into<String>, column: &str) -> Self {
        let alias = alias.into();
        if let Some(expr) = self.resolve_text(&alias, column) {
            self.push(alias, FieldExpr::Lower(Box::new(expr)));
        }
        self
    }

    /// Character length of a text column
    pub fn length(mut self, alias: impl Into<String>, column: &str) -> Self {
        let alias = alias.into();
        if let Some(expr) = self.resolve_text(&alias, column) {
            self.push(alias, FieldExpr::Length(Box::new(expr)));
        }
        self
    }

    /// Element count of an array column
    pub fn cardinality(mut self, alias: impl Into<String>, column: &str) -> Self {
        let alias = alias.into();
        if let Some(expr) = self.resolve_typed(&alias, column, "array", DataType::is_array) {
            self.push(alias, FieldExpr::Cardinality(Box::new(expr)));
        }
        self
    }

    /// Client-side transformation of a column. Predicates over this field
    /// are always evaluated after fetch.
    pub fn computed<F>(
        mut self,
        alias: impl Into<String>,
        column: &str,
        output: DataType,
        func: F,
    ) -> Self
    where
        F: Fn(&Value) -> Value + Send + Sync + 'static,
    {
        let alias = alias.into();
        if let Some(expr) = self.resolve(column) {
            let func = ClientFn::new(alias.clone(), output, func);
            self.push(
                alias,
                FieldExpr::Client {
                    input: Box::new(expr),
                    func,
                },
            );
        }
        self
    }

    /// Arbitrary pre-built expression. Every column reference must agree
    /// with the schema on both name and index: storage reads by name, the
    /// client reads by index.
    pub fn expr(mut self, alias: impl Into<String>, expr: FieldExpr) -> Self {
        let bad = expr
            .column_refs()
            .into_iter()
            .find(|col| self.schema.index_of(&col.name) != Some(col.index))
            .map(|col| format!("{}#{}", col.name, col.index));
        match bad {
            Some(column) => self.fail(ProjectionError::UnknownColumn {
                table: self.schema.table().to_string(),
                column,
            }),
            None => self.push(alias.into(), expr),
        }
        self
    }

    pub fn build(self) -> Result<Projection, ProjectionError> {
        if let Some(err) = self.error {
            return Err(err);
        }
        if self.fields.is_empty() {
            return Err(ProjectionError::Empty);
        }

        let mut seen = HashSet::new();
        for field in &self.fields {
            if !seen.insert(field.alias.as_str()) {
                return Err(ProjectionError::DuplicateField(field.alias.clone()));
            }
        }

        let aliases: Arc<[String]> = self.fields.iter().map(|f| f.alias.clone()).collect();
        Ok(Projection {
            schema: self.schema,
            fields: self.fields,
            aliases,
        })
    }

    fn push(&mut self, alias: String, expr: FieldExpr) {
        self.fields.push(ProjectedField { alias, expr });
    }

    fn fail(&mut self, err: ProjectionError) {
        if self.error.is_none() {
            self.error = Some(err);
        }
    }

    fn resolve(&mut self, column: &str) -> Option<FieldExpr> {
        match self.schema.index_of(column) {
            Some(index) => Some(FieldExpr::column(column, index)),
            None => {
                self.fail(ProjectionError::UnknownColumn {
                    table: self.schema.table().to_string(),
                    column: column.to_string(),
                });
                None
            }
        }
    }

    fn resolve_text(&mut self, alias: &str, column: &str) -> Option<FieldExpr> {
        self.resolve_typed(alias, column, "text", |t| *t == DataType::String)
    }

    fn resolve_typed(
        &mut self,
        alias: &str,
        column: &str,
        expected: &'static str,
        accepts: impl Fn(&DataType) -> bool,
    ) -> Option<FieldExpr> {
        let expr = self.resolve(column)?;
        let actual = expr.data_type(&self.schema);
        if accepts(&actual) {
            Some(expr)
        } else {
            self.fail(ProjectionError::TypeMismatch {
                field: alias.to_string(),
                expected,
                actual,
            });
            None
        }
    }
}

/// One evaluated row of a projection, fields in projection order
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProjectedRow {
    aliases: Arc<[String]>,
    values: Vec<Value>,
}

impl ProjectedRow {
    pub fn get(&self, alias: &str) -> Option<&Value> {
        let idx = self.aliases.iter().position(|a| a == alias)?;
        self.values.get(idx)
    }

    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.aliases.iter().map(String::as_str).zip(self.values.iter())
    }
}

impl FieldSource for ProjectedRow {
    fn field(&self, name: &str) -> Option<&Value> {
        self.get(name)
    }
}

// A JSON object whose keys keep projection order.
impl Serialize for ProjectedRow {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (alias, value) in self.iter() {
            map.serialize_entry(alias, value)?;
        }
        map.end()
    }
}
