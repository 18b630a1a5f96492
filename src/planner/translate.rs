//! Predicate translation into storage fragments.
//!
//! Translation is all-or-nothing and type-checked up front: a fragment is
//! only produced when every operation in it is supported by the storage
//! engine and well typed for its inputs. Anything else is a
//! [`TranslationError`], which the evaluator turns into a deferred plan.
//!
//! Column references are where array representation is erased. Both a
//! sequence-declared and a fixed-declared array column become the same
//! `SqlExpr::Column` with the same storage type, so the rest of translation
//! cannot tell them apart.

use crate::ir::{CompareOp, FieldExpr, Predicate};
use crate::projection::Projection;
use crate::storage::{escape_like, Capabilities, SqlExpr, SqlFunction};
use crate::value::{DataType, Value};

/// Why a predicate could not be pushed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TranslationError {
    #[error("field '{0}' is computed on the client")]
    ClientOnly(String),

    #[error("storage does not support {0}")]
    MissingCapability(&'static str),

    #[error("{op} is not defined for {ty}")]
    TypeMismatch { op: &'static str, ty: DataType },

    #[error("cannot compare {field} with {value}")]
    IncomparableConstant { field: DataType, value: DataType },

    #[error("unknown field '{0}'")]
    UnknownField(String),

    #[error("pushdown disabled")]
    PushdownDisabled,

    #[error("LIKE pattern of {len} characters exceeds the storage limit of {max}")]
    PatternTooLong { len: usize, max: usize },
}

/// Translates predicates over one projection
pub struct Translator<'a> {
    projection: &'a Projection,
    capabilities: Capabilities,
}

impl<'a> Translator<'a> {
    pub fn new(projection: &'a Projection, capabilities: Capabilities) -> Self {
        Translator {
            projection,
            capabilities,
        }
    }

    /// Translate a whole predicate, or fail without producing anything
    pub fn translate(&self, predicate: &Predicate) -> Result<SqlExpr, TranslationError> {
        match predicate {
            Predicate::Contains { field, needle } => {
                let (expr, ty) = self.field(field)?;
                Self::expect_text("contains", ty)?;
                self.require(SqlFunction::Strpos)?;
                Ok(SqlExpr::compare(
                    CompareOp::Gt,
                    SqlExpr::call(SqlFunction::Strpos, vec![expr, SqlExpr::literal(needle.as_str())]),
                    SqlExpr::literal(0),
                ))
            }
            Predicate::StartsWith { field, prefix } => {
                self.like(field, "starts_with", format!("{}%", escape_like(prefix)))
            }
            Predicate::EndsWith { field, suffix } => {
                self.like(field, "ends_with", format!("%{}", escape_like(suffix)))
            }
            Predicate::Compare { field, op, value } => {
                let (expr, ty) = self.field(field)?;
                Self::check_comparable(ty, *op, value)?;
                Ok(SqlExpr::compare(*op, expr, SqlExpr::Literal(value.clone())))
            }
            Predicate::ArrayContains { field, element } => {
                let (expr, ty) = self.field(field)?;
                let element_type = ty.element_type().ok_or(TranslationError::TypeMismatch {
                    op: "array_contains",
                    ty,
                })?;
                if !element.is_null() && !Self::same_family(element_type, element.data_type()) {
                    return Err(TranslationError::IncomparableConstant {
                        field: element_type,
                        value: element.data_type(),
                    });
                }
                if !self.capabilities.array_any {
                    return Err(TranslationError::MissingCapability("= ANY"));
                }
                Ok(SqlExpr::AnyEq {
                    element: Box::new(SqlExpr::Literal(element.clone())),
                    array: Box::new(expr),
                })
            }
            Predicate::And(l, r) => Ok(SqlExpr::And(
                Box::new(self.translate(l)?),
                Box::new(self.translate(r)?),
            )),
            Predicate::Or(l, r) => Ok(SqlExpr::Or(
                Box::new(self.translate(l)?),
                Box::new(self.translate(r)?),
            )),
            Predicate::Not(inner) => Ok(SqlExpr::Not(Box::new(self.translate(inner)?))),
            Predicate::True => Ok(SqlExpr::literal(true)),
            Predicate::False => Ok(SqlExpr::literal(false)),
        }
    }

    /// Translate the expression behind a projected field, with its type
    fn field(&self, alias: &str) -> Result<(SqlExpr, DataType), TranslationError> {
        let field = self
            .projection
            .field(alias)
            .ok_or_else(|| TranslationError::UnknownField(alias.to_string()))?;
        let expr = self.expr(&field.expr)?;
        Ok((expr, field.expr.data_type(self.projection.schema())))
    }

    fn expr(&self, expr: &FieldExpr) -> Result<SqlExpr, TranslationError> {
        let schema = self.projection.schema();
        match expr {
            FieldExpr::Column(col) => Ok(SqlExpr::column(col.name.as_str())),
            FieldExpr::Join { input, separator } => {
                let ty = input.data_type(schema);
                if !ty.is_array() {
                    return Err(TranslationError::TypeMismatch { op: "join", ty });
                }
                self.require(SqlFunction::ArrayToString)?;
                Ok(SqlExpr::call(
                    SqlFunction::ArrayToString,
                    vec![self.expr(input)?, SqlExpr::literal(separator.as_str())],
                ))
            }
            FieldExpr::Upper(input) => self.text_fn(SqlFunction::Upper, input),
            FieldExpr::Lower(input) => self.text_fn(SqlFunction::Lower, input),
            FieldExpr::Length(input) => self.text_fn(SqlFunction::Length, input),
            FieldExpr::Cardinality(input) => {
                let ty = input.data_type(schema);
                if !ty.is_array() {
                    return Err(TranslationError::TypeMismatch {
                        op: "cardinality",
                        ty,
                    });
                }
                self.require(SqlFunction::Cardinality)?;
                Ok(SqlExpr::call(SqlFunction::Cardinality, vec![self.expr(input)?]))
            }
            FieldExpr::Client { func, .. } => {
                Err(TranslationError::ClientOnly(func.name().to_string()))
            }
        }
    }

    fn text_fn(&self, func: SqlFunction, input: &FieldExpr) -> Result<SqlExpr, TranslationError> {
        Self::expect_text(func.name(), input.data_type(self.projection.schema()))?;
        self.require(func)?;
        Ok(SqlExpr::call(func, vec![self.expr(input)?]))
    }

    fn like(
        &self,
        field: &str,
        op: &'static str,
        pattern: String,
    ) -> Result<SqlExpr, TranslationError> {
        let (expr, ty) = self.field(field)?;
        Self::expect_text(op, ty)?;
        if !self.capabilities.like {
            return Err(TranslationError::MissingCapability("LIKE"));
        }
        let len = pattern.chars().count();
        if len > self.capabilities.max_like_pattern {
            return Err(TranslationError::PatternTooLong {
                len,
                max: self.capabilities.max_like_pattern,
            });
        }
        Ok(SqlExpr::Like {
            expr: Box::new(expr),
            pattern,
        })
    }

    fn require(&self, func: SqlFunction) -> Result<(), TranslationError> {
        if self.capabilities.supports(func) {
            Ok(())
        } else {
            Err(TranslationError::MissingCapability(func.name()))
        }
    }

    fn expect_text(op: &'static str, ty: DataType) -> Result<(), TranslationError> {
        if ty == DataType::String {
            Ok(())
        } else {
            Err(TranslationError::TypeMismatch { op, ty })
        }
    }

    fn same_family(a: DataType, b: DataType) -> bool {
        let int = |t: DataType| matches!(t, DataType::Int32 | DataType::Int64);
        a == b || (int(a) && int(b))
    }

    fn check_comparable(
        field: DataType,
        op: CompareOp,
        value: &Value,
    ) -> Result<(), TranslationError> {
        if field.is_array() && !op.is_equality() {
            return Err(TranslationError::TypeMismatch {
                op: op.symbol(),
                ty: field,
            });
        }
        if value.is_null() || Self::same_family(field, value.data_type()) {
            Ok(())
        } else {
            Err(TranslationError::IncomparableConstant {
                field,
                value: value.data_type(),
            })
        }
    }
}
