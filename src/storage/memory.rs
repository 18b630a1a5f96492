//! In-memory storage engine
//!
//! Interprets [`SqlExpr`] fragments directly over stored rows, with SQL NULL
//! semantics and PostgreSQL-style type errors. A fragment that applies a
//! function to the wrong type is rejected at execution time with
//! [`StorageError::QueryRejected`], the same way a real database refuses
//! an ill-typed query.

use super::sql::{SqlExpr, SqlFunction, StorageQuery};
use super::{Capabilities, Storage, StorageError, StorageResult};
use crate::schema::RecordSchema;
use crate::value::{compare, Tuple, Value};
use parking_lot::RwLock;
use regex::{Regex, RegexBuilder};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug)]
struct Table {
    schema: RecordSchema,
    rows: Vec<Tuple>,
    /// Next serial key; may sit one past `i32::MAX` once the sequence is spent
    next_key: i64,
}

/// Thread-safe in-memory tables
#[derive(Debug)]
pub struct MemoryStorage {
    tables: RwLock<HashMap<String, Table>>,
    capabilities: Capabilities,
    available: AtomicBool,
    /// 0 = unlimited
    max_rows: usize,
}

impl MemoryStorage {
    /// Engine with every native operation available
    pub fn new() -> Self {
        MemoryStorage {
            tables: RwLock::new(HashMap::new()),
            capabilities: Capabilities::full(),
            available: AtomicBool::new(true),
            max_rows: 0,
        }
    }

    /// Restrict the native operations this engine accepts
    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Cap the number of rows per table (0 = unlimited)
    pub fn with_max_rows(mut self, max_rows: usize) -> Self {
        self.max_rows = max_rows;
        self
    }

    /// Simulate the engine going away or coming back
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of rows stored in a table
    pub fn row_count(&self, table: &str) -> Option<usize> {
        self.tables.read().get(table).map(|t| t.rows.len())
    }

    fn check_available(&self) -> StorageResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            tracing::warn!("memory storage is offline");
            Err(StorageError::Unavailable(
                "memory storage is offline".to_string(),
            ))
        }
    }

    fn check_functions(&self, expr: &SqlExpr) -> StorageResult<()> {
        let unsupported = |what: &str| {
            Err(StorageError::QueryRejected(format!(
                "{what} is not supported by this engine"
            )))
        };
        match expr {
            SqlExpr::Column(_) | SqlExpr::Literal(_) => Ok(()),
            SqlExpr::Call { func, args } => {
                if !self.capabilities.supports(*func) {
                    return unsupported(func.name());
                }
                args.iter().try_for_each(|a| self.check_functions(a))
            }
            SqlExpr::Compare { left, right, .. } => {
                self.check_functions(left)?;
                self.check_functions(right)
            }
            SqlExpr::Like { expr, .. } => {
                if !self.capabilities.like {
                    return unsupported("LIKE");
                }
                self.check_functions(expr)
            }
            SqlExpr::AnyEq { element, array } => {
                if !self.capabilities.array_any {
                    return unsupported("= ANY");
                }
                self.check_functions(element)?;
                self.check_functions(array)
            }
            SqlExpr::And(l, r) | SqlExpr::Or(l, r) => {
                self.check_functions(l)?;
                self.check_functions(r)
            }
            SqlExpr::Not(inner) => self.check_functions(inner),
        }
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl Storage for MemoryStorage {
    fn ensure_deleted(&self, table: &str) -> StorageResult<bool> {
        self.check_available()?;
        let dropped = self.tables.write().remove(table).is_some();
        tracing::debug!(table, dropped, "ensure_deleted");
        Ok(dropped)
    }

    fn ensure_created(&self, schema: &RecordSchema) -> StorageResult<bool> {
        self.check_available()?;
        let mut tables = self.tables.write();
        if tables.contains_key(schema.table()) {
            return Ok(false);
        }
        tables.insert(
            schema.table().to_string(),
            Table {
                schema: schema.clone(),
                rows: Vec::new(),
                next_key: 1,
            },
        );
        tracing::debug!(table = schema.table(), "table_created");
        Ok(true)
    }

    fn insert(&self, table: &str, mut row: Tuple) -> StorageResult<Tuple> {
        self.check_available()?;
        let mut tables = self.tables.write();
        let entry = tables
            .get_mut(table)
            .ok_or_else(|| StorageError::TableNotFound(table.to_string()))?;

        entry.schema.validate(&row)?;

        if self.max_rows > 0 && entry.rows.len() >= self.max_rows {
            return Err(StorageError::RowLimitExceeded {
                table: table.to_string(),
                limit: self.max_rows,
            });
        }

        if let Some(key_idx) = entry.schema.key_index() {
            let explicit = match row.get(key_idx) {
                Some(Value::Int32(key)) if *key != 0 => Some(*key),
                _ => None,
            };
            match explicit {
                Some(key) => {
                    let taken = entry
                        .rows
                        .iter()
                        .any(|r| r.get(key_idx) == Some(&Value::Int32(key)));
                    if taken {
                        return Err(StorageError::DuplicateKey {
                            table: table.to_string(),
                            key,
                        });
                    }
                    entry.next_key = entry.next_key.max(i64::from(key) + 1);
                }
                None => {
                    let key = i32::try_from(entry.next_key).map_err(|_| {
                        StorageError::KeySequenceExhausted(table.to_string())
                    })?;
                    row.set(key_idx, Value::Int32(key));
                    entry.next_key += 1;
                }
            }
        }

        entry.rows.push(row.clone());
        tracing::debug!(table, rows = entry.rows.len(), "row_inserted");
        Ok(row)
    }

    fn query(&self, query: &StorageQuery) -> StorageResult<Vec<Tuple>> {
        self.check_available()?;
        let tables = self.tables.read();
        let table = tables
            .get(&query.table)
            .ok_or_else(|| StorageError::TableNotFound(query.table.clone()))?;

        let resolve = |column: &str| {
            table
                .schema
                .index_of(column)
                .ok_or_else(|| StorageError::ColumnNotFound {
                    table: query.table.clone(),
                    column: column.to_string(),
                })
        };

        let selected = query
            .columns
            .iter()
            .map(|c| resolve(c.as_str()))
            .collect::<StorageResult<Vec<usize>>>()?;

        let mut ctx = EvalContext {
            schema: &table.schema,
            table: &query.table,
            patterns: HashMap::new(),
        };
        if let Some(filter) = &query.filter {
            self.check_functions(filter)?;
            for column in filter.columns() {
                resolve(column)?;
            }
            for pattern in filter.like_patterns() {
                let len = pattern.chars().count();
                if len > self.capabilities.max_like_pattern {
                    return Err(StorageError::QueryRejected(format!(
                        "LIKE pattern of {len} characters exceeds limit of {}",
                        self.capabilities.max_like_pattern
                    )));
                }
                ctx.patterns
                    .insert(pattern.to_string(), like_to_regex(pattern)?);
            }
        }

        let mut out = Vec::new();
        for row in &table.rows {
            if let Some(filter) = &query.filter {
                match ctx.eval(filter, row)? {
                    Value::Bool(true) => {}
                    Value::Bool(false) | Value::Null => continue,
                    other => {
                        return Err(StorageError::QueryRejected(format!(
                            "argument of WHERE must be type boolean, not {}",
                            other.data_type()
                        )))
                    }
                }
            }
            out.push(Tuple::new(
                selected
                    .iter()
                    .map(|&i| row.get(i).cloned().unwrap_or(Value::Null))
                    .collect(),
            ));
        }

        tracing::debug!(
            table = %query.table,
            pushed = query.filter.is_some(),
            rows = out.len(),
            "storage_query"
        );
        Ok(out)
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }
}

/// Compiled program bound for one LIKE pattern. Any pattern within
/// [`DEFAULT_MAX_LIKE_PATTERN`](super::DEFAULT_MAX_LIKE_PATTERN) characters
/// fits well inside it.
const LIKE_REGEX_SIZE_LIMIT: usize = 1 << 24;

/// Translate a LIKE pattern (escape `\`) into an anchored regex
fn like_to_regex(pattern: &str) -> StorageResult<Regex> {
    let mut re = String::from("(?s)^");
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some(escaped) => re.push_str(&regex::escape(escaped.encode_utf8(&mut [0; 4]))),
                None => {
                    return Err(StorageError::QueryRejected(
                        "LIKE pattern must not end with escape character".to_string(),
                    ))
                }
            },
            '%' => re.push_str(".*"),
            '_' => re.push('.'),
            other => re.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
        }
    }
    re.push('$');
    RegexBuilder::new(&re)
        .size_limit(LIKE_REGEX_SIZE_LIMIT)
        .build()
        .map_err(|e| StorageError::QueryRejected(e.to_string()))
}

struct EvalContext<'a> {
    schema: &'a RecordSchema,
    table: &'a str,
    patterns: HashMap<String, Regex>,
}

impl EvalContext<'_> {
    fn eval(&self, expr: &SqlExpr, row: &Tuple) -> StorageResult<Value> {
        match expr {
            SqlExpr::Column(name) => {
                let idx = self
                    .schema
                    .index_of(name)
                    .ok_or_else(|| StorageError::ColumnNotFound {
                        table: self.table.to_string(),
                        column: name.clone(),
                    })?;
                Ok(row.get(idx).cloned().unwrap_or(Value::Null))
            }
            SqlExpr::Literal(value) => Ok(value.clone()),
            SqlExpr::Call { func, args } => {
                let args = args
                    .iter()
                    .map(|a| self.eval(a, row))
                    .collect::<StorageResult<Vec<_>>>()?;
                call(*func, &args)
            }
            SqlExpr::Compare { op, left, right } => {
                let left = self.eval(left, row)?;
                let right = self.eval(right, row)?;
                if left.is_null() || right.is_null() {
                    return Ok(Value::Null);
                }
                match compare(&left, &right) {
                    Some(ordering) => Ok(Value::Bool(op.holds(ordering))),
                    None => Err(StorageError::QueryRejected(format!(
                        "operator does not exist: {} {} {}",
                        left.data_type(),
                        op.symbol(),
                        right.data_type()
                    ))),
                }
            }
            SqlExpr::Like { expr, pattern } => match self.eval(expr, row)? {
                Value::Null => Ok(Value::Null),
                Value::String(s) => {
                    let re = self.patterns.get(pattern).ok_or_else(|| {
                        StorageError::QueryRejected(format!("pattern not prepared: {pattern}"))
                    })?;
                    Ok(Value::Bool(re.is_match(&s)))
                }
                other => Err(StorageError::QueryRejected(format!(
                    "operator does not exist: {} LIKE text",
                    other.data_type()
                ))),
            },
            SqlExpr::AnyEq { element, array } => {
                let element = self.eval(element, row)?;
                let array = self.eval(array, row)?;
                if element.is_null() || array.is_null() {
                    return Ok(Value::Null);
                }
                array
                    .array_contains(&element)
                    .map(Value::Bool)
                    .ok_or_else(|| {
                        StorageError::QueryRejected(format!(
                            "operator does not exist: {} = ANY ({})",
                            element.data_type(),
                            array.data_type()
                        ))
                    })
            }
            SqlExpr::And(l, r) => {
                let l = truth(self.eval(l, row)?)?;
                let r = truth(self.eval(r, row)?)?;
                Ok(match (l, r) {
                    (Some(false), _) | (_, Some(false)) => Value::Bool(false),
                    (Some(true), Some(true)) => Value::Bool(true),
                    _ => Value::Null,
                })
            }
            SqlExpr::Or(l, r) => {
                let l = truth(self.eval(l, row)?)?;
                let r = truth(self.eval(r, row)?)?;
                Ok(match (l, r) {
                    (Some(true), _) | (_, Some(true)) => Value::Bool(true),
                    (Some(false), Some(false)) => Value::Bool(false),
                    _ => Value::Null,
                })
            }
            SqlExpr::Not(inner) => {
                Ok(truth(self.eval(inner, row)?)?.map_or(Value::Null, |b| Value::Bool(!b)))
            }
        }
    }
}

fn truth(value: Value) -> StorageResult<Option<bool>> {
    match value {
        Value::Bool(b) => Ok(Some(b)),
        Value::Null => Ok(None),
        other => Err(StorageError::QueryRejected(format!(
            "argument of boolean operator must be type boolean, not {}",
            other.data_type()
        ))),
    }
}

fn no_such_function(func: SqlFunction, args: &[Value]) -> StorageError {
    let types: Vec<String> = args.iter().map(|a| a.data_type().to_string()).collect();
    StorageError::QueryRejected(format!(
        "function {}({}) does not exist",
        func.name(),
        types.join(", ")
    ))
}

fn call(func: SqlFunction, args: &[Value]) -> StorageResult<Value> {
    if args.iter().any(Value::is_null) {
        return Ok(Value::Null);
    }
    match (func, args) {
        (SqlFunction::ArrayToString, [array, Value::String(sep)]) => array
            .join(sep)
            .map(Value::from)
            .ok_or_else(|| no_such_function(func, args)),
        (SqlFunction::Strpos, [Value::String(haystack), Value::String(needle)]) => {
            let pos = haystack
                .find(&**needle)
                .map_or(0, |byte| haystack[..byte].chars().count() + 1);
            Ok(Value::Int64(pos as i64))
        }
        (SqlFunction::Upper, [Value::String(s)]) => Ok(Value::from(s.to_uppercase())),
        (SqlFunction::Lower, [Value::String(s)]) => Ok(Value::from(s.to_lowercase())),
        (SqlFunction::Length, [Value::String(s)]) => Ok(Value::Int64(s.chars().count() as i64)),
        (SqlFunction::Cardinality, [array]) => array
            .array_len()
            .map(|n| Value::Int64(n as i64))
            .ok_or_else(|| no_such_function(func, args)),
        _ => Err(no_such_function(func, args)),
    }
}
