//! # Query Context
//!
//! Caller-facing surface tying the pieces together.
//!
//! ```text
//! Context::query(projection) -> Query
//!     .filter(predicate)          fuse with AND, plan lazily
//!     .to_query_string()          SQL storage would receive
//!     .to_list()                  storage.query -> project -> plan.apply
//! ```
//!
//! Every query selects all table columns and evaluates its projection on the
//! client. Only the WHERE clause is ever pushed, so a pushed and a deferred
//! plan for the same predicate see exactly the same projected rows.

use crate::config::Config;
use crate::ir::Predicate;
use crate::planner::{EvaluationPlan, Evaluator, PlanError, PlanKind};
use crate::projection::{ProjectedRow, Projection, ProjectionError};
use crate::schema::{Record, RecordSchema, SchemaError};
use crate::storage::{MemoryStorage, Storage, StorageError, StorageQuery};
use crate::value::Tuple;
use std::cell::OnceCell;
use std::fmt;
use thiserror::Error;

/// Errors surfaced to query callers
#[derive(Error, Debug)]
pub enum QueryError {
    /// Storage unreachable or the query was rejected. Fatal for this query.
    #[error("Storage fault: {0}")]
    Storage(#[from] StorageError),

    #[error("Projection error: {0}")]
    Projection(#[from] ProjectionError),

    #[error("Plan error: {0}")]
    Plan(#[from] PlanError),

    /// A matching row could not be decoded as the requested record type
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    /// Projection was built over a schema with different columns
    #[error("Projection over '{projection}' does not match the columns of table '{table}'")]
    TableMismatch { table: String, projection: String },

    /// Two predicates that differ only in array representation behaved
    /// differently
    #[error("Representation inconsistency between `{left}` and `{right}`: {detail}")]
    RepresentationInconsistency {
        left: String,
        right: String,
        detail: String,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for query operations
pub type QueryResult<T> = Result<T, QueryError>;

/// A storage handle bound to one table schema, with a pending insert buffer
pub struct Context<S: Storage> {
    storage: S,
    schema: RecordSchema,
    evaluator: Evaluator,
    separator: String,
    pending: Vec<Tuple>,
}

impl<S: Storage> Context<S> {
    /// Context over `R`'s table with pushdown enabled
    pub fn new<R: Record>(storage: S) -> Self {
        let evaluator = Evaluator::new(storage.capabilities());
        Context {
            storage,
            schema: R::schema(),
            evaluator,
            separator: ", ".to_string(),
            pending: Vec::new(),
        }
    }

    /// Apply table name, pushdown and separator settings
    pub fn configure(mut self, config: &Config) -> Self {
        self.schema = self.schema.with_table(config.storage.table_name.as_str());
        self.evaluator = self
            .evaluator
            .with_pushdown(config.evaluation.enable_pushdown);
        self.separator = config.evaluation.separator.clone();
        self
    }

    pub fn with_pushdown(mut self, enabled: bool) -> Self {
        self.evaluator = self.evaluator.with_pushdown(enabled);
        self
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn schema(&self) -> &RecordSchema {
        &self.schema
    }

    pub fn evaluator(&self) -> &Evaluator {
        &self.evaluator
    }

    /// Drop the table. Returns true if it existed.
    pub fn ensure_deleted(&self) -> QueryResult<bool> {
        Ok(self.storage.ensure_deleted(self.schema.table())?)
    }

    /// Create the table. Returns true if it was created.
    pub fn ensure_created(&self) -> QueryResult<bool> {
        Ok(self.storage.ensure_created(&self.schema)?)
    }

    /// DDL for the table
    pub fn create_script(&self) -> String {
        self.schema.create_table_sql()
    }

    /// Stage a record for the next `save_changes`
    pub fn add<R: Record>(&mut self, record: &R) {
        self.pending.push(record.to_tuple());
    }

    /// Insert staged records in order. Returns the stored rows, keys filled
    /// in. Records after a failed insert stay staged.
    pub fn save_changes(&mut self) -> QueryResult<Vec<Tuple>> {
        let pending = std::mem::take(&mut self.pending);
        let mut saved = Vec::with_capacity(pending.len());
        let mut rows = pending.into_iter();
        while let Some(row) = rows.next() {
            match self.storage.insert(self.schema.table(), row.clone()) {
                Ok(stored) => saved.push(stored),
                Err(e) => {
                    tracing::warn!(table = self.schema.table(), error = %e, "save_failed");
                    self.pending = std::iter::once(row).chain(rows).collect();
                    return Err(e.into());
                }
            }
        }
        tracing::info!(table = self.schema.table(), rows = saved.len(), "changes_saved");
        Ok(saved)
    }

    /// The canonical joined projection over this context's table
    pub fn default_projection(&self) -> QueryResult<Projection> {
        Ok(Projection::build(&self.schema, &self.separator)?)
    }

    /// Start a query returning rows of `projection`
    pub fn query(&self, projection: Projection) -> Query<'_, S> {
        Query {
            context: self,
            projection,
            predicate: None,
            plan: OnceCell::new(),
        }
    }

    /// Check that two predicates, expected to differ only in which array
    /// representation they read, get the same plan kind and select the same
    /// rows.
    pub fn verify_equivalent(
        &self,
        projection: &Projection,
        left: &Predicate,
        right: &Predicate,
    ) -> QueryResult<PlanKind> {
        let lq = self.query(projection.clone()).filter(left.clone());
        let rq = self.query(projection.clone()).filter(right.clone());

        let inconsistency = |detail: String| QueryError::RepresentationInconsistency {
            left: left.to_string(),
            right: right.to_string(),
            detail,
        };

        let lkind = lq.plan_kind()?;
        let rkind = rq.plan_kind()?;
        if lkind != rkind {
            return Err(inconsistency(format!("plan kinds differ: {lkind} vs {rkind}")));
        }

        let lrows: Vec<Tuple> = lq.matching_rows()?.into_iter().map(|(t, _)| t).collect();
        let rrows: Vec<Tuple> = rq.matching_rows()?.into_iter().map(|(t, _)| t).collect();
        if lrows != rrows {
            return Err(inconsistency(format!(
                "row sets differ: {} vs {} rows",
                lrows.len(),
                rrows.len()
            )));
        }
        Ok(lkind)
    }
}

impl Context<MemoryStorage> {
    /// In-memory context for `R` built from configuration
    pub fn from_config<R: Record>(config: &Config) -> Self {
        let storage = MemoryStorage::new().with_max_rows(config.storage.max_rows);
        Context::new::<R>(storage).configure(config)
    }
}

/// A projection with an optional filter, planned on first use
pub struct Query<'c, S: Storage> {
    context: &'c Context<S>,
    projection: Projection,
    predicate: Option<Predicate>,
    plan: OnceCell<EvaluationPlan>,
}

impl<S: Storage> Clone for Query<'_, S> {
    fn clone(&self) -> Self {
        Query {
            context: self.context,
            projection: self.projection.clone(),
            predicate: self.predicate.clone(),
            plan: self.plan.clone(),
        }
    }
}

impl<S: Storage> fmt::Debug for Query<'_, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("projection", &self.projection)
            .field("predicate", &self.predicate)
            .field("plan", &self.plan.get())
            .finish()
    }
}

impl<'c, S: Storage> Query<'c, S> {
    /// Add a predicate. Repeated filters combine with AND.
    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicate = Some(match self.predicate.take() {
            Some(existing) => existing.and(predicate),
            None => predicate,
        });
        self.plan = OnceCell::new();
        self
    }

    pub fn projection(&self) -> &Projection {
        &self.projection
    }

    pub fn predicate(&self) -> Option<&Predicate> {
        self.predicate.as_ref()
    }

    /// Plan for the current predicate, compiled once. `None` when unfiltered.
    pub fn plan(&self) -> QueryResult<Option<&EvaluationPlan>> {
        let Some(predicate) = &self.predicate else {
            return Ok(None);
        };
        if let Some(plan) = self.plan.get() {
            return Ok(Some(plan));
        }
        let compiled = self
            .context
            .evaluator
            .compile(predicate, &self.projection)?;
        Ok(Some(self.plan.get_or_init(|| compiled)))
    }

    /// Plan kind. An unfiltered query counts as pushed.
    pub fn plan_kind(&self) -> QueryResult<PlanKind> {
        Ok(self.plan()?.map_or(PlanKind::Pushed, EvaluationPlan::kind))
    }

    /// The read sent to storage
    pub fn storage_query(&self) -> QueryResult<StorageQuery> {
        let table = self.context.schema.table();
        if self.projection.schema().columns() != self.context.schema.columns() {
            return Err(QueryError::TableMismatch {
                table: table.to_string(),
                projection: self.projection.schema().table().to_string(),
            });
        }
        let columns = self
            .context
            .schema
            .columns()
            .iter()
            .map(|c| c.name.clone())
            .collect();
        let query = StorageQuery::scan(table, columns);
        Ok(match self.plan()?.and_then(EvaluationPlan::fragment) {
            Some(fragment) => query.with_filter(fragment.clone()),
            None => query,
        })
    }

    /// SQL text of the storage read. A deferred filter is appended as a
    /// comment since storage never sees it.
    pub fn to_query_string(&self) -> QueryResult<String> {
        let mut sql = self.storage_query()?.to_string();
        if let Some(EvaluationPlan::Deferred { predicate, reason }) = self.plan()? {
            sql.push_str(&format!("\n-- client filter: {predicate} ({reason})"));
        }
        Ok(sql)
    }

    /// Run the query. Rows come back in insertion order.
    pub fn to_list(&self) -> QueryResult<Vec<ProjectedRow>> {
        Ok(self
            .matching_rows()?
            .iter()
            .map(|(_, row)| row.clone())
            .collect())
    }

    /// Run the query and decode the matching stored rows as records
    pub fn to_records<R: Record>(&self) -> QueryResult<Vec<R>> {
        self.matching_rows()?
            .iter()
            .map(|(row, _)| Ok(R::from_tuple(row)?))
            .collect()
    }

    /// Run the query and serialise the rows as a JSON array
    pub fn to_json(&self) -> QueryResult<String> {
        Ok(serde_json::to_string_pretty(&self.to_list()?)?)
    }

    /// Stored rows that satisfy the filter, paired with their projection
    fn matching_rows(&self) -> QueryResult<Vec<(Tuple, ProjectedRow)>> {
        let query = self.storage_query()?;
        let stored = self.context.storage.query(&query).map_err(|e| {
            tracing::warn!(table = %query.table, error = %e, "storage_fault");
            QueryError::Storage(e)
        })?;

        let rows = stored
            .into_iter()
            .map(|t| {
                let projected = self.projection.evaluate(&t);
                (t, projected)
            })
            .collect::<Vec<_>>();

        let rows = match self.plan()? {
            Some(EvaluationPlan::Deferred { predicate, .. }) => rows
                .into_iter()
                .filter(|(_, row)| predicate.matches(row))
                .collect(),
            _ => rows,
        };

        let kind = self.plan_kind()?;
        tracing::info!(
            table = %query.table,
            %kind,
            rows = rows.len(),
            "query_executed"
        );
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Blog;

    fn foo_blog() -> Blog {
        Blog {
            id: 0,
            name: "FooBlog".to_string(),
            tags_list: vec!["tag 1".to_string(), "tag 2".to_string()],
            tags_array: vec!["tag 3".to_string(), "tag 4".to_string()],
            ratings_list: vec![1, 2],
            ratings_array: vec![3, 4],
        }
    }

    fn seeded() -> Context<MemoryStorage> {
        let mut ctx = Context::new::<Blog>(MemoryStorage::new());
        ctx.ensure_deleted().unwrap();
        ctx.ensure_created().unwrap();
        ctx.add(&foo_blog());
        ctx.save_changes().unwrap();
        ctx
    }

    #[test]
    fn test_save_changes_assigns_serial_keys() {
        let mut ctx = Context::new::<Blog>(MemoryStorage::new());
        ctx.ensure_created().unwrap();
        ctx.add(&foo_blog());
        ctx.add(&foo_blog());
        let saved = ctx.save_changes().unwrap();
        let keys: Vec<_> = saved.iter().map(|t| t.get(0).cloned()).collect();
        assert_eq!(
            keys,
            vec![
                Some(crate::value::Value::Int32(1)),
                Some(crate::value::Value::Int32(2))
            ]
        );
    }

    #[test]
    fn test_joined_projection_values() {
        let ctx = seeded();
        let rows = ctx.query(ctx.default_projection().unwrap()).to_list().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(
            rows[0].get("TagsListJoined").and_then(|v| v.as_str()),
            Some("tag 1, tag 2")
        );
        assert_eq!(
            rows[0].get("TagsArrayJoined").and_then(|v| v.as_str()),
            Some("tag 3, tag 4")
        );
        assert_eq!(
            rows[0].get("RatingsArrayJoined").and_then(|v| v.as_str()),
            Some("3, 4")
        );
    }

    #[test]
    fn test_filter_on_both_representations() {
        let ctx = seeded();
        let projection = ctx.default_projection().unwrap();
        for field in ["TagsListJoined", "TagsArrayJoined"] {
            let query = ctx
                .query(projection.clone())
                .filter(Predicate::contains(field, "tag"));
            assert_eq!(query.plan_kind().unwrap(), PlanKind::Pushed);
            assert_eq!(query.to_list().unwrap().len(), 1);
        }
        let kind = ctx
            .verify_equivalent(
                &projection,
                &Predicate::contains("TagsListJoined", "tag"),
                &Predicate::contains("TagsArrayJoined", "tag"),
            )
            .unwrap();
        assert_eq!(kind, PlanKind::Pushed);
    }

    #[test]
    fn test_query_string_has_where_clause() {
        let ctx = seeded();
        let sql = ctx
            .query(ctx.default_projection().unwrap())
            .filter(Predicate::contains("TagsListJoined", "tag"))
            .to_query_string()
            .unwrap();
        assert!(sql.ends_with(
            "WHERE strpos(array_to_string(b.\"TagsList\", ', '), 'tag') > 0"
        ));
    }

    #[test]
    fn test_storage_fault_propagates() {
        let ctx = seeded();
        ctx.storage().set_available(false);
        let err = ctx
            .query(ctx.default_projection().unwrap())
            .to_list()
            .unwrap_err();
        assert!(matches!(
            err,
            QueryError::Storage(StorageError::Unavailable(_))
        ));
    }

    #[test]
    fn test_failed_save_keeps_pending() {
        let mut ctx = Context::new::<Blog>(MemoryStorage::new().with_max_rows(1));
        ctx.ensure_created().unwrap();
        ctx.add(&foo_blog());
        ctx.add(&foo_blog());
        assert!(ctx.save_changes().is_err());
        assert_eq!(ctx.storage().row_count("Blogs"), Some(1));
        assert_eq!(ctx.pending.len(), 1);
    }
}
