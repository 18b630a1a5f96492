//! # shapeql: Query Shape Translator
//!
//! Maps a typed projection and filter over records with array-valued
//! columns into a storage query plus an equivalent in-memory evaluation,
//! and keeps the two in agreement.
//!
//! ## Pipeline Architecture
//!
//! ```text
//! Record (Blog)
//!     ↓
//! [Schema]              → RecordSchema (array repr kept as a column annotation)
//!     ↓
//! [Projection Builder]  → Projection (columns + joined-text fields)
//!     ↓
//! [Predicate Evaluator] → EvaluationPlan::Pushed | EvaluationPlan::Deferred
//!     ↓
//! [Storage]             → StorageQuery, rows in insertion order
//!     ↓
//! ProjectedRow list / JSON
//! ```
//!
//! Array columns may be declared as resizable sequences or as fixed-size
//! arrays. Both map to the same value type and the same storage type, so a
//! predicate's plan and its result never depend on the declaration.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use shapeql::{Blog, Context, MemoryStorage, Predicate};
//!
//! let mut ctx = Context::new::<Blog>(MemoryStorage::new());
//! ctx.ensure_deleted()?;
//! ctx.ensure_created()?;
//! ctx.add(&blog);
//! ctx.save_changes()?;
//!
//! let rows = ctx
//!     .query(ctx.default_projection()?)
//!     .filter(Predicate::contains("TagsListJoined", "tag"))
//!     .to_list()?;
//! ```

pub mod config;
pub mod ir;
pub mod planner;
pub mod projection;
pub mod query;
pub mod schema;
pub mod storage;
pub mod value;

pub use config::Config;
pub use ir::{ClientFn, ColumnRef, CompareOp, FieldExpr, FieldSource, Predicate};
pub use planner::{
    EvaluationPlan, Evaluator, PlanError, PlanKind, PlanState, TranslationError, Translator,
};
pub use projection::{ProjectedField, ProjectedRow, Projection, ProjectionBuilder, ProjectionError};
pub use query::{Context, Query, QueryError, QueryResult};
pub use schema::{
    ArrayRepr, Blog, ColumnSchema, ColumnType, ElementType, Record, RecordSchema, SchemaError,
};
pub use storage::{
    Capabilities, MemoryStorage, SqlExpr, SqlFunction, Storage, StorageError, StorageQuery,
    StorageResult, DEFAULT_MAX_LIKE_PATTERN,
};
pub use value::{DataType, Tuple, Value};
