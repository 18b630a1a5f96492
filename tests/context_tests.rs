//! End-to-end tests through the query context: the blog scenario, SQL text,
//! JSON output, and fault propagation.

use shapeql::{
    Blog, ColumnType, Config, Context, DataType, MemoryStorage, PlanKind, Predicate,
    ProjectionBuilder, QueryError, Record, RecordSchema, SchemaError, StorageError,
    TranslationError, Tuple, Value, DEFAULT_MAX_LIKE_PATTERN,
};

/// A record over a narrower table than `Blog`
#[derive(Debug, PartialEq)]
struct Headline {
    name: String,
}

impl Record for Headline {
    fn schema() -> RecordSchema {
        RecordSchema::new("Headlines")
            .key("Id")
            .column("Name", ColumnType::Text)
    }

    fn to_tuple(&self) -> Tuple {
        Tuple::new(vec![Value::Null, Value::from(self.name.clone())])
    }

    fn from_tuple(row: &Tuple) -> Result<Self, SchemaError> {
        Self::schema().validate(row)?;
        Ok(Headline {
            name: row.get(1).and_then(Value::as_str).unwrap_or_default().to_string(),
        })
    }
}

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

fn scenario(config: &Config) -> Context<MemoryStorage> {
    let mut ctx = Context::from_config::<Blog>(config);
    ctx.ensure_deleted().unwrap();
    ctx.ensure_created().unwrap();
    ctx.add(&foo_blog());
    ctx.save_changes().unwrap();
    ctx
}

// Schema

#[test]
fn test_create_script() {
    let ctx = Context::new::<Blog>(MemoryStorage::new());
    assert_eq!(
        ctx.create_script(),
        "CREATE TABLE \"Blogs\" (\n    \"Id\" integer GENERATED BY DEFAULT AS IDENTITY,\n    \"Name\" text NOT NULL,\n    \"TagsList\" text[] NOT NULL,\n    \"TagsArray\" text[] NOT NULL,\n    \"RatingsList\" integer[] NOT NULL,\n    \"RatingsArray\" integer[] NOT NULL,\n    CONSTRAINT \"PK_Blogs\" PRIMARY KEY (\"Id\")\n);"
    );
}

#[test]
fn test_ensure_created_is_idempotent() {
    let ctx = Context::new::<Blog>(MemoryStorage::new());
    assert!(!ctx.ensure_deleted().unwrap());
    assert!(ctx.ensure_created().unwrap());
    assert!(!ctx.ensure_created().unwrap());
    assert!(ctx.ensure_deleted().unwrap());
}

// Scenario

#[test]
fn test_unfiltered_query_string() {
    let ctx = scenario(&Config::default());
    let sql = ctx
        .query(ctx.default_projection().unwrap())
        .to_query_string()
        .unwrap();
    assert_eq!(
        sql,
        "SELECT b.\"Id\", b.\"Name\", b.\"TagsList\", b.\"TagsArray\", b.\"RatingsList\", b.\"RatingsArray\"\nFROM \"Blogs\" AS b"
    );
}

#[test]
fn test_filter_through_both_representations_returns_record() {
    let ctx = scenario(&Config::default());
    let projection = ctx.default_projection().unwrap();
    for field in ["TagsArrayJoined", "TagsListJoined"] {
        let rows = ctx
            .query(projection.clone())
            .filter(Predicate::contains(field, "tag"))
            .to_list()
            .unwrap();
        assert_eq!(rows.len(), 1, "{field}");
        assert_eq!(rows[0].get("Name"), Some(&Value::from("FooBlog")));
    }
}

#[test]
fn test_json_output() {
    let ctx = scenario(&Config::default());
    let json = ctx
        .query(ctx.default_projection().unwrap())
        .filter(Predicate::contains("TagsListJoined", "tag 2"))
        .to_json()
        .unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed[0]["TagsListJoined"], "tag 1, tag 2");
    assert_eq!(parsed[0]["TagsArrayJoined"], "tag 3, tag 4");
    assert_eq!(parsed[0]["RatingsListJoined"], "1, 2");
    assert_eq!(parsed[0]["RatingsArrayJoined"], "3, 4");
    assert_eq!(parsed[0]["RatingsArray"], serde_json::json!([3, 4]));
}

#[test]
fn test_repeated_filters_combine() {
    let ctx = scenario(&Config::default());
    let query = ctx
        .query(ctx.default_projection().unwrap())
        .filter(Predicate::contains("TagsListJoined", "tag"))
        .filter(Predicate::array_contains("RatingsArray", 5));
    assert!(query.to_list().unwrap().is_empty());
    assert!(query.to_query_string().unwrap().contains(" AND "));
}

#[test]
fn test_deferred_query_string_notes_client_filter() {
    let ctx = scenario(&Config::default());
    let projection = ProjectionBuilder::new(ctx.schema())
        .column("Name")
        .computed("Reversed", "Name", DataType::String, |v| {
            v.as_str()
                .map_or(Value::Null, |s| Value::from(s.chars().rev().collect::<String>()))
        })
        .build()
        .unwrap();
    let query = ctx
        .query(projection)
        .filter(Predicate::starts_with("Reversed", "golB"));
    assert_eq!(query.plan_kind().unwrap(), PlanKind::Deferred);
    let sql = query.to_query_string().unwrap();
    assert!(!sql.contains("WHERE"));
    assert!(sql.contains("-- client filter:"));
    assert_eq!(query.to_list().unwrap().len(), 1);
}

// Configuration

#[test]
fn test_pushdown_disabled_by_config() {
    let mut config = Config::default();
    config.evaluation.enable_pushdown = false;
    let ctx = scenario(&config);
    let query = ctx
        .query(ctx.default_projection().unwrap())
        .filter(Predicate::contains("TagsArrayJoined", "tag"));
    assert_eq!(query.plan_kind().unwrap(), PlanKind::Deferred);
    assert_eq!(query.to_list().unwrap().len(), 1);
}

#[test]
fn test_table_name_and_separator_from_config() {
    let mut config = Config::default();
    config.storage.table_name = "Posts".to_string();
    config.evaluation.separator = " | ".to_string();
    let ctx = scenario(&config);
    let query = ctx.query(ctx.default_projection().unwrap());
    assert!(query.to_query_string().unwrap().contains("FROM \"Posts\" AS b"));
    let rows = query.to_list().unwrap();
    assert_eq!(rows[0].get("TagsListJoined"), Some(&Value::from("tag 1 | tag 2")));
}

// Faults

#[test]
fn test_row_limit_from_config_is_storage_fault() {
    let mut config = Config::default();
    config.storage.max_rows = 1;
    let mut ctx = scenario(&config);
    ctx.add(&foo_blog());
    let err = ctx.save_changes().unwrap_err();
    assert!(matches!(
        err,
        QueryError::Storage(StorageError::RowLimitExceeded { limit: 1, .. })
    ));
}

#[test]
fn test_unavailable_storage_is_storage_fault() {
    let ctx = scenario(&Config::default());
    ctx.storage().set_available(false);
    let err = ctx
        .query(ctx.default_projection().unwrap())
        .filter(Predicate::contains("TagsArrayJoined", "tag"))
        .to_list()
        .unwrap_err();
    assert!(matches!(err, QueryError::Storage(StorageError::Unavailable(_))));
}

#[test]
fn test_unknown_field_is_plan_error() {
    let ctx = scenario(&Config::default());
    let err = ctx
        .query(ctx.default_projection().unwrap())
        .filter(Predicate::contains("Missing", "tag"))
        .to_list()
        .unwrap_err();
    assert!(matches!(err, QueryError::Plan(_)));
}

#[test]
fn test_projection_over_other_table_is_mismatch() {
    let ctx = scenario(&Config::default());
    let projection = ProjectionBuilder::new(&Headline::schema())
        .column("Name")
        .build()
        .unwrap();
    let query = ctx.query(projection);
    let err = query.to_list().unwrap_err();
    assert!(matches!(
        err,
        QueryError::TableMismatch { ref table, ref projection } if table == "Blogs" && projection == "Headlines"
    ));
    assert!(matches!(query.to_query_string(), Err(QueryError::TableMismatch { .. })));
}

// Typed records

#[test]
fn test_to_records_decodes_matching_blogs() {
    let ctx = scenario(&Config::default());
    let blogs: Vec<Blog> = ctx
        .query(ctx.default_projection().unwrap())
        .filter(Predicate::contains("TagsArrayJoined", "tag 4"))
        .to_records()
        .unwrap();
    assert_eq!(blogs, vec![Blog { id: 1, ..foo_blog() }]);
}

#[test]
fn test_to_records_with_wrong_record_type_is_schema_error() {
    let ctx = scenario(&Config::default());
    let err = ctx
        .query(ctx.default_projection().unwrap())
        .to_records::<Headline>()
        .unwrap_err();
    assert!(matches!(err, QueryError::Schema(SchemaError::ArityMismatch { .. })));
}

// Pattern bounds

#[test]
fn test_oversized_prefix_is_deferred_and_agrees_with_client() {
    let pushed_ctx = scenario(&Config::default());
    let mut config = Config::default();
    config.evaluation.enable_pushdown = false;
    let client_ctx = scenario(&config);

    for prefix in ["Foo".to_string() + &"x".repeat(2_000_000), "Foo".to_string()] {
        let predicate = Predicate::starts_with("Name", prefix.clone());
        let query = pushed_ctx
            .query(pushed_ctx.default_projection().unwrap())
            .filter(predicate.clone());
        let pushed = query.to_list().unwrap();
        let client = client_ctx
            .query(client_ctx.default_projection().unwrap())
            .filter(predicate)
            .to_list()
            .unwrap();
        assert_eq!(pushed, client);
        if prefix.chars().count() + 1 > DEFAULT_MAX_LIKE_PATTERN {
            let plan = query.plan().unwrap().unwrap();
            assert!(matches!(plan.reason(), Some(TranslationError::PatternTooLong { .. })));
        } else {
            assert_eq!(query.plan_kind().unwrap(), PlanKind::Pushed);
            assert_eq!(pushed.len(), 1);
        }
    }
}
