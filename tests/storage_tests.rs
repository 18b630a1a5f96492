//! Storage collaborator tests against the in-memory engine.

use shapeql::storage::SqlFunction;
use shapeql::{
    Blog, Capabilities, CompareOp, MemoryStorage, Record, SqlExpr, Storage, StorageError,
    StorageQuery, Value,
};

fn blog(name: &str, tags: &[&str], ratings: &[i32]) -> Blog {
    Blog {
        id: 0,
        name: name.to_string(),
        tags_list: tags.iter().map(|s| s.to_string()).collect(),
        tags_array: tags.iter().map(|s| s.to_string()).collect(),
        ratings_list: ratings.to_vec(),
        ratings_array: ratings.to_vec(),
    }
}

fn seeded(storage: &MemoryStorage) {
    storage.ensure_deleted("Blogs").unwrap();
    storage.ensure_created(&Blog::schema()).unwrap();
    for b in [
        blog("Alpha", &["rust", "db"], &[5]),
        blog("Beta", &["go"], &[1, 2]),
        blog("Gamma", &[], &[]),
    ] {
        storage.insert("Blogs", b.to_tuple()).unwrap();
    }
}

fn names(storage: &dyn Storage, filter: Option<SqlExpr>) -> Result<Vec<String>, StorageError> {
    let mut query = StorageQuery::scan("Blogs", vec!["Name".to_string()]);
    if let Some(filter) = filter {
        query = query.with_filter(filter);
    }
    Ok(storage
        .query(&query)?
        .iter()
        .filter_map(|t| t.get(0).and_then(Value::as_str).map(str::to_string))
        .collect())
}

fn joined(column: &str) -> SqlExpr {
    SqlExpr::call(
        SqlFunction::ArrayToString,
        vec![SqlExpr::column(column), SqlExpr::literal(", ")],
    )
}

#[test]
fn test_rows_in_insertion_order() {
    let storage = MemoryStorage::new();
    seeded(&storage);
    assert_eq!(names(&storage, None).unwrap(), vec!["Alpha", "Beta", "Gamma"]);
}

#[test]
fn test_both_array_columns_accept_same_operators() {
    let storage = MemoryStorage::new();
    seeded(&storage);
    for column in ["TagsList", "TagsArray"] {
        let filter = SqlExpr::compare(
            CompareOp::Gt,
            SqlExpr::call(
                SqlFunction::Strpos,
                vec![joined(column), SqlExpr::literal("db")],
            ),
            SqlExpr::literal(0),
        );
        assert_eq!(names(&storage, Some(filter)).unwrap(), vec!["Alpha"]);
    }
    for column in ["RatingsList", "RatingsArray"] {
        let filter = SqlExpr::AnyEq {
            element: Box::new(SqlExpr::literal(2)),
            array: Box::new(SqlExpr::column(column)),
        };
        assert_eq!(names(&storage, Some(filter)).unwrap(), vec!["Beta"]);
    }
}

#[test]
fn test_empty_array_joins_to_empty_text() {
    let storage = MemoryStorage::new();
    seeded(&storage);
    let filter = SqlExpr::compare(CompareOp::Eq, joined("TagsArray"), SqlExpr::literal(""));
    assert_eq!(names(&storage, Some(filter)).unwrap(), vec!["Gamma"]);
}

#[test]
fn test_cardinality() {
    let storage = MemoryStorage::new();
    seeded(&storage);
    let filter = SqlExpr::compare(
        CompareOp::Ge,
        SqlExpr::call(SqlFunction::Cardinality, vec![SqlExpr::column("RatingsList")]),
        SqlExpr::literal(2),
    );
    assert_eq!(names(&storage, Some(filter)).unwrap(), vec!["Beta"]);
}

#[test]
fn test_strpos_on_raw_array_rejected() {
    let storage = MemoryStorage::new();
    seeded(&storage);
    let filter = SqlExpr::compare(
        CompareOp::Gt,
        SqlExpr::call(
            SqlFunction::Strpos,
            vec![SqlExpr::column("TagsList"), SqlExpr::literal("db")],
        ),
        SqlExpr::literal(0),
    );
    let err = names(&storage, Some(filter)).unwrap_err();
    assert!(matches!(err, StorageError::QueryRejected(msg) if msg.contains("strpos")));
}

#[test]
fn test_capabilities_enforced() {
    let storage = MemoryStorage::new().with_capabilities(Capabilities {
        array_to_string: false,
        ..Capabilities::full()
    });
    seeded(&storage);
    assert!(!storage.capabilities().array_to_string);
    let filter = SqlExpr::compare(CompareOp::Eq, joined("TagsList"), SqlExpr::literal("go"));
    assert!(matches!(
        names(&storage, Some(filter)),
        Err(StorageError::QueryRejected(_))
    ));
}

#[test]
fn test_offline_storage_faults_every_operation() {
    let storage = MemoryStorage::new();
    seeded(&storage);
    storage.set_available(false);
    assert!(matches!(names(&storage, None), Err(StorageError::Unavailable(_))));
    assert!(matches!(
        storage.insert("Blogs", blog("Delta", &[], &[]).to_tuple()),
        Err(StorageError::Unavailable(_))
    ));
    storage.set_available(true);
    assert_eq!(names(&storage, None).unwrap().len(), 3);
}

#[test]
fn test_serial_keys_follow_explicit_keys() {
    let storage = MemoryStorage::new();
    storage.ensure_created(&Blog::schema()).unwrap();
    let mut explicit = blog("Explicit", &[], &[]);
    explicit.id = 10;
    storage.insert("Blogs", explicit.to_tuple()).unwrap();
    let stored = storage
        .insert("Blogs", blog("Next", &[], &[]).to_tuple())
        .unwrap();
    assert_eq!(stored.get(0), Some(&Value::Int32(11)));
}

#[test]
fn test_schema_violation_rejected() {
    let storage = MemoryStorage::new();
    storage.ensure_created(&Blog::schema()).unwrap();
    let mut row = blog("Bad", &[], &[]).to_tuple();
    row.set(2, Value::int_array([1]));
    assert!(matches!(
        storage.insert("Blogs", row),
        Err(StorageError::Schema(_))
    ));
}
