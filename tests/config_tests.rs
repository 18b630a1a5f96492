//! Config loading, TOML parsing, and env var override tests.
//!
//! The env var test is `#[ignore]` (it mutates process env and conflicts in
//! parallel). Run it with: `cargo test --test config_tests -- --ignored --test-threads=1`

use shapeql::{Blog, Config, Context, PlanKind, Predicate};
use std::env;
use std::fs;
use tempfile::TempDir;

fn write_config(dir: &TempDir, body: &str) -> String {
    let path = dir.path().join("shapeql.toml");
    fs::write(&path, body).unwrap();
    path.to_string_lossy().into_owned()
}

// Default Configuration Tests
#[test]
fn test_config_default_table_name() {
    assert_eq!(Config::default().storage.table_name, "Blogs");
}

#[test]
fn test_config_default_pushdown_enabled() {
    assert!(Config::default().evaluation.enable_pushdown);
}

#[test]
fn test_config_default_logging() {
    let config = Config::default();
    assert_eq!(config.logging.level, "info");
    assert_eq!(config.logging.format, "text");
}

// File Loading Tests
#[test]
fn test_config_from_file() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        r#"
[storage]
table_name = "Posts"
max_rows = 10

[evaluation]
enable_pushdown = false
separator = "; "

[logging]
level = "debug"
format = "json"
"#,
    );
    let config = Config::from_file(&path).unwrap();
    assert_eq!(config.storage.table_name, "Posts");
    assert_eq!(config.storage.max_rows, 10);
    assert!(!config.evaluation.enable_pushdown);
    assert_eq!(config.evaluation.separator, "; ");
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.logging.format, "json");
}

#[test]
fn test_config_partial_file_uses_defaults() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "[logging]\nlevel = \"warn\"\n");
    let config = Config::from_file(&path).unwrap();
    assert_eq!(config.logging.level, "warn");
    assert_eq!(config.storage.table_name, "Blogs");
    assert!(config.evaluation.enable_pushdown);
}

#[test]
fn test_config_missing_file_uses_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("absent.toml");
    let config = Config::from_file(&path.to_string_lossy()).unwrap();
    assert_eq!(config, Config::default());
}

#[test]
fn test_config_invalid_type_is_error() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "[evaluation]\nenable_pushdown = \"sometimes\"\n");
    assert!(Config::from_file(&path).is_err());
}

#[test]
fn test_config_drives_context() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "[evaluation]\nenable_pushdown = false\n");
    let config = Config::from_file(&path).unwrap();
    let ctx = Context::from_config::<Blog>(&config);
    ctx.ensure_created().unwrap();
    let query = ctx
        .query(ctx.default_projection().unwrap())
        .filter(Predicate::contains("TagsArrayJoined", "tag"));
    assert_eq!(query.plan_kind().unwrap(), PlanKind::Deferred);
}

// Env Override Tests
#[test]
#[ignore]
fn test_config_env_override() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "[storage]\ntable_name = \"Posts\"\n");
    env::set_var("SHAPEQL_STORAGE__TABLE_NAME", "Entries");
    env::set_var("SHAPEQL_EVALUATION__ENABLE_PUSHDOWN", "false");
    let config = Config::from_file(&path);
    env::remove_var("SHAPEQL_STORAGE__TABLE_NAME");
    env::remove_var("SHAPEQL_EVALUATION__ENABLE_PUSHDOWN");
    let config = config.unwrap();
    assert_eq!(config.storage.table_name, "Entries");
    assert!(!config.evaluation.enable_pushdown);
}
