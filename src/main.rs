//! # shapeql
//!
//! Runs the blog scenario end to end against in-memory storage: reset and
//! create the table, print its DDL, insert one blog, print the projection
//! query with its JSON rows, then run the same `contains` filter against the
//! joined text of the sequence and the fixed array tag columns.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -- --filter-value tag
//! cargo run -- --config shapeql.toml --no-pushdown
//! RUST_LOG=shapeql=debug cargo run
//! ```

use anyhow::{Context as _, Result};
use clap::Parser;
use shapeql::config::LoggingConfig;
use shapeql::{Blog, Config, Context, Predicate, Projection, ProjectionBuilder, Storage};
use std::sync::OnceLock;

static TRACE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "shapeql", version, about = "Array-shape aware query translation demo")]
struct Args {
    /// Configuration file (defaults to shapeql.toml + shapeql.local.toml)
    #[arg(long)]
    config: Option<String>,

    /// Substring the joined tags are filtered on
    #[arg(long, default_value = "tag")]
    filter_value: String,

    /// Evaluate every filter after materialisation
    #[arg(long)]
    no_pushdown: bool,
}

fn init_tracing(logging_config: &LoggingConfig) {
    let (non_blocking, guard) = tracing_appender::non_blocking(std::io::stderr());
    let _ = TRACE_GUARD.set(guard);

    // RUST_LOG takes precedence over the configured level
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(&logging_config.level))
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let base = || {
        tracing_subscriber::fmt()
            .with_env_filter(filter.clone())
            .with_ansi(false)
            .with_writer(non_blocking.clone())
    };

    let subscriber: Box<dyn tracing::Subscriber + Send + Sync> =
        if logging_config.format == "json" {
            Box::new(base().json().finish())
        } else {
            Box::new(base().compact().finish())
        };

    let _ = tracing::subscriber::set_global_default(subscriber);
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

/// Name, the four raw array columns, and a joined field for each
fn blog_projection<S: Storage>(ctx: &Context<S>, separator: &str) -> Result<Projection> {
    ProjectionBuilder::new(ctx.schema())
        .column("Name")
        .column("TagsList")
        .column("TagsArray")
        .joined("ListTagsJoined", "TagsList", separator)
        .joined("ArrayTagsJoined", "TagsArray", separator)
        .column("RatingsList")
        .column("RatingsArray")
        .joined("ListRatingsJoined", "RatingsList", separator)
        .joined("ArrayRatingsJoined", "RatingsArray", separator)
        .build()
        .context("building blog projection")
}

fn run_filtered<S: Storage>(
    ctx: &Context<S>,
    projection: &Projection,
    field: &str,
    needle: &str,
) -> Result<()> {
    let query = ctx
        .query(projection.clone())
        .filter(Predicate::contains(field, needle));
    println!("-- {field}.contains({needle:?}) [{}]", query.plan_kind()?);
    println!("{}\n", query.to_query_string()?);
    println!("{}", query.to_json()?);
    let blogs: Vec<Blog> = query.to_records()?;
    let names: Vec<&str> = blogs.iter().map(|b| b.name.as_str()).collect();
    println!("-- matched blogs: {names:?}\n");
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::from_file(path).with_context(|| format!("loading config {path}"))?,
        None => Config::load().unwrap_or_else(|e| {
            eprintln!("Warning: failed to load config ({e}), using defaults");
            Config::default()
        }),
    };
    if args.no_pushdown {
        config.evaluation.enable_pushdown = false;
    }

    init_tracing(&config.logging);
    tracing::info!(
        table = %config.storage.table_name,
        pushdown = config.evaluation.enable_pushdown,
        "starting"
    );

    let mut ctx = Context::from_config::<Blog>(&config);
    ctx.ensure_deleted()?;
    ctx.ensure_created()?;
    println!("{}\n", ctx.create_script());

    ctx.add(&foo_blog());
    ctx.save_changes()?;

    let projection = blog_projection(&ctx, &config.evaluation.separator)?;
    let query = ctx.query(projection.clone());
    println!("{}\n", query.to_query_string()?);
    println!("{}\n", query.to_json()?);

    run_filtered(&ctx, &projection, "ArrayTagsJoined", &args.filter_value)?;
    run_filtered(&ctx, &projection, "ListTagsJoined", &args.filter_value)?;

    let kind = ctx.verify_equivalent(
        &projection,
        &Predicate::contains("ArrayTagsJoined", args.filter_value.as_str()),
        &Predicate::contains("ListTagsJoined", args.filter_value.as_str()),
    )?;
    println!("-- representation check passed ({kind})");
    Ok(())
}
