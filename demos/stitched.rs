//! Runs a query against the stitched task + user schemas.
//!
//! `RUST_LOG=stitchload=debug cargo run --example stitched` shows the batched delegation.

use std::sync::Arc;

use clap::Parser;
use serde_json::Map;
use stitchload::{
    schedule::YieldTicks,
    stitch::{task_schema, user_schema, ComposedSchema, ExecutionContext, ExecutionError, TaskUser, LINK_TYPE_DEFS},
    LoaderOptions,
};
use tracing_subscriber::EnvFilter;

const DEFAULT_QUERY: &str = r#"{
  task(id: "1") {
    id
    text
    user {
      id
      email
    }
  }
}"#;

#[derive(Parser, Debug)]
#[command(about = "Execute a query against the stitched task and user schemas")]
struct Args {
    /// Query to execute.
    #[arg(short, long, default_value = DEFAULT_QUERY)]
    query: String,

    /// Upper bound on ids per delegated usersByIds call.
    #[arg(long)]
    max_batch_size: Option<usize>,

    /// Runtime yields before a user batch is dispatched.
    #[arg(long, default_value_t = 1)]
    yield_ticks: usize,
}

#[tokio::main]
async fn main() -> Result<(), ExecutionError> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();

    let users = Arc::new(user_schema()?);
    let schema = ComposedSchema::new(vec![Arc::new(task_schema()?), Arc::clone(&users)], LINK_TYPE_DEFS)?
        .with_relationship("Task", "user", TaskUser)?;

    let mut options = LoaderOptions::default().with_schedule(YieldTicks(args.yield_ticks));
    if let Some(max_batch_size) = args.max_batch_size {
        options = options.with_max_batch_size(max_batch_size);
    }

    let response =
        schema.execute(&args.query, &Map::new(), ExecutionContext::with_options(users, options)).await;
    println!("result: {:#}", response.to_json());
    Ok(())
}
