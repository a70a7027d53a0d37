use anyhow::{Context, Result};
use clap::Parser;
use leak_etl::{
    app::{self, CommonArgs},
    observability,
};

/// Run one SQL statement against the survey database and print the result.
#[derive(Debug, Parser)]
#[command(name = "query-db")]
struct Args {
    #[arg(long)]
    sql: String,

    #[command(flatten)]
    common: CommonArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();
    let args = Args::parse();

    let cfg = args.common.load_config()?;
    let store = app::open_store(&cfg).await?;

    let result = store.run_sql(&args.sql).await;
    store.close().await;

    let table = result.context("query failed")?;
    println!("{table}");
    Ok(())
}
