use anyhow::{Context, Result};
use clap::Parser;
use leak_etl::{
    app::{self, CommonArgs},
    observability,
    render::MapRenderer,
};

/// Render a map for every city in the database.
#[derive(Debug, Parser)]
#[command(name = "run-map-all")]
struct Args {
    #[command(flatten)]
    common: CommonArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();
    let args = Args::parse();

    let cfg = args.common.load_config()?;
    app::init_metrics(&cfg)?;
    let store = app::open_store(&cfg).await?;

    let renderer = MapRenderer::new(store.clone(), &cfg.maps.output_dir);
    let result = renderer.render_all().await;
    app::finish_metrics(&cfg);
    store.close().await;

    let report = result.context("render: failed to list cities")?;
    for artifact in &report.artifacts {
        println!("{}: {} markers -> {}", artifact.city, artifact.marker_count, artifact.path.display());
    }
    for skipped in &report.skipped {
        println!("{}: skipped ({})", skipped.city, skipped.reason);
    }
    println!(
        "rendered {} map(s), skipped {}",
        report.artifacts.len(),
        report.skipped.len()
    );
    Ok(())
}
