use anyhow::Result;
use clap::Parser;
use leak_etl::{
    app::{self, CommonArgs},
    observability,
    render::MapRenderer,
};

/// Render the map for one city.
#[derive(Debug, Parser)]
#[command(name = "create-map")]
struct Args {
    /// City name as stored in the database.
    #[arg(long)]
    city: String,

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

    let result = MapRenderer::new(store.clone(), &cfg.maps.output_dir)
        .render_city(&args.city)
        .await;
    app::finish_metrics(&cfg);
    store.close().await;

    let artifact = result?;
    println!(
        "{}: {} markers -> {}",
        artifact.city,
        artifact.marker_count,
        artifact.path.display()
    );
    Ok(())
}
