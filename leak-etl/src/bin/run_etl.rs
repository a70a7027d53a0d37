use anyhow::{Context, Result};
use clap::Parser;
use leak_etl::{
    app::{self, CommonArgs},
    observability,
    pipeline::Pipeline,
    sinks::{load_reference_data, StoreSink},
    transform::{ReferenceData, SurveyTransformer},
};

/// Seed reference data, then extract, transform and load the survey sheet.
#[derive(Debug, Parser)]
#[command(name = "run-etl")]
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

    let seed = load_reference_data(&store, &cfg.reference)
        .await
        .context("seed: failed to load reference data")?;
    println!("reference data: {seed}");

    let reference = ReferenceData::load(&store)
        .await
        .context("transform: failed to read reference data")?;

    let pipeline = Pipeline {
        source: app::build_source(&cfg).context("extract: invalid source configuration")?,
        transformer: SurveyTransformer::new(cfg.transform.methane_unit),
        sink: StoreSink::new(store.clone(), app::build_photo_fetcher(&cfg)?),
        raw_archive_dir: cfg.source.raw_archive_dir.clone(),
    };

    let result = pipeline.run(&reference).await;
    app::finish_metrics(&cfg);
    store.close().await;

    let summary = result.context("etl run aborted")?;
    for failed in &summary.load.failed {
        eprintln!("row {}: {}", failed.row_number, failed.error);
    }
    println!("{summary}");
    Ok(())
}
