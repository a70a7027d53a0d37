//! Wiring shared by the command-line entry points.

use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
use leak_client::Store;

use crate::{
    config::{AppConfig, SourceKind},
    metrics_textfile,
    photos::{HttpPhotoFetcher, NoPhotoFetcher, PhotoFetcher},
    pipeline::{PipelineError, Source},
    sources::{CsvExportSource, RawRecordSet, SheetsApiSource},
};

/// Options every binary accepts.
#[derive(Debug, Clone, clap::Args)]
pub struct CommonArgs {
    /// Config file; falls back to $LEAK_ETL_CONFIG, then ./leak-etl.toml.
    #[arg(long, value_name = "PATH", env = "LEAK_ETL_CONFIG")]
    pub config: Option<PathBuf>,
}

impl CommonArgs {
    pub fn load_config(&self) -> anyhow::Result<AppConfig> {
        AppConfig::load(self.config.as_deref())
    }
}

/// The configured survey source.
pub enum SurveySource {
    SheetsApi(SheetsApiSource),
    CsvFile(CsvExportSource),
}

#[async_trait::async_trait]
impl Source for SurveySource {
    async fn fetch_rows(&self) -> Result<RawRecordSet, PipelineError> {
        match self {
            Self::SheetsApi(s) => s.fetch_rows().await,
            Self::CsvFile(s) => s.fetch_rows().await,
        }
    }
}

pub fn build_source(cfg: &AppConfig) -> anyhow::Result<SurveySource> {
    let src = &cfg.source;
    match src.kind {
        SourceKind::SheetsApi => {
            let source = SheetsApiSource::new(src.sheet_ref()?, src.sheets_auth()?, src.timeout())?;
            Ok(SurveySource::SheetsApi(source))
        }
        SourceKind::CsvFile => Ok(SurveySource::CsvFile(CsvExportSource::new(src.csv_path()?))),
    }
}

pub fn build_photo_fetcher(cfg: &AppConfig) -> anyhow::Result<Arc<dyn PhotoFetcher>> {
    if cfg.photos.enabled {
        Ok(Arc::new(HttpPhotoFetcher::new(cfg.photos.timeout())?))
    } else {
        Ok(Arc::new(NoPhotoFetcher))
    }
}

/// Open the configured database and make sure its schema exists.
pub async fn open_store(cfg: &AppConfig) -> anyhow::Result<Store> {
    let store = Store::open(&cfg.store.path)
        .await
        .with_context(|| format!("failed to open database {}", cfg.store.path.display()))?;
    store.create_schema().await.context("failed to create schema")?;
    Ok(store)
}

pub fn init_metrics(cfg: &AppConfig) -> anyhow::Result<()> {
    if cfg.metrics.textfile_path.is_some() {
        metrics_textfile::init()?;
    }
    Ok(())
}

/// Flush metrics if configured. A failure here never fails the run.
pub fn finish_metrics(cfg: &AppConfig) {
    if let Some(path) = &cfg.metrics.textfile_path {
        if let Err(e) = metrics_textfile::write_textfile(path) {
            tracing::warn!(error = %e, "failed to write metrics textfile");
        }
    }
}
