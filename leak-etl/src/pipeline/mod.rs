use std::{fmt, path::PathBuf, time::SystemTime};

use leak_client::StoreError;

use crate::{
    sinks::LoadReport,
    sources::{archive_raw, RawRecordSet},
    transform::{CandidateMeasurement, ReferenceData, RejectedRow, SurveyTransformer},
};

/// A record in flight, tagged with the sheet row it came from.
#[derive(Debug, Clone)]
pub struct Envelope<T> {
    pub payload: T,
    /// Data row number in the source (the header row is not counted).
    pub row_number: usize,
    pub received_at: SystemTime,
}

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("extract: source unavailable: {0}")]
    SourceUnavailable(String),
    #[error("extract: source is missing expected columns: {}", missing.join(", "))]
    SchemaMismatch { missing: Vec<String> },
    #[error("load: {0}")]
    Store(#[from] StoreError),
}

#[async_trait::async_trait]
pub trait Source: Send + Sync {
    /// Fetch every row of the source with its headers. No type coercion.
    async fn fetch_rows(&self) -> Result<RawRecordSet, PipelineError>;
}

#[async_trait::async_trait]
pub trait Sink: Send + Sync {
    async fn load(
        &self,
        records: Vec<Envelope<CandidateMeasurement>>,
    ) -> Result<LoadReport, PipelineError>;
}

/// Totals reported at the end of every run.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub rows_seen: usize,
    pub rejected: Vec<RejectedRow>,
    pub load: LoadReport,
}

impl RunSummary {
    pub fn loaded(&self) -> usize {
        self.load.inserted
    }

    pub fn duplicate_skipped(&self) -> usize {
        self.load.skipped_duplicate
    }

    pub fn rejected_count(&self) -> usize {
        self.rejected.len()
    }

    pub fn failed_count(&self) -> usize {
        self.load.failed.len()
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "rows seen: {}, loaded: {}, duplicate-skipped: {}, rejected: {}, failed: {}",
            self.rows_seen,
            self.loaded(),
            self.duplicate_skipped(),
            self.rejected_count(),
            self.failed_count()
        )
    }
}

pub struct Pipeline<S, K> {
    pub source: S,
    pub transformer: SurveyTransformer,
    pub sink: K,
    /// Where to keep a CSV copy of each raw extract, if anywhere.
    pub raw_archive_dir: Option<PathBuf>,
}

impl<S, K> Pipeline<S, K>
where
    S: Source,
    K: Sink,
{
    /// Extract, transform and load once. Only extraction failures and store
    /// outages abort; bad rows and failed records are counted in the summary.
    pub async fn run(&self, reference: &ReferenceData) -> Result<RunSummary, PipelineError> {
        tracing::info!("extracting survey rows");
        let raw = self.source.fetch_rows().await?;
        metrics::counter!("survey_rows_extracted_total").increment(raw.rows.len() as u64);
        tracing::info!(rows = raw.rows.len(), columns = raw.headers.len(), "extracted survey rows");

        if let Some(dir) = &self.raw_archive_dir {
            match archive_raw(&raw, dir, time::OffsetDateTime::now_utc()) {
                Ok(path) => tracing::info!(path = %path.display(), "archived raw extract"),
                Err(e) => tracing::warn!(error = %e, "failed to archive raw extract, continuing"),
            }
        }

        let output = self.transformer.transform(&raw, reference);
        for rejected in &output.rejected {
            tracing::warn!(
                row = rejected.row_number,
                reason = rejected.reason.code(),
                detail = %rejected.reason,
                "rejected survey row"
            );
        }
        tracing::info!(
            valid = output.valid.len(),
            rejected = output.rejected.len(),
            "transformed survey rows"
        );

        let load = self.sink.load(output.valid).await?;

        Ok(RunSummary {
            rows_seen: raw.rows.len(),
            rejected: output.rejected,
            load,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_totals_come_from_the_load_report() {
        let summary = RunSummary {
            rows_seen: 5,
            load: LoadReport {
                inserted: 3,
                skipped_duplicate: 2,
                failed: Vec::new(),
            },
            ..RunSummary::default()
        };

        assert_eq!(summary.loaded(), 3);
        assert_eq!(summary.duplicate_skipped(), 2);
        assert_eq!(
            summary.to_string(),
            "rows seen: 5, loaded: 3, duplicate-skipped: 2, rejected: 0, failed: 0"
        );
    }
}
