use std::{
    fs::{self, File},
    path::{Path, PathBuf},
};

use time::{macros::format_description, OffsetDateTime};

use super::RawRecordSet;
use crate::pipeline::{PipelineError, Source};

/// CSV export of the survey sheet (File > Download > CSV).
///
/// The first record is the header row; columns are matched by name, so the
/// export may carry extra columns or a different order than the form.
pub struct CsvExportSource {
    path: PathBuf,
}

impl CsvExportSource {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait::async_trait]
impl Source for CsvExportSource {
    async fn fetch_rows(&self) -> Result<RawRecordSet, PipelineError> {
        // Volunteer sheets are small; a blocking read inside the task is fine.
        let file = File::open(&self.path).map_err(|e| {
            PipelineError::SourceUnavailable(format!(
                "failed to open CSV export {}: {e}",
                self.path.display()
            ))
        })?;
        let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(file);
        let headers: Vec<String> = rdr
            .headers()
            .map_err(|e| PipelineError::SourceUnavailable(format!("failed to read CSV headers: {e}")))?
            .iter()
            .map(str::to_string)
            .collect();

        let mut rows = Vec::new();
        for result in rdr.records() {
            let record = result.map_err(|e| {
                PipelineError::SourceUnavailable(format!("failed to read CSV record: {e}"))
            })?;
            rows.push(record.iter().map(str::to_string).collect());
        }

        RawRecordSet::new(headers, rows)
    }
}

/// Write `raw` to `<dir>/raw_<UTC timestamp>.csv` and return the path.
pub fn archive_raw(raw: &RawRecordSet, dir: &Path, now: OffsetDateTime) -> anyhow::Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let stamp = now.format(format_description!(
        "[year][month][day]T[hour][minute][second]Z"
    ))?;
    let path = dir.join(format!("raw_{stamp}.csv"));

    let mut wtr = csv::Writer::from_path(&path)?;
    wtr.write_record(&raw.headers)?;
    for row in &raw.rows {
        wtr.write_record(raw.headers.iter().map(|h| row.get(h).unwrap_or("")))?;
    }
    wtr.flush()?;
    Ok(path)
}
