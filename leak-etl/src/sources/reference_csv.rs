//! Readers for the seed rosters: `cities.csv`, `utilities.csv` and
//! `volunteers.csv`. Each has a header row naming the entity's fields.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;

#[derive(thiserror::Error, Debug)]
#[error("failed to read reference file {}: {source}", .path.display())]
pub struct ReferenceCsvError {
    pub path: PathBuf,
    #[source]
    pub source: csv::Error,
}

/// A roster line that could not be deserialized.
#[derive(Debug, Clone, PartialEq)]
pub struct MalformedRecord {
    pub line: u64,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedCsv<T> {
    pub records: Vec<T>,
    pub malformed: Vec<MalformedRecord>,
}

/// Deserialize every record of `path`, trimming headers and cells. Empty
/// cells become `None` for optional fields. A bad line is recorded and
/// skipped; only an unreadable file is an error.
pub fn read_reference_csv<T: DeserializeOwned>(path: &Path) -> Result<ParsedCsv<T>, ReferenceCsvError> {
    let wrap = |source| ReferenceCsvError {
        path: path.to_path_buf(),
        source,
    };

    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(wrap)?;
    // Fail early on an unreadable header row.
    rdr.headers().map_err(wrap)?;

    let mut records = Vec::new();
    let mut malformed = Vec::new();
    for result in rdr.deserialize::<T>() {
        match result {
            Ok(record) => records.push(record),
            Err(e) => {
                let line = e.position().map(|p| p.line()).unwrap_or_default();
                tracing::warn!(path = %path.display(), line, error = %e, "skipping malformed reference record");
                malformed.push(MalformedRecord {
                    line,
                    error: e.to_string(),
                });
            }
        }
    }

    Ok(ParsedCsv { records, malformed })
}
