//! Extractors for the survey spreadsheet plus the reference roster readers.

pub mod csv_export;
pub mod reference_csv;
pub mod sheets_api;

use std::collections::{BTreeMap, HashMap};

use crate::pipeline::PipelineError;

pub use csv_export::{archive_raw, CsvExportSource};
pub use sheets_api::{SheetRef, SheetsApiSource, SheetsAuth};

/// One spreadsheet row keyed by the source's own header text.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRow {
    pub row_number: usize,
    pub fields: BTreeMap<String, String>,
}

impl RawRow {
    pub fn get(&self, header: &str) -> Option<&str> {
        self.fields.get(header).map(String::as_str)
    }
}

/// Untyped extract: headers in source order plus every non-blank data row.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecordSet {
    pub headers: Vec<String>,
    pub rows: Vec<RawRow>,
}

impl RawRecordSet {
    /// Build a record set from a header row and data rows, failing with
    /// `SchemaMismatch` when a required survey column is absent. Short rows
    /// are padded with empty cells; fully blank rows are dropped.
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Result<Self, PipelineError> {
        let headers: Vec<String> = headers.iter().map(|h| h.trim().to_string()).collect();

        let missing = HeaderIndex::new(&headers).missing_required();
        if !missing.is_empty() {
            return Err(PipelineError::SchemaMismatch { missing });
        }

        let rows = rows
            .into_iter()
            .enumerate()
            .filter(|(_, cells)| cells.iter().any(|c| !c.trim().is_empty()))
            .map(|(idx, cells)| {
                let mut cells = cells.into_iter();
                let fields = headers
                    .iter()
                    .map(|h| (h.clone(), cells.next().unwrap_or_default()))
                    .collect();
                RawRow {
                    row_number: idx + 1,
                    fields,
                }
            })
            .collect();

        Ok(Self { headers, rows })
    }
}

/// Canonical survey columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    Timestamp,
    City,
    MethaneLevel,
    Leak,
    InfrastructureType,
    Photo,
    Latitude,
    Longitude,
    Coordinates,
    Volunteer,
}

impl Column {
    pub const ALL: [Column; 10] = [
        Column::Timestamp,
        Column::City,
        Column::MethaneLevel,
        Column::Leak,
        Column::InfrastructureType,
        Column::Photo,
        Column::Latitude,
        Column::Longitude,
        Column::Coordinates,
        Column::Volunteer,
    ];

    pub fn name(self) -> &'static str {
        self.aliases()[0]
    }

    /// Accepted normalized header spellings; the first one is canonical.
    fn aliases(self) -> &'static [&'static str] {
        match self {
            Column::Timestamp => &["timestamp", "date_time", "datetime"],
            Column::City => &["city", "town", "city_town"],
            Column::MethaneLevel => &[
                "methane_level",
                "methane",
                "methane_reading",
                "methane_level_ppm",
                "methane_level_lel",
            ],
            Column::Leak => &["leak", "leak_detected"],
            Column::InfrastructureType => &[
                "infrastructure_type",
                "type_of_infrastructure",
                "infrastructure",
            ],
            Column::Photo => &["photo", "picture", "photo_link", "image"],
            Column::Latitude => &["latitude", "lat"],
            Column::Longitude => &["longitude", "lon", "lng", "long"],
            Column::Coordinates => &["coordinates", "location", "gps_coordinates"],
            Column::Volunteer => &["volunteer", "volunteer_initials", "initials"],
        }
    }
}

/// Lowercase a header and fold every run of non-alphanumerics into `_`.
pub fn normalize_header(header: &str) -> String {
    let mut out = String::with_capacity(header.len());
    for ch in header.trim().chars() {
        if ch.is_alphanumeric() {
            out.extend(ch.to_lowercase());
        } else if !out.is_empty() && !out.ends_with('_') {
            out.push('_');
        }
    }
    while out.ends_with('_') {
        out.pop();
    }
    out
}

/// Maps canonical columns to the header text the source actually used.
#[derive(Debug, Clone, Default)]
pub struct HeaderIndex {
    columns: HashMap<Column, String>,
}

impl HeaderIndex {
    pub fn new(headers: &[String]) -> Self {
        let normalized: Vec<(String, &String)> =
            headers.iter().map(|h| (normalize_header(h), h)).collect();

        let mut columns = HashMap::new();
        for column in Column::ALL {
            let found = column
                .aliases()
                .iter()
                .find_map(|alias| normalized.iter().find(|(n, _)| n == alias));
            if let Some((_, original)) = found {
                columns.insert(column, (*original).clone());
            }
        }
        Self { columns }
    }

    pub fn header(&self, column: Column) -> Option<&str> {
        self.columns.get(&column).map(String::as_str)
    }

    pub fn has(&self, column: Column) -> bool {
        self.columns.contains_key(&column)
    }

    /// Names of required columns the headers do not provide.
    pub fn missing_required(&self) -> Vec<String> {
        let mut missing: Vec<String> = [
            Column::Timestamp,
            Column::City,
            Column::MethaneLevel,
            Column::Volunteer,
        ]
        .into_iter()
        .filter(|c| !self.has(*c))
        .map(|c| c.name().to_string())
        .collect();

        let has_pair = self.has(Column::Latitude) && self.has(Column::Longitude);
        if !has_pair && !self.has(Column::Coordinates) {
            missing.push("coordinates (or latitude and longitude)".to_string());
        }
        missing
    }

    /// Cell text for `column` in `row`, or `None` when the column is absent.
    pub fn cell<'r>(&self, row: &'r RawRow, column: Column) -> Option<&'r str> {
        self.header(column).and_then(|h| row.get(h))
    }
}
