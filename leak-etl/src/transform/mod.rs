//! Row validation and coercion: raw sheet rows in, candidate measurements and
//! rejected rows out. Rejection never aborts the batch.

pub mod coerce;

use std::{
    collections::{HashMap, HashSet},
    time::SystemTime,
};

use leak_client::{
    domain::{timestamp, City, NewMeasurement, Volunteer},
    Store, StoreError,
};

use crate::{
    pipeline::Envelope,
    sources::{Column, HeaderIndex, RawRecordSet, RawRow},
};

pub use coerce::MethaneUnit;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum RowValidationError {
    #[error("required field '{0}' is missing")]
    MissingField(&'static str),
    #[error("field '{field}' is not a number: '{value}'")]
    InvalidNumber { field: &'static str, value: String },
    #[error("leak value '{0}' is not a recognized yes/no token")]
    InvalidBoolean(String),
    #[error("timestamp '{0}' is malformed")]
    InvalidTimestamp(String),
    #[error("timestamp {0} is outside 2000-01-01..2100-01-01")]
    TimestampOutOfRange(String),
    #[error("'{0}' is not a valid latitude/longitude")]
    InvalidCoordinates(String),
    #[error("city '{0}' is not in the reference data")]
    UnknownCity(String),
    #[error("volunteer '{initials}' is not registered in city '{city}'")]
    UnknownVolunteer { initials: String, city: String },
    #[error("timestamp {0} repeats an earlier row in this batch")]
    DuplicateInBatch(String),
}

impl RowValidationError {
    /// Stable reason code for logs and reports.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingField(_) => "missing_field",
            Self::InvalidNumber { .. } => "invalid_number",
            Self::InvalidBoolean(_) => "invalid_boolean",
            Self::InvalidTimestamp(_) => "invalid_timestamp",
            Self::TimestampOutOfRange(_) => "timestamp_out_of_range",
            Self::InvalidCoordinates(_) => "invalid_coordinates",
            Self::UnknownCity(_) => "unknown_city",
            Self::UnknownVolunteer { .. } => "unknown_volunteer",
            Self::DuplicateInBatch(_) => "duplicate_in_batch",
        }
    }
}

/// A validated measurement plus the photo link it still needs fetched.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateMeasurement {
    pub measurement: NewMeasurement,
    pub photo_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RejectedRow {
    pub row_number: usize,
    pub reason: RowValidationError,
    pub raw: RawRow,
}

#[derive(Debug, Default)]
pub struct TransformOutput {
    pub valid: Vec<Envelope<CandidateMeasurement>>,
    pub rejected: Vec<RejectedRow>,
}

/// City and volunteer lookups used to resolve sheet references.
#[derive(Debug, Clone, Default)]
pub struct ReferenceData {
    /// Lowercased name -> stored spelling.
    cities: HashMap<String, String>,
    /// (uppercased initials, lowercased city) pairs from the roster.
    volunteers: HashSet<(String, String)>,
}

impl ReferenceData {
    pub fn new(cities: &[City], volunteers: &[Volunteer]) -> Self {
        let cities = cities
            .iter()
            .map(|c| (coerce::normalize_text(&c.city).to_lowercase(), c.city.clone()))
            .collect();

        let volunteers = volunteers
            .iter()
            .map(|v| volunteer_key(&v.initials, &v.city))
            .collect();

        Self {
            cities,
            volunteers,
        }
    }

    pub async fn load(store: &Store) -> Result<Self, StoreError> {
        let cities = store.cities().await?;
        let volunteers = store.volunteers().await?;
        tracing::debug!(
            cities = cities.len(),
            volunteers = volunteers.len(),
            "loaded reference data"
        );
        Ok(Self::new(&cities, &volunteers))
    }

    /// Stored spelling of a city name, matched case-insensitively.
    pub fn resolve_city(&self, name: &str) -> Option<&str> {
        self.cities
            .get(&coerce::normalize_text(name).to_lowercase())
            .map(String::as_str)
    }

    /// Whether `initials` is registered in `city`. A volunteer is identified
    /// by the pair, so initials known only in another city do not count.
    pub fn knows_volunteer(&self, initials: &str, city: &str) -> bool {
        self.volunteers.contains(&volunteer_key(initials, city))
    }
}

fn volunteer_key(initials: &str, city: &str) -> (String, String) {
    (
        initials.trim().to_uppercase(),
        coerce::normalize_text(city).to_lowercase(),
    )
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SurveyTransformer {
    pub methane_unit: MethaneUnit,
}

impl SurveyTransformer {
    pub fn new(methane_unit: MethaneUnit) -> Self {
        Self { methane_unit }
    }

    pub fn transform(&self, raw: &RawRecordSet, reference: &ReferenceData) -> TransformOutput {
        let index = HeaderIndex::new(&raw.headers);
        let mut seen = HashSet::new();
        let mut output = TransformOutput::default();

        for row in &raw.rows {
            let result = self.transform_row(&index, row, reference).and_then(|candidate| {
                let ts = candidate.measurement.timestamp;
                if seen.insert(ts) {
                    Ok(candidate)
                } else {
                    Err(RowValidationError::DuplicateInBatch(timestamp::to_storage(ts)))
                }
            });

            match result {
                Ok(candidate) => output.valid.push(Envelope {
                    payload: candidate,
                    row_number: row.row_number,
                    received_at: SystemTime::now(),
                }),
                Err(reason) => {
                    metrics::counter!("survey_rows_rejected_total", "reason" => reason.code())
                        .increment(1);
                    output.rejected.push(RejectedRow {
                        row_number: row.row_number,
                        reason,
                        raw: row.clone(),
                    });
                }
            }
        }

        output
    }

    fn transform_row(
        &self,
        index: &HeaderIndex,
        row: &RawRow,
        reference: &ReferenceData,
    ) -> Result<CandidateMeasurement, RowValidationError> {
        let cell = |column: Column| index.cell(row, column).unwrap_or("");

        let ts = coerce::parse_timestamp(cell(Column::Timestamp))?;

        let city_raw = coerce::normalize_text(cell(Column::City));
        if city_raw.is_empty() {
            return Err(RowValidationError::MissingField("city"));
        }
        let city = reference
            .resolve_city(&city_raw)
            .ok_or_else(|| RowValidationError::UnknownCity(city_raw.clone()))?
            .to_string();

        let volunteer = coerce::normalize_text(cell(Column::Volunteer)).to_uppercase();
        if volunteer.is_empty() {
            return Err(RowValidationError::MissingField("volunteer"));
        }
        if !reference.knows_volunteer(&volunteer, &city) {
            return Err(RowValidationError::UnknownVolunteer {
                initials: volunteer,
                city,
            });
        }

        let reading = coerce::parse_number("methane_level", cell(Column::MethaneLevel))?;
        let methane_level = self.methane_unit.to_ppm(reading);

        let leak = coerce::parse_leak(cell(Column::Leak))?.unwrap_or(methane_level > 0.0);

        let (latitude, longitude) = if index.has(Column::Latitude) && index.has(Column::Longitude) {
            coerce::parse_lat_lon(cell(Column::Latitude), cell(Column::Longitude))?
        } else {
            coerce::parse_coordinates(cell(Column::Coordinates))?
        };

        let infrastructure_type = Some(coerce::normalize_text(cell(Column::InfrastructureType)))
            .filter(|s| !s.is_empty())
            .map(|s| s.to_lowercase());

        // Form uploads can list several links; the first one is kept.
        let photo_url = cell(Column::Photo)
            .split(',')
            .map(str::trim)
            .find(|s| !s.is_empty())
            .map(str::to_string);
        let photo_id = photo_url.as_ref().map(|_| coerce::photo_id(ts, &volunteer));

        Ok(CandidateMeasurement {
            measurement: NewMeasurement {
                city,
                methane_level,
                leak,
                infrastructure_type,
                photo_id,
                latitude,
                longitude,
                volunteer,
                timestamp: ts,
            },
            photo_url,
        })
    }
}
