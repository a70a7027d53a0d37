use time::PrimitiveDateTime;

/// A persisted survey measurement.
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    pub measurement_id: i64,
    pub city: String,
    pub methane_level: f64,
    pub leak: bool,
    pub infrastructure_type: Option<String>,
    pub photo_id: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub volunteer: String,
    pub timestamp: PrimitiveDateTime,
}

/// A validated measurement ready to be inserted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMeasurement {
    pub city: String,
    pub methane_level: f64,
    pub leak: bool,
    pub infrastructure_type: Option<String>,
    pub photo_id: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub volunteer: String,
    pub timestamp: PrimitiveDateTime,
}
