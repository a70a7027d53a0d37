//! Cell-level coercions. Each returns the row rejection reason on failure.

use leak_client::domain::timestamp;
use serde::Deserialize;
use time::{
    format_description::FormatItem,
    macros::{datetime, format_description},
    PrimitiveDateTime,
};

use super::RowValidationError;

const TRUTHY: &[&str] = &["yes", "y", "true", "t", "1"];
const FALSY: &[&str] = &["no", "n", "false", "f", "0"];

/// Timestamp layouts accepted from the sheet, Google Forms' own first.
const TIMESTAMP_FORMATS: &[&[FormatItem<'static>]] = &[
    format_description!(
        "[month padding:none]/[day padding:none]/[year] [hour padding:none]:[minute]:[second]"
    ),
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"),
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
];

/// Unit the survey instrument reports methane in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MethaneUnit {
    #[default]
    Ppm,
    /// Percent of the lower explosive limit; 100 %LEL is 50 000 ppm.
    Lel,
}

impl MethaneUnit {
    pub fn to_ppm(self, value: f64) -> f64 {
        match self {
            MethaneUnit::Ppm => value,
            MethaneUnit::Lel => value * 50000.0 * 0.01,
        }
    }
}

/// Collapse internal whitespace and trim.
pub fn normalize_text(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// `Ok(None)` for an empty cell; otherwise the token must be a recognized
/// yes/no spelling.
pub fn parse_leak(raw: &str) -> Result<Option<bool>, RowValidationError> {
    let token = raw.trim().to_ascii_lowercase();
    if token.is_empty() {
        Ok(None)
    } else if TRUTHY.contains(&token.as_str()) {
        Ok(Some(true))
    } else if FALSY.contains(&token.as_str()) {
        Ok(Some(false))
    } else {
        Err(RowValidationError::InvalidBoolean(raw.trim().to_string()))
    }
}

pub fn parse_number(field: &'static str, raw: &str) -> Result<f64, RowValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(RowValidationError::MissingField(field));
    }
    match trimmed.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(RowValidationError::InvalidNumber {
            field,
            value: trimmed.to_string(),
        }),
    }
}

pub fn parse_timestamp(raw: &str) -> Result<PrimitiveDateTime, RowValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(RowValidationError::MissingField("timestamp"));
    }
    let ts = TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| PrimitiveDateTime::parse(trimmed, fmt).ok())
        .ok_or_else(|| RowValidationError::InvalidTimestamp(trimmed.to_string()))?;

    let min_ts = datetime!(2000-01-01 00:00:00);
    let max_ts = datetime!(2100-01-01 00:00:00);
    if ts < min_ts || ts > max_ts {
        return Err(RowValidationError::TimestampOutOfRange(timestamp::to_storage(ts)));
    }
    Ok(ts)
}

fn check_position(lat: f64, lon: f64, raw: &str) -> Result<(f64, f64), RowValidationError> {
    if (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lon) {
        Ok((lat, lon))
    } else {
        Err(RowValidationError::InvalidCoordinates(raw.trim().to_string()))
    }
}

/// Separate latitude/longitude cells.
pub fn parse_lat_lon(lat: &str, lon: &str) -> Result<(f64, f64), RowValidationError> {
    let lat_v = parse_number("latitude", lat)?;
    let lon_v = parse_number("longitude", lon)?;
    check_position(lat_v, lon_v, &format!("{}, {}", lat.trim(), lon.trim()))
}

fn parse_axis(part: &str, negative: char, positive: char) -> Option<f64> {
    let part = part.trim().trim_end_matches('°').trim();
    let (number, hemisphere) = match part.chars().last() {
        Some(c) if c.is_ascii_alphabetic() => (&part[..part.len() - 1], Some(c.to_ascii_uppercase())),
        _ => (part, None),
    };
    let value: f64 = number.trim().trim_end_matches('°').trim().parse().ok()?;
    if !value.is_finite() {
        return None;
    }
    match hemisphere {
        None => Some(value),
        Some(h) if h == negative => Some(-value.abs()),
        Some(h) if h == positive => Some(value),
        Some(_) => None,
    }
}

/// A single coordinates cell: `(44.80, -68.77)`, `44.80, -68.77` or
/// `44.80° N, 68.77° W`.
pub fn parse_coordinates(raw: &str) -> Result<(f64, f64), RowValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(RowValidationError::MissingField("coordinates"));
    }
    let invalid = || RowValidationError::InvalidCoordinates(trimmed.to_string());

    let inner = trimmed.trim_start_matches('(').trim_end_matches(')');
    let mut parts = inner.split(',');
    let (Some(lat), Some(lon), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(invalid());
    };
    let lat = parse_axis(lat, 'S', 'N').ok_or_else(invalid)?;
    let lon = parse_axis(lon, 'W', 'E').ok_or_else(invalid)?;
    check_position(lat, lon, trimmed)
}

/// Stable photo id for a measurement, so re-running the ETL over the same
/// row never mints a new id.
pub fn photo_id(ts: PrimitiveDateTime, volunteer: &str) -> String {
    let stamp = timestamp::to_storage(ts);
    let mut h = blake3::Hasher::new();
    for part in [stamp.as_str(), volunteer] {
        h.update(&(part.len() as u32).to_le_bytes());
        h.update(part.as_bytes());
    }
    let hex = h.finalize().to_hex();
    format!("photo-{}", &hex[..32])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leak_tokens_are_case_insensitive() {
        for token in ["yes", "YES", "1", "true", " Y "] {
            assert_eq!(parse_leak(token).unwrap(), Some(true), "{token}");
        }
        for token in ["no", "False", "0"] {
            assert_eq!(parse_leak(token).unwrap(), Some(false), "{token}");
        }
        assert_eq!(parse_leak("  ").unwrap(), None);
        assert_eq!(
            parse_leak("maybe").unwrap_err(),
            RowValidationError::InvalidBoolean("maybe".to_string())
        );
    }

    #[test]
    fn numbers_keep_sign_and_precision() {
        assert_eq!(parse_number("methane_level", " -0.125 ").unwrap(), -0.125);
        assert!(matches!(
            parse_number("methane_level", "N/A"),
            Err(RowValidationError::InvalidNumber { field: "methane_level", .. })
        ));
        assert!(parse_number("methane_level", "NaN").is_err());
        assert_eq!(
            parse_number("methane_level", "").unwrap_err(),
            RowValidationError::MissingField("methane_level")
        );
    }

    #[test]
    fn timestamps_accept_form_and_iso_layouts() {
        let expected = datetime!(2024-07-01 09:05:00);
        assert_eq!(parse_timestamp("7/1/2024 9:05:00").unwrap(), expected);
        assert_eq!(parse_timestamp("07/01/2024 09:05:00").unwrap(), expected);
        assert_eq!(parse_timestamp("2024-07-01 09:05:00").unwrap(), expected);
        assert_eq!(parse_timestamp("2024-07-01T09:05:00").unwrap(), expected);
        assert!(matches!(
            parse_timestamp("yesterday"),
            Err(RowValidationError::InvalidTimestamp(_))
        ));
        assert!(matches!(
            parse_timestamp("1/1/1999 00:00:00"),
            Err(RowValidationError::TimestampOutOfRange(_))
        ));
    }

    #[test]
    fn timestamp_window_ends_are_inclusive() {
        assert_eq!(
            parse_timestamp("2000-01-01 00:00:00").unwrap(),
            datetime!(2000-01-01 00:00:00)
        );
        assert_eq!(
            parse_timestamp("1/1/2100 0:00:00").unwrap(),
            datetime!(2100-01-01 00:00:00)
        );
        assert_eq!(
            parse_timestamp("2100-01-01 00:00:01"),
            Err(RowValidationError::TimestampOutOfRange("2100-01-01 00:00:01".to_string()))
        );
        assert_eq!(
            parse_timestamp("1999-12-31T23:59:59"),
            Err(RowValidationError::TimestampOutOfRange("1999-12-31 23:59:59".to_string()))
        );
    }

    #[test]
    fn coordinates_in_several_spellings() {
        assert_eq!(parse_coordinates("(44.8, -68.77)").unwrap(), (44.8, -68.77));
        assert_eq!(parse_coordinates("44.8,-68.77").unwrap(), (44.8, -68.77));
        assert_eq!(parse_coordinates("44.8° N, 68.77° W").unwrap(), (44.8, -68.77));
        assert_eq!(parse_coordinates("12.5S, 30E").unwrap(), (-12.5, 30.0));
        assert!(matches!(
            parse_coordinates("(95.0, 10.0)"),
            Err(RowValidationError::InvalidCoordinates(_))
        ));
        assert!(parse_coordinates("somewhere downtown").is_err());
        assert!(parse_coordinates("1, 2, 3").is_err());
    }

    #[test]
    fn lel_converts_to_ppm() {
        assert_eq!(MethaneUnit::Lel.to_ppm(2.0), 1000.0);
        assert_eq!(MethaneUnit::Ppm.to_ppm(2.0), 2.0);
    }

    #[test]
    fn photo_id_is_deterministic() {
        let ts = datetime!(2024-07-01 10:00:00);
        assert_eq!(photo_id(ts, "JD"), photo_id(ts, "JD"));
        assert_ne!(photo_id(ts, "JD"), photo_id(ts, "SR"));
        assert_eq!(photo_id(ts, "JD").len(), "photo-".len() + 32);
    }

    #[test]
    fn text_whitespace_is_collapsed() {
        assert_eq!(normalize_text("  service \t line "), "service line");
    }
}
