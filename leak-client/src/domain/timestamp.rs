//! Measurement timestamps are naive wall-clock times (survey forms carry no
//! zone). They are stored as `YYYY-MM-DD HH:MM:SS` text, which sorts
//! chronologically and doubles as the measurement dedup key.

use time::{format_description::FormatItem, macros::format_description, PrimitiveDateTime};

pub const STORAGE_FORMAT: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

pub fn to_storage(ts: PrimitiveDateTime) -> String {
    // The format has no optional components, so formatting cannot fail for
    // years in the four-digit range the transformer admits.
    ts.format(STORAGE_FORMAT).unwrap_or_else(|_| ts.to_string())
}

pub fn from_storage(s: &str) -> Result<PrimitiveDateTime, time::error::Parse> {
    PrimitiveDateTime::parse(s, STORAGE_FORMAT)
}
