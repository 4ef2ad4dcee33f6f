//! Feed protocol implementations

pub mod v2;
pub mod v3;

pub use v2::V2OData;
pub use v3::V3Json;

use chrono::{DateTime, NaiveDateTime, Utc};

/// Parse a feed timestamp
///
/// Feeds send either RFC 3339 (`2020-01-02T03:04:05Z`) or a bare
/// `Edm.DateTime` without offset, which is taken as UTC.
pub(crate) fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|naive| naive.and_utc())
        })
}

/// Quote a value for an OData string literal and percent-encode it
pub(crate) fn encode_literal(value: &str) -> String {
    urlencoding::encode(&value.replace('\'', "''")).into_owned()
}
