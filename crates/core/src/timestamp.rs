//! Timestamp parsing and formatting for stored failure entries.
//!
//! Workers stamp failures as `YYYY/MM/DD HH:MM:SS <ZONE>`; older entries and
//! hand-written filter bounds show up in RFC 3339 or plain date form.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Offset, TimeZone, Utc};

use crate::error::{RecordError, RecordResult};

/// Format used when this tool stamps a record (`retried_at`).
pub const STAMP_FORMAT: &str = "%Y/%m/%d %H:%M:%S";

/// Format of the day key used when grouping by date.
pub const DAY_FORMAT: &str = "%Y/%m/%d";

const OFFSET_FORMATS: [&str; 2] = ["%Y/%m/%d %H:%M:%S %z", "%Y-%m-%d %H:%M:%S %z"];
const NAIVE_FORMATS: [&str; 3] = ["%Y/%m/%d %H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];
const DATE_FORMATS: [&str; 2] = ["%Y/%m/%d", "%Y-%m-%d"];

/// Zone abbreviations workers commonly stamp with `%Z`, as UTC offsets in minutes.
///
/// Abbreviations shared by several zones (e.g. `IST`) take their most common
/// reading.
const ZONE_ABBREVIATIONS: [(&str, i32); 40] = [
    ("UTC", 0),
    ("GMT", 0),
    ("UT", 0),
    ("Z", 0),
    ("WET", 0),
    ("WEST", 60),
    ("BST", 60),
    ("CET", 60),
    ("CEST", 120),
    ("MET", 60),
    ("MEST", 120),
    ("EET", 120),
    ("EEST", 180),
    ("MSK", 180),
    ("IST", 330),
    ("PKT", 300),
    ("ICT", 420),
    ("WIB", 420),
    ("CST", -360),
    ("CDT", -300),
    ("EST", -300),
    ("EDT", -240),
    ("MST", -420),
    ("MDT", -360),
    ("PST", -480),
    ("PDT", -420),
    ("AKST", -540),
    ("AKDT", -480),
    ("HST", -600),
    ("AST", -240),
    ("NST", -210),
    ("BRT", -180),
    ("ART", -180),
    ("HKT", 480),
    ("SGT", 480),
    ("AWST", 480),
    ("JST", 540),
    ("KST", 540),
    ("AEST", 600),
    ("AEDT", 660),
];

/// Parse a stored or user-supplied timestamp, keeping its original offset.
///
/// Zone-less values are read as UTC. A trailing zone abbreviation is resolved
/// through a fixed offset table; abbreviations outside it are rejected rather
/// than guessed.
pub fn parse_with_offset(raw: &str) -> RecordResult<DateTime<FixedOffset>> {
    let s = raw.trim();

    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Ok(t);
    }
    for fmt in OFFSET_FORMATS {
        if let Ok(t) = DateTime::parse_from_str(s, fmt) {
            return Ok(t);
        }
    }

    let (local, offset) = match split_zone(s) {
        Some((rest, zone)) => match zone_offset(zone) {
            Some(offset) => (rest, offset),
            None => return Err(RecordError::invalid_timestamp(raw)),
        },
        None => (s, Utc.fix()),
    };

    for fmt in NAIVE_FORMATS {
        if let Ok(t) = NaiveDateTime::parse_from_str(local, fmt) {
            return from_local(offset, t).ok_or_else(|| RecordError::invalid_timestamp(raw));
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(local, fmt) {
            return from_local(offset, d.and_time(NaiveTime::default()))
                .ok_or_else(|| RecordError::invalid_timestamp(raw));
        }
    }

    Err(RecordError::invalid_timestamp(raw))
}

/// Parse a timestamp and normalize it to UTC for comparisons.
pub fn parse_timestamp(raw: &str) -> RecordResult<DateTime<Utc>> {
    parse_with_offset(raw).map(|t| t.with_timezone(&Utc))
}

/// Calendar day a stamp was written on, read from its leading `YYYY/MM/DD`
/// (or `YYYY-MM-DD`) without interpreting the zone.
pub fn leading_day(raw: &str) -> Option<NaiveDate> {
    let prefix = raw.trim_start().get(..10)?;
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(prefix, fmt).ok())
}

/// Render a timestamp the way this tool stamps records.
pub fn format_stamp(at: DateTime<Utc>) -> String {
    at.format(STAMP_FORMAT).to_string()
}

/// Split a trailing alphabetic zone token (`... JST`, `...Z`) off `s`.
fn split_zone(s: &str) -> Option<(&str, &str)> {
    if let Some((rest, zone)) = s.rsplit_once(' ') {
        if !zone.is_empty() && zone.chars().all(|c| c.is_ascii_alphabetic()) {
            return Some((rest.trim_end(), zone));
        }
    }
    s.strip_suffix('Z').map(|rest| (rest, "Z"))
}

fn zone_offset(zone: &str) -> Option<FixedOffset> {
    let zone = zone.to_ascii_uppercase();
    ZONE_ABBREVIATIONS
        .iter()
        .find(|(name, _)| *name == zone)
        .and_then(|(_, minutes)| FixedOffset::east_opt(minutes * 60))
}

fn from_local(offset: FixedOffset, local: NaiveDateTime) -> Option<DateTime<FixedOffset>> {
    offset.from_local_datetime(&local).single()
}
