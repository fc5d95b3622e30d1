use std::sync::LazyLock;

use chrono::{DateTime, NaiveDateTime};
use regex::Regex;

/// Format of the `YYYY-MM-DDTHH:MM:SS` prefix shared by every remote timestamp.
const LOCAL_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Byte length of the `YYYY-MM-DDTHH:MM:SS` prefix. Offset markers only count after it.
const SECONDS_FIELD_END: usize = 19;

static RE_COMPACT_OFFSET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([+-])(\d{2})(\d{2})$").unwrap());

type ParseStrategy = fn(&str) -> Option<NaiveDateTime>;

/// Tried in order; the first strategy that yields a value wins.
const STRATEGIES: &[ParseStrategy] = &[parse_zulu, parse_with_offset, parse_local_prefix];

/// Parse a remote (Jira) timestamp into a wall-clock date-time.
///
/// Accepted shapes:
/// - `2024-01-15T10:30:00.000Z`
/// - `2024-01-15T10:30:00.000+0000`
/// - `2024-01-15T10:30:00.000+00:00`
/// - `2024-01-15T10:30:00` (with or without fractional seconds)
///
/// The zone is dropped after parsing: the result is the local time as written
/// in the source offset. Empty or unparseable input yields `None`.
pub fn parse_remote_timestamp(input: Option<&str>) -> Option<NaiveDateTime> {
    let s = input?.trim();
    if s.is_empty() {
        return None;
    }
    STRATEGIES.iter().find_map(|strategy| strategy(s))
}

fn parse_zulu(s: &str) -> Option<NaiveDateTime> {
    if !s.ends_with('Z') {
        return None;
    }
    DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.naive_local())
}

fn parse_with_offset(s: &str) -> Option<NaiveDateTime> {
    let tail = s.get(SECONDS_FIELD_END..)?;
    if !tail.contains(['+', '-']) {
        return None;
    }
    let normalized = if tail.contains(':') {
        s.to_string()
    } else {
        RE_COMPACT_OFFSET.replace(s, "${1}${2}:${3}").into_owned()
    };
    DateTime::parse_from_rfc3339(&normalized)
        .ok()
        .map(|dt| dt.naive_local())
}

fn parse_local_prefix(s: &str) -> Option<NaiveDateTime> {
    let prefix = s.get(..SECONDS_FIELD_END)?;
    NaiveDateTime::parse_from_str(prefix, LOCAL_FORMAT).ok()
}

/// Elapsed time between two date-times in fractional hours at minute resolution.
/// A negative span (end before start) stays negative.
pub fn hours_between(start: NaiveDateTime, end: NaiveDateTime) -> f64 {
    let elapsed = end - start;
    elapsed.num_hours() as f64 + (elapsed.num_minutes() % 60) as f64 / 60.0
}
