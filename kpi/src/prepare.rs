//! Preparation stage: parses date cells, extracts the sprint number from the
//! iteration label and resolves sprint boundaries.
//!
//! Nothing here fails. A cell that cannot be read becomes `None` and the item
//! simply drops out of the indicators that need it.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Utc};
use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::calendar::SprintCalendar;
use crate::types::{PreparedWorkItem, RawDate, WorkItem};

static SPRINT_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Sprint ([0-9]+)").expect("sprint pattern is a valid regex"));

const NAIVE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"];

/// Finds `Sprint <n>` in an iteration label such as `Projeto\Sprint 36`.
/// Numbers wider than 64 bits count as no match.
pub fn extract_sprint_number(label: &str) -> Option<u64> {
    let captures = SPRINT_PATTERN.captures(label)?;
    captures.get(1)?.as_str().parse().ok()
}

/// Parses a raw date cell into a wall-clock timestamp.
///
/// Offsets are dropped rather than converted, so the calendar day written in
/// the source is the day that gets compared.
pub fn parse_date(raw: &RawDate) -> Option<NaiveDateTime> {
    parse_with_offset(raw).map(|(wall, _)| wall)
}

/// Parses a raw date cell into an instant. Values without an offset are
/// read as UTC.
pub fn parse_instant(raw: &RawDate) -> Option<DateTime<Utc>> {
    let (wall, offset) = parse_with_offset(raw)?;
    let shift = TimeDelta::try_seconds(i64::from(offset.local_minus_utc()))?;
    Some(wall.checked_sub_signed(shift)?.and_utc())
}

fn parse_with_offset(raw: &RawDate) -> Option<(NaiveDateTime, FixedOffset)> {
    let utc = FixedOffset::east_opt(0)?;
    match raw {
        RawDate::Text(s) => parse_date_str(s.trim(), utc),
        RawDate::EpochMillis(ms) => DateTime::<Utc>::from_timestamp_millis(*ms).map(|dt| (dt.naive_utc(), utc)),
        RawDate::Other(_) => None,
    }
}

fn parse_date_str(s: &str, utc: FixedOffset) -> Option<(NaiveDateTime, FixedOffset)> {
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some((dt.naive_local(), *dt.offset()));
    }
    for format in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
            return Some((dt, utc));
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .map(|d| (d.and_time(NaiveTime::MIN), utc))
}

fn parse_field(item_id: i64, field: &str, raw: Option<&RawDate>) -> Option<NaiveDateTime> {
    let raw = raw?;
    let parsed = parse_date(raw);
    if parsed.is_none() {
        debug!("work item {}: ignoring unparsable {} {}", item_id, field, raw);
    }
    parsed
}

fn midnight(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN)
}

pub fn prepare_item(item: &WorkItem, calendar: &SprintCalendar) -> PreparedWorkItem {
    let sprint_num = item.sprint_number();
    if sprint_num.is_none() {
        debug!("work item {}: no sprint in iteration {:?}", item.id, item.iteration);
    }

    let bounds = sprint_num.map(|n| calendar.bounds(n));

    PreparedWorkItem {
        parsed_created_date: parse_field(item.id, "createdDate", item.created_date.as_ref()),
        parsed_activated_date: parse_field(item.id, "activatedDate", item.activated_date.as_ref()),
        parsed_closed_date: parse_field(item.id, "closedDate", item.closed_date.as_ref()),
        parsed_prospect_date: parse_field(item.id, "prospectDate", item.prospect_date.as_ref()),
        parsed_analysis_date: parse_field(item.id, "analysisDate", item.analysis_date.as_ref()),
        sprint_num,
        sprint_start: bounds.and_then(|b| b.start).map(midnight),
        sprint_end: bounds.and_then(|b| b.end).map(midnight),
        sprint_end_tol: bounds.and_then(|b| b.end_tol).map(midnight),
        item: item.clone(),
    }
}

/// Prepares every item, preserving order and length.
pub fn prepare_items(items: &[WorkItem], calendar: &SprintCalendar) -> Vec<PreparedWorkItem> {
    items.iter().map(|item| prepare_item(item, calendar)).collect()
}
