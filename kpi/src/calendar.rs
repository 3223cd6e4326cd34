//! Sprint calendar: authoritative sprint end dates plus fixed-length
//! extrapolation for sprints outside the table.

use chrono::{NaiveDate, TimeDelta};
use log::debug;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::error::KpiError;

pub const DEFAULT_SPRINT_LENGTH_DAYS: i64 = 21;
pub const DEFAULT_GRACE_DAYS: i64 = 1;

/// Sprints further than this from the anchor are not extrapolated.
pub const MAX_EXTRAPOLATED_SPRINTS: i64 = 5_000;

/// Known sprint end dates as (sprint, year, month, day).
const DEFAULT_SPRINT_ENDS: &[(u32, i32, u32, u32)] = &[
    (28, 2025, 8, 8),
    (29, 2025, 8, 29),
    (30, 2025, 9, 19),
    (31, 2025, 10, 10),
    (32, 2025, 10, 31),
    (33, 2025, 11, 21),
    (34, 2025, 12, 12),
    (35, 2026, 1, 23),
    (36, 2026, 2, 13),
];

/// SprintBounds holds the resolved dates of one sprint. Each date resolves on
/// its own: the start depends on the previous sprint, which may fall outside
/// the extrapolation bound while the sprint itself does not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SprintBounds {
    pub sprint: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_tol: Option<NaiveDate>,
}

impl SprintBounds {
    pub fn is_unresolved(&self) -> bool {
        self.start.is_none() && self.end.is_none() && self.end_tol.is_none()
    }
}

/// SprintCalendar maps sprint numbers to end dates.
///
/// The highest tabulated sprint is the anchor: any sprint missing from the
/// table ends `(anchor - sprint) * sprint_length_days` days before the
/// anchor's end, which moves forward for sprints past the anchor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SprintCalendar {
    ends: BTreeMap<u32, NaiveDate>,
    sprint_length_days: i64,
    grace_days: i64,
}

impl SprintCalendar {
    pub fn new(ends: BTreeMap<u32, NaiveDate>) -> Result<Self, KpiError> {
        if ends.is_empty() {
            return Err(KpiError::EmptyCalendar);
        }
        Ok(SprintCalendar {
            ends,
            sprint_length_days: DEFAULT_SPRINT_LENGTH_DAYS,
            grace_days: DEFAULT_GRACE_DAYS,
        })
    }

    pub fn with_sprint_length(mut self, days: i64) -> Result<Self, KpiError> {
        if days <= 0 {
            return Err(KpiError::InvalidSprintLength(days));
        }
        self.sprint_length_days = days;
        Ok(self)
    }

    pub fn with_grace_days(mut self, days: i64) -> Result<Self, KpiError> {
        if days < 0 {
            return Err(KpiError::InvalidGraceDays(days));
        }
        self.grace_days = days;
        Ok(self)
    }

    /// Highest tabulated sprint and its end date.
    pub fn anchor(&self) -> Option<(u32, NaiveDate)> {
        self.ends.iter().next_back().map(|(s, d)| (*s, *d))
    }

    /// Tabulated entries in sprint order.
    pub fn entries(&self) -> impl Iterator<Item = (u32, NaiveDate)> + '_ {
        self.ends.iter().map(|(s, d)| (*s, *d))
    }

    /// Resolves the end date of a sprint. Takes a signed number so the sprint
    /// before sprint 0 can be resolved too.
    pub fn end_date(&self, sprint: i64) -> Option<NaiveDate> {
        if let Some(date) = u32::try_from(sprint).ok().and_then(|s| self.ends.get(&s)) {
            return Some(*date);
        }

        let (anchor, anchor_end) = self.anchor()?;
        let offset = i64::from(anchor) - sprint;
        if offset.abs() > MAX_EXTRAPOLATED_SPRINTS {
            debug!(
                "sprint {} is {} sprints from anchor {}, not extrapolating",
                sprint, offset, anchor
            );
            return None;
        }

        let days = offset.checked_mul(self.sprint_length_days)?;
        anchor_end.checked_sub_signed(TimeDelta::try_days(days)?)
    }

    /// First day of a sprint: the day after the previous sprint's end.
    pub fn start_date(&self, sprint: i64) -> Option<NaiveDate> {
        self.end_date(sprint.checked_sub(1)?)?.succ_opt()
    }

    /// End date plus the grace period.
    pub fn tolerance_end(&self, sprint: i64) -> Option<NaiveDate> {
        let end = self.end_date(sprint)?;
        end.checked_add_signed(TimeDelta::try_days(self.grace_days)?)
    }

    pub fn bounds(&self, sprint: u64) -> SprintBounds {
        let n = i64::try_from(sprint).ok();
        SprintBounds {
            sprint,
            start: n.and_then(|n| self.start_date(n)),
            end: n.and_then(|n| self.end_date(n)),
            end_tol: n.and_then(|n| self.tolerance_end(n)),
        }
    }
}

impl Default for SprintCalendar {
    fn default() -> Self {
        let ends = DEFAULT_SPRINT_ENDS
            .iter()
            .filter_map(|&(sprint, y, m, d)| NaiveDate::from_ymd_opt(y, m, d).map(|date| (sprint, date)))
            .collect();
        SprintCalendar {
            ends,
            sprint_length_days: DEFAULT_SPRINT_LENGTH_DAYS,
            grace_days: DEFAULT_GRACE_DAYS,
        }
    }
}
