//! Typed errors for configuration and input validation.
//!
//! Malformed work-item data is never an error; these cover the places where a
//! wrong value must fail loudly instead of being absorbed.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum KpiError {
    #[error("sprint calendar has no entries")]
    EmptyCalendar,

    #[error("invalid sprint number in calendar: {0:?}")]
    InvalidSprintNumber(String),

    #[error("invalid end date {value:?} for sprint {sprint} (expected YYYY-MM-DD)")]
    InvalidCalendarDate { sprint: u32, value: String },

    #[error("sprint length must be positive (got {0} days)")]
    InvalidSprintLength(i64),

    #[error("grace period cannot be negative (got {0} days)")]
    InvalidGraceDays(i64),

    #[error("invalid month {0:?} (expected YYYY-MM)")]
    InvalidMonth(String),

    #[error("invalid record at position {index}: {reason}")]
    InvalidRecord { index: usize, reason: String },
}
