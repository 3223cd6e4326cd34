//! Collection-level counters and the closed-month view.

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeSet;

use crate::error::KpiError;
use crate::kpi::EPIC_TYPE;
use crate::types::{PreparedWorkItem, WorkItem};

pub const CLOSED_STATES: &[&str] = &["Closed", "Concluído"];

/// Number of states listed in the status distribution.
const TOP_STATES: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusCount {
    pub state: String,
    pub count: usize,
}

/// Overview provides aggregate counters for a raw collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Overview {
    pub total_items: usize,
    pub closed_items: usize,
    pub epics: usize,
    pub unique_sprints: usize,
    pub status_distribution: Vec<StatusCount>,
}

pub fn overview(items: &[WorkItem]) -> Overview {
    let mut distribution: Vec<StatusCount> = Vec::new();
    for item in items {
        match distribution.iter_mut().find(|s| s.state == item.state) {
            Some(entry) => entry.count += 1,
            None => distribution.push(StatusCount {
                state: item.state.clone(),
                count: 1,
            }),
        }
    }
    // Stable sort keeps first-seen order among equal counts.
    distribution.sort_by(|a, b| b.count.cmp(&a.count));
    distribution.truncate(TOP_STATES);

    Overview {
        total_items: items.len(),
        closed_items: items
            .iter()
            .filter(|i| CLOSED_STATES.contains(&i.state.as_str()))
            .count(),
        epics: items.iter().filter(|i| i.work_item_type == EPIC_TYPE).count(),
        unique_sprints: available_sprints(items).len(),
        status_distribution: distribution,
    }
}

/// Distinct sprint numbers, most recent first.
pub fn available_sprints(items: &[WorkItem]) -> Vec<u64> {
    let sprints: BTreeSet<u64> = items.iter().filter_map(WorkItem::sprint_number).collect();
    sprints.into_iter().rev().collect()
}

fn month_key(item: &PreparedWorkItem) -> Option<String> {
    item.parsed_closed_date.map(|d| d.format("%Y-%m").to_string())
}

/// Distinct `YYYY-MM` close months, most recent first.
pub fn available_months(items: &[PreparedWorkItem]) -> Vec<String> {
    let months: BTreeSet<String> = items.iter().filter_map(month_key).collect();
    months.into_iter().rev().collect()
}

/// Items closed in `month` (`YYYY-MM`). Items without a close date are dropped.
pub fn filter_by_closed_month(
    items: &[PreparedWorkItem],
    month: &str,
) -> Result<Vec<PreparedWorkItem>, KpiError> {
    let valid = month.len() == 7
        && NaiveDate::parse_from_str(&format!("{}-01", month), "%Y-%m-%d").is_ok();
    if !valid {
        return Err(KpiError::InvalidMonth(month.to_string()));
    }

    Ok(items
        .iter()
        .filter(|i| month_key(i).as_deref() == Some(month))
        .cloned()
        .collect())
}
