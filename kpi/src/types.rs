//! Core data structures for the KPI engine.

use chrono::{NaiveDate, NaiveDateTime};
use log::debug;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;

use crate::prepare::extract_sprint_number;

/// WorkItem is a tracker record after the export's opaque field keys have
/// been mapped onto named fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkItem {
    pub id: i64,
    #[serde(default, deserialize_with = "lenient_string")]
    pub title: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub state: String,
    #[serde(rename = "type", default, deserialize_with = "lenient_string")]
    pub work_item_type: String,
    #[serde(skip_serializing_if = "Option::is_none", default, deserialize_with = "lenient_opt_string")]
    pub iteration: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub created_date: Option<RawDate>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub activated_date: Option<RawDate>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub closed_date: Option<RawDate>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub prospect_date: Option<RawDate>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub analysis_date: Option<RawDate>,
    #[serde(
        rename = "tipoSolucao",
        skip_serializing_if = "Option::is_none",
        default,
        deserialize_with = "lenient_opt_string"
    )]
    pub solution_type: Option<String>,
}

/// Reads a text cell, absorbing anything that is not a string.
pub(crate) fn lenient_opt_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(Some(s)),
        Value::Null => Ok(None),
        other => {
            debug!("ignoring non-text cell {}", other);
            Ok(None)
        }
    }
}

pub(crate) fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_opt_string(deserializer)?.unwrap_or_default())
}

impl WorkItem {
    #[cfg(test)]
    pub fn new(id: i64, work_item_type: &str, iteration: &str) -> Self {
        WorkItem {
            id,
            title: String::new(),
            state: String::new(),
            work_item_type: work_item_type.to_string(),
            iteration: Some(iteration.to_string()),
            created_date: None,
            activated_date: None,
            closed_date: None,
            prospect_date: None,
            analysis_date: None,
            solution_type: None,
        }
    }

    /// Sprint number embedded in the iteration label, if any.
    pub fn sprint_number(&self) -> Option<u64> {
        self.iteration.as_deref().and_then(extract_sprint_number)
    }

    /// Creates a deterministic hash of the item's content.
    /// Covers every field except the id so that a re-export of an unchanged
    /// item produces the same hash.
    pub fn compute_content_hash(&self) -> String {
        let mut hasher = Sha256::new();

        hasher.update(self.title.as_bytes());
        hasher.update([0u8]); // separator
        hasher.update(self.state.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.work_item_type.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.iteration.as_deref().unwrap_or("").as_bytes());
        hasher.update([0u8]);

        for date in [
            &self.created_date,
            &self.activated_date,
            &self.closed_date,
            &self.prospect_date,
            &self.analysis_date,
        ] {
            if let Some(raw) = date {
                hasher.update(raw.to_string().as_bytes());
            }
            hasher.update([0u8]);
        }

        if let Some(ref solution_type) = self.solution_type {
            hasher.update(solution_type.as_bytes());
        }

        hex::encode(hasher.finalize())
    }
}

/// RawDate is a date cell exactly as the export carried it.
///
/// Anything that is neither a string nor an integer is kept as `Other` so that
/// a bad cell never fails the whole record; preparation treats it as absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawDate {
    Text(String),
    EpochMillis(i64),
    Other(Value),
}

impl From<&str> for RawDate {
    fn from(s: &str) -> Self {
        RawDate::Text(s.to_string())
    }
}

impl From<NaiveDateTime> for RawDate {
    fn from(dt: NaiveDateTime) -> Self {
        RawDate::Text(dt.format("%Y-%m-%dT%H:%M:%S").to_string())
    }
}

impl From<NaiveDate> for RawDate {
    fn from(d: NaiveDate) -> Self {
        RawDate::Text(d.format("%Y-%m-%d").to_string())
    }
}

impl fmt::Display for RawDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawDate::Text(s) => write!(f, "{}", s),
            RawDate::EpochMillis(ms) => write!(f, "{}", ms),
            RawDate::Other(v) => write!(f, "{}", v),
        }
    }
}

/// PreparedWorkItem extends WorkItem with parsed dates and sprint boundaries
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreparedWorkItem {
    #[serde(flatten)]
    pub item: WorkItem,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parsed_created_date: Option<NaiveDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parsed_activated_date: Option<NaiveDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parsed_closed_date: Option<NaiveDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parsed_prospect_date: Option<NaiveDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parsed_analysis_date: Option<NaiveDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sprint_num: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sprint_start: Option<NaiveDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sprint_end: Option<NaiveDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sprint_end_tol: Option<NaiveDateTime>,
}

/// KpiColor is the qualitative tag the dashboard paints a KPI with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KpiColor {
    Green,
    Yellow,
    Red,
    Off,
}

impl KpiColor {
    pub fn as_str(&self) -> &'static str {
        match self {
            KpiColor::Green => "green",
            KpiColor::Yellow => "yellow",
            KpiColor::Red => "red",
            KpiColor::Off => "off",
        }
    }
}

impl fmt::Display for KpiColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// KpiResult holds one computed indicator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KpiResult {
    #[serde(rename = "valor")]
    pub value: f64,
    #[serde(rename = "unidade", skip_serializing_if = "Option::is_none", default)]
    pub unit: Option<String>,
    #[serde(rename = "msg", skip_serializing_if = "Option::is_none", default)]
    pub message: Option<String>,
    #[serde(rename = "classificacao", skip_serializing_if = "Option::is_none", default)]
    pub classification: Option<String>,
    #[serde(rename = "cor", skip_serializing_if = "Option::is_none", default)]
    pub color: Option<KpiColor>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub help: Option<String>,
}

/// KpiDashboardData is the full set of indicators for one item collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpiDashboardData {
    #[serde(rename = "tempo_medio")]
    pub analysis_lead_time: KpiResult,
    #[serde(rename = "implantacao")]
    pub deployment_rate: KpiResult,
    #[serde(rename = "cronograma")]
    pub schedule_adherence: KpiResult,
    #[serde(rename = "desvio")]
    pub scope_deviation: KpiResult,
}

impl KpiDashboardData {
    /// Indicators paired with their dashboard keys, in display order.
    pub fn entries(&self) -> [(&'static str, &KpiResult); 4] {
        [
            ("tempo_medio", &self.analysis_lead_time),
            ("implantacao", &self.deployment_rate),
            ("cronograma", &self.schedule_adherence),
            ("desvio", &self.scope_deviation),
        ]
    }
}

/// WorkItemFilter restricts a collection before it reaches the engine
#[derive(Debug, Clone, Default)]
pub struct WorkItemFilter {
    pub sprint: Option<u64>,
    pub types: Vec<String>, // OR semantics
    pub state: Option<String>,
}

impl WorkItemFilter {
    pub fn matches(&self, item: &WorkItem) -> bool {
        if let Some(sprint) = self.sprint {
            if item.sprint_number() != Some(sprint) {
                return false;
            }
        }
        if !self.types.is_empty() && !self.types.iter().any(|t| *t == item.work_item_type) {
            return false;
        }
        if let Some(ref state) = self.state {
            if item.state != *state {
                return false;
            }
        }
        true
    }

    pub fn apply(&self, items: Vec<WorkItem>) -> Vec<WorkItem> {
        items.into_iter().filter(|item| self.matches(item)).collect()
    }
}
