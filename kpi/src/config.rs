//! Layered settings: built-in defaults, an optional TOML file, then `KPI_*`
//! environment variables.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use ::config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::calendar::{SprintCalendar, DEFAULT_GRACE_DAYS, DEFAULT_SPRINT_LENGTH_DAYS};
use crate::error::KpiError;

/// Looked up in the working directory when no explicit path is given.
pub const DEFAULT_CONFIG_FILE: &str = "kpi.toml";
pub const ENV_PREFIX: &str = "KPI";

pub const DEFAULT_PROSPECT_FIELD: &str = "Custom.d583d2dc-0ad4-47a8-b36e-14c73ce0bb26";
pub const DEFAULT_ANALYSIS_FIELD: &str = "Custom.53fe01b9-fe2d-4e69-9cb7-a53b6e748c0e";
pub const DEFAULT_SOLUTION_TYPE_FIELD: &str = "tipoSolucao";

/// FieldKeys names the export keys that hold the named work-item fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldKeys {
    pub prospect: String,
    pub analysis: String,
    pub solution_type: String,
}

impl Default for FieldKeys {
    fn default() -> Self {
        FieldKeys {
            prospect: DEFAULT_PROSPECT_FIELD.to_string(),
            analysis: DEFAULT_ANALYSIS_FIELD.to_string(),
            solution_type: DEFAULT_SOLUTION_TYPE_FIELD.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalendarSettings {
    pub sprint_length_days: i64,
    pub grace_days: i64,
    /// Sprint number to `YYYY-MM-DD` end date.
    pub sprints: BTreeMap<String, String>,
}

impl Default for CalendarSettings {
    fn default() -> Self {
        CalendarSettings {
            sprint_length_days: DEFAULT_SPRINT_LENGTH_DAYS,
            grace_days: DEFAULT_GRACE_DAYS,
            sprints: SprintCalendar::default()
                .entries()
                .map(|(sprint, end)| (sprint.to_string(), end.format("%Y-%m-%d").to_string()))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub fields: FieldKeys,
    pub calendar: CalendarSettings,
}

impl Settings {
    /// Loads settings. An explicit path must exist; the default file is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(p) => File::from(p).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let settings = Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to read configuration")?
            .try_deserialize::<Settings>()
            .context("Invalid configuration")?;

        log::debug!("loaded settings: {:?}", settings);
        Ok(settings)
    }

    /// Builds the validated sprint calendar.
    pub fn sprint_calendar(&self) -> Result<SprintCalendar, KpiError> {
        let mut ends = BTreeMap::new();
        for (key, value) in &self.calendar.sprints {
            let sprint: u32 = key
                .trim()
                .parse()
                .map_err(|_| KpiError::InvalidSprintNumber(key.clone()))?;
            let end = NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| {
                KpiError::InvalidCalendarDate {
                    sprint,
                    value: value.clone(),
                }
            })?;
            ends.insert(sprint, end);
        }

        SprintCalendar::new(ends)?
            .with_sprint_length(self.calendar.sprint_length_days)?
            .with_grace_days(self.calendar.grace_days)
    }
}
