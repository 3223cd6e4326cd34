//! Project timeline: phases of activities plus risks and lessons learned.

use serde::{Deserialize, Serialize};
use std::fmt;

/// ActivityStatus is the delivery state of a timeline activity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActivityStatus {
    #[serde(rename = "Entregue")]
    Delivered,
    #[serde(rename = "Em andamento")]
    InProgress,
    #[serde(rename = "Não iniciado")]
    NotStarted,
}

impl ActivityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityStatus::Delivered => "Entregue",
            ActivityStatus::InProgress => "Em andamento",
            ActivityStatus::NotStarted => "Não iniciado",
        }
    }
}

impl fmt::Display for ActivityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    pub id: String,
    pub name: String,
    pub status: ActivityStatus,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Phase {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub progress: u8,
    #[serde(default)]
    pub activities: Vec<Activity>,
}

impl Phase {
    pub fn delivered(&self) -> usize {
        self.activities
            .iter()
            .filter(|a| a.status == ActivityStatus::Delivered)
            .count()
    }

    /// Percentage of delivered activities, rounded; 0 for an empty phase.
    pub fn computed_progress(&self) -> u8 {
        let total = self.activities.len();
        if total == 0 {
            return 0;
        }
        ((self.delivered() as f64 / total as f64) * 100.0).round() as u8
    }
}

/// Note is a free-text risk or lesson entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub id: String,
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeline {
    #[serde(default)]
    pub phases: Vec<Phase>,
    #[serde(default)]
    pub risks: Vec<Note>,
    #[serde(default)]
    pub lessons: Vec<Note>,
}

impl Timeline {
    /// Overwrites each phase's stored progress with the computed one.
    pub fn refresh_progress(&mut self) {
        for phase in &mut self.phases {
            phase.progress = phase.computed_progress();
        }
    }
}
