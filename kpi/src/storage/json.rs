//! JSON export loaders for tracker work items and Orquestra tickets

use anyhow::{anyhow, Context, Result};
use log::info;
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::config::FieldKeys;
use crate::error::KpiError;
use crate::orquestra::Ticket;
use crate::storage::WorkItemStore;
use crate::types::WorkItem;

const PROSPECT_KEY: &str = "prospectDate";
const ANALYSIS_KEY: &str = "analysisDate";
const SOLUTION_TYPE_KEY: &str = "tipoSolucao";

/// JsonExportStore reads a tracker export and caches it after the first load
pub struct JsonExportStore {
    path: PathBuf,
    fields: FieldKeys,
    cache: Mutex<Option<Vec<WorkItem>>>,
}

impl JsonExportStore {
    pub fn new(path: PathBuf, fields: FieldKeys) -> Self {
        JsonExportStore {
            path,
            fields,
            cache: Mutex::new(None),
        }
    }

    fn cache(&self) -> Result<MutexGuard<'_, Option<Vec<WorkItem>>>> {
        self.cache
            .lock()
            .map_err(|_| anyhow!("work item cache lock poisoned"))
    }

    /// Drops the cached collection so the next load re-reads the file
    #[cfg(test)]
    pub fn clear_cache(&self) -> Result<()> {
        *self.cache()? = None;
        Ok(())
    }
}

impl WorkItemStore for JsonExportStore {
    fn load_all(&self) -> Result<Vec<WorkItem>> {
        let mut cache = self.cache()?;
        if let Some(ref items) = *cache {
            return Ok(items.clone());
        }

        let text = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read export at {:?}", self.path))?;
        let items = parse_export(&text, &self.fields)
            .with_context(|| format!("Failed to parse export at {:?}", self.path))?;
        info!("loaded {} work items from {:?}", items.len(), self.path);

        *cache = Some(items.clone());
        Ok(items)
    }

    fn path(&self) -> &str {
        self.path.to_str().unwrap_or("")
    }
}

/// Parses an export document: a JSON array of flat records.
pub fn parse_export(text: &str, fields: &FieldKeys) -> Result<Vec<WorkItem>> {
    let records: Vec<Value> = serde_json::from_str(text).context("Export is not a JSON array")?;
    let items = records
        .into_iter()
        .enumerate()
        .map(|(index, record)| map_record(index, record, fields))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(items)
}

/// Maps one export record onto a WorkItem, renaming the configured keys.
pub fn map_record(index: usize, record: Value, fields: &FieldKeys) -> Result<WorkItem, KpiError> {
    let Value::Object(mut map) = record else {
        return Err(KpiError::InvalidRecord {
            index,
            reason: "not a JSON object".to_string(),
        });
    };

    rename_key(&mut map, &fields.prospect, PROSPECT_KEY);
    rename_key(&mut map, &fields.analysis, ANALYSIS_KEY);
    rename_key(&mut map, &fields.solution_type, SOLUTION_TYPE_KEY);

    serde_json::from_value(Value::Object(map)).map_err(|e| KpiError::InvalidRecord {
        index,
        reason: e.to_string(),
    })
}

/// Reads a ticket export: a JSON array of Orquestra ticket records.
pub fn load_tickets(path: &Path) -> Result<Vec<Ticket>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read ticket export at {:?}", path))?;
    let tickets = parse_ticket_export(&text)
        .with_context(|| format!("Failed to parse ticket export at {:?}", path))?;
    info!("loaded {} tickets from {:?}", tickets.len(), path);
    Ok(tickets)
}

pub fn parse_ticket_export(text: &str) -> Result<Vec<Ticket>> {
    let records: Vec<Value> = serde_json::from_str(text).context("Ticket export is not a JSON array")?;
    let tickets = records
        .into_iter()
        .enumerate()
        .map(|(index, record)| {
            if !record.is_object() {
                return Err(KpiError::InvalidRecord {
                    index,
                    reason: "not a JSON object".to_string(),
                });
            }
            serde_json::from_value(record).map_err(|e| KpiError::InvalidRecord {
                index,
                reason: e.to_string(),
            })
        })
        .collect::<Result<Vec<Ticket>, _>>()?;
    Ok(tickets)
}

fn rename_key(map: &mut Map<String, Value>, from: &str, to: &str) {
    if from == to {
        return;
    }
    if let Some(value) = map.remove(from) {
        map.insert(to.to_string(), value);
    }
}
