//! Work-item sources: the tracker's JSON export and the SQLite work-item database.

pub mod json;
pub mod sqlite;

use anyhow::Result;
use std::path::PathBuf;

use crate::config::FieldKeys;
use crate::types::WorkItem;

/// WorkItemStore is a source of raw work items for the engine
pub trait WorkItemStore: Send + Sync {
    /// Loads the full collection. Any failure fails the whole load.
    fn load_all(&self) -> Result<Vec<WorkItem>>;

    /// Looks up one item by id.
    fn get(&self, id: i64) -> Result<Option<WorkItem>> {
        Ok(self.load_all()?.into_iter().find(|item| item.id == id))
    }

    fn path(&self) -> &str;
}

/// Source names the backend to open
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    JsonExport(PathBuf),
    Sqlite(PathBuf),
}

pub fn open(source: &Source, fields: &FieldKeys) -> Result<Box<dyn WorkItemStore>> {
    match source {
        Source::JsonExport(path) => Ok(Box::new(json::JsonExportStore::new(path.clone(), fields.clone()))),
        Source::Sqlite(path) => Ok(Box::new(sqlite::SqliteStore::new(path.clone())?)),
    }
}
