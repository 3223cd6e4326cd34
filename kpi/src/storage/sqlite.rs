//! SQLite work-item database

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use log::info;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::storage::WorkItemStore;
use crate::types::{RawDate, WorkItem};

const SCHEMA: &str = include_str!("sqlite_schema.sql");

const SELECT_COLUMNS: &str = "SELECT id, title, state, work_item_type, iteration,
        created_date, activated_date, closed_date, prospect_date, analysis_date, solution_type
 FROM work_items";

/// ImportSummary reports what an import changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
}

/// SQLite storage for imported work items
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    path: PathBuf,
}

impl SqliteStore {
    /// Opens (or creates) the work-item database at `path`
    pub fn new(path: PathBuf) -> Result<Self> {
        let conn = Connection::open(&path)
            .with_context(|| format!("Failed to open database at {:?}", path))?;
        Self::with_connection(conn, path)
    }

    #[cfg(test)]
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::with_connection(conn, PathBuf::from(":memory:"))
    }

    fn with_connection(conn: Connection, path: PathBuf) -> Result<Self> {
        conn.execute_batch(SCHEMA)
            .context("Failed to initialize schema")?;
        Ok(SqliteStore {
            conn: Arc::new(Mutex::new(conn)),
            path,
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("database connection lock poisoned"))
    }

    /// Upserts items by id. Rows whose content hash is unchanged are left alone.
    pub fn import_items(&self, items: &[WorkItem]) -> Result<ImportSummary> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let mut summary = ImportSummary::default();

        for item in items {
            let hash = item.compute_content_hash();
            let existing: Option<String> = tx
                .query_row(
                    "SELECT content_hash FROM work_items WHERE id = ?",
                    params![item.id],
                    |row| row.get(0),
                )
                .optional()?;

            match existing {
                Some(ref h) if *h == hash => {
                    summary.unchanged += 1;
                    continue;
                }
                Some(_) => summary.updated += 1,
                None => summary.inserted += 1,
            }

            tx.execute(
                "INSERT OR REPLACE INTO work_items (
                    id, title, state, work_item_type, iteration,
                    created_date, activated_date, closed_date, prospect_date, analysis_date,
                    solution_type, content_hash, imported_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    item.id,
                    item.title,
                    item.state,
                    item.work_item_type,
                    item.iteration,
                    encode_date(&item.created_date)?,
                    encode_date(&item.activated_date)?,
                    encode_date(&item.closed_date)?,
                    encode_date(&item.prospect_date)?,
                    encode_date(&item.analysis_date)?,
                    item.solution_type,
                    hash,
                    Utc::now(),
                ],
            )?;
        }

        tx.commit()?;
        info!(
            "imported work items: {} inserted, {} updated, {} unchanged",
            summary.inserted, summary.updated, summary.unchanged
        );
        Ok(summary)
    }

    pub fn get_item(&self, id: i64) -> Result<Option<WorkItem>> {
        let conn = self.lock()?;
        let item = conn
            .query_row(
                &format!("{} WHERE id = ?", SELECT_COLUMNS),
                params![id],
                read_item,
            )
            .optional()?;
        Ok(item)
    }

    pub fn count(&self) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM work_items", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn set_metadata(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO metadata (key, value) VALUES (?, ?)",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn get_metadata(&self, key: &str) -> Result<Option<String>> {
        let conn = self.lock()?;
        let value = conn
            .query_row("SELECT value FROM metadata WHERE key = ?", params![key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }
}

impl WorkItemStore for SqliteStore {
    fn load_all(&self) -> Result<Vec<WorkItem>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!("{} ORDER BY id", SELECT_COLUMNS))?;
        let items = stmt
            .query_map([], read_item)?
            .collect::<Result<Vec<WorkItem>, _>>()?;
        info!("loaded {} work items from {:?}", items.len(), self.path);
        Ok(items)
    }

    fn get(&self, id: i64) -> Result<Option<WorkItem>> {
        self.get_item(id)
    }

    fn path(&self) -> &str {
        self.path.to_str().unwrap_or("")
    }
}

fn encode_date(date: &Option<RawDate>) -> Result<Option<String>> {
    date.as_ref()
        .map(serde_json::to_string)
        .transpose()
        .context("Failed to encode date cell")
}

fn decode_date(row: &Row, idx: usize) -> rusqlite::Result<Option<RawDate>> {
    let text: Option<String> = row.get(idx)?;
    text.map(|t| {
        serde_json::from_str(&t)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

fn read_item(row: &Row) -> rusqlite::Result<WorkItem> {
    Ok(WorkItem {
        id: row.get(0)?,
        title: row.get(1)?,
        state: row.get(2)?,
        work_item_type: row.get(3)?,
        iteration: row.get(4)?,
        created_date: decode_date(row, 5)?,
        activated_date: decode_date(row, 6)?,
        closed_date: decode_date(row, 7)?,
        prospect_date: decode_date(row, 8)?,
        analysis_date: decode_date(row, 9)?,
        solution_type: row.get(10)?,
    })
}
