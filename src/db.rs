use std::path::Path;

use rusqlite::{params, Connection, Transaction};
use thiserror::Error;
use tracing::info;

use crate::models::{NewEvent, StoredEvent};
use crate::utils;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        utils::ensure_parent(path);
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let store = Self {
            conn: Connection::open_in_memory()?,
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> rusqlite::Result<()> {
        // Column caps mirror the extractor's truncation limits. Image URLs are
        // stored whole; a cut URL would point nowhere.
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS events(
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL CHECK (length(name) <= 80),
                date TEXT NOT NULL CHECK (length(date) <= 120),
                description TEXT NOT NULL CHECK (length(description) <= 200),
                url TEXT NOT NULL CHECK (length(url) <= 200),
                image_url TEXT
            );",
        )?;
        Ok(())
    }

    /// Swaps the whole event table for `batch` in one transaction.
    ///
    /// Any failure rolls back, leaving the previous snapshot untouched.
    pub fn replace_all(&mut self, batch: &[NewEvent]) -> Result<usize, StoreError> {
        let tx = self.conn.transaction()?;
        let removed = delete_all(&tx)?;
        let inserted = bulk_insert(&tx, batch)?;
        tx.commit()?;
        info!(removed, inserted, "event snapshot replaced");
        Ok(inserted)
    }

    pub fn list_events(&self) -> Result<Vec<StoredEvent>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, date, description, url, image_url FROM events ORDER BY id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(StoredEvent {
                id: row.get(0)?,
                name: row.get(1)?,
                date: row.get(2)?,
                description: row.get(3)?,
                url: row.get(4)?,
                image_url: row.get(5)?,
            })
        })?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn count(&self) -> Result<i64, StoreError> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))?;
        Ok(count)
    }
}

fn delete_all(tx: &Transaction<'_>) -> rusqlite::Result<usize> {
    tx.execute("DELETE FROM events", [])
}

fn bulk_insert(tx: &Transaction<'_>, batch: &[NewEvent]) -> rusqlite::Result<usize> {
    let mut stmt = tx.prepare(
        "INSERT INTO events (name, date, description, url, image_url)
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;
    for event in batch {
        stmt.execute(params![
            event.name,
            event.date,
            event.description,
            event.url,
            event.image_url
        ])?;
    }
    Ok(batch.len())
}
