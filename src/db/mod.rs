use rusqlite::{Connection, OptionalExtension, TransactionBehavior};
use serde_json::Value;
use std::path::Path;

use crate::error::TrackerResult;

pub mod store;

const UPSERT_DOCUMENT: &str =
    "INSERT INTO documents (path, body, updated_at, revision)
     VALUES (?1, ?2, datetime('now'), (SELECT COALESCE(MAX(revision), 0) + 1 FROM documents))
     ON CONFLICT(path) DO UPDATE SET
        body = excluded.body,
        updated_at = excluded.updated_at,
        revision = excluded.revision";

/// SQLite-backed document store. Each document is a JSON object
/// addressed by a slash-separated path.
pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn new(path: &Path) -> TrackerResult<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        conn.busy_timeout(std::time::Duration::from_millis(250))?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> TrackerResult<Self> {
        let db = Self { conn: Connection::open_in_memory()? };
        db.run_migrations()?;
        Ok(db)
    }

    pub fn run_migrations(&self) -> TrackerResult<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT DEFAULT (datetime('now'))
            );"
        )?;

        let current_version: i64 = self.conn.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM _migrations",
            [],
            |row| row.get(0),
        )?;

        if current_version < 1 {
            self.apply_v1()?;
        }
        if current_version < 2 {
            self.apply_v2()?;
        }

        Ok(())
    }

    fn apply_v1(&self) -> TrackerResult<()> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS documents (
                path TEXT PRIMARY KEY,
                body TEXT NOT NULL,
                updated_at TEXT DEFAULT (datetime('now'))
            );

            INSERT INTO _migrations (version) VALUES (1);
            "
        )?;
        Ok(())
    }

    /// Every write stamps the document with the next store-wide revision,
    /// so other processes sharing the file can find what changed.
    fn apply_v2(&self) -> TrackerResult<()> {
        self.conn.execute_batch(
            "
            ALTER TABLE documents ADD COLUMN revision INTEGER NOT NULL DEFAULT 0;
            CREATE INDEX IF NOT EXISTS idx_documents_revision ON documents(revision);

            INSERT INTO _migrations (version) VALUES (2);
            "
        )?;
        Ok(())
    }

    pub fn get_document(&self, path: &str) -> TrackerResult<Option<Value>> {
        let body: Option<String> = self
            .conn
            .query_row(
                "SELECT body FROM documents WHERE path = ?1",
                rusqlite::params![path],
                |row| row.get(0),
            )
            .optional()?;
        match body {
            Some(text) => Ok(Some(serde_json::from_str(&text)?)),
            None => Ok(None),
        }
    }

    /// Replace the whole document.
    pub fn set_document(&self, path: &str, body: &Value) -> TrackerResult<()> {
        self.conn.execute(
            UPSERT_DOCUMENT,
            rusqlite::params![path, serde_json::to_string(body)?],
        )?;
        Ok(())
    }

    /// Merge `patch` into the stored document, creating it if missing.
    /// Fields absent from the patch are left as they are.
    pub fn merge_document(&mut self, path: &str, patch: &Value) -> TrackerResult<Value> {
        // take the write lock up front so a busy writer is waited on
        let tx = self.conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let existing: Option<String> = tx
            .query_row(
                "SELECT body FROM documents WHERE path = ?1",
                rusqlite::params![path],
                |row| row.get(0),
            )
            .optional()?;

        let mut merged = match existing {
            Some(text) => serde_json::from_str(&text)?,
            None => Value::Object(Default::default()),
        };
        merge_json(&mut merged, patch);

        tx.execute(
            UPSERT_DOCUMENT,
            rusqlite::params![path, serde_json::to_string(&merged)?],
        )?;
        tx.commit()?;
        Ok(merged)
    }

    /// Paths under `prefix`, e.g. every daily record.
    pub fn list_paths(&self, prefix: &str) -> TrackerResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT path FROM documents WHERE substr(path, 1, length(?1)) = ?1 ORDER BY path"
        )?;
        let paths = stmt
            .query_map(rusqlite::params![prefix], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(paths)
    }

    /// Highest revision written so far, 0 for an empty store.
    pub fn latest_revision(&self) -> TrackerResult<i64> {
        let revision = self.conn.query_row(
            "SELECT COALESCE(MAX(revision), 0) FROM documents",
            [],
            |row| row.get(0),
        )?;
        Ok(revision)
    }

    /// Documents written after `revision`, oldest write first.
    pub fn changed_since(&self, revision: i64) -> TrackerResult<Vec<(String, i64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT path, revision FROM documents WHERE revision > ?1 ORDER BY revision"
        )?;
        let rows = stmt
            .query_map(rusqlite::params![revision], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<(String, i64)>, _>>()?;
        Ok(rows)
    }
}

/// Objects merge key by key, anything else is replaced.
pub fn merge_json(target: &mut Value, patch: &Value) {
    match (target, patch) {
        (Value::Object(target), Value::Object(patch)) => {
            for (key, value) in patch {
                match target.get_mut(key) {
                    Some(existing) => merge_json(existing, value),
                    None => {
                        target.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (target, patch) => *target = patch.clone(),
    }
}
