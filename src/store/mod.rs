//! SQLite-backed case store
//!
//! Holds exactly one case under a fixed key. Saving overwrites it wholesale
//! (last writer wins). File bytes are never stored, only file metadata.

use crate::case::CaseSnapshot;
use crate::error::StoreError;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// Key of the single persisted case
pub const CURRENT_CASE_KEY: &str = "current_case";

pub trait CaseStore: Send + Sync {
    fn save(&self, snapshot: &CaseSnapshot) -> Result<(), StoreError>;
    fn load(&self) -> Result<Option<CaseSnapshot>, StoreError>;
    fn clear(&self) -> Result<(), StoreError>;
}

pub struct SqliteCaseStore {
    conn: Mutex<Connection>,
}

impl SqliteCaseStore {
    /// Open or create the store at `path`
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        tracing::debug!(path = %path.display(), "Opened case store");
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    /// Default location: <data dir>/case-intake/case.db
    pub fn default_path() -> Option<PathBuf> {
        dirs::data_dir().map(|d| d.join("case-intake").join("case.db"))
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS cases (
                id TEXT PRIMARY KEY,
                messages TEXT NOT NULL,
                files TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
        "#,
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }
}

impl CaseStore for SqliteCaseStore {
    fn save(&self, snapshot: &CaseSnapshot) -> Result<(), StoreError> {
        let messages = serde_json::to_string(&snapshot.messages)?;
        let files = serde_json::to_string(&snapshot.files)?;

        self.conn()?.execute(
            "INSERT INTO cases (id, messages, files, updated_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET
                messages = excluded.messages,
                files = excluded.files,
                updated_at = excluded.updated_at",
            params![CURRENT_CASE_KEY, messages, files, Utc::now().to_rfc3339()],
        )?;

        tracing::debug!(
            messages = snapshot.messages.len(),
            files = snapshot.files.len(),
            "Saved case"
        );
        Ok(())
    }

    fn load(&self) -> Result<Option<CaseSnapshot>, StoreError> {
        let row: Option<(String, String)> = self
            .conn()?
            .query_row(
                "SELECT messages, files FROM cases WHERE id = ?1",
                params![CURRENT_CASE_KEY],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match row {
            Some((messages, files)) => Ok(Some(CaseSnapshot {
                messages: serde_json::from_str(&messages)?,
                files: serde_json::from_str(&files)?,
            })),
            None => Ok(None),
        }
    }

    fn clear(&self) -> Result<(), StoreError> {
        self.conn()?
            .execute("DELETE FROM cases WHERE id = ?1", params![CURRENT_CASE_KEY])?;
        tracing::info!("Cleared stored case");
        Ok(())
    }
}
