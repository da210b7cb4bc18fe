//! Conflict log stored in a SQLite database.
//!
//! Each entry is kept as its JSON document, with the columns used for
//! ordering and lookup broken out. The schema is versioned through the
//! `user_version` pragma.

use std::path::Path;

use rusqlite::{params, Connection};
use tracing::{debug, info};

use crate::errors::LogError;

use super::ConflictLogEntry;

/// Migrations in order: `(version, description, sql)`.
static MIGRATIONS: &[(u32, &str, &str)] = &[(
    1,
    "initial schema",
    r#"
    CREATE TABLE IF NOT EXISTS resolutions (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        session_id  TEXT NOT NULL,
        logged_at   TEXT NOT NULL,
        path        TEXT NOT NULL,
        outcome     TEXT NOT NULL,
        tool        TEXT,
        entry       TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_resolutions_path ON resolutions (path);
    CREATE INDEX IF NOT EXISTS idx_resolutions_session ON resolutions (session_id);
    "#,
)];

#[derive(Debug)]
pub struct SqliteLog {
    conn: Connection,
}

impl SqliteLog {
    /// Open (or create) the database at `path` and bring its schema up to
    /// date.
    pub fn open(path: &Path) -> Result<Self, LogError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA busy_timeout = 5000;")?;
        run_migrations(&conn)?;
        Ok(Self { conn })
    }

    #[cfg(test)]
    fn in_memory() -> Result<Self, LogError> {
        let conn = Connection::open_in_memory()?;
        run_migrations(&conn)?;
        Ok(Self { conn })
    }

    pub fn append(&mut self, entry: &ConflictLogEntry) -> Result<(), LogError> {
        let json = serde_json::to_string(entry)?;
        let outcome = serde_json::to_value(entry.outcome)?;
        self.conn.execute(
            "INSERT INTO resolutions (session_id, logged_at, path, outcome, tool, entry)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                entry.session_id.to_string(),
                entry.logged_at.to_rfc3339(),
                entry.path,
                outcome.as_str().unwrap_or_default(),
                entry.tool,
                json,
            ],
        )?;
        debug!(id = self.conn.last_insert_rowid(), path = %entry.path, "conflict log row inserted");
        Ok(())
    }

    /// The newest `limit` entries, newest first.
    pub fn recent(&self, limit: usize) -> Result<Vec<ConflictLogEntry>, LogError> {
        let mut stmt = self
            .conn
            .prepare("SELECT entry FROM resolutions ORDER BY id DESC LIMIT ?1")?;
        let rows = stmt
            .query_map(params![limit as i64], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        rows.iter()
            .map(|json| serde_json::from_str(json).map_err(LogError::from))
            .collect()
    }
}

fn run_migrations(conn: &Connection) -> Result<(), LogError> {
    let current: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    for &(version, description, sql) in MIGRATIONS {
        if version > current {
            info!(version, description, "applying conflict log migration");
            conn.execute_batch(sql)?;
            conn.pragma_update(None, "user_version", version)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conflict::ResolutionMethod;
    use crate::conflict_log::tests::entry;

    #[test]
    fn test_migrations_are_idempotent() {
        let log = SqliteLog::in_memory().unwrap();
        run_migrations(&log.conn).unwrap();
        let version: u32 = log
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap();
        assert_eq!(version, 1);
    }

    #[test]
    fn test_append_and_limit() {
        let mut log = SqliteLog::in_memory().unwrap();
        for path in ["a", "b", "c"] {
            log.append(&entry(path, ResolutionMethod::Tool("meld".into())))
                .unwrap();
        }
        let recent = log.recent(2).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].path, "c");
        assert_eq!(recent[1].path, "b");
        assert_eq!(recent[0].tool.as_deref(), Some("meld"));
    }
}
