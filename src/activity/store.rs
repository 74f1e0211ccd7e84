//! SQLite-backed activity log storage.

use super::ActivityRecord;
use crate::error::{BellError, Result};
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS activity_logs (
    id          TEXT PRIMARY KEY,
    event_type  TEXT NOT NULL,
    event_time  TEXT NOT NULL,
    description TEXT NOT NULL,
    timestamp   TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_activity_logs_timestamp ON activity_logs(timestamp);";

/// A persisted activity record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredActivity {
    pub id: String,
    pub event_type: String,
    pub event_time: String,
    pub description: String,
    /// When the record was stored (UTC).
    pub timestamp: DateTime<Utc>,
}

/// Activity log table in a SQLite database.
///
/// Thread-safe via an internal `Mutex<Connection>`.
pub struct ActivityStore {
    conn: Mutex<Connection>,
}

impl ActivityStore {
    /// Open (or create) the database file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`BellError::Store`] if the file cannot be opened or the schema applied.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)
            .map_err(|e| BellError::Store(format!("cannot open {}: {e}", path.display())))?;
        Self::with_connection(conn)
    }

    /// A private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| BellError::Store(format!("cannot open in-memory db: {e}")))?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)
            .map_err(|e| BellError::Store(format!("cannot apply schema: {e}")))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Store `record` with a fresh id and the current time.
    pub fn insert(&self, record: &ActivityRecord) -> Result<StoredActivity> {
        let stored = StoredActivity {
            id: uuid::Uuid::new_v4().to_string(),
            event_type: record.event_type.clone(),
            event_time: record.event_time.clone(),
            description: record.description.clone(),
            timestamp: Utc::now().trunc_subsecs(6),
        };

        self.lock()
            .execute(
                "INSERT INTO activity_logs (id, event_type, event_time, description, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    stored.id,
                    stored.event_type,
                    stored.event_time,
                    stored.description,
                    // Fixed width so text order equals time order.
                    stored.timestamp.to_rfc3339_opts(SecondsFormat::Micros, true),
                ],
            )
            .map_err(|e| BellError::Store(format!("cannot insert activity: {e}")))?;
        Ok(stored)
    }

    /// Up to `limit` records, newest first.
    pub fn recent(&self, limit: usize) -> Result<Vec<StoredActivity>> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare(
                "SELECT id, event_type, event_time, description, timestamp
                 FROM activity_logs ORDER BY timestamp DESC, rowid DESC LIMIT ?1",
            )
            .map_err(|e| BellError::Store(format!("cannot query activity: {e}")))?;

        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt
            .query_map(params![limit], row_to_activity)
            .map_err(|e| BellError::Store(format!("cannot query activity: {e}")))?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row.map_err(|e| BellError::Store(format!("bad activity row: {e}")))?);
        }
        Ok(out)
    }

    pub fn count(&self) -> Result<usize> {
        let n: i64 = self
            .lock()
            .query_row("SELECT COUNT(*) FROM activity_logs", [], |row| row.get(0))
            .map_err(|e| BellError::Store(format!("cannot count activity: {e}")))?;
        Ok(usize::try_from(n).unwrap_or(0))
    }
}

fn row_to_activity(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredActivity> {
    let raw: String = row.get(4)?;
    let timestamp = DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
        })?;
    Ok(StoredActivity {
        id: row.get(0)?,
        event_type: row.get(1)?,
        event_time: row.get(2)?,
        description: row.get(3)?,
        timestamp,
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    fn record(event_type: &str, time: &str) -> ActivityRecord {
        ActivityRecord {
            event_type: event_type.to_owned(),
            event_time: time.to_owned(),
            description: format!("{event_type} dimainkan"),
        }
    }

    #[test]
    fn insert_assigns_id_and_timestamp() {
        let store = ActivityStore::open_in_memory().unwrap();
        let stored = store.insert(&record("hourly_tick", "09:00:00")).unwrap();
        assert_eq!(stored.id.len(), 36);
        assert_eq!(stored.event_time, "09:00:00");
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn recent_is_newest_first_and_limited() {
        let store = ActivityStore::open_in_memory().unwrap();
        for hour in 7..12 {
            store
                .insert(&record("hourly_tick", &format!("{hour:02}:00:00")))
                .unwrap();
        }

        let recent = store.recent(3).unwrap();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].event_time, "11:00:00");
        assert_eq!(recent[2].event_time, "09:00:00");
    }

    #[test]
    fn file_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("activity.db");
        {
            let store = ActivityStore::open(&path).unwrap();
            store.insert(&record("weekday_instant", "08:00:00")).unwrap();
        }
        let store = ActivityStore::open(&path).unwrap();
        let recent = store.recent(100).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].event_type, "weekday_instant");
    }
}
