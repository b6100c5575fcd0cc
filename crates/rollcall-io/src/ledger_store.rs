//! SQLite key-value store and the attendance ledger kept in it.
//!
//! The whole ledger is one JSON object stored under [`ATTENDANCE_KEY`].

use async_trait::async_trait;
use rollcall_core::{AttendanceLedger, AttendanceMap, LedgerError};
use rusqlite::OptionalExtension;
use std::path::Path;
use tokio_rusqlite::Connection;

/// Fixed key holding the serialized attendance mapping.
pub const ATTENDANCE_KEY: &str = "attendance";

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS kv (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
)";

fn storage_error(e: tokio_rusqlite::Error) -> LedgerError {
    LedgerError::Storage(e.to_string())
}

/// String key-value store backed by a single SQLite table.
#[derive(Clone)]
pub struct KvStore {
    conn: Connection,
}

impl KvStore {
    /// Open (or create) the database file, creating parent directories.
    pub async fn open(path: &Path) -> Result<Self, LedgerError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    LedgerError::Storage(format!("failed to create {}: {e}", parent.display()))
                })?;
            }
        }
        let conn = Connection::open(path).await.map_err(storage_error)?;
        tracing::info!(path = %path.display(), "opened ledger database");
        Self::init(conn).await
    }

    pub async fn open_in_memory() -> Result<Self, LedgerError> {
        let conn = Connection::open_in_memory().await.map_err(storage_error)?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self, LedgerError> {
        conn.call(|conn| {
            conn.execute(SCHEMA, [])?;
            Ok(())
        })
        .await
        .map_err(storage_error)?;
        Ok(Self { conn })
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>, LedgerError> {
        let key = key.to_string();
        self.conn
            .call(move |conn| {
                let value = conn
                    .query_row("SELECT value FROM kv WHERE key = ?1", [&key], |row| row.get(0))
                    .optional()?;
                Ok(value)
            })
            .await
            .map_err(storage_error)
    }

    pub async fn set(&self, key: &str, value: String) -> Result<(), LedgerError> {
        let key = key.to_string();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO kv (key, value) VALUES (?1, ?2)
                     ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                    rusqlite::params![key, value],
                )?;
                Ok(())
            })
            .await
            .map_err(storage_error)
    }
}

/// Attendance ledger persisted as JSON in a [`KvStore`].
#[derive(Clone)]
pub struct SqliteLedger {
    store: KvStore,
}

impl SqliteLedger {
    pub fn new(store: KvStore) -> Self {
        Self { store }
    }

    pub async fn open(path: &Path) -> Result<Self, LedgerError> {
        Ok(Self::new(KvStore::open(path).await?))
    }
}

#[async_trait]
impl AttendanceLedger for SqliteLedger {
    async fn load(&self) -> Result<AttendanceMap, LedgerError> {
        match self.store.get(ATTENDANCE_KEY).await? {
            None => Ok(AttendanceMap::new()),
            Some(json) => {
                serde_json::from_str(&json).map_err(|e| LedgerError::Corrupt(e.to_string()))
            }
        }
    }

    async fn store(&self, map: &AttendanceMap) -> Result<(), LedgerError> {
        let json = serde_json::to_string(map).map_err(|e| LedgerError::Corrupt(e.to_string()))?;
        self.store.set(ATTENDANCE_KEY, json).await?;
        tracing::debug!(entries = map.len(), "ledger stored");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rollcall_core::{mark_attendance, AttendanceStatus, Clock};

    struct FixedClock(NaiveDate);

    impl Clock for FixedClock {
        fn today(&self) -> NaiveDate {
            self.0
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    async fn ledger() -> SqliteLedger {
        SqliteLedger::new(KvStore::open_in_memory().await.unwrap())
    }

    #[tokio::test]
    async fn test_kv_get_missing_and_overwrite() {
        let store = KvStore::open_in_memory().await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);

        store.set("k", "one".into()).await.unwrap();
        store.set("k", "two".into()).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("two"));
    }

    #[tokio::test]
    async fn test_never_written_ledger_is_empty() {
        assert!(ledger().await.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_store_then_load_round_trips() {
        let ledger = ledger().await;
        let mut map = AttendanceMap::new();
        map.insert(date(2026, 10, 16), AttendanceStatus::Absent);
        map.insert(date(2026, 10, 17), AttendanceStatus::Present);

        ledger.store(&map).await.unwrap();
        assert_eq!(ledger.load().await.unwrap(), map);
    }

    #[tokio::test]
    async fn test_persisted_layout_is_date_keyed_json() {
        let store = KvStore::open_in_memory().await.unwrap();
        let ledger = SqliteLedger::new(store.clone());
        mark_attendance(&ledger, &FixedClock(date(2026, 10, 17)), AttendanceStatus::Present)
            .await
            .unwrap();

        let raw = store.get(ATTENDANCE_KEY).await.unwrap().unwrap();
        assert_eq!(raw, r#"{"2026-10-17":"present"}"#);
    }

    #[tokio::test]
    async fn test_corrupt_json_is_reported() {
        let store = KvStore::open_in_memory().await.unwrap();
        store.set(ATTENDANCE_KEY, "{not json".into()).await.unwrap();

        let err = SqliteLedger::new(store).load().await.unwrap_err();
        assert!(matches!(err, LedgerError::Corrupt(_)));
    }

    #[tokio::test]
    async fn test_ledger_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("ledger.db");

        {
            let ledger = SqliteLedger::open(&path).await.unwrap();
            mark_attendance(&ledger, &FixedClock(date(2026, 10, 17)), AttendanceStatus::Late)
                .await
                .unwrap();
        }

        let reopened = SqliteLedger::open(&path).await.unwrap();
        let map = reopened.load().await.unwrap();
        assert_eq!(map.get(&date(2026, 10, 17)), Some(&AttendanceStatus::Late));
    }
}
