//! SQLite-backed operation ledger.
//!
//! One table, `operations`, appended to once per dispatched handler call.
//! The connection lives behind a mutex so every append is serialized and ids
//! stay monotonic even when the ledger is shared between tasks.

use std::borrow::Cow;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row, params};
use serde_json::json;

use crate::error::StorageError;

use super::record::{NewOperation, OperationRecord, format_timestamp, now_timestamp, truncate_chars};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS operations (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        timestamp TEXT NOT NULL,
        tool_name TEXT NOT NULL CHECK (length(tool_name) > 0),
        parameters TEXT NOT NULL,
        result TEXT,
        success INTEGER NOT NULL,
        duration_ms INTEGER NOT NULL CHECK (duration_ms >= 0)
    );

    CREATE INDEX IF NOT EXISTS idx_operations_tool ON operations(tool_name);
"#;

const SELECT_COLUMNS: &str = "SELECT id, timestamp, tool_name, parameters, result, success, duration_ms FROM operations";

/// Append-only history of dispatched operations.
pub struct Ledger {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
    max_result_chars: Option<usize>,
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger")
            .field("path", &self.path)
            .field("max_result_chars", &self.max_result_chars)
            .finish_non_exhaustive()
    }
}

impl Ledger {
    /// Open or create the ledger database at `path`.
    ///
    /// Parent directories and the schema are created if absent.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;
        log::debug!("Opened ledger at {}", path.display());

        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path.to_path_buf()),
            max_result_chars: None,
        })
    }

    /// Open a private in-memory ledger (tests, dry runs).
    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: None,
            max_result_chars: None,
        })
    }

    /// Cap the result text kept per record. `None` stores results whole.
    ///
    /// A result over the cap is stored as `{"truncated": true, "text": <prefix>}`
    /// so the column always holds valid JSON.
    pub fn with_max_result_chars(mut self, max_chars: Option<usize>) -> Self {
        self.max_result_chars = max_chars;
        self
    }

    fn cap_result<'a>(&self, text: &'a str) -> Cow<'a, str> {
        match self.max_result_chars {
            Some(max) if text.chars().count() > max => {
                Cow::Owned(json!({"truncated": true, "text": truncate_chars(text, max)}).to_string())
            }
            _ => Cow::Borrowed(text),
        }
    }

    fn init_schema(conn: &Connection) -> Result<(), StorageError> {
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.conn.lock().map_err(|e| StorageError::Lock(e.to_string()))
    }

    /// Append one record and return its id.
    ///
    /// The insert runs in its own transaction; on error nothing is written.
    pub fn record(&self, op: &NewOperation) -> Result<i64, StorageError> {
        if op.tool_name.trim().is_empty() {
            return Err(StorageError::Constraint("tool_name must not be empty".to_string()));
        }
        if op.duration_ms < 0 {
            return Err(StorageError::Constraint(format!("duration_ms is negative: {}", op.duration_ms)));
        }

        let result = op.result.as_deref().map(|text| self.cap_result(text));

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute(
            r#"
            INSERT INTO operations (timestamp, tool_name, parameters, result, success, duration_ms)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                now_timestamp(),
                op.tool_name,
                op.parameters,
                result,
                op.success as i64,
                op.duration_ms,
            ],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        Ok(id)
    }

    /// Up to `limit` most recent records, newest first.
    pub fn query(&self, limit: usize) -> Result<Vec<OperationRecord>, StorageError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!("{SELECT_COLUMNS} ORDER BY id DESC LIMIT ?1"))?;
        let rows = stmt.query_map([clamp_limit(limit)], row_to_record)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Up to `limit` most recent records for one tool, newest first.
    pub fn query_tool(&self, tool_name: &str, limit: usize) -> Result<Vec<OperationRecord>, StorageError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!("{SELECT_COLUMNS} WHERE tool_name = ?1 ORDER BY id DESC LIMIT ?2"))?;
        let rows = stmt.query_map(params![tool_name, clamp_limit(limit)], row_to_record)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Total number of records.
    pub fn count(&self) -> Result<usize, StorageError> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM operations", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Delete records captured strictly before `cutoff`. Maintenance only.
    pub fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<usize, StorageError> {
        let conn = self.lock()?;
        let deleted = conn.execute("DELETE FROM operations WHERE timestamp < ?1", [format_timestamp(cutoff)])?;
        log::warn!("Purged {} ledger records older than {}", deleted, cutoff);
        Ok(deleted)
    }

    /// Delete every record. Maintenance only.
    pub fn purge_all(&self) -> Result<usize, StorageError> {
        let conn = self.lock()?;
        let deleted = conn.execute("DELETE FROM operations", [])?;
        log::warn!("Purged all {} ledger records", deleted);
        Ok(deleted)
    }

    /// Database file path, `None` for in-memory ledgers.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Close the underlying connection, reporting any error SQLite raises.
    pub fn close(self) -> Result<(), StorageError> {
        let conn = self.conn.into_inner().map_err(|e| StorageError::Lock(e.to_string()))?;
        conn.close().map_err(|(_, e)| StorageError::Sqlite(e))
    }
}

fn clamp_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<OperationRecord> {
    Ok(OperationRecord {
        id: row.get(0)?,
        timestamp: row.get(1)?,
        tool_name: row.get(2)?,
        parameters: row.get(3)?,
        result: row.get(4)?,
        success: row.get::<_, i64>(5)? != 0,
        duration_ms: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;
    use tempfile::TempDir;

    fn op(tool: &str, n: i64) -> NewOperation {
        NewOperation::succeeded(tool, &json!({"n": n}), &json!({"ok": n}), n as u64)
    }

    #[test]
    fn test_open_creates_directories() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested/dir/history.db");
        let ledger = Ledger::open(&path).unwrap();

        assert!(path.exists());
        assert_eq!(ledger.path(), Some(path.as_path()));
    }

    #[test]
    fn test_open_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("history.db");

        {
            let ledger = Ledger::open(&path).unwrap();
            ledger.record(&op("a", 1)).unwrap();
        }

        let ledger = Ledger::open(&path).unwrap();
        assert_eq!(ledger.count().unwrap(), 1);
    }

    #[test]
    fn test_record_and_query_round_trip() {
        let ledger = Ledger::open_in_memory().unwrap();
        let new_op = NewOperation::failed("extract_tax_documents", &json!({"dry_run": true}), "boom", 42);

        let id = ledger.record(&new_op).unwrap();
        let records = ledger.query(10).unwrap();

        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.id, id);
        assert_eq!(record.tool_name, new_op.tool_name);
        assert_eq!(record.parameters, new_op.parameters);
        assert_eq!(record.result, new_op.result);
        assert_eq!(record.success, new_op.success);
        assert_eq!(record.duration_ms, 42);
        assert!(record.timestamp.ends_with('Z'));
    }

    #[test]
    fn test_ids_strictly_increase() {
        let ledger = Ledger::open_in_memory().unwrap();
        let ids: Vec<i64> = (0..5).map(|n| ledger.record(&op("t", n)).unwrap()).collect();

        assert!(ids.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_query_returns_newest_first_up_to_limit() {
        let ledger = Ledger::open_in_memory().unwrap();
        for n in 0..5 {
            ledger.record(&op("t", n)).unwrap();
        }

        let records = ledger.query(3).unwrap();
        assert_eq!(records.len(), 3);
        let ids: Vec<i64> = records.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![5, 4, 3]);
    }

    #[test]
    fn test_query_fewer_than_limit() {
        let ledger = Ledger::open_in_memory().unwrap();
        ledger.record(&op("t", 1)).unwrap();
        ledger.record(&op("t", 2)).unwrap();

        assert_eq!(ledger.query(20).unwrap().len(), 2);
        assert!(ledger.query(0).unwrap().is_empty());
    }

    #[test]
    fn test_query_rereads_current_state() {
        let ledger = Ledger::open_in_memory().unwrap();
        ledger.record(&op("t", 1)).unwrap();
        assert_eq!(ledger.query(10).unwrap().len(), 1);

        ledger.record(&op("t", 2)).unwrap();
        assert_eq!(ledger.query(10).unwrap().len(), 2);
    }

    #[test]
    fn test_query_tool_filters() {
        let ledger = Ledger::open_in_memory().unwrap();
        ledger.record(&op("organize_downloads", 1)).unwrap();
        ledger.record(&op("sync_notion_context", 2)).unwrap();
        ledger.record(&op("organize_downloads", 3)).unwrap();

        let records = ledger.query_tool("organize_downloads", 10).unwrap();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.tool_name == "organize_downloads"));
        assert!(records[0].id > records[1].id);
    }

    #[test]
    fn test_empty_tool_name_rejected() {
        let ledger = Ledger::open_in_memory().unwrap();
        let err = ledger.record(&op("", 1)).unwrap_err();

        assert!(matches!(err, StorageError::Constraint(_)));
        assert_eq!(ledger.count().unwrap(), 0);
    }

    #[test]
    fn test_negative_duration_rejected() {
        let ledger = Ledger::open_in_memory().unwrap();
        let mut bad = op("t", 1);
        bad.duration_ms = -1;

        assert!(matches!(ledger.record(&bad), Err(StorageError::Constraint(_))));
        assert_eq!(ledger.count().unwrap(), 0);
    }

    #[test]
    fn test_result_over_cap_is_wrapped() {
        let ledger = Ledger::open_in_memory().unwrap().with_max_result_chars(Some(4));
        ledger
            .record(&NewOperation::succeeded("t", &json!({}), &json!("abcdefgh"), 0))
            .unwrap();

        let records = ledger.query(1).unwrap();
        let record = &records[0];
        assert_eq!(record.result_value(), json!({"truncated": true, "text": "\"abc"}));
    }

    #[test]
    fn test_result_under_cap_is_kept() {
        let ledger = Ledger::open_in_memory().unwrap().with_max_result_chars(Some(100));
        ledger.record(&op("t", 7)).unwrap();

        assert_eq!(ledger.query(1).unwrap()[0].result_value(), json!({"ok": 7}));
    }

    #[test]
    fn test_large_result_round_trips_without_cap() {
        let ledger = Ledger::open_in_memory().unwrap();
        let entries: Vec<_> = (0..200).map(|n| json!({"name": format!("agent-{n}"), "status": "watching"})).collect();
        let value = json!({"launch_agents": entries});
        ledger
            .record(&NewOperation::succeeded("get_ecosystem_status", &json!({}), &value, 3))
            .unwrap();

        let records = ledger.query(1).unwrap();
        let record = &records[0];
        assert!(record.result.as_deref().map(str::len).unwrap_or(0) > 1000);
        assert_eq!(record.result_value(), value);
    }

    #[tokio::test]
    async fn test_concurrent_appends_get_unique_increasing_ids() {
        let ledger = std::sync::Arc::new(Ledger::open_in_memory().unwrap());

        let tasks: Vec<_> = (0..8)
            .map(|task| {
                let ledger = ledger.clone();
                tokio::spawn(async move {
                    (0..25)
                        .map(|n| ledger.record(&op(&format!("tool-{task}"), n)).unwrap())
                        .collect::<Vec<i64>>()
                })
            })
            .collect();

        let mut all_ids = Vec::new();
        for task in tasks {
            let ids = task.await.unwrap();
            assert!(ids.windows(2).all(|w| w[0] < w[1]));
            all_ids.extend(ids);
        }

        all_ids.sort_unstable();
        all_ids.dedup();
        assert_eq!(all_ids.len(), 200);
        assert_eq!(ledger.count().unwrap(), 200);

        let newest_first: Vec<i64> = ledger.query(200).unwrap().iter().map(|r| r.id).collect();
        assert!(newest_first.windows(2).all(|w| w[0] > w[1]));
    }

    #[test]
    fn test_null_result_stored_as_null() {
        let ledger = Ledger::open_in_memory().unwrap();
        let mut new_op = op("t", 1);
        new_op.result = None;
        ledger.record(&new_op).unwrap();

        assert_eq!(ledger.query(1).unwrap()[0].result, None);
    }

    #[test]
    fn test_purge_before() {
        let ledger = Ledger::open_in_memory().unwrap();
        ledger.record(&op("t", 1)).unwrap();
        ledger.record(&op("t", 2)).unwrap();

        assert_eq!(ledger.purge_before(Utc::now() - Duration::days(1)).unwrap(), 0);
        assert_eq!(ledger.purge_before(Utc::now() + Duration::days(1)).unwrap(), 2);
        assert_eq!(ledger.count().unwrap(), 0);
    }

    #[test]
    fn test_purge_all_keeps_id_sequence() {
        let ledger = Ledger::open_in_memory().unwrap();
        let first = ledger.record(&op("t", 1)).unwrap();
        assert_eq!(ledger.purge_all().unwrap(), 1);

        let second = ledger.record(&op("t", 2)).unwrap();
        assert!(second > first);
    }

    #[test]
    fn test_close() {
        let temp_dir = TempDir::new().unwrap();
        let ledger = Ledger::open(temp_dir.path().join("history.db")).unwrap();
        ledger.record(&op("t", 1)).unwrap();
        assert!(ledger.close().is_ok());
    }
}
