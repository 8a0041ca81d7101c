//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the `Sink` and
//! `Storage` traits. The connection sits behind a mutex so concurrent walks
//! can share one `Arc<SqliteStorage>`.

use crate::crawler::{ParentId, Record, RecordKind};
use crate::state::ParentStatus;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Sink, Storage, StorageError, StorageResult};
use crate::storage::{RunRecord, RunStatus, StoredRecord};
use crate::HarvestError;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Attribute maps are merged so fields only present on some pages (the
/// first-page detail) survive later re-listings. A changed timestamp sends
/// the record back to `unused` so its children are walked again.
const UPSERT_SQL: &str = "
    INSERT INTO records (kind, natural_key, parent, timestamp, attributes, status, first_seen, updated_at)
    VALUES (?1, ?2, ?3, ?4, ?5, 'unused', ?6, ?6)
    ON CONFLICT(kind, natural_key) DO UPDATE SET
        parent = excluded.parent,
        attributes = json_patch(records.attributes, excluded.attributes),
        status = CASE WHEN records.timestamp = excluded.timestamp
                      THEN records.status ELSE 'unused' END,
        timestamp = excluded.timestamp,
        updated_at = excluded.updated_at
";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(HarvestError)` - Failed to open database
    pub fn new(path: &Path) -> Result<Self, HarvestError> {
        let conn = Connection::open(path)?;

        // Configure SQLite for better performance
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            PRAGMA busy_timeout = 5000;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Creates an in-memory database (for testing and dry runs)
    pub fn new_in_memory() -> Result<Self, HarvestError> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StorageError::Database("connection mutex poisoned".to_string()))
    }
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get(0)?,
        started_at: row.get(1)?,
        finished_at: row.get(2)?,
        config_hash: row.get(3)?,
        status: RunStatus::from_db_string(&row.get::<_, String>(4)?)
            .unwrap_or(RunStatus::Running),
    })
}

impl Sink for SqliteStorage {
    fn upsert_batch(&self, records: &[Record]) -> StorageResult<u64> {
        if records.is_empty() {
            return Ok(0);
        }

        let now = Utc::now().to_rfc3339();
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let mut affected = 0u64;

        {
            let mut stmt = tx.prepare_cached(UPSERT_SQL)?;
            for record in records {
                let attributes = serde_json::to_string(&record.attributes)?;
                affected += stmt.execute(params![
                    record.kind.to_db_string(),
                    record.key,
                    record.parent.as_str(),
                    record.timestamp,
                    attributes,
                    now,
                ])? as u64;
            }
        }

        tx.commit()?;
        Ok(affected)
    }

    fn mark_parent_done(&self, kind: RecordKind, parent: &ParentId) -> StorageResult<u64> {
        let now = Utc::now().to_rfc3339();
        let conn = self.lock()?;
        let affected = conn.execute(
            "UPDATE records SET status = ?1, updated_at = ?2 WHERE kind = ?3 AND natural_key = ?4",
            params![
                ParentStatus::Done.to_db_string(),
                now,
                kind.to_db_string(),
                parent.as_str()
            ],
        )?;
        Ok(affected as u64)
    }

    fn pending_parents(
        &self,
        kind: RecordKind,
        under: Option<&ParentId>,
    ) -> StorageResult<Vec<ParentId>> {
        let conn = self.lock()?;
        let unused = ParentStatus::Unused.to_db_string();

        let keys = match under {
            Some(grandparent) => {
                let mut stmt = conn.prepare(
                    "SELECT natural_key FROM records
                     WHERE kind = ?1 AND status = ?2 AND parent = ?3 ORDER BY id",
                )?;
                let rows = stmt.query_map(
                    params![kind.to_db_string(), unused, grandparent.as_str()],
                    |row| row.get::<_, String>(0),
                )?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
            None => {
                let mut stmt = conn.prepare(
                    "SELECT natural_key FROM records WHERE kind = ?1 AND status = ?2 ORDER BY id",
                )?;
                let rows = stmt.query_map(params![kind.to_db_string(), unused], |row| {
                    row.get::<_, String>(0)
                })?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
        };

        Ok(keys.into_iter().map(ParentId::from).collect())
    }
}

impl Storage for SqliteStorage {
    // ===== Run Management =====

    fn create_run(&self, config_hash: &str) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO runs (started_at, config_hash, status) VALUES (?1, ?2, ?3)",
            params![now, config_hash, RunStatus::Running.to_db_string()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT id, started_at, finished_at, config_hash, status FROM runs WHERE id = ?1",
            params![run_id],
            run_from_row,
        )
        .optional()?
        .ok_or(StorageError::RunNotFound(run_id))
    }

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let conn = self.lock()?;
        let run = conn
            .query_row(
                "SELECT id, started_at, finished_at, config_hash, status FROM runs ORDER BY id DESC LIMIT 1",
                [],
                run_from_row,
            )
            .optional()?;
        Ok(run)
    }

    fn complete_run(&self, run_id: i64, status: RunStatus) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let conn = self.lock()?;
        let affected = conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2 WHERE id = ?3",
            params![status.to_db_string(), now, run_id],
        )?;
        if affected == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    // ===== Records =====

    fn get_record(&self, kind: RecordKind, key: &str) -> StorageResult<Option<StoredRecord>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT id, natural_key, parent, timestamp, attributes, status, first_seen, updated_at
                 FROM records WHERE kind = ?1 AND natural_key = ?2",
                params![kind.to_db_string(), key],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, String>(6)?,
                        row.get::<_, String>(7)?,
                    ))
                },
            )
            .optional()?;

        let Some((id, natural_key, parent, timestamp, attributes, status, first_seen, updated_at)) =
            row
        else {
            return Ok(None);
        };

        Ok(Some(StoredRecord {
            id,
            kind,
            natural_key,
            parent: ParentId::from(parent),
            timestamp,
            attributes: serde_json::from_str(&attributes)?,
            status: ParentStatus::from_db_string(&status).unwrap_or(ParentStatus::Unused),
            first_seen,
            updated_at,
        }))
    }

    fn reset_parents(&self, kind: RecordKind) -> StorageResult<u64> {
        let conn = self.lock()?;
        let affected = conn.execute(
            "UPDATE records SET status = ?1 WHERE kind = ?2",
            params![ParentStatus::Unused.to_db_string(), kind.to_db_string()],
        )?;
        Ok(affected as u64)
    }

    // ===== Statistics =====

    fn count_records_by_kind(&self) -> StorageResult<HashMap<RecordKind, u64>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT kind, COUNT(*) FROM records GROUP BY kind")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut counts = HashMap::new();
        for row in rows {
            let (kind, count) = row?;
            if let Some(kind) = RecordKind::from_db_string(&kind) {
                counts.insert(kind, count as u64);
            }
        }
        Ok(counts)
    }

    fn count_parents_by_status(
        &self,
        kind: RecordKind,
    ) -> StorageResult<HashMap<ParentStatus, u64>> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT status, COUNT(*) FROM records WHERE kind = ?1 GROUP BY status")?;
        let rows = stmt.query_map(params![kind.to_db_string()], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut counts = HashMap::new();
        for row in rows {
            let (status, count) = row?;
            if let Some(status) = ParentStatus::from_db_string(&status) {
                counts.insert(status, count as u64);
            }
        }
        Ok(counts)
    }
}
