//! Storage traits and error types
//!
//! `Sink` is the narrow interface the page walker and the dispatcher write
//! through. `Storage` adds run tracking and statistics for the binary.

use crate::crawler::{ParentId, Record, RecordKind};
use crate::state::ParentStatus;
use crate::storage::{RunRecord, RunStatus, StoredRecord};
use std::collections::HashMap;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Destination for extracted records
///
/// Implementations are shared across concurrent walks and must be usable
/// through `&self`.
pub trait Sink: Send + Sync {
    /// Inserts or updates a batch, idempotent on `(kind, natural key)`
    ///
    /// # Returns
    ///
    /// The number of rows inserted or updated
    fn upsert_batch(&self, records: &[Record]) -> StorageResult<u64>;

    /// Moves a parent record from `unused` to `done`
    ///
    /// # Returns
    ///
    /// The number of rows touched; zero means the parent was never stored
    fn mark_parent_done(&self, kind: RecordKind, parent: &ParentId) -> StorageResult<u64>;

    /// Lists parents of the given kind whose child walk has not completed
    ///
    /// # Arguments
    ///
    /// * `kind` - The parent record kind (e.g. `Topic`)
    /// * `under` - Restrict to parents stored under this grandparent
    fn pending_parents(
        &self,
        kind: RecordKind,
        under: Option<&ParentId>,
    ) -> StorageResult<Vec<ParentId>>;
}

/// Full storage backend used by the harvester
pub trait Storage: Sink {
    // ===== Run Management =====

    /// Creates a new harvest run
    ///
    /// # Arguments
    ///
    /// * `config_hash` - Hash of the configuration file
    ///
    /// # Returns
    ///
    /// The ID of the newly created run
    fn create_run(&self, config_hash: &str) -> StorageResult<i64>;

    /// Gets a run by ID
    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord>;

    /// Gets the most recent run
    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>>;

    /// Sets the final status of a run and stamps its finish time
    fn complete_run(&self, run_id: i64, status: RunStatus) -> StorageResult<()>;

    // ===== Records =====

    /// Gets a stored record by kind and natural key
    fn get_record(&self, kind: RecordKind, key: &str) -> StorageResult<Option<StoredRecord>>;

    /// Resets every parent of the given kind to `unused`
    fn reset_parents(&self, kind: RecordKind) -> StorageResult<u64>;

    // ===== Statistics =====

    /// Counts stored records per kind
    fn count_records_by_kind(&self) -> StorageResult<HashMap<RecordKind, u64>>;

    /// Counts records of one kind per parent status
    fn count_parents_by_status(
        &self,
        kind: RecordKind,
    ) -> StorageResult<HashMap<ParentStatus, u64>>;
}
