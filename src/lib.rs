//! pagewalk: a recency-bounded pagination harvester
//!
//! This crate walks page-ordered remote listings (forum topic lists, reply
//! threads, fan-app album feeds), stops once items fall out of a recency
//! window, and fans out one walk per parent entity with bounded concurrency.
//! Extracted records are persisted idempotently to SQLite.

pub mod config;
pub mod crawler;
pub mod output;
pub mod recency;
pub mod sites;
pub mod state;
pub mod storage;

use thiserror::Error;

/// Main error type for harvesting operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Network or HTTP failure; fatal to the current walk
    #[error("Transport error for {url}: {message}")]
    Transport { url: String, message: String },

    /// Malformed document, JSON payload or timestamp
    #[error("Parse error: {0}")]
    Parse(String),

    /// The sink rejected a batch; earlier batches stay committed
    #[error("Persistence error: {0}")]
    Persistence(#[from] storage::StorageError),

    /// An expected update touched zero rows
    #[error("Consistency error: {0}")]
    Consistency(String),

    #[error("Walk for {parent} was cancelled")]
    Cancelled { parent: String },

    #[error("Walk task for {parent} failed: {message}")]
    TaskFailed { parent: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl HarvestError {
    /// Creates a transport error for the given URL
    pub fn transport(url: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Transport {
            url: url.into(),
            message: message.to_string(),
        }
    }

    /// Creates a parse error
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse(message.into())
    }

    /// Creates a consistency error
    pub fn consistency(message: impl Into<String>) -> Self {
        Self::Consistency(message.into())
    }
}

impl From<rusqlite::Error> for HarvestError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Persistence(storage::StorageError::Sqlite(err))
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid timestamp in config: {0}")]
    InvalidTimestamp(String),
}

/// Result type alias for harvesting operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{
    Cursor, CursorKind, DetailRecord, DispatchOutcome, FanOutDispatcher, FetchedPage, Keyed,
    PageSource, PageWalker, ParentId, Record, RecordKind, WalkResult,
};
pub use recency::{Cutoff, RecencyGate};
pub use state::{ParentStatus, WalkStop};
pub use storage::{Sink, SqliteStorage};
