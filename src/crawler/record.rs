//! Record types produced by extractors
//!
//! Every site-specific row is carried as a tagged `Record`: the kind selects
//! the natural-key namespace, the key and timestamp are required, and the
//! remaining site fields live in an open JSON attribute map.

use crate::crawler::ParentId;
use chrono::NaiveDateTime;
use serde_json::{Map, Value};
use std::fmt;

/// Attribute key holding the parent's creation time on the first item
pub const DETAIL_CREATED_AT: &str = "detail_created_at";

/// Attribute key holding the parent's body text on the first item
pub const DETAIL_BODY: &str = "detail_body";

/// Kind of harvested record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    /// Forum topic (natural key: topic id)
    Topic,
    /// Forum reply (natural key: data-cid)
    Reply,
    /// Friend channel (natural key: channel id)
    Channel,
    /// Fan-app album (natural key: album url)
    Album,
    /// Fan-app live or radio broadcast (natural key: live id)
    Live,
}

impl RecordKind {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Topic => "topic",
            Self::Reply => "reply",
            Self::Channel => "channel",
            Self::Album => "album",
            Self::Live => "live",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "topic" => Some(Self::Topic),
            "reply" => Some(Self::Reply),
            "channel" => Some(Self::Channel),
            "album" => Some(Self::Album),
            "live" => Some(Self::Live),
            _ => None,
        }
    }

    pub fn all_kinds() -> [Self; 5] {
        [
            Self::Topic,
            Self::Reply,
            Self::Channel,
            Self::Album,
            Self::Live,
        ]
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// Shared capability of everything the recency gate and the sink look at
pub trait Keyed {
    /// Raw listing timestamp, in any format the gate understands
    fn timestamp(&self) -> &str;

    /// Site-specific identifier used for idempotent persistence
    fn natural_key(&self) -> &str;
}

/// One extracted item
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub kind: RecordKind,
    pub key: String,
    pub parent: ParentId,
    pub timestamp: String,
    pub attributes: Map<String, Value>,
}

impl Record {
    pub fn new(
        kind: RecordKind,
        key: impl Into<String>,
        parent: ParentId,
        timestamp: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            key: key.into(),
            parent,
            timestamp: timestamp.into(),
            attributes: Map::new(),
        }
    }

    /// Adds an attribute, builder style
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.to_string(), value.into());
        self
    }

    pub fn attribute_str(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).and_then(Value::as_str)
    }

    /// Folds parent-level detail into this record's attributes
    pub fn attach_detail(&mut self, detail: &DetailRecord) {
        if let Some(created_at) = detail.created_at {
            self.attributes.insert(
                DETAIL_CREATED_AT.to_string(),
                Value::String(created_at.format("%Y-%m-%d %H:%M:%S").to_string()),
            );
        }
        self.attributes.insert(
            DETAIL_BODY.to_string(),
            Value::String(detail.body.clone()),
        );
    }
}

impl Keyed for Record {
    fn timestamp(&self) -> &str {
        &self.timestamp
    }

    fn natural_key(&self) -> &str {
        &self.key
    }
}

/// Parent-level enrichment taken from the first page of a walk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetailRecord {
    pub parent: ParentId,
    pub created_at: Option<NaiveDateTime>,
    pub body: String,
}
