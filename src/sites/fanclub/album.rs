//! Album listings
//!
//! Albums are listed per owner through a JSON POST endpoint paginated by
//! page number. Each response carries `content.userNftListInfo`; an empty
//! or missing array marks the end of the listing. `createTime` is epoch
//! milliseconds and the album `url` is the natural key.

use super::token_headers;
use crate::config::AlbumEntry;
use crate::crawler::{
    post_json, Cursor, CursorKind, Extractor, FetchedPage, PageSource, ParentId, Record,
    RecordKind,
};
use crate::HarvestError;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};

/// Album listing endpoint
pub struct AlbumSource {
    client: Client,
    api_url: String,
    page_size: usize,
    token: Option<String>,
}

impl AlbumSource {
    pub fn new(client: Client, api_url: &str, page_size: usize, token: Option<String>) -> Self {
        Self {
            client,
            api_url: api_url.to_string(),
            page_size,
            token,
        }
    }

    /// Request payload for one page; the API expects every field as a string
    pub fn payload(&self, owner: &ParentId, cursor: Cursor) -> Value {
        json!({
            "size": self.page_size.to_string(),
            "page": cursor.to_string(),
            "starId": owner.as_str(),
        })
    }
}

#[async_trait]
impl PageSource for AlbumSource {
    type Item = Value;
    type Detail = ();

    fn page_size(&self) -> usize {
        self.page_size
    }

    fn cursor_kind(&self) -> CursorKind {
        CursorKind::PageNumber
    }

    async fn fetch_page(
        &self,
        parent: &ParentId,
        cursor: Cursor,
        _with_detail: bool,
    ) -> Result<FetchedPage<Value, ()>, HarvestError> {
        let headers = token_headers(self.token.as_deref());

        let response = post_json(
            &self.client,
            &self.api_url,
            &self.payload(parent, cursor),
            &headers,
        )
        .await?;

        let items = match response.pointer("/content/userNftListInfo") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items.clone(),
            Some(other) => {
                return Err(HarvestError::parse(format!(
                    "userNftListInfo for {} is not an array: {}",
                    parent, other
                )))
            }
        };

        Ok(FetchedPage::new(items))
    }
}

/// Display label of an album's media type
pub fn file_type_label(source_type: i64) -> &'static str {
    match source_type {
        1 => "图片",
        2 => "音频",
        3 => "视频",
        _ => "未知",
    }
}

/// Display label of an album's sale state
pub fn album_state_label(state: i64) -> &'static str {
    match state {
        1 => "出售中",
        2 => "占位",
        3 => "已结束",
        _ => "未知状态",
    }
}

/// Album fields read from the API
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAlbum {
    url: String,
    create_time: i64,
    #[serde(default)]
    sold: i64,
    #[serde(default)]
    money: i64,
    #[serde(default)]
    total: i64,
    #[serde(default)]
    source_type: i64,
    #[serde(default)]
    state: i64,
}

/// Builds `Album` records, tagging each with its owner's display name
#[derive(Debug, Default, Clone)]
pub struct AlbumExtractor {
    owner_names: HashMap<String, String>,
}

impl AlbumExtractor {
    pub fn new(entries: &[AlbumEntry]) -> Self {
        let owner_names = entries
            .iter()
            .map(|entry| (entry.owner_id.to_string(), entry.owner_name.clone()))
            .collect();
        Self { owner_names }
    }
}

impl Extractor for AlbumExtractor {
    type Item = Value;
    type Detail = ();

    fn extract(&self, parent: &ParentId, raw: &Value) -> Result<Record, HarvestError> {
        let album: RawAlbum = serde_json::from_value(raw.clone())
            .map_err(|e| HarvestError::parse(format!("album under {}: {}", parent, e)))?;

        if album.url.is_empty() {
            return Err(HarvestError::parse(format!("album under {} has no url", parent)));
        }

        let owner_name = self
            .owner_names
            .get(parent.as_str())
            .cloned()
            .unwrap_or_default();

        Ok(Record::new(
            RecordKind::Album,
            album.url,
            parent.clone(),
            album.create_time.to_string(),
        )
        .with("owner_name", owner_name)
        .with("sold", album.sold)
        .with("money", album.money)
        .with("total", album.total)
        .with("source_type", album.source_type)
        .with("file_type", file_type_label(album.source_type))
        .with("state", album_state_label(album.state))
        .with("create_time", album.create_time))
    }
}

/// Keeps the first entry per owner id, preserving order
pub fn unique_owners(entries: &[AlbumEntry]) -> Vec<AlbumEntry> {
    let mut seen = HashSet::new();
    entries
        .iter()
        .filter(|entry| seen.insert(entry.owner_id))
        .cloned()
        .collect()
}
