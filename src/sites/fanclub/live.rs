//! Live and radio broadcasts
//!
//! The broadcast feed is one listing, newest first, paged by an opaque
//! `next` token; an empty token ends it. Listing entries only carry the
//! live id and `ctime` (epoch milliseconds), so each stored broadcast is
//! then enriched by a one-item detail walk with the live id as parent.
//! Both walks write the same `Live` record under the `LIVE_FEED` parent.

use super::{json_id, FanclubApi, LIVE_DETAIL_PATH, LIVE_LIST_PATH};
use crate::crawler::{Cursor, Extractor, FetchedPage, PageSource, ParentId, Record, RecordKind};
use crate::HarvestError;
use async_trait::async_trait;
use chrono::{Local, TimeZone};
use serde_json::{json, Value};

/// Parent of every `Live` record
pub const LIVE_FEED: &str = "lives";

/// Display label of a broadcast type
pub fn live_type_label(live_type: i64) -> &'static str {
    match live_type {
        1 => "直播",
        2 => "电台",
        3 => "录屏",
        _ => "未知",
    }
}

/// Reads the `next` token; a missing or empty token means no more pages
fn next_token(content: &Value) -> Result<Option<Cursor>, HarvestError> {
    let token = match content.get("next") {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::String(s)) if s.is_empty() => return Ok(None),
        Some(Value::String(s)) => s.parse::<u64>().ok(),
        Some(Value::Number(n)) => n.as_u64(),
        Some(_) => None,
    };
    token
        .map(|value| Some(Cursor(value)))
        .ok_or_else(|| HarvestError::parse(format!("unreadable next token {}", content["next"])))
}

/// The broadcast feed
pub struct LiveListSource {
    api: FanclubApi,
}

impl LiveListSource {
    pub fn new(api: FanclubApi) -> Self {
        Self { api }
    }

    /// Request payload for the page at `cursor`; all fields are strings
    pub fn payload(cursor: Cursor) -> Value {
        json!({
            "debug": "true",
            "groupId": "0",
            "next": cursor.to_string(),
            "record": "true",
            "teamId": "0",
            "userId": "0",
        })
    }
}

#[async_trait]
impl PageSource for LiveListSource {
    type Item = Value;
    type Detail = ();

    fn page_size(&self) -> usize {
        0
    }

    async fn fetch_page(
        &self,
        _parent: &ParentId,
        cursor: Cursor,
        _with_detail: bool,
    ) -> Result<FetchedPage<Value, ()>, HarvestError> {
        let mut content = self.api.content(LIVE_LIST_PATH, &Self::payload(cursor)).await?;
        let next = next_token(&content)?.unwrap_or(cursor);

        let items = match content.get_mut("liveList").map(Value::take) {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items,
            Some(other) => {
                return Err(HarvestError::parse(format!(
                    "liveList is not an array: {}",
                    other
                )))
            }
        };

        Ok(FetchedPage::new(items).with_next_cursor(next))
    }
}

fn ctime(raw: &Value, context: &str) -> Result<i64, HarvestError> {
    raw.get("ctime")
        .and_then(|value| value.as_i64().or_else(|| value.as_str()?.parse().ok()))
        .ok_or_else(|| HarvestError::parse(format!("{} has no ctime", context)))
}

/// Builds bare `Live` records from feed entries
#[derive(Debug, Default, Clone, Copy)]
pub struct LiveListExtractor;

impl Extractor for LiveListExtractor {
    type Item = Value;
    type Detail = ();

    fn extract(&self, parent: &ParentId, raw: &Value) -> Result<Record, HarvestError> {
        let live_id = raw
            .get("liveId")
            .and_then(json_id)
            .ok_or_else(|| HarvestError::parse("feed entry has no liveId"))?;
        let ctime = ctime(raw, &format!("live {}", live_id))?;

        Ok(
            Record::new(RecordKind::Live, live_id.as_str(), parent.clone(), ctime.to_string())
                .with("live_id", live_id)
                .with("ctime", ctime),
        )
    }
}

/// Detail of one broadcast, parented by its live id
pub struct LiveDetailSource {
    api: FanclubApi,
}

impl LiveDetailSource {
    pub fn new(api: FanclubApi) -> Self {
        Self { api }
    }
}

#[async_trait]
impl PageSource for LiveDetailSource {
    type Item = Value;
    type Detail = ();

    fn page_size(&self) -> usize {
        0
    }

    async fn fetch_page(
        &self,
        parent: &ParentId,
        cursor: Cursor,
        _with_detail: bool,
    ) -> Result<FetchedPage<Value, ()>, HarvestError> {
        let content = self
            .api
            .content(LIVE_DETAIL_PATH, &json!({ "liveId": parent.as_str() }))
            .await?;
        Ok(FetchedPage::new(vec![content]).with_next_cursor(cursor))
    }
}

/// Builds full `Live` records from broadcast detail
#[derive(Debug, Default, Clone, Copy)]
pub struct LiveDetailExtractor;

impl Extractor for LiveDetailExtractor {
    type Item = Value;
    type Detail = ();

    fn extract(&self, parent: &ParentId, raw: &Value) -> Result<Record, HarvestError> {
        let live_id = raw
            .get("liveId")
            .and_then(json_id)
            .unwrap_or_else(|| parent.to_string());
        let ctime = ctime(raw, &format!("live {}", live_id))?;
        let text = |pointer: &str| {
            raw.pointer(pointer)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        let live_date = Local
            .timestamp_millis_opt(ctime)
            .single()
            .and_then(|t| t.format("%Y%m%d").to_string().parse::<i64>().ok())
            .unwrap_or(0);

        // Same parent and timestamp as the feed entry, so the upsert merges
        // into it without resetting its status
        Ok(Record::new(
            RecordKind::Live,
            live_id.as_str(),
            ParentId::from(LIVE_FEED),
            ctime.to_string(),
        )
        .with("live_id", live_id)
        .with(
            "live_type",
            live_type_label(raw.get("liveType").and_then(Value::as_i64).unwrap_or(0)),
        )
        .with(
            "online_num",
            raw.get("onlineNum").and_then(Value::as_i64).unwrap_or(0),
        )
        .with("msg_file_path", text("/msgFilePath"))
        .with("owner_name", text("/user/userName"))
        .with("title", text("/title"))
        .with("play_stream_path", text("/playStreamPath"))
        .with("ctime", ctime)
        .with("live_date", live_date))
    }
}
