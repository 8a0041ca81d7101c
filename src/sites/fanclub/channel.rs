//! Chat channels per followed star
//!
//! One walk per star id. Its single page is built from three lookups: the
//! star's server id, the server's recently active channels, then each
//! channel's room info. Only chat rooms are kept. Channels carry no listing
//! time, so the walk is not recency bounded and records are stamped with
//! the time they were seen.

use super::{json_id, FanclubApi, LAST_MESSAGE_PATH, ROOM_INFO_PATH, SERVER_JUMP_PATH};
use crate::crawler::{
    Cursor, Extractor, FetchedPage, ListingOrder, PageSource, ParentId, Record, RecordKind,
};
use crate::HarvestError;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde_json::{json, Value};

/// Room type of a member chat channel
pub const CHAT_CHANNEL: &str = "CHAT_CHANNEL";

/// Room info of one channel together with the server it was found on
#[derive(Debug, Clone, PartialEq)]
pub struct RawChannel {
    pub server_id: String,
    pub info: Value,
}

/// Channels of one star
pub struct ChannelSource {
    api: FanclubApi,
}

impl ChannelSource {
    pub fn new(api: FanclubApi) -> Self {
        Self { api }
    }

    async fn server_id(&self, star: &ParentId) -> Result<String, HarvestError> {
        let payload = json!({ "targetType": "1", "tabId": "0", "starId": star.as_str() });
        let content = self.api.content(SERVER_JUMP_PATH, &payload).await?;
        content
            .get("serverId")
            .and_then(json_id)
            .filter(|id| id != "0")
            .ok_or_else(|| HarvestError::parse(format!("no server for star {}", star)))
    }

    async fn active_channel_ids(&self, server_id: &str) -> Result<Vec<String>, HarvestError> {
        let content = self
            .api
            .content(LAST_MESSAGE_PATH, &json!({ "serverId": server_id }))
            .await?;
        Ok(content
            .get("lastMsgList")
            .and_then(Value::as_array)
            .map(|list| {
                list.iter()
                    .filter_map(|entry| entry.get("channelId").and_then(json_id))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn room_info(&self, channel_id: &str) -> Result<Value, HarvestError> {
        let mut content = self
            .api
            .content(ROOM_INFO_PATH, &json!({ "channelId": channel_id }))
            .await?;
        match content.get_mut("channelInfo").map(Value::take) {
            None | Some(Value::Null) => Err(HarvestError::parse(format!(
                "channel {} has no room info",
                channel_id
            ))),
            Some(info) => Ok(info),
        }
    }
}

#[async_trait]
impl PageSource for ChannelSource {
    type Item = RawChannel;
    type Detail = ();

    fn page_size(&self) -> usize {
        0
    }

    fn order(&self) -> ListingOrder {
        ListingOrder::Unbounded
    }

    async fn fetch_page(
        &self,
        parent: &ParentId,
        cursor: Cursor,
        _with_detail: bool,
    ) -> Result<FetchedPage<RawChannel, ()>, HarvestError> {
        let server_id = self.server_id(parent).await?;
        let channel_ids = self.active_channel_ids(&server_id).await?;
        tracing::debug!(
            "Star {} has {} active channels on server {}",
            parent,
            channel_ids.len(),
            server_id
        );

        let mut channels = Vec::with_capacity(channel_ids.len());
        for channel_id in channel_ids {
            match self.room_info(&channel_id).await {
                Ok(info) => {
                    if info.get("functionType").and_then(Value::as_str) == Some(CHAT_CHANNEL) {
                        channels.push(RawChannel {
                            server_id: server_id.clone(),
                            info,
                        });
                    }
                }
                Err(e) => tracing::warn!("Skipping channel {} of {}: {}", channel_id, parent, e),
            }
        }

        // Every channel arrives at once
        Ok(FetchedPage::new(channels).with_next_cursor(cursor))
    }
}

/// Builds `Channel` records stamped with the harvest time
#[derive(Debug, Clone)]
pub struct ChannelExtractor {
    seen_at: String,
}

impl ChannelExtractor {
    pub fn new(seen_at: NaiveDateTime) -> Self {
        Self {
            seen_at: seen_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}

impl Extractor for ChannelExtractor {
    type Item = RawChannel;
    type Detail = ();

    fn extract(&self, parent: &ParentId, raw: &RawChannel) -> Result<Record, HarvestError> {
        let info = &raw.info;
        let channel_id = info
            .get("channelId")
            .and_then(json_id)
            .ok_or_else(|| HarvestError::parse(format!("channel of {} has no id", parent)))?;
        let text = |field: &str| {
            info.get(field)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };

        Ok(
            Record::new(RecordKind::Channel, channel_id, parent.clone(), &self.seen_at)
                .with("channel_name", text("channelName"))
                .with("owner_id", info.get("ownerId").and_then(Value::as_i64).unwrap_or(0))
                .with("owner_name", text("ownerName"))
                .with("server_id", raw.server_id.as_str()),
        )
    }
}
